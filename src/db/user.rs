use super::DbExecutor;
use crate::db_message_handler_with_span;
use crate::span::AsyncDbHandler;
use actix::prelude::*;
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgTypeInfo, PgValueRef};
use sqlx::types::Uuid;
use sqlx::{FromRow, PgPool, Postgres};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Access level of a user. Stored as plain text in the `role` column.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "employee" => Ok(Role::Employee),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(String);

impl sqlx::Type<Postgres> for Role {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, Postgres> for Role {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as sqlx::Decode<'r, Postgres>>::decode(value)?;
        Ok(raw.parse()?)
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct InternalUser {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub role: Role,
}

/// Outcome of an insert guarded by the username uniqueness constraint.
#[derive(Clone, Debug)]
pub enum UserInsert {
    Created(InternalUser),
    DuplicateUsername,
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalUser>, Report>")]
pub struct UserByUsername(pub String);

db_message_handler_with_span!({
    impl AsyncDbHandler<UserByUsername> for DbExecutor {
        async fn handle(pool: PgPool, msg: UserByUsername) -> Result<Option<InternalUser>, Report> {
            let UserByUsername(username) = msg;
            debug!(username = username.as_str(), "Get user by username");
            let user = sqlx::query_as::<_, InternalUser>(
                "SELECT id, name, username, role FROM users WHERE username = $1",
            )
            .bind(&username)
            .fetch_optional(&pool)
            .await?;

            Ok(user)
        }
    }
});

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalUser>, Report>")]
pub struct UserById(pub UserId);

db_message_handler_with_span!({
    impl AsyncDbHandler<UserById> for DbExecutor {
        async fn handle(pool: PgPool, msg: UserById) -> Result<Option<InternalUser>, Report> {
            let UserById(user_id) = msg;
            debug!(id = %user_id, "Get user by id");
            let user = sqlx::query_as::<_, InternalUser>(
                "SELECT id, name, username, role FROM users WHERE id = $1",
            )
            .bind(user_id)
            .fetch_optional(&pool)
            .await?;

            Ok(user)
        }
    }
});

#[derive(Message, Clone)]
#[rtype(result = "Result<UserInsert, Report>")]
pub struct AddUser {
    pub name: String,
    pub username: String,
    pub role: Role,
}

db_message_handler_with_span!({
    impl AsyncDbHandler<AddUser> for DbExecutor {
        async fn handle(pool: PgPool, msg: AddUser) -> Result<UserInsert, Report> {
            let id = UserId::new();
            debug!(id = %id, username = msg.username.as_str(), "Insert user");
            let result = sqlx::query_as::<_, InternalUser>(
                "INSERT INTO users (id, name, username, role) VALUES ($1, $2, $3, $4) \
                 RETURNING id, name, username, role",
            )
            .bind(id)
            .bind(&msg.name)
            .bind(&msg.username)
            .bind(msg.role.as_str())
            .fetch_one(&pool)
            .await;

            match result {
                Ok(user) => Ok(UserInsert::Created(user)),
                Err(err) if super::is_unique_violation(&err, "users_username_key") => {
                    debug!(username = msg.username.as_str(), "Username already taken");
                    Ok(UserInsert::DuplicateUsername)
                }
                Err(err) => Err(err.into()),
            }
        }
    }
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_stored_values() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("employee".parse::<Role>().unwrap(), Role::Employee);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn role_round_trips_through_storage_text() {
        for role in [Role::Admin, Role::Employee] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), "admin");
        assert_eq!(serde_json::to_value(Role::Employee).unwrap(), "employee");
    }
}
