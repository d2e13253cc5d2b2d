use super::{user::UserId, DbExecutor};
use crate::db_message_handler_with_span;
use crate::span::AsyncDbHandler;
use actix::prelude::*;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct DestinationId(pub Uuid);

impl DestinationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DestinationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct InternalDestination {
    pub id: DestinationId,
    pub name: String,
    pub description: String,
    pub location: String,
    pub cost: f64,
    pub image_url: Option<String>,
    pub voting_deadline: Option<DateTime<Utc>>,
    pub added_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The narrow view vote casting needs: existence, display name and the
/// deadline that decides whether the destination is still open.
#[derive(Clone, Debug, FromRow)]
pub struct DestinationSummary {
    pub id: DestinationId,
    pub name: String,
    pub voting_deadline: Option<DateTime<Utc>>,
}

impl DestinationSummary {
    /// Voting closes strictly after the deadline passes. A destination with
    /// no deadline never closes. Evaluated against the supplied clock on
    /// every read; there is no stored open/closed flag to go stale.
    pub fn is_closed_at(&self, now: DateTime<Utc>) -> bool {
        match self.voting_deadline {
            Some(deadline) => now > deadline,
            None => false,
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<InternalDestination>, Report>")]
pub struct ListDestinations;

db_message_handler_with_span!({
    impl AsyncDbHandler<ListDestinations> for DbExecutor {
        async fn handle(pool: PgPool, _msg: ListDestinations) -> Result<Vec<InternalDestination>, Report> {
            debug!("List destinations");
            let destinations = sqlx::query_as::<_, InternalDestination>(
                "SELECT id, name, description, location, cost, image_url, voting_deadline, \
                        added_by, created_at, updated_at \
                 FROM destinations ORDER BY created_at DESC",
            )
            .fetch_all(&pool)
            .await?;

            Ok(destinations)
        }
    }
});

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalDestination>, Report>")]
pub struct DestinationById(pub DestinationId);

db_message_handler_with_span!({
    impl AsyncDbHandler<DestinationById> for DbExecutor {
        async fn handle(pool: PgPool, msg: DestinationById) -> Result<Option<InternalDestination>, Report> {
            let DestinationById(destination_id) = msg;
            debug!(id = %destination_id, "Get destination by id");
            let destination = sqlx::query_as::<_, InternalDestination>(
                "SELECT id, name, description, location, cost, image_url, voting_deadline, \
                        added_by, created_at, updated_at \
                 FROM destinations WHERE id = $1",
            )
            .bind(destination_id)
            .fetch_optional(&pool)
            .await?;

            Ok(destination)
        }
    }
});

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<DestinationSummary>, Report>")]
pub struct DestinationSummaryById(pub DestinationId);

db_message_handler_with_span!({
    impl AsyncDbHandler<DestinationSummaryById> for DbExecutor {
        async fn handle(pool: PgPool, msg: DestinationSummaryById) -> Result<Option<DestinationSummary>, Report> {
            let DestinationSummaryById(destination_id) = msg;
            debug!(id = %destination_id, "Get destination summary by id");
            let summary = sqlx::query_as::<_, DestinationSummary>(
                "SELECT id, name, voting_deadline FROM destinations WHERE id = $1",
            )
            .bind(destination_id)
            .fetch_optional(&pool)
            .await?;

            Ok(summary)
        }
    }
});

#[derive(Message, Clone)]
#[rtype(result = "Result<InternalDestination, Report>")]
pub struct AddDestination {
    pub name: String,
    pub description: String,
    pub location: String,
    pub cost: f64,
    pub image_url: Option<String>,
    pub voting_deadline: Option<DateTime<Utc>>,
    pub added_by: UserId,
}

db_message_handler_with_span!({
    impl AsyncDbHandler<AddDestination> for DbExecutor {
        async fn handle(pool: PgPool, msg: AddDestination) -> Result<InternalDestination, Report> {
            let id = DestinationId::new();
            debug!(id = %id, name = msg.name.as_str(), "Insert destination");
            let destination = sqlx::query_as::<_, InternalDestination>(
                "INSERT INTO destinations \
                     (id, name, description, location, cost, image_url, voting_deadline, added_by) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 RETURNING id, name, description, location, cost, image_url, voting_deadline, \
                           added_by, created_at, updated_at",
            )
            .bind(id)
            .bind(&msg.name)
            .bind(&msg.description)
            .bind(&msg.location)
            .bind(msg.cost)
            .bind(&msg.image_url)
            .bind(msg.voting_deadline)
            .bind(msg.added_by)
            .fetch_one(&pool)
            .await?;

            Ok(destination)
        }
    }
});

/// Full-row update. The catalog service resolves partial input against the
/// stored row first, so every column is written here.
#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalDestination>, Report>")]
pub struct UpdateDestination {
    pub id: DestinationId,
    pub name: String,
    pub description: String,
    pub location: String,
    pub cost: f64,
    pub image_url: Option<String>,
    pub voting_deadline: Option<DateTime<Utc>>,
}

db_message_handler_with_span!({
    impl AsyncDbHandler<UpdateDestination> for DbExecutor {
        async fn handle(pool: PgPool, msg: UpdateDestination) -> Result<Option<InternalDestination>, Report> {
            debug!(id = %msg.id, "Update destination");
            let destination = sqlx::query_as::<_, InternalDestination>(
                "UPDATE destinations \
                 SET name = $2, description = $3, location = $4, cost = $5, image_url = $6, \
                     voting_deadline = $7, updated_at = now() \
                 WHERE id = $1 \
                 RETURNING id, name, description, location, cost, image_url, voting_deadline, \
                           added_by, created_at, updated_at",
            )
            .bind(msg.id.clone())
            .bind(&msg.name)
            .bind(&msg.description)
            .bind(&msg.location)
            .bind(msg.cost)
            .bind(&msg.image_url)
            .bind(msg.voting_deadline)
            .fetch_optional(&pool)
            .await?;

            Ok(destination)
        }
    }
});

#[derive(Clone, Debug)]
pub struct CascadeDelete {
    pub votes_deleted: u64,
}

/// Removes the destination's votes and then the destination itself in one
/// transaction, so no reader ever observes votes pointing at a destination
/// that is already gone.
#[derive(Message, Clone)]
#[rtype(result = "Result<CascadeDelete, Report>")]
pub struct DeleteDestinationCascade(pub DestinationId);

db_message_handler_with_span!({
    impl AsyncDbHandler<DeleteDestinationCascade> for DbExecutor {
        async fn handle(pool: PgPool, msg: DeleteDestinationCascade) -> Result<CascadeDelete, Report> {
            let DeleteDestinationCascade(destination_id) = msg;
            debug!(id = %destination_id, "Delete destination and its votes");
            let mut tx = pool.begin().await?;
            let votes = sqlx::query("DELETE FROM votes WHERE destination_id = $1")
                .bind(destination_id.clone())
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM destinations WHERE id = $1")
                .bind(destination_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            Ok(CascadeDelete {
                votes_deleted: votes.rows_affected(),
            })
        }
    }
});

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn summary(voting_deadline: Option<DateTime<Utc>>) -> DestinationSummary {
        DestinationSummary {
            id: DestinationId::new(),
            name: "Mountain Retreat".into(),
            voting_deadline,
        }
    }

    #[test]
    fn destination_without_deadline_never_closes() {
        assert!(!summary(None).is_closed_at(Utc::now()));
    }

    #[test]
    fn destination_closes_strictly_after_deadline() {
        let deadline = Utc::now();
        let summary = summary(Some(deadline));
        assert!(!summary.is_closed_at(deadline - Duration::seconds(1)));
        // At the exact deadline instant voting is still open.
        assert!(!summary.is_closed_at(deadline));
        assert!(summary.is_closed_at(deadline + Duration::seconds(1)));
    }

    #[test]
    fn destination_id_parses_uuid_strings_only() {
        assert!("db615b37-0835-4f8f-ab41-a9a6b77dee3a".parse::<DestinationId>().is_ok());
        assert!("not-a-uuid".parse::<DestinationId>().is_err());
        assert!("".parse::<DestinationId>().is_err());
    }
}
