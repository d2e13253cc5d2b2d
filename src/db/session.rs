use super::{user::UserId, DbExecutor};
use crate::db_message_handler_with_span;
use crate::span::AsyncDbHandler;
use actix::prelude::*;
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::{FromRow, PgPool};
use std::fmt;
use tracing::debug;

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct InternalSession {
    pub id: SessionId,
    pub user_id: UserId,
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalSession>, Report>")]
pub struct SessionById(pub SessionId);

db_message_handler_with_span!({
    impl AsyncDbHandler<SessionById> for DbExecutor {
        async fn handle(pool: PgPool, msg: SessionById) -> Result<Option<InternalSession>, Report> {
            let SessionById(session_id) = msg;
            debug!(id = %session_id, "Get session by id");
            let session = sqlx::query_as::<_, InternalSession>(
                "SELECT id, user_id FROM sessions WHERE id = $1",
            )
            .bind(session_id)
            .fetch_optional(&pool)
            .await?;

            Ok(session)
        }
    }
});

#[derive(Message, Clone)]
#[rtype(result = "Result<InternalSession, Report>")]
pub struct SaveSession(pub UserId);

db_message_handler_with_span!({
    impl AsyncDbHandler<SaveSession> for DbExecutor {
        async fn handle(pool: PgPool, msg: SaveSession) -> Result<InternalSession, Report> {
            let SaveSession(user_id) = msg;
            debug!(user_id = %user_id, "Save new session for user");
            let session = sqlx::query_as::<_, InternalSession>(
                "INSERT INTO sessions (id, user_id) VALUES ($1, $2) RETURNING id, user_id",
            )
            .bind(SessionId::new())
            .bind(user_id)
            .fetch_one(&pool)
            .await?;

            Ok(session)
        }
    }
});
