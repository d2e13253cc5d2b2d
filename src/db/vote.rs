use super::{destination::DestinationId, user::UserId, DbExecutor};
use crate::db_message_handler_with_span;
use crate::span::AsyncDbHandler;
use actix::prelude::*;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::{FromRow, PgPool};
use std::fmt;
use tracing::debug;

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct VoteId(pub Uuid);

impl VoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, FromRow)]
pub struct InternalVote {
    pub id: VoteId,
    pub voter_id: UserId,
    pub destination_id: DestinationId,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an insert arbitrated by the unique constraint on `voter_id`.
/// A second vote by the same voter is a normal outcome here, not an error.
#[derive(Clone, Debug)]
pub enum VoteInsert {
    Created(InternalVote),
    DuplicateVoter,
}

/// Inserts optimistically and lets the storage constraint decide. There is
/// deliberately no prior existence check: two concurrent casts by the same
/// voter both reach the INSERT and the constraint serializes them.
#[derive(Message, Clone)]
#[rtype(result = "Result<VoteInsert, Report>")]
pub struct AddVote(pub UserId, pub DestinationId);

db_message_handler_with_span!({
    impl AsyncDbHandler<AddVote> for DbExecutor {
        async fn handle(pool: PgPool, msg: AddVote) -> Result<VoteInsert, Report> {
            let AddVote(voter_id, destination_id) = msg;
            let id = VoteId::new();
            debug!(id = %id, voter = %voter_id, destination = %destination_id, "Insert vote");
            let result = sqlx::query_as::<_, InternalVote>(
                "INSERT INTO votes (id, voter_id, destination_id) VALUES ($1, $2, $3) \
                 RETURNING id, voter_id, destination_id, created_at",
            )
            .bind(id)
            .bind(voter_id.clone())
            .bind(destination_id)
            .fetch_one(&pool)
            .await;

            match result {
                Ok(vote) => Ok(VoteInsert::Created(vote)),
                Err(err) if super::is_unique_violation(&err, "votes_voter_id_key") => {
                    debug!(voter = %voter_id, "Vote insert lost to an existing vote");
                    Ok(VoteInsert::DuplicateVoter)
                }
                Err(err) => Err(err.into()),
            }
        }
    }
});

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalVote>, Report>")]
pub struct VoteByVoter(pub UserId);

db_message_handler_with_span!({
    impl AsyncDbHandler<VoteByVoter> for DbExecutor {
        async fn handle(pool: PgPool, msg: VoteByVoter) -> Result<Option<InternalVote>, Report> {
            let VoteByVoter(voter_id) = msg;
            debug!(voter = %voter_id, "Get vote by voter");
            let vote = sqlx::query_as::<_, InternalVote>(
                "SELECT id, voter_id, destination_id, created_at FROM votes WHERE voter_id = $1",
            )
            .bind(voter_id)
            .fetch_optional(&pool)
            .await?;

            Ok(vote)
        }
    }
});

/// One tally group per distinct `destination_id` present in the votes table.
/// The destination columns come from a LEFT JOIN and are all None when the
/// reference dangles; the aggregator decides what to do with those.
#[derive(Clone, Debug, FromRow)]
pub struct TallyRow {
    pub destination_id: DestinationId,
    pub vote_count: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub cost: Option<f64>,
    pub image_url: Option<String>,
    pub voting_deadline: Option<DateTime<Utc>>,
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<TallyRow>, Report>")]
pub struct VoteTally;

db_message_handler_with_span!({
    impl AsyncDbHandler<VoteTally> for DbExecutor {
        async fn handle(pool: PgPool, _msg: VoteTally) -> Result<Vec<TallyRow>, Report> {
            debug!("Tally votes per destination");
            // Ordering is the aggregator's contract and happens in Rust.
            let rows = sqlx::query_as::<_, TallyRow>(
                "SELECT v.destination_id, COUNT(*) AS vote_count, \
                        d.name, d.description, d.location, d.cost, d.image_url, d.voting_deadline \
                 FROM votes v \
                 LEFT JOIN destinations d ON d.id = v.destination_id \
                 GROUP BY v.destination_id, d.id",
            )
            .fetch_all(&pool)
            .await?;

            Ok(rows)
        }
    }
});

/// A voter's vote joined with the destination it points at. The destination
/// columns are None when the referenced row no longer exists.
#[derive(Clone, Debug, FromRow)]
pub struct MyVoteRow {
    pub id: VoteId,
    pub destination_id: DestinationId,
    pub created_at: DateTime<Utc>,
    pub dest_name: Option<String>,
    pub dest_location: Option<String>,
    pub dest_image_url: Option<String>,
    pub dest_cost: Option<f64>,
    pub dest_voting_deadline: Option<DateTime<Utc>>,
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<MyVoteRow>, Report>")]
pub struct MyVoteByVoter(pub UserId);

db_message_handler_with_span!({
    impl AsyncDbHandler<MyVoteByVoter> for DbExecutor {
        async fn handle(pool: PgPool, msg: MyVoteByVoter) -> Result<Option<MyVoteRow>, Report> {
            let MyVoteByVoter(voter_id) = msg;
            debug!(voter = %voter_id, "Get vote with destination for voter");
            let row = sqlx::query_as::<_, MyVoteRow>(
                "SELECT v.id, v.destination_id, v.created_at, \
                        d.name AS dest_name, d.location AS dest_location, \
                        d.image_url AS dest_image_url, d.cost AS dest_cost, \
                        d.voting_deadline AS dest_voting_deadline \
                 FROM votes v \
                 LEFT JOIN destinations d ON d.id = v.destination_id \
                 WHERE v.voter_id = $1",
            )
            .bind(voter_id)
            .fetch_optional(&pool)
            .await?;

            Ok(row)
        }
    }
});

/// Every vote with its voter and destination resolved, newest first. Missing
/// joins surface as None so the aggregator can flag them.
#[derive(Clone, Debug, FromRow)]
pub struct DetailedVoteRow {
    pub id: VoteId,
    pub created_at: DateTime<Utc>,
    pub voter_name: Option<String>,
    pub destination_name: Option<String>,
    pub destination_location: Option<String>,
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<DetailedVoteRow>, Report>")]
pub struct DetailedVotes;

db_message_handler_with_span!({
    impl AsyncDbHandler<DetailedVotes> for DbExecutor {
        async fn handle(pool: PgPool, _msg: DetailedVotes) -> Result<Vec<DetailedVoteRow>, Report> {
            debug!("List votes with voter and destination");
            let rows = sqlx::query_as::<_, DetailedVoteRow>(
                "SELECT v.id, v.created_at, u.name AS voter_name, \
                        d.name AS destination_name, d.location AS destination_location \
                 FROM votes v \
                 LEFT JOIN users u ON u.id = v.voter_id \
                 LEFT JOIN destinations d ON d.id = v.destination_id \
                 ORDER BY v.created_at DESC",
            )
            .fetch_all(&pool)
            .await?;

            Ok(rows)
        }
    }
});
