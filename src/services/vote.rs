use crate::async_message_handler_with_span;
use crate::db::user::UserId;
use crate::db::vote::{InternalVote, VoteInsert};
use crate::db::{self, DbExecutor};
use crate::error::ApiError;
use crate::span::{AsyncSpanHandler, SpanMessage};
use actix::prelude::*;
use chrono::Utc;
use tracing::{debug, info};

/// The vote ledger: sole owner of the mutation path into the votes table.
/// One vote per voter across all destinations, enforced by the storage
/// constraint rather than by any check here.
#[derive(Default)]
pub struct VoteActor;

impl Actor for VoteActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Vote actor started");
    }
}

impl SystemService for VoteActor {}
impl Supervised for VoteActor {}

/// A vote request as it arrives off the wire. The destination id is still a
/// raw string at this point; format checking is the first validation step.
#[derive(Message, Clone)]
#[rtype(result = "Result<InternalVote, ApiError>")]
pub struct CastVote {
    pub voter_id: UserId,
    pub destination_id: String,
}

async_message_handler_with_span!({
    impl AsyncSpanHandler<CastVote> for VoteActor {
        async fn handle(msg: CastVote) -> Result<InternalVote, ApiError> {
            let CastVote {
                voter_id,
                destination_id,
            } = msg;
            debug!(voter = %voter_id, destination = destination_id.as_str(), "Handling cast vote");

            let destination_id: db::destination::DestinationId =
                destination_id.parse().map_err(|_| {
                    debug!("Rejecting vote: malformed destination id");
                    ApiError::InvalidReference("Invalid Destination ID format.".into())
                })?;

            let destination = DbExecutor::from_registry()
                .send(SpanMessage::new(db::destination::DestinationSummaryById(
                    destination_id.clone(),
                )))
                .await??
                .ok_or_else(|| {
                    debug!(destination = %destination_id, "Rejecting vote: unknown destination");
                    ApiError::NotFound("Destination not found.".into())
                })?;

            if destination.is_closed_at(Utc::now()) {
                debug!(destination = %destination.id, "Rejecting vote: deadline has passed");
                return Err(ApiError::DeadlineExpired);
            }

            let inserted = DbExecutor::from_registry()
                .send(SpanMessage::new(db::vote::AddVote(
                    voter_id.clone(),
                    destination_id,
                )))
                .await??;

            match inserted {
                VoteInsert::Created(vote) => {
                    info!(
                        vote = %vote.id,
                        voter = %vote.voter_id,
                        destination = %vote.destination_id,
                        "Vote cast"
                    );
                    Ok(vote)
                }
                VoteInsert::DuplicateVoter => {
                    debug!(voter = %voter_id, "Rejecting vote: voter has already voted");
                    Err(ApiError::AlreadyVoted)
                }
            }
        }
    }
});
