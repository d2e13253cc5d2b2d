use crate::async_message_handler_with_span;
use crate::db::destination::DestinationId;
use crate::db::user::UserId;
use crate::db::vote::{DetailedVoteRow, MyVoteRow, TallyRow, VoteId};
use crate::db::{self, DbExecutor};
use crate::error::ApiError;
use crate::span::{AsyncSpanHandler, SpanMessage};
use actix::prelude::*;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::{info, warn};

pub const DELETED_USER_PLACEHOLDER: &str = "[deleted user]";
pub const DELETED_DESTINATION_PLACEHOLDER: &str = "[deleted destination]";

/// Results aggregator: read-only views over the vote ledger joined with the
/// catalog and the user directory. Votes whose destination is gone are
/// dropped from public tallies and flagged in the admin view, never errors.
#[derive(Default)]
pub struct ResultsActor;

impl Actor for ResultsActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Results actor started");
    }
}

impl SystemService for ResultsActor {}
impl Supervised for ResultsActor {}

#[derive(Clone, Debug, PartialEq)]
pub struct DestinationTally {
    pub destination_id: DestinationId,
    pub name: String,
    pub location: String,
    pub image_url: Option<String>,
    pub cost: f64,
    pub description: String,
    pub voting_deadline: Option<DateTime<Utc>>,
    pub vote_count: i64,
}

#[derive(Clone, Debug)]
pub struct VoteResults {
    pub results: Vec<DestinationTally>,
    pub user_vote: Option<DestinationId>,
}

/// Display contract: most votes first, ties broken by name ascending.
fn tally_order(a: &DestinationTally, b: &DestinationTally) -> Ordering {
    b.vote_count
        .cmp(&a.vote_count)
        .then_with(|| a.name.cmp(&b.name))
}

/// Turns raw tally groups into the public results list. Only destinations
/// that still exist appear; a zero-vote destination produces no group at all
/// so it is absent by construction.
fn collect_tallies(rows: Vec<TallyRow>) -> Vec<DestinationTally> {
    let mut results: Vec<DestinationTally> = Vec::with_capacity(rows.len());
    for row in rows {
        match (row.name, row.description, row.location, row.cost) {
            (Some(name), Some(description), Some(location), Some(cost)) => {
                results.push(DestinationTally {
                    destination_id: row.destination_id,
                    name,
                    location,
                    image_url: row.image_url,
                    cost,
                    description,
                    voting_deadline: row.voting_deadline,
                    vote_count: row.vote_count,
                });
            }
            _ => {
                warn!(
                    destination = %row.destination_id,
                    votes = row.vote_count,
                    "Excluding votes whose destination no longer exists"
                );
            }
        }
    }
    results.sort_by(tally_order);
    results
}

/// Tally plus, when the caller is known, which destination they voted for.
#[derive(Message, Clone)]
#[rtype(result = "Result<VoteResults, ApiError>")]
pub struct GetResults {
    pub voter_id: Option<UserId>,
}

async_message_handler_with_span!({
    impl AsyncSpanHandler<GetResults> for ResultsActor {
        async fn handle(msg: GetResults) -> Result<VoteResults, ApiError> {
            let tally = DbExecutor::from_registry().send(SpanMessage::new(db::vote::VoteTally));

            let (rows, user_vote) = match msg.voter_id {
                Some(voter_id) => {
                    let own_vote = DbExecutor::from_registry()
                        .send(SpanMessage::new(db::vote::VoteByVoter(voter_id)));
                    let (rows, vote) = futures::try_join!(tally, own_vote)?;
                    (rows?, vote?.map(|vote| vote.destination_id))
                }
                None => (tally.await??, None),
            };

            Ok(VoteResults {
                results: collect_tallies(rows),
                user_vote,
            })
        }
    }
});

#[derive(Clone, Debug, PartialEq)]
pub struct MyVoteDestination {
    pub id: DestinationId,
    pub name: String,
    pub location: String,
    pub image_url: Option<String>,
    pub cost: f64,
    pub voting_deadline: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MyVote {
    pub id: VoteId,
    pub created_at: DateTime<Utc>,
    /// None when the voted destination has since been deleted out from under
    /// the vote.
    pub destination: Option<MyVoteDestination>,
}

fn project_my_vote(row: MyVoteRow) -> MyVote {
    let destination = match (row.dest_name, row.dest_location, row.dest_cost) {
        (Some(name), Some(location), Some(cost)) => Some(MyVoteDestination {
            id: row.destination_id,
            name,
            location,
            image_url: row.dest_image_url,
            cost,
            voting_deadline: row.dest_voting_deadline,
        }),
        _ => {
            warn!(
                vote = %row.id,
                destination = %row.destination_id,
                "Vote references a destination that no longer exists"
            );
            None
        }
    };
    MyVote {
        id: row.id,
        created_at: row.created_at,
        destination,
    }
}

/// The caller's own vote, destination resolved. Having no vote is a normal
/// empty result, not an error.
#[derive(Message, Clone)]
#[rtype(result = "Result<Option<MyVote>, ApiError>")]
pub struct GetMyVote(pub UserId);

async_message_handler_with_span!({
    impl AsyncSpanHandler<GetMyVote> for ResultsActor {
        async fn handle(msg: GetMyVote) -> Result<Option<MyVote>, ApiError> {
            let GetMyVote(voter_id) = msg;
            let row = DbExecutor::from_registry()
                .send(SpanMessage::new(db::vote::MyVoteByVoter(voter_id)))
                .await??;
            Ok(row.map(project_my_vote))
        }
    }
});

#[derive(Clone, Debug, PartialEq)]
pub struct DetailedVote {
    pub id: VoteId,
    pub voter_name: String,
    pub destination_name: String,
    pub destination_location: String,
    pub created_at: DateTime<Utc>,
}

/// Admin view keeps every vote on the books. Dangling references get
/// placeholder names instead of being dropped, so the audit trail stays
/// complete.
fn flag_missing(row: DetailedVoteRow) -> DetailedVote {
    let voter_name = match row.voter_name {
        Some(name) => name,
        None => {
            warn!(vote = %row.id, "Vote references a voter that no longer exists");
            DELETED_USER_PLACEHOLDER.to_owned()
        }
    };
    let (destination_name, destination_location) = match (row.destination_name, row.destination_location) {
        (Some(name), Some(location)) => (name, location),
        _ => {
            warn!(vote = %row.id, "Vote references a destination that no longer exists");
            (DELETED_DESTINATION_PLACEHOLDER.to_owned(), String::new())
        }
    };
    DetailedVote {
        id: row.id,
        voter_name,
        destination_name,
        destination_location,
        created_at: row.created_at,
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<DetailedVote>, ApiError>")]
pub struct GetDetailedResults;

async_message_handler_with_span!({
    impl AsyncSpanHandler<GetDetailedResults> for ResultsActor {
        async fn handle(_msg: GetDetailedResults) -> Result<Vec<DetailedVote>, ApiError> {
            let rows = DbExecutor::from_registry()
                .send(SpanMessage::new(db::vote::DetailedVotes))
                .await??;
            Ok(rows.into_iter().map(flag_missing).collect())
        }
    }
});

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tally_row(name: Option<&str>, vote_count: i64) -> TallyRow {
        TallyRow {
            destination_id: DestinationId::new(),
            vote_count,
            name: name.map(str::to_owned),
            description: name.map(|_| "A place worth going".to_owned()),
            location: name.map(|_| "Somewhere".to_owned()),
            cost: name.map(|_| 900.0),
            image_url: None,
            voting_deadline: None,
        }
    }

    #[test]
    fn tallies_sort_by_count_then_name() {
        let rows = vec![
            tally_row(Some("Gamma"), 3),
            tally_row(Some("Beta"), 5),
            tally_row(Some("Alpha"), 3),
        ];
        let results = collect_tallies(rows);
        let order: Vec<(&str, i64)> = results
            .iter()
            .map(|tally| (tally.name.as_str(), tally.vote_count))
            .collect();
        assert_eq!(order, vec![("Beta", 5), ("Alpha", 3), ("Gamma", 3)]);
    }

    #[test]
    fn dangling_tally_groups_are_dropped() {
        let rows = vec![tally_row(None, 4), tally_row(Some("Alpha"), 1)];
        let results = collect_tallies(rows);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Alpha");
    }

    #[test]
    fn my_vote_keeps_vote_when_destination_is_gone() {
        let row = MyVoteRow {
            id: VoteId::new(),
            destination_id: DestinationId::new(),
            created_at: Utc::now(),
            dest_name: None,
            dest_location: None,
            dest_image_url: None,
            dest_cost: None,
            dest_voting_deadline: None,
        };
        let vote = project_my_vote(row);
        assert!(vote.destination.is_none());
    }

    #[test]
    fn my_vote_projects_destination_fields() {
        let destination_id = DestinationId::new();
        let row = MyVoteRow {
            id: VoteId::new(),
            destination_id: destination_id.clone(),
            created_at: Utc::now(),
            dest_name: Some("Mountain Retreat".into()),
            dest_location: Some("Aspen, Colorado".into()),
            dest_image_url: Some("https://example.com/mountain.jpg".into()),
            dest_cost: Some(1200.50),
            dest_voting_deadline: None,
        };
        let vote = project_my_vote(row);
        let destination = vote.destination.unwrap();
        assert_eq!(destination.id, destination_id);
        assert_eq!(destination.name, "Mountain Retreat");
        assert_eq!(destination.cost, 1200.50);
    }

    #[test]
    fn detailed_votes_flag_missing_references() {
        let row = DetailedVoteRow {
            id: VoteId::new(),
            created_at: Utc::now(),
            voter_name: None,
            destination_name: None,
            destination_location: None,
        };
        let vote = flag_missing(row);
        assert_eq!(vote.voter_name, DELETED_USER_PLACEHOLDER);
        assert_eq!(vote.destination_name, DELETED_DESTINATION_PLACEHOLDER);
        assert_eq!(vote.destination_location, "");
    }

    #[test]
    fn detailed_votes_pass_through_resolved_references() {
        let row = DetailedVoteRow {
            id: VoteId::new(),
            created_at: Utc::now(),
            voter_name: Some("Alice Employee".into()),
            destination_name: Some("Beach Paradise Getaway".into()),
            destination_location: Some("Maldives".into()),
        };
        let vote = flag_missing(row);
        assert_eq!(vote.voter_name, "Alice Employee");
        assert_eq!(vote.destination_name, "Beach Paradise Getaway");
        assert_eq!(vote.destination_location, "Maldives");
    }
}
