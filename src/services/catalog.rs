use crate::async_message_handler_with_span;
use crate::db::destination::{CascadeDelete, DestinationId, InternalDestination};
use crate::db::user::UserId;
use crate::db::{self, DbExecutor};
use crate::error::ApiError;
use crate::span::{AsyncSpanHandler, SpanMessage};
use actix::prelude::*;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Destination catalog: curates the options votes can reference. Deleting a
/// destination also deletes its votes; that cascade lives here because the
/// vote ledger itself never deletes anything.
#[derive(Default)]
pub struct CatalogActor;

impl Actor for CatalogActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Catalog actor started");
    }
}

impl SystemService for CatalogActor {}
impl Supervised for CatalogActor {}

fn parse_destination_id(raw: &str) -> Result<DestinationId, ApiError> {
    raw.parse().map_err(|_| {
        debug!(id = raw, "Malformed destination id");
        ApiError::InvalidReference("Invalid destination ID format.".into())
    })
}

fn not_found(id: &DestinationId) -> ApiError {
    ApiError::NotFound(format!("Destination not found with ID {id}"))
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Please add a destination name".into()));
    }
    if name.chars().count() > 100 {
        return Err(ApiError::Validation(
            "Name cannot be more than 100 characters".into(),
        ));
    }
    Ok(name.to_owned())
}

fn validate_description(description: &str) -> Result<String, ApiError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(ApiError::Validation("Please add a description".into()));
    }
    Ok(description.to_owned())
}

fn validate_location(location: &str) -> Result<String, ApiError> {
    let location = location.trim();
    if location.is_empty() {
        return Err(ApiError::Validation("Please add a location".into()));
    }
    Ok(location.to_owned())
}

fn validate_cost(cost: f64) -> Result<f64, ApiError> {
    if !cost.is_finite() {
        return Err(ApiError::Validation(
            "Please add an estimated cost (numeric value)".into(),
        ));
    }
    if cost < 0.0 {
        return Err(ApiError::Validation("Cost cannot be negative".into()));
    }
    Ok(cost)
}

fn clean_image_url(image_url: Option<String>) -> Option<String> {
    image_url
        .map(|url| url.trim().to_owned())
        .filter(|url| !url.is_empty())
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<InternalDestination>, ApiError>")]
pub struct ListDestinations;

async_message_handler_with_span!({
    impl AsyncSpanHandler<ListDestinations> for CatalogActor {
        async fn handle(_msg: ListDestinations) -> Result<Vec<InternalDestination>, ApiError> {
            let destinations = DbExecutor::from_registry()
                .send(SpanMessage::new(db::destination::ListDestinations))
                .await??;
            Ok(destinations)
        }
    }
});

#[derive(Message, Clone)]
#[rtype(result = "Result<InternalDestination, ApiError>")]
pub struct GetDestination(pub String);

async_message_handler_with_span!({
    impl AsyncSpanHandler<GetDestination> for CatalogActor {
        async fn handle(msg: GetDestination) -> Result<InternalDestination, ApiError> {
            let GetDestination(raw) = msg;
            let id = parse_destination_id(&raw)?;
            let destination = DbExecutor::from_registry()
                .send(SpanMessage::new(db::destination::DestinationById(id.clone())))
                .await??;
            destination.ok_or_else(|| not_found(&id))
        }
    }
});

#[derive(Message, Clone)]
#[rtype(result = "Result<InternalDestination, ApiError>")]
pub struct CreateDestination {
    pub name: String,
    pub description: String,
    pub location: String,
    pub cost: f64,
    pub image_url: Option<String>,
    pub voting_deadline: Option<DateTime<Utc>>,
    pub added_by: UserId,
}

async_message_handler_with_span!({
    impl AsyncSpanHandler<CreateDestination> for CatalogActor {
        async fn handle(msg: CreateDestination) -> Result<InternalDestination, ApiError> {
            let destination = DbExecutor::from_registry()
                .send(SpanMessage::new(db::destination::AddDestination {
                    name: validate_name(&msg.name)?,
                    description: validate_description(&msg.description)?,
                    location: validate_location(&msg.location)?,
                    cost: validate_cost(msg.cost)?,
                    image_url: clean_image_url(msg.image_url),
                    voting_deadline: msg.voting_deadline,
                    added_by: msg.added_by,
                }))
                .await??;

            info!(id = %destination.id, name = destination.name.as_str(), "Destination created");
            Ok(destination)
        }
    }
});

/// Partial update. Absent fields keep their stored values; for the two
/// nullable columns an explicit null clears the value, which is why they
/// arrive double-wrapped.
#[derive(Message, Clone)]
#[rtype(result = "Result<InternalDestination, ApiError>")]
pub struct UpdateDestination {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub cost: Option<f64>,
    pub image_url: Option<Option<String>>,
    pub voting_deadline: Option<Option<DateTime<Utc>>>,
}

async_message_handler_with_span!({
    impl AsyncSpanHandler<UpdateDestination> for CatalogActor {
        async fn handle(msg: UpdateDestination) -> Result<InternalDestination, ApiError> {
            let id = parse_destination_id(&msg.id)?;
            let existing = DbExecutor::from_registry()
                .send(SpanMessage::new(db::destination::DestinationById(id.clone())))
                .await??
                .ok_or_else(|| not_found(&id))?;

            let name = match msg.name {
                Some(name) => validate_name(&name)?,
                None => existing.name,
            };
            let description = match msg.description {
                Some(description) => validate_description(&description)?,
                None => existing.description,
            };
            let location = match msg.location {
                Some(location) => validate_location(&location)?,
                None => existing.location,
            };
            let cost = match msg.cost {
                Some(cost) => validate_cost(cost)?,
                None => existing.cost,
            };
            let image_url = match msg.image_url {
                Some(image_url) => clean_image_url(image_url),
                None => existing.image_url,
            };
            let voting_deadline = match msg.voting_deadline {
                Some(deadline) => deadline,
                None => existing.voting_deadline,
            };

            let updated = DbExecutor::from_registry()
                .send(SpanMessage::new(db::destination::UpdateDestination {
                    id: id.clone(),
                    name,
                    description,
                    location,
                    cost,
                    image_url,
                    voting_deadline,
                }))
                .await??
                .ok_or_else(|| not_found(&id))?;

            info!(id = %updated.id, "Destination updated");
            Ok(updated)
        }
    }
});

#[derive(Message, Clone)]
#[rtype(result = "Result<CascadeDelete, ApiError>")]
pub struct DeleteDestination(pub String);

async_message_handler_with_span!({
    impl AsyncSpanHandler<DeleteDestination> for CatalogActor {
        async fn handle(msg: DeleteDestination) -> Result<CascadeDelete, ApiError> {
            let DeleteDestination(raw) = msg;
            let id = parse_destination_id(&raw)?;
            DbExecutor::from_registry()
                .send(SpanMessage::new(db::destination::DestinationById(id.clone())))
                .await??
                .ok_or_else(|| not_found(&id))?;

            let deleted = DbExecutor::from_registry()
                .send(SpanMessage::new(db::destination::DeleteDestinationCascade(
                    id.clone(),
                )))
                .await??;

            info!(
                id = %id,
                votes_deleted = deleted.votes_deleted,
                "Destination deleted with its votes"
            );
            Ok(deleted)
        }
    }
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_trimmed_and_bounded() {
        assert_eq!(validate_name("  Beach Paradise  ").unwrap(), "Beach Paradise");
        assert!(matches!(validate_name("   "), Err(ApiError::Validation(_))));
        let long = "x".repeat(101);
        assert!(matches!(validate_name(&long), Err(ApiError::Validation(_))));
        assert!(validate_name(&"x".repeat(100)).is_ok());
    }

    #[test]
    fn cost_rejects_negative_and_non_finite() {
        assert_eq!(validate_cost(0.0).unwrap(), 0.0);
        assert_eq!(validate_cost(1200.50).unwrap(), 1200.50);
        assert!(matches!(validate_cost(-1.0), Err(ApiError::Validation(_))));
        assert!(matches!(validate_cost(f64::NAN), Err(ApiError::Validation(_))));
        assert!(matches!(
            validate_cost(f64::INFINITY),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn empty_image_url_becomes_none() {
        assert_eq!(clean_image_url(None), None);
        assert_eq!(clean_image_url(Some("   ".into())), None);
        assert_eq!(
            clean_image_url(Some(" https://example.com/a.jpg ".into())),
            Some("https://example.com/a.jpg".into())
        );
    }

    #[test]
    fn malformed_id_is_rejected_before_lookup() {
        let err = parse_destination_id("123").unwrap_err();
        assert!(matches!(err, ApiError::InvalidReference(_)));
        assert_eq!(err.to_string(), "Invalid destination ID format.");
    }
}
