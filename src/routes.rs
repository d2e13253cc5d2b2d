use crate::db::destination::{DestinationId, InternalDestination};
use crate::db::session::SessionId;
use crate::db::user::{InternalUser, Role, UserId};
use crate::db::vote::{InternalVote, VoteId};
use crate::error::ApiError;
use crate::services::catalog::{self, CatalogActor};
use crate::services::identity::{Authenticate, IdentityActor, LoginUser, RegisterUser};
use crate::services::results::{
    DestinationTally, DetailedVote, GetDetailedResults, GetMyVote, GetResults, MyVote,
    MyVoteDestination, ResultsActor, VoteResults,
};
use crate::services::vote::{CastVote, VoteActor};
use crate::span::SpanMessage;
use actix::prelude::*;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

// Request bodies

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CastVoteRequest {
    pub destination_id: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CreateDestinationRequest {
    pub name: String,
    pub description: String,
    pub location: String,
    pub cost: f64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub voting_deadline: Option<DateTime<Utc>>,
}

/// Patch semantics: an absent field keeps the stored value, an explicit null
/// clears it. Serde collapses both to `None` by default, hence the
/// double-wrapped options on the nullable columns.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UpdateDestinationRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub cost: Option<f64>,
    #[serde(default, deserialize_with = "double_option")]
    pub image_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub voting_deadline: Option<Option<DateTime<Utc>>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

// Response bodies

#[derive(Serialize, Deserialize, Debug)]
pub struct UserBody {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub role: Role,
}

impl From<InternalUser> for UserBody {
    fn from(user: InternalUser) -> Self {
        Self {
            id: user.id,
            name: user.name,
            username: user.username,
            role: user.role,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AuthBody {
    pub success: bool,
    pub token: SessionId,
    pub user: UserBody,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MeBody {
    pub success: bool,
    pub user: UserBody,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DataBody<T> {
    pub success: bool,
    pub data: T,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ListBody<T> {
    pub success: bool,
    pub count: usize,
    pub data: Vec<T>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Empty {}

#[derive(Serialize, Deserialize, Debug)]
pub struct DestinationBody {
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

impl From<InternalDestination> for DestinationBody {
    fn from(destination: InternalDestination) -> Self {
        Self {
            id: destination.id,
            name: destination.name,
            description: destination.description,
            location: destination.location,
            cost: destination.cost,
            image_url: destination.image_url,
            voting_deadline: destination.voting_deadline,
            added_by: destination.added_by,
            created_at: destination.created_at,
            updated_at: destination.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct VoteBody {
    pub id: VoteId,
    pub voter_id: UserId,
    pub destination_id: DestinationId,
    pub created_at: DateTime<Utc>,
}

impl From<InternalVote> for VoteBody {
    fn from(vote: InternalVote) -> Self {
        Self {
            id: vote.id,
            voter_id: vote.voter_id,
            destination_id: vote.destination_id,
            created_at: vote.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TallyBody {
    pub destination_id: DestinationId,
    pub name: String,
    pub location: String,
    pub image_url: Option<String>,
    pub cost: f64,
    pub description: String,
    pub voting_deadline: Option<DateTime<Utc>>,
    pub vote_count: i64,
}

impl From<DestinationTally> for TallyBody {
    fn from(tally: DestinationTally) -> Self {
        Self {
            destination_id: tally.destination_id,
            name: tally.name,
            location: tally.location,
            image_url: tally.image_url,
            cost: tally.cost,
            description: tally.description,
            voting_deadline: tally.voting_deadline,
            vote_count: tally.vote_count,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ResultsBody {
    pub success: bool,
    pub results: Vec<TallyBody>,
    pub user_vote: Option<DestinationId>,
}

impl From<VoteResults> for ResultsBody {
    fn from(results: VoteResults) -> Self {
        Self {
            success: true,
            results: results.results.into_iter().map(TallyBody::from).collect(),
            user_vote: results.user_vote,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MyVoteDestinationBody {
    pub id: DestinationId,
    pub name: String,
    pub location: String,
    pub image_url: Option<String>,
    pub cost: f64,
    pub voting_deadline: Option<DateTime<Utc>>,
}

impl From<MyVoteDestination> for MyVoteDestinationBody {
    fn from(destination: MyVoteDestination) -> Self {
        Self {
            id: destination.id,
            name: destination.name,
            location: destination.location,
            image_url: destination.image_url,
            cost: destination.cost,
            voting_deadline: destination.voting_deadline,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MyVoteBody {
    pub id: VoteId,
    pub created_at: DateTime<Utc>,
    pub destination: Option<MyVoteDestinationBody>,
}

impl From<MyVote> for MyVoteBody {
    fn from(vote: MyVote) -> Self {
        Self {
            id: vote.id,
            created_at: vote.created_at,
            destination: vote.destination.map(MyVoteDestinationBody::from),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DetailedVoteBody {
    pub id: VoteId,
    pub voter_name: String,
    pub destination_name: String,
    pub destination_location: String,
    pub created_at: DateTime<Utc>,
}

impl From<DetailedVote> for DetailedVoteBody {
    fn from(vote: DetailedVote) -> Self {
        Self {
            id: vote.id,
            voter_name: vote.voter_name,
            destination_name: vote.destination_name,
            destination_location: vote.destination_location,
            created_at: vote.created_at,
        }
    }
}

// Credential handling

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::to_owned)
}

async fn authenticate(req: &HttpRequest) -> Result<InternalUser, ApiError> {
    let token = bearer_token(req).ok_or(ApiError::Unauthorized)?;
    let user = IdentityActor::from_registry()
        .send(SpanMessage::new(Authenticate(token)))
        .await??;
    Ok(user)
}

async fn authenticate_admin(req: &HttpRequest) -> Result<InternalUser, ApiError> {
    let user = authenticate(req).await?;
    if user.role != Role::Admin {
        return Err(ApiError::Forbidden(user.role.as_str().to_owned()));
    }
    Ok(user)
}

/// Best-effort identity for public endpoints. A missing or stale credential
/// degrades to anonymous instead of failing the request.
async fn authenticate_opt(req: &HttpRequest) -> Option<InternalUser> {
    let token = bearer_token(req)?;
    match IdentityActor::from_registry()
        .send(SpanMessage::new(Authenticate(token)))
        .await
    {
        Ok(Ok(user)) => Some(user),
        Ok(Err(_)) => {
            debug!("Ignoring invalid credential on public endpoint");
            None
        }
        Err(err) => {
            debug!(error = %err, "Identity lookup failed, treating caller as anonymous");
            None
        }
    }
}

// Handlers

pub async fn index() -> HttpResponse {
    HttpResponse::Ok().body("API is running...")
}

#[instrument(skip_all)]
pub async fn register(body: web::Json<RegisterRequest>) -> Result<HttpResponse, ApiError> {
    let RegisterRequest { name, username } = body.into_inner();
    let (session, user) = IdentityActor::from_registry()
        .send(SpanMessage::new(RegisterUser { name, username }))
        .await??;
    Ok(HttpResponse::Created().json(AuthBody {
        success: true,
        token: session.id,
        user: UserBody::from(user),
    }))
}

#[instrument(skip_all)]
pub async fn login(body: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let LoginRequest { username } = body.into_inner();
    let (session, user) = IdentityActor::from_registry()
        .send(SpanMessage::new(LoginUser { username }))
        .await??;
    Ok(HttpResponse::Ok().json(AuthBody {
        success: true,
        token: session.id,
        user: UserBody::from(user),
    }))
}

#[instrument(skip_all)]
pub async fn me(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user = authenticate(&req).await?;
    Ok(HttpResponse::Ok().json(MeBody {
        success: true,
        user: UserBody::from(user),
    }))
}

#[instrument(skip_all)]
pub async fn list_destinations() -> Result<HttpResponse, ApiError> {
    let destinations = CatalogActor::from_registry()
        .send(SpanMessage::new(catalog::ListDestinations))
        .await??;
    Ok(HttpResponse::Ok().json(ListBody {
        success: true,
        count: destinations.len(),
        data: destinations
            .into_iter()
            .map(DestinationBody::from)
            .collect::<Vec<_>>(),
    }))
}

#[instrument(skip_all)]
pub async fn get_destination(path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let destination = CatalogActor::from_registry()
        .send(SpanMessage::new(catalog::GetDestination(path.into_inner())))
        .await??;
    Ok(HttpResponse::Ok().json(DataBody {
        success: true,
        data: DestinationBody::from(destination),
    }))
}

#[instrument(skip_all)]
pub async fn create_destination(
    req: HttpRequest,
    body: web::Json<CreateDestinationRequest>,
) -> Result<HttpResponse, ApiError> {
    let admin = authenticate_admin(&req).await?;
    let body = body.into_inner();
    let destination = CatalogActor::from_registry()
        .send(SpanMessage::new(catalog::CreateDestination {
            name: body.name,
            description: body.description,
            location: body.location,
            cost: body.cost,
            image_url: body.image_url,
            voting_deadline: body.voting_deadline,
            added_by: admin.id,
        }))
        .await??;
    Ok(HttpResponse::Created().json(DataBody {
        success: true,
        data: DestinationBody::from(destination),
    }))
}

#[instrument(skip_all)]
pub async fn update_destination(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateDestinationRequest>,
) -> Result<HttpResponse, ApiError> {
    authenticate_admin(&req).await?;
    let body = body.into_inner();
    let destination = CatalogActor::from_registry()
        .send(SpanMessage::new(catalog::UpdateDestination {
            id: path.into_inner(),
            name: body.name,
            description: body.description,
            location: body.location,
            cost: body.cost,
            image_url: body.image_url,
            voting_deadline: body.voting_deadline,
        }))
        .await??;
    Ok(HttpResponse::Ok().json(DataBody {
        success: true,
        data: DestinationBody::from(destination),
    }))
}

#[instrument(skip_all)]
pub async fn delete_destination(
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    authenticate_admin(&req).await?;
    CatalogActor::from_registry()
        .send(SpanMessage::new(catalog::DeleteDestination(path.into_inner())))
        .await??;
    Ok(HttpResponse::Ok().json(DataBody {
        success: true,
        data: Empty {},
    }))
}

#[instrument(skip_all)]
pub async fn cast_vote(
    req: HttpRequest,
    body: web::Json<CastVoteRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(&req).await?;
    let vote = VoteActor::from_registry()
        .send(SpanMessage::new(CastVote {
            voter_id: user.id,
            destination_id: body.into_inner().destination_id,
        }))
        .await??;
    Ok(HttpResponse::Created().json(DataBody {
        success: true,
        data: VoteBody::from(vote),
    }))
}

#[instrument(skip_all)]
pub async fn get_results(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let voter_id = authenticate_opt(&req).await.map(|user| user.id);
    let results = ResultsActor::from_registry()
        .send(SpanMessage::new(GetResults { voter_id }))
        .await??;
    Ok(HttpResponse::Ok().json(ResultsBody::from(results)))
}

#[instrument(skip_all)]
pub async fn my_vote(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user = authenticate(&req).await?;
    let vote = ResultsActor::from_registry()
        .send(SpanMessage::new(GetMyVote(user.id)))
        .await??;
    Ok(HttpResponse::Ok().json(DataBody {
        success: true,
        data: vote.map(MyVoteBody::from),
    }))
}

#[instrument(skip_all)]
pub async fn detailed_results(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    authenticate_admin(&req).await?;
    let votes = ResultsActor::from_registry()
        .send(SpanMessage::new(GetDetailedResults))
        .await??;
    Ok(HttpResponse::Ok().json(ListBody {
        success: true,
        count: votes.len(),
        data: votes
            .into_iter()
            .map(DetailedVoteBody::from)
            .collect::<Vec<_>>(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn update_request_distinguishes_absent_from_null() {
        let absent: UpdateDestinationRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.voting_deadline, None);
        assert_eq!(absent.image_url, None);

        let cleared: UpdateDestinationRequest =
            serde_json::from_str(r#"{"voting_deadline": null, "image_url": null}"#).unwrap();
        assert_eq!(cleared.voting_deadline, Some(None));
        assert_eq!(cleared.image_url, Some(None));

        let set: UpdateDestinationRequest = serde_json::from_str(
            r#"{"voting_deadline": "2026-09-01T12:00:00Z", "image_url": "https://example.com/x.jpg"}"#,
        )
        .unwrap();
        assert!(matches!(set.voting_deadline, Some(Some(_))));
        assert_eq!(set.image_url, Some(Some("https://example.com/x.jpg".into())));
    }

    #[test]
    fn bearer_token_requires_the_scheme_prefix() {
        let with_token = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc123"))
            .to_http_request();
        assert_eq!(bearer_token(&with_token).as_deref(), Some("abc123"));

        let wrong_scheme = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic abc123"))
            .to_http_request();
        assert_eq!(bearer_token(&wrong_scheme), None);

        let missing = TestRequest::default().to_http_request();
        assert_eq!(bearer_token(&missing), None);
    }

    #[test]
    fn vote_body_serializes_flat_ids() {
        let vote = InternalVote {
            id: VoteId::new(),
            voter_id: UserId::new(),
            destination_id: DestinationId::new(),
            created_at: Utc::now(),
        };
        let body = serde_json::to_value(VoteBody::from(vote.clone())).unwrap();
        assert_eq!(body["id"], serde_json::json!(vote.id.0));
        assert_eq!(body["voter_id"], serde_json::json!(vote.voter_id.0));
        assert_eq!(
            body["destination_id"],
            serde_json::json!(vote.destination_id.0)
        );
    }
}
