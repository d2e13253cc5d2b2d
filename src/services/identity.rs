use crate::async_message_handler_with_span;
use crate::db::session::InternalSession;
use crate::db::user::{InternalUser, Role, UserInsert};
use crate::db::{self, DbExecutor};
use crate::error::ApiError;
use crate::span::{AsyncSpanHandler, SpanMessage};
use actix::prelude::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity provider: resolves credentials to users and issues sessions.
/// Vote handling trusts the identity this actor produces and never takes a
/// voter id from request payloads.
#[derive(Default)]
pub struct IdentityActor;

impl Actor for IdentityActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Identity actor started");
    }
}

impl SystemService for IdentityActor {}
impl Supervised for IdentityActor {}

/// Resolve a bearer token to the user behind it.
#[derive(Message, Clone)]
#[rtype(result = "Result<InternalUser, ApiError>")]
pub struct Authenticate(pub String);

async_message_handler_with_span!({
    impl AsyncSpanHandler<Authenticate> for IdentityActor {
        async fn handle(msg: Authenticate) -> Result<InternalUser, ApiError> {
            let Authenticate(token) = msg;
            let session_id = match token.parse::<Uuid>() {
                Ok(id) => db::session::SessionId(id),
                Err(_) => {
                    debug!("Credential is not a session token");
                    return Err(ApiError::Unauthorized);
                }
            };

            let session = DbExecutor::from_registry()
                .send(SpanMessage::new(db::session::SessionById(session_id)))
                .await??
                .ok_or(ApiError::Unauthorized)?;

            let user = DbExecutor::from_registry()
                .send(SpanMessage::new(db::user::UserById(session.user_id)))
                .await??;

            match user {
                Some(user) => Ok(user),
                None => {
                    warn!(session = %session.id, "Session references a missing user");
                    Err(ApiError::Unauthorized)
                }
            }
        }
    }
});

#[derive(Message, Clone)]
#[rtype(result = "Result<(InternalSession, InternalUser), ApiError>")]
pub struct LoginUser {
    pub username: String,
}

async_message_handler_with_span!({
    impl AsyncSpanHandler<LoginUser> for IdentityActor {
        async fn handle(msg: LoginUser) -> Result<(InternalSession, InternalUser), ApiError> {
            let username = msg.username.trim().to_lowercase();
            debug!(username = username.as_str(), "Handling login");

            let user = DbExecutor::from_registry()
                .send(SpanMessage::new(db::user::UserByUsername(username)))
                .await??
                .ok_or(ApiError::InvalidCredentials)?;

            let session = DbExecutor::from_registry()
                .send(SpanMessage::new(db::session::SaveSession(user.id.clone())))
                .await??;

            info!(user = %user.id, "User logged in");
            Ok((session, user))
        }
    }
});

/// Registration creates an employee and logs them straight in.
#[derive(Message, Clone)]
#[rtype(result = "Result<(InternalSession, InternalUser), ApiError>")]
pub struct RegisterUser {
    pub name: String,
    pub username: String,
}

async_message_handler_with_span!({
    impl AsyncSpanHandler<RegisterUser> for IdentityActor {
        async fn handle(msg: RegisterUser) -> Result<(InternalSession, InternalUser), ApiError> {
            let name = msg.name.trim().to_owned();
            let username = msg.username.trim().to_lowercase();
            debug!(username = username.as_str(), "Handling registration");

            if name.is_empty() {
                return Err(ApiError::Validation("Please add a name".into()));
            }
            if username.is_empty() || username.contains(char::is_whitespace) {
                return Err(ApiError::Validation("Please add a valid username".into()));
            }

            let inserted = DbExecutor::from_registry()
                .send(SpanMessage::new(db::user::AddUser {
                    name,
                    username,
                    role: Role::Employee,
                }))
                .await??;

            let user = match inserted {
                UserInsert::Created(user) => user,
                UserInsert::DuplicateUsername => {
                    return Err(ApiError::Validation("Username is already registered".into()))
                }
            };

            let session = DbExecutor::from_registry()
                .send(SpanMessage::new(db::session::SaveSession(user.id.clone())))
                .await??;

            info!(user = %user.id, "User registered");
            Ok((session, user))
        }
    }
});
