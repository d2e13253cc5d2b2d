use actix::prelude::*;
use actix::registry::SystemRegistry;
use actix_web::web;
use sqlx::PgPool;

use crate::db::DbExecutor;
use crate::error::ApiError;
use crate::routes;
use crate::services::catalog::CatalogActor;
use crate::services::identity::IdentityActor;
use crate::services::results::ResultsActor;
use crate::services::vote::VoteActor;

/// The database actor has no usable `Default`, so it is registered
/// explicitly with a connected pool before anything can talk to it.
pub fn register_db_actor(pool: PgPool) {
    SystemRegistry::set(DbExecutor(pool).start());
}

pub fn register_system_actors() {
    SystemRegistry::set(IdentityActor::default().start());
    SystemRegistry::set(CatalogActor::default().start());
    SystemRegistry::set(VoteActor::default().start());
    SystemRegistry::set(ResultsActor::default().start());
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::Validation(err.to_string()).into()
    }))
    .service(
        web::scope("/api")
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(routes::register))
                    .route("/login", web::post().to(routes::login))
                    .route("/me", web::get().to(routes::me)),
            )
            .service(
                web::scope("/destinations")
                    .route("", web::get().to(routes::list_destinations))
                    .route("", web::post().to(routes::create_destination))
                    .route("/{id}", web::get().to(routes::get_destination))
                    .route("/{id}", web::put().to(routes::update_destination))
                    .route("/{id}", web::delete().to(routes::delete_destination)),
            )
            .service(
                web::scope("/votes")
                    .route("/results", web::get().to(routes::get_results))
                    .route("/my-vote", web::get().to(routes::my_vote))
                    .route("/detailed-results", web::get().to(routes::detailed_results))
                    .route("", web::post().to(routes::cast_vote)),
            ),
    )
    .route("/", web::get().to(routes::index));
}
