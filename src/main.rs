use actix_web::{App, HttpServer};
use color_eyre::eyre::WrapErr;
use tracing::info;

use tripvote_server::config::Config;
use tripvote_server::{db, log, server};

#[actix_rt::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    log::init();

    let config = Config::load()?;
    let pool = db::new_pool(&config.database_url)
        .await
        .wrap_err("Failed to connect to Postgres")?;
    db::MIGRATOR
        .run(&pool)
        .await
        .wrap_err("Failed to run migrations")?;

    server::register_db_actor(pool);
    server::register_system_actors();

    info!(addr = config.bind_addr.as_str(), "Starting HTTP server");

    HttpServer::new(|| App::new().configure(server::configure))
        .bind(&config.bind_addr)?
        .run()
        .await?;

    Ok(())
}
