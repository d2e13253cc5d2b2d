use dotenv::dotenv;
use lazy_static::lazy_static;
use sqlx::{postgres::PgConnectOptions, Executor, PgPool};
use std::{env, fs};
use tokio::sync::Mutex;
use tracing::{debug, span};
use tripvote_server::db;

lazy_static! {
    static ref CREATE_DB_MUTEX: Mutex<()> = Mutex::new(());
}

async fn create_test_db(pool: PgPool, test_db: &str) {
    let _lock = CREATE_DB_MUTEX.lock().await;
    debug!("Creating new test db");

    sqlx::query(&format!("DROP DATABASE IF EXISTS {}", test_db))
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(&format!("CREATE DATABASE {}", test_db))
        .execute(&pool)
        .await
        .unwrap();
}

async fn init_fixtures_test_db(pool: &PgPool) {
    let mut fixtures: Vec<fs::DirEntry> = fs::read_dir("fixtures")
        .unwrap()
        .map(|entry| entry.unwrap())
        .collect();
    fixtures.sort_by_key(|entry| entry.file_name());
    debug!("Executing init SQL in test db");
    for resource in fixtures {
        pool.execute(fs::read_to_string(resource.path()).unwrap().as_str())
            .await
            .unwrap();
    }
}

async fn drop_test_db(pool: PgPool, test_db: &str) {
    let _lock = CREATE_DB_MUTEX.lock().await;
    debug!("Dropping test db");
    sqlx::query(&format!("DROP DATABASE {}", test_db))
        .execute(&pool)
        .await
        .unwrap();
}

/// One throwaway Postgres database per test: created, migrated and seeded on
/// construction, dropped when the test finishes. Tests that need it call
/// [`IntegrationTestDb::try_new`] and skip when `DATABASE_URL` is not set.
pub struct IntegrationTestDb {
    db_name: String,
    pool: PgPool,
    template_connect_options: PgConnectOptions,
}

impl IntegrationTestDb {
    pub async fn try_new() -> Option<Self> {
        dotenv().ok();
        let template_connect_options: PgConnectOptions = env::var("DATABASE_URL")
            .ok()?
            .parse()
            .expect("DATABASE_URL is not a valid Postgres URL");

        // Test database with a random name so parallel tests never collide
        let db_name = format!("integration_{}", uuid::Uuid::new_v4().simple());
        let span = span!(tracing::Level::DEBUG, "test_db", test_db = db_name.as_str());
        let _enter = span.enter();
        let template_pool = db::new_pool_with(template_connect_options.clone())
            .await
            .unwrap();
        create_test_db(template_pool, &db_name).await;

        let integration_options = template_connect_options.clone().database(&db_name);
        let pool = db::new_pool_with(integration_options).await.unwrap();
        db::MIGRATOR.run(&pool).await.unwrap();
        init_fixtures_test_db(&pool).await;

        Some(Self {
            db_name,
            pool,
            template_connect_options,
        })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}

impl Drop for IntegrationTestDb {
    fn drop(&mut self) {
        // Cleanup test db after test is finished
        let db_name = self.db_name.clone();
        let pool = self.pool.clone();
        let template_connect_options = self.template_connect_options.clone();
        // Drop cannot await, so the cleanup gets its own thread and runtime.
        // The thread stays detached: joining it here would block this test's
        // single-threaded runtime, which pool.close() needs live to finish.
        let _detached = std::thread::spawn(move || {
            let span = span!(tracing::Level::DEBUG, "test_db", test_db = db_name.as_str());
            let _enter = span.enter();
            actix_rt::System::new().block_on(async move {
                // Open handles would block DROP DATABASE
                pool.close().await;
                let template_pool = db::new_pool_with(template_connect_options.clone())
                    .await
                    .unwrap();
                drop_test_db(template_pool, &db_name).await;
                debug!("Dropped test db");
            });
        });
    }
}
