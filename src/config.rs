use color_eyre::eyre::{eyre, Result};
use std::env;

/// Runtime configuration, read from the environment. A `.env` file in the
/// working directory is honored for local development.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let database_url =
            env::var("DATABASE_URL").map_err(|_| eyre!("DATABASE_URL must be set"))?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_owned());
        Ok(Self {
            database_url,
            bind_addr,
        })
    }
}
