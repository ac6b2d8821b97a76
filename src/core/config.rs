use anyhow::{Context, Result};

pub struct Config {
    pub database: DatabaseConfig,
    pub port: u16,
}

pub struct DatabaseConfig {
    pub url: String,
}

pub fn load() -> Result<Config> {
    Ok(Config {
        database: DatabaseConfig {
            url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
        },
        port: std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid port number")?,
    })
}
