//! Database connection settings and pool setup.

use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

/// Local development database. `RouterConfig` layers file and env settings on top.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost:5432/intent_router";

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::with_url(DEFAULT_DATABASE_URL)
    }
}

impl DatabaseConfig {
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

/// Open a connection pool for `config`.
#[cfg(feature = "database")]
pub async fn connect(config: &DatabaseConfig) -> Result<sqlx::PgPool, sqlx::Error> {
    use sqlx::postgres::PgPoolOptions;
    use tracing::{info, warn};

    info!(
        "Connecting to database: {}",
        mask_database_url(&config.database_url)
    );

    let mut pool_options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connection_timeout);

    if let Some(idle_timeout) = config.idle_timeout {
        pool_options = pool_options.idle_timeout(idle_timeout);
    }

    if let Some(max_lifetime) = config.max_lifetime {
        pool_options = pool_options.max_lifetime(max_lifetime);
    }

    let pool = pool_options
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            warn!("Failed to connect to database: {}", e);
            e
        })?;

    info!(
        "Database pool ready (max {} connections)",
        config.max_connections
    );
    Ok(pool)
}

/// Mask the password in a database URL for logging.
pub fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let mut masked = parsed.clone();
            if parsed.password().is_some() {
                let _ = masked.set_password(Some("***"));
            }
            masked.to_string()
        }
        Err(_) => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_password_only() {
        let masked = mask_database_url("postgresql://router:s3cret@db:5432/mes");
        assert!(!masked.contains("s3cret"));
        assert!(masked.contains("router"));
        assert!(masked.contains("db:5432/mes"));
    }

    #[test]
    fn default_does_not_read_the_environment() {
        std::env::set_var("DATABASE_POOL_SIZE", "77");
        let config = DatabaseConfig::default();
        std::env::remove_var("DATABASE_POOL_SIZE");
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn unparseable_url_is_fully_masked() {
        assert_eq!(mask_database_url("not a url"), "***");
    }
}
