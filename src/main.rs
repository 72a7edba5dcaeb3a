use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use token_auth::configuration::get_configuration;
use token_auth::identity::{LockoutPolicy, PgClientRegistry, PgIdentityStore};
use token_auth::startup::{build_auth, run};
use token_auth::store::PgRefreshTokenStore;
use token_auth::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
        })?;

    let policy = LockoutPolicy::from_settings(&configuration.identity);
    let components = build_auth(
        &configuration.jwt,
        Arc::new(PgRefreshTokenStore::new(pool.clone())),
        Arc::new(PgIdentityStore::new(pool.clone(), policy)),
        Arc::new(PgClientRegistry::new(pool)),
    )
    .map_err(|e| {
        // Missing signing secret: refuse to start
        tracing::error!("Invalid authentication configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, components)?.await
}
