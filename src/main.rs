mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod mail;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use config::Config;
use db::{userdb::UserExt, DBClient};
use dotenv::dotenv;
use mail::sendmail::{mailer_from_config, MailSender};
use routes::create_router;
use service::storage::{FileStore, LocalFileStore};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::LevelFilter;
use utils::password;

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: DBClient,
    pub mailer: Arc<dyn MailSender>,
    pub file_store: Arc<dyn FileStore>,
}

async fn bootstrap_admin(config: &Config, db_client: &DBClient) {
    let (Some(email), Some(raw_password)) = (&config.admin_email, &config.admin_password) else {
        return;
    };

    let hashed = match password::hash(raw_password.as_str()) {
        Ok(hashed) => hashed,
        Err(e) => {
            tracing::error!("Could not hash the administrator password: {}", e.to_string());
            return;
        }
    };

    match db_client
        .ensure_admin(&email.trim().to_lowercase(), &hashed)
        .await
    {
        Ok(true) => tracing::info!("Administrator account {} created", email),
        Ok(false) => tracing::debug!("Administrator account {} already present", email),
        Err(e) => tracing::error!("Failed to create administrator account: {}", e),
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = Config::init();

    let level = config
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::DEBUG);
    tracing_subscriber::fmt().with_max_level(level).init();

    let pool = match PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connection to the database is successful");
            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!("Failed to run migrations: {:?}", err);
        std::process::exit(1);
    }

    let db_client = match &config.redis_url {
        Some(redis_url) => DBClient::with_redis(pool, redis_url).await,
        None => {
            tracing::warn!("REDIS_URL not set. Token revocation disabled.");
            DBClient::new(pool)
        }
    };

    bootstrap_admin(&config, &db_client).await;

    let app_state = AppState {
        mailer: mailer_from_config(&config),
        file_store: Arc::new(LocalFileStore::new(config.media_root.clone())),
        env: config.clone(),
        db_client,
    };

    let app = create_router(Arc::new(app_state));

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", err);
        std::process::exit(1);
    }
}
