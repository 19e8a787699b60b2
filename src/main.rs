use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use taskserver::auth;
use taskserver::config::AppConfig;
use taskserver::journal;
use taskserver::notify::queue;
use taskserver::shared::state::AppState;
use taskserver::shared::utils::create_pool;
use taskserver::tasks;
use taskserver::users;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env()?;
    let pool = create_pool(&config.database.url)?;

    {
        use diesel::Connection;
        let mut conn = diesel::PgConnection::establish(&config.database.url)
            .context("failed to connect for migrations")?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    }

    let state = Arc::new(AppState::new(pool, config.clone()));

    queue::spawn_worker(state.clone());

    let api = Router::new()
        .merge(tasks::configure_tasks_routes())
        .merge(users::configure_users_routes())
        .merge(journal::configure_journal_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let app = Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
