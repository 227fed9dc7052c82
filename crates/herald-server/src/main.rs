mod commands;
mod routes;
mod telegram;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::{post, put};
use axum::Router;
use herald_engine::dispatcher::Dispatcher;
use herald_engine::pipeline::{PresencePipeline, PRESENCE_QUEUE_DEPTH};
use herald_engine::presence::OnlineSet;
use herald_engine::routing::{Router as EventRouter, RouterConfig};
use herald_engine::tokens::LinkTokenService;
use herald_engine::Casing;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::routes::{AppState, AppStateInner};
use crate::telegram::TelegramTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = env_or("HERALD_DB_PATH", "herald.db");
    let host = env_or("HERALD_HOST", "0.0.0.0");
    let port: u16 = env_or("HERALD_PORT", "3000").parse()?;
    let tg_token =
        std::env::var("HERALD_TG_TOKEN").context("HERALD_TG_TOKEN must be set")?;
    let tg_api_base = env_or("HERALD_TG_API_BASE", "https://api.telegram.org");
    let bot_username = env_or("HERALD_BOT_USERNAME", "herald_bot");
    let server_name = env_or("HERALD_SERVER_NAME", "the server");
    let token_ttl_secs: i64 = env_or("HERALD_TOKEN_TTL_SECS", "300").parse()?;
    let fanout_limit: usize = env_or("HERALD_FANOUT_LIMIT", "8").parse()?;
    let send_retries: u32 = env_or("HERALD_SEND_RETRIES", "3").parse()?;
    let case_insensitive: bool = env_or("HERALD_CASE_INSENSITIVE", "false").parse()?;
    let ignored_usernames: HashSet<String> = env_or("HERALD_IGNORE_USERNAMES", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let casing = if case_insensitive {
        Casing::Insensitive
    } else {
        Casing::Sensitive
    };

    // Init database
    let db = Arc::new(herald_db::Database::open(&PathBuf::from(&db_path))?);
    if let Err(e) = db.purge_stale_tokens(chrono::Utc::now()) {
        warn!("Failed to purge stale link tokens: {e}");
    }

    // Core components
    let online = Arc::new(OnlineSet::new(casing));
    let transport = Arc::new(TelegramTransport::new(
        tg_api_base,
        tg_token,
        server_name,
    )?);
    let router = EventRouter::new(
        Arc::clone(&db),
        Arc::clone(&online),
        RouterConfig {
            ignored_usernames,
            casing,
        },
    );
    let dispatcher = Dispatcher::new(
        Arc::clone(&db),
        Arc::clone(&transport),
        fanout_limit,
        send_retries,
    );
    let tokens = LinkTokenService::new(Arc::clone(&db), token_ttl_secs);

    // Presence worker: one sequential consumer keeps per-username ordering.
    let (events_tx, events_rx) = mpsc::channel(PRESENCE_QUEUE_DEPTH);
    let pipeline = PresencePipeline::new(Arc::clone(&online), router, dispatcher);
    tokio::spawn(pipeline.run(events_rx));

    let state: AppState = Arc::new(AppStateInner {
        db,
        online,
        tokens,
        transport,
        events_tx,
        bot_username,
    });

    // Routes
    let app = Router::new()
        .route("/presence/events", post(routes::ingest_event))
        .route("/presence/online", put(routes::seed_online))
        .route("/links", post(routes::issue_link))
        .route("/telegram/webhook", post(routes::telegram_webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Herald listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}
