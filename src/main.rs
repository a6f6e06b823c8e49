use anyhow::Result;
use axum::{
    extract::FromRef,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use axum_extra::extract::cookie::Key;
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod calendar;
mod caption;
mod config;
mod error;
mod extract;
mod meta;
mod pricing;
mod relay;
mod scrape;
mod session;
mod store;
#[cfg(test)]
mod test_support;
mod types;

use crate::{
    config::Config,
    extract::NicheRules,
    store::{MemoryStore, StateStore},
};

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn StateStore>,
    pub http_client: reqwest::Client,
    pub cookie_key: Key,
    pub niches: Arc<NicheRules>,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resellio=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    info!("Starting Resellio backend");

    if config.meta_app_id.is_empty() {
        info!("META_APP_ID not set; Meta connection is disabled");
    }

    // Initialize state store
    let store: Arc<dyn StateStore> = match &config.store_path {
        Some(path) => {
            info!("State will be persisted to: {}", path.display());
            Arc::new(MemoryStore::persistent(path.clone()))
        }
        None => Arc::new(MemoryStore::in_memory()),
    };

    // Scrape requests set their own timeout; this one bounds Graph and webhook calls
    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let app_state = AppState {
        cookie_key: session::cookie_key(&config.session_secret),
        config,
        store,
        http_client,
        niches: Arc::new(NicheRules::default()),
    };

    let addr = app_state.config.server_address();
    let app = router(app_state);

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        // Product grabber
        .route("/api/grab", post(scrape::grab))
        // Meta connection
        .route("/api/meta/connect", get(meta::connect))
        .route("/api/meta/callback", get(meta::callback))
        .route("/api/meta/status", get(meta::status))
        .route("/api/meta/disconnect", post(meta::disconnect))
        // Relay job formatter
        .route("/api/relay/format", post(relay::format_handler))
        // Pricing and captions
        .route("/api/pricing", post(pricing::quote_handler))
        .route("/api/caption", post(caption::caption_handler))
        // Content calendar
        .route("/api/calendar", get(calendar::list).post(calendar::schedule))
        .route("/api/calendar/export", get(calendar::export))
        .route("/api/calendar/import", post(calendar::import))
        .route("/api/calendar/tips", get(calendar::tips))
        .route(
            "/api/calendar/:id",
            patch(calendar::update_status).delete(calendar::delete),
        )
        .route("/api/calendar/:id/duplicate", post(calendar::duplicate))
        .route(
            "/api/settings",
            get(calendar::get_settings).put(calendar::put_settings),
        )
        // Health check
        .route("/health", get(health_check))
        .route("/", get(root_handler))
        .with_state(app_state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn root_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "service": "Resellio",
        "status": "running",
        "endpoints": {
            "grab": "/api/grab",
            "meta_connect": "/api/meta/connect",
            "meta_status": "/api/meta/status",
            "relay_format": "/api/relay/format",
            "pricing": "/api/pricing",
            "caption": "/api/caption",
            "calendar": "/api/calendar",
            "settings": "/api/settings",
            "health": "/health"
        }
    }))
}
