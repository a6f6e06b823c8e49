use crate::{
    config::Config, extract::NicheRules, session::cookie_key, store::MemoryStore, AppState,
};
use std::sync::Arc;
use std::time::Duration;

pub fn test_config(graph_base_url: &str) -> Config {
    Config {
        port: 0,
        session_secret: "test-session-secret".to_string(),
        public_origin: "http://localhost:4000".to_string(),
        meta_app_id: "app-id".to_string(),
        meta_app_secret: "app-secret".to_string(),
        meta_redirect_uri: "http://localhost:4000/api/meta/callback".to_string(),
        oauth_dialog_url: "https://www.facebook.com/v20.0/dialog/oauth".to_string(),
        graph_base_url: graph_base_url.trim_end_matches('/').to_string(),
        scrape_timeout: Duration::from_secs(2),
        store_path: None,
    }
}

/// In-memory state pointed at a (usually mocked) Graph API.
pub fn test_state(graph_base_url: &str) -> AppState {
    let config = test_config(graph_base_url);
    AppState {
        cookie_key: cookie_key(&config.session_secret),
        config: Arc::new(config),
        store: Arc::new(MemoryStore::in_memory()),
        http_client: reqwest::Client::new(),
        niches: Arc::new(NicheRules::default()),
    }
}
