use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const META_CALLBACK_PATH: &str = "/api/meta/callback";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub session_secret: String,
    pub public_origin: String,
    pub meta_app_id: String,
    pub meta_app_secret: String,
    pub meta_redirect_uri: String,
    pub oauth_dialog_url: String,
    pub graph_base_url: String,
    pub scrape_timeout: Duration,
    pub store_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let public_origin = std::env::var("PUBLIC_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:4000".to_string())
            .trim_end_matches('/')
            .to_string();

        let raw_redirect_uri = std::env::var("META_REDIRECT_URI")
            .unwrap_or_else(|_| format!("{}{}", public_origin, META_CALLBACK_PATH));

        Ok(Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .context("Invalid PORT")?,

            session_secret: std::env::var("SESSION_SECRET").unwrap_or_else(|_| {
                // Generate a random secret if not provided; sessions won't survive restarts
                use rand::Rng;
                let secret: Vec<u8> = (0..32).map(|_| rand::thread_rng().gen()).collect();
                base64::Engine::encode(&base64::engine::general_purpose::STANDARD, secret)
            }),

            meta_redirect_uri: normalize_redirect_uri(&raw_redirect_uri, &public_origin),

            public_origin,

            meta_app_id: std::env::var("META_APP_ID").unwrap_or_default(),

            meta_app_secret: std::env::var("META_APP_SECRET").unwrap_or_default(),

            oauth_dialog_url: std::env::var("META_OAUTH_DIALOG_URL")
                .unwrap_or_else(|_| "https://www.facebook.com/v20.0/dialog/oauth".to_string()),

            graph_base_url: std::env::var("META_GRAPH_BASE_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v20.0".to_string())
                .trim_end_matches('/')
                .to_string(),

            scrape_timeout: Duration::from_secs(
                std::env::var("SCRAPE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .context("Invalid SCRAPE_TIMEOUT_SECS")?,
            ),

            store_path: std::env::var("STORE_PATH").map(PathBuf::from).ok().or_else(|| {
                dirs::data_local_dir().map(|dir| dir.join("resellio").join("state.json"))
            }),
        })
    }

    pub fn server_address(&self) -> SocketAddr {
        ([0, 0, 0, 0], self.port).into()
    }
}

/// A redirect URI configured as a bare origin gets the callback path appended;
/// an unparsable one is replaced by the callback on our own public origin.
pub fn normalize_redirect_uri(redirect_uri: &str, origin: &str) -> String {
    match Url::parse(redirect_uri) {
        Ok(mut parsed) => {
            if parsed.path().is_empty() || parsed.path() == "/" {
                parsed.set_path(META_CALLBACK_PATH);
            }
            parsed.to_string()
        }
        Err(_) => format!("{}{}", origin, META_CALLBACK_PATH),
    }
}
