use crate::{
    error::{AppError, GraphError, OAuthFailure, Result},
    session::{ensure_session, session_id},
    store::{load_json, save_json, scoped_key, StateStore},
    types::{
        AccountsResponse, AuthStatus, ConnectResponse, Connection, ConnectionStatus,
        FacebookStatus, GraphErrorBody, InstagramStatus, OAuthCallback, PermissionsResponse,
        TokenResponse,
    },
    AppState,
};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::{IntoResponse, Redirect},
    Json,
};
use axum_extra::extract::SignedCookieJar;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

pub const OAUTH_STATE_KEY: &str = "resellio_meta_oauth_state";
pub const CONNECTION_KEY: &str = "resellio_meta_connection";

const STATE_TTL: std::time::Duration = std::time::Duration::from_secs(60 * 10);
const CONNECTION_TTL: std::time::Duration = std::time::Duration::from_secs(60 * 60 * 24 * 30);

// Graph omits expires_in for some long-lived tokens; they last ~60 days
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 60 * 60 * 24 * 60;

pub const META_SCOPES: [&str; 6] = [
    "pages_show_list",
    "pages_manage_posts",
    "pages_read_engagement",
    "instagram_basic",
    "instagram_content_publish",
    "business_management",
];

// Random anti-forgery state, same shape as a PKCE verifier
pub fn generate_state() -> String {
    let random_bytes: Vec<u8> = (0..64).map(|_| rand::thread_rng().gen()).collect();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Issues a fresh state for this session and builds the dialog URL.
pub fn begin_connect(state: &AppState, session_id: &str) -> Result<ConnectResponse> {
    if state.config.meta_app_id.is_empty() {
        return Err(AppError::Config("META_APP_ID is not configured".into()));
    }

    let oauth_state = generate_state();
    state.store.set(
        &scoped_key(session_id, OAUTH_STATE_KEY),
        oauth_state.clone(),
        Some(STATE_TTL),
    );

    let scope = META_SCOPES.join(",");
    let auth_params = vec![
        ("client_id", state.config.meta_app_id.as_str()),
        ("redirect_uri", state.config.meta_redirect_uri.as_str()),
        ("state", oauth_state.as_str()),
        ("response_type", "code"),
        ("scope", scope.as_str()),
    ];

    let query = serde_urlencoded::to_string(auth_params)
        .map_err(|e| AppError::InternalError(e.into()))?;
    let oauth_url = format!("{}?{}", state.config.oauth_dialog_url, query);

    debug!(
        "Meta auth params: client_id={}, redirect_uri={}",
        state.config.meta_app_id, state.config.meta_redirect_uri
    );

    Ok(ConnectResponse {
        oauth_url,
        state: oauth_state,
    })
}

/// Runs the whole callback. Nothing is stored unless every step succeeds.
pub async fn handle_callback(
    state: &AppState,
    session_id: Option<&str>,
    params: OAuthCallback,
) -> std::result::Result<Connection, OAuthFailure> {
    if let Some(reason) = params.error_reason.as_deref() {
        warn!("Meta authorization declined: {}", reason);
        return Err(OAuthFailure::PermissionsMissing);
    }

    let (Some(code), Some(returned_state)) = (
        params.code.filter(|c| !c.is_empty()),
        params.state.filter(|s| !s.is_empty()),
    ) else {
        return Err(OAuthFailure::MissingCodeOrState);
    };

    let session_id = session_id.ok_or(OAuthFailure::InvalidState)?;
    consume_state(state.store.as_ref(), session_id, &returned_state)?;

    let connection = exchange_for_connection(state, &code).await?;

    save_json(
        state.store.as_ref(),
        &scoped_key(session_id, CONNECTION_KEY),
        &connection,
        Some(CONNECTION_TTL),
    )
    .map_err(|e| {
        error!("Failed to persist Meta connection: {}", e);
        OAuthFailure::OAuthFailed
    })?;

    info!(
        "Meta connected: page {} ({}), instagram linked: {}",
        connection.page_name,
        connection.page_id,
        connection.ig_user_id.is_some()
    );
    Ok(connection)
}

/// The stored state must equal the returned one; on a match it is removed so
/// the same callback can never be replayed.
fn consume_state(
    store: &dyn StateStore,
    session_id: &str,
    returned: &str,
) -> std::result::Result<(), OAuthFailure> {
    let key = scoped_key(session_id, OAUTH_STATE_KEY);
    match store.get(&key) {
        Some(issued) if issued == returned => {}
        Some(_) => {
            warn!("OAuth state mismatch for session {}", session_id);
            return Err(OAuthFailure::InvalidState);
        }
        None => {
            warn!("No pending OAuth state for session {}", session_id);
            return Err(OAuthFailure::InvalidState);
        }
    }

    // take() is atomic; losing a race here means someone else consumed it
    match store.take(&key) {
        Some(issued) if issued == returned => Ok(()),
        _ => Err(OAuthFailure::InvalidState),
    }
}

async fn exchange_for_connection(
    state: &AppState,
    code: &str,
) -> std::result::Result<Connection, OAuthFailure> {
    let config = &state.config;
    let token_url = format!("{}/oauth/access_token", config.graph_base_url);

    let short_token: TokenResponse = graph_request(
        state,
        &token_url,
        &[
            ("client_id", config.meta_app_id.as_str()),
            ("client_secret", config.meta_app_secret.as_str()),
            ("redirect_uri", config.meta_redirect_uri.as_str()),
            ("code", code),
        ],
    )
    .await?;
    debug!("Exchanged authorization code for short-lived token");

    let long_token: TokenResponse = graph_request(
        state,
        &token_url,
        &[
            ("grant_type", "fb_exchange_token"),
            ("client_id", config.meta_app_id.as_str()),
            ("client_secret", config.meta_app_secret.as_str()),
            ("fb_exchange_token", short_token.access_token.as_str()),
        ],
    )
    .await?;
    debug!("Exchanged short-lived token for long-lived token");

    let accounts: AccountsResponse = graph_request(
        state,
        &format!("{}/me/accounts", config.graph_base_url),
        &[
            ("fields", "id,name,access_token,instagram_business_account"),
            ("access_token", long_token.access_token.as_str()),
        ],
    )
    .await?;

    let linked_index = accounts
        .data
        .iter()
        .position(|page| page.instagram_business_account.is_some());
    let page = match linked_index {
        Some(index) => accounts.data.into_iter().nth(index),
        None => accounts.data.into_iter().next(),
    }
    .ok_or_else(|| {
        warn!("Meta user manages no pages");
        OAuthFailure::NotAdminPage
    })?;

    let permissions: PermissionsResponse = graph_request(
        state,
        &format!("{}/me/permissions", config.graph_base_url),
        &[("access_token", long_token.access_token.as_str())],
    )
    .await?;

    let scopes_granted: BTreeSet<String> = permissions
        .data
        .into_iter()
        .filter(|grant| grant.status == "granted")
        .map(|grant| grant.permission)
        .collect();

    let now = Utc::now();
    let lifetime = long_token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    let expires_at = Duration::try_seconds(lifetime)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            warn!("Token lifetime out of range: {}", lifetime);
            OAuthFailure::OAuthFailed
        })?;

    Ok(Connection {
        page_id: page.id,
        page_name: page.name,
        ig_user_id: page.instagram_business_account.map(|account| account.id),
        page_access_token: page.access_token,
        scopes_granted,
        expires_at,
        connected_at: now,
    })
}

/// One GET against the Graph API; non-2xx answers become `GraphError::Rejected`
/// carrying Graph's own error message when it sent one.
pub async fn graph_request<T: DeserializeOwned>(
    state: &AppState,
    url: &str,
    query: &[(&str, &str)],
) -> std::result::Result<T, GraphError> {
    let response = state.http_client.get(url).query(query).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<GraphErrorBody>(&body)
            .ok()
            .and_then(|body| body.error)
            .and_then(|detail| detail.message)
            .unwrap_or_else(|| format!("Meta request failed ({})", status.as_u16()));
        error!("Graph request to {} failed: {}", url, message);
        return Err(GraphError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        error!("Unexpected Graph response from {}: {}", url, e);
        GraphError::Decode(e)
    })
}

pub fn read_connection(store: &dyn StateStore, session_id: &str) -> Option<Connection> {
    load_json::<Connection>(store, &scoped_key(session_id, CONNECTION_KEY))
        .filter(Connection::is_complete)
}

pub fn connection_status(connection: Option<&Connection>) -> ConnectionStatus {
    let Some(connection) = connection else {
        return ConnectionStatus {
            connected: false,
            facebook: FacebookStatus {
                page_id: None,
                page_name: None,
            },
            instagram: InstagramStatus {
                ig_user_id: None,
                connected: false,
            },
            auth: AuthStatus {
                scopes_ok: false,
                token_expired: false,
                expires_at: None,
            },
            notes: vec!["facebook_not_connected".to_string()],
        };
    };

    let missing: Vec<&str> = META_SCOPES
        .iter()
        .copied()
        .filter(|scope| !connection.scopes_granted.contains(*scope))
        .collect();
    let token_expired = connection.expires_at <= Utc::now();

    let mut notes = Vec::new();
    if connection.ig_user_id.is_none() {
        notes.push("instagram_not_linked".to_string());
    }
    notes.extend(missing.iter().map(|scope| format!("missing_scope:{}", scope)));
    if token_expired {
        notes.push("token_expired".to_string());
    }

    ConnectionStatus {
        connected: true,
        facebook: FacebookStatus {
            page_id: Some(connection.page_id.clone()),
            page_name: Some(connection.page_name.clone()),
        },
        instagram: InstagramStatus {
            ig_user_id: connection.ig_user_id.clone(),
            connected: connection.ig_user_id.is_some(),
        },
        auth: AuthStatus {
            scopes_ok: missing.is_empty(),
            token_expired,
            expires_at: Some(connection.expires_at),
        },
        notes,
    }
}

// GET /api/meta/connect
pub async fn connect(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<impl IntoResponse> {
    let (jar, session_id) = ensure_session(jar);
    let response = begin_connect(&state, &session_id)?;
    info!("Starting Meta connection for session {}", session_id);
    Ok((jar, Json(response)))
}

// GET /api/meta/callback
pub async fn callback(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    params: std::result::Result<Query<OAuthCallback>, QueryRejection>,
) -> impl IntoResponse {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            warn!("Unreadable Meta callback query: {}", rejection);
            return Redirect::to(&format!(
                "/?meta_error={}",
                OAuthFailure::MissingCodeOrState
            ));
        }
    };
    let session_id = session_id(&jar);

    let destination = match handle_callback(&state, session_id.as_deref(), params).await {
        Ok(connection) if connection.ig_user_id.is_some() => "/?meta=connected".to_string(),
        Ok(_) => "/?meta=connected_without_ig".to_string(),
        Err(failure) => {
            warn!("Meta callback failed: {}", failure);
            format!("/?meta_error={}", failure)
        }
    };

    Redirect::to(&destination)
}

// GET /api/meta/status
pub async fn status(State(state): State<AppState>, jar: SignedCookieJar) -> impl IntoResponse {
    let connection =
        session_id(&jar).and_then(|id| read_connection(state.store.as_ref(), &id));
    Json(connection_status(connection.as_ref()))
}

// POST /api/meta/disconnect
pub async fn disconnect(State(state): State<AppState>, jar: SignedCookieJar) -> impl IntoResponse {
    if let Some(id) = session_id(&jar) {
        state.store.delete(&scoped_key(&id, CONNECTION_KEY));
        info!("Meta connection removed for session {}", id);
    }

    Json(json!({ "disconnected": true, "status": "not_connected" }))
}
