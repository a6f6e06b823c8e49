use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const CURRENCY: &str = "IDR";

/// Marketplaces we accept links from, in the order they are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marketplace {
    Shopee,
    Tokopedia,
    Alibaba,
    #[serde(rename = "1688")]
    Alibaba1688,
    AliExpress,
    #[serde(rename = "Marketplace")]
    Other,
}

impl Marketplace {
    pub const KNOWN: [(&'static str, Marketplace); 5] = [
        ("shopee", Marketplace::Shopee),
        ("tokopedia", Marketplace::Tokopedia),
        ("alibaba", Marketplace::Alibaba),
        ("1688", Marketplace::Alibaba1688),
        ("aliexpress", Marketplace::AliExpress),
    ];

    /// Classifies a URL (or hostname) by the first marketplace name it contains.
    pub fn infer(url: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|(needle, _)| url.contains(needle))
            .map(|(_, market)| *market)
            .unwrap_or(Marketplace::Other)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Marketplace::Shopee => "Shopee",
            Marketplace::Tokopedia => "Tokopedia",
            Marketplace::Alibaba => "Alibaba",
            Marketplace::Alibaba1688 => "1688",
            Marketplace::AliExpress => "AliExpress",
            Marketplace::Other => "Marketplace",
        }
    }
}

/// What the scrape endpoint hands back to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub title: String,
    pub image: String,
    pub price: u64,
    pub source: Marketplace,
    pub currency: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub niche: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Connection {
    pub page_id: String,
    pub page_name: String,
    pub ig_user_id: Option<String>,
    pub page_access_token: String,
    pub scopes_granted: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn is_complete(&self) -> bool {
        !self.page_id.is_empty() && !self.page_name.is_empty() && !self.page_access_token.is_empty()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("page_id", &self.page_id)
            .field("page_name", &self.page_name)
            .field("ig_user_id", &self.ig_user_id)
            .field("page_access_token", &"<redacted>")
            .field("scopes_granted", &self.scopes_granted)
            .field("expires_at", &self.expires_at)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub facebook: FacebookStatus,
    pub instagram: InstagramStatus,
    pub auth: AuthStatus,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacebookStatus {
    pub page_id: Option<String>,
    pub page_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstagramStatus {
    pub ig_user_id: Option<String>,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthStatus {
    pub scopes_ok: bool,
    pub token_expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub oauth_url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AccountsResponse {
    #[serde(default)]
    pub data: Vec<PageAccount>,
}

#[derive(Debug, Deserialize)]
pub struct PageAccount {
    pub id: String,
    pub name: String,
    pub access_token: String,
    pub instagram_business_account: Option<LinkedAccount>,
}

#[derive(Debug, Deserialize)]
pub struct LinkedAccount {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct PermissionsResponse {
    #[serde(default)]
    pub data: Vec<PermissionGrant>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionGrant {
    pub permission: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct GraphErrorBody {
    pub error: Option<GraphErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct GraphErrorDetail {
    pub message: Option<String>,
}
