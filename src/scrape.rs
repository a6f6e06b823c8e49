use crate::{
    error::{AppError, Result},
    extract::{extract, NicheRules},
    types::{Marketplace, ProductMetadata},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
pub struct GrabRequest {
    pub url: Option<String>,
}

/// Checks a user supplied product link. Runs before any network traffic.
pub fn validate_product_url(raw: Option<&str>) -> Result<Url> {
    let raw = raw
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| AppError::BadRequest("URL must not be empty".into()))?;

    let url =
        Url::parse(raw).map_err(|_| AppError::BadRequest("URL format is invalid".into()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::BadRequest("URL protocol is not supported".into()));
    }

    let hostname = url.host_str().unwrap_or_default().to_lowercase();
    if !Marketplace::KNOWN
        .iter()
        .any(|(needle, _)| hostname.contains(needle))
    {
        return Err(AppError::BadRequest(
            "Marketplace domain is not supported yet".into(),
        ));
    }

    Ok(url)
}

/// Fetches a product page and extracts its metadata. Never fails: anything
/// that goes wrong upstream yields the fallback record for this URL.
pub async fn fetch_product(
    client: &reqwest::Client,
    url: &Url,
    timeout: Duration,
    niches: &NicheRules,
) -> ProductMetadata {
    let response = client
        .get(url.clone())
        .header(header::USER_AGENT, BROWSER_USER_AGENT)
        .timeout(timeout)
        .send()
        .await;

    let response = match response {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!("Product page {} answered {}", url, response.status());
            return ProductMetadata::fallback(url.as_str(), niches);
        }
        Err(e) => {
            warn!("Product page fetch failed for {}: {}", url, e);
            return ProductMetadata::fallback(url.as_str(), niches);
        }
    };

    match response.text().await {
        Ok(html) => {
            debug!("Fetched {} bytes from {}", html.len(), url);
            ProductMetadata::from_page(extract(&html), url.as_str(), niches)
        }
        Err(e) => {
            warn!("Reading product page {} failed: {}", url, e);
            ProductMetadata::fallback(url.as_str(), niches)
        }
    }
}

pub async fn grab(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GrabRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let url = match payload {
        Ok(Json(request)) => validate_product_url(request.url.as_deref())?,
        Err(rejection) => {
            debug!("Rejected grab body: {}", rejection);
            return Err(AppError::BadRequest("URL must not be empty".into()));
        }
    };

    info!("Grabbing product metadata from {}", url);
    let product = fetch_product(
        &state.http_client,
        &url,
        state.config.scrape_timeout,
        &state.niches,
    )
    .await;

    Ok(Json(product))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{DEFAULT_PRICE, FALLBACK_TITLE};
    use wiremock::{
        matchers::{header as header_matcher, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn bad_request_message(result: Result<Url>) -> String {
        match result {
            Err(AppError::BadRequest(message)) => message,
            other => panic!("expected bad request, got {:?}", other),
        }
    }

    #[test]
    fn accepts_known_marketplaces() {
        for raw in [
            "https://shopee.co.id/Tas-i.1.2",
            "http://www.tokopedia.com/toko/produk",
            "https://www.alibaba.com/product-detail/x.html",
            "https://detail.1688.com/offer/1.html",
            "https://ID.AliExpress.com/item/1.html",
        ] {
            assert!(validate_product_url(Some(raw)).is_ok(), "{}", raw);
        }
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(bad_request_message(validate_product_url(None)), "URL must not be empty");
        assert_eq!(
            bad_request_message(validate_product_url(Some("   "))),
            "URL must not be empty"
        );
        assert_eq!(
            bad_request_message(validate_product_url(Some("shopee"))),
            "URL format is invalid"
        );
        assert_eq!(
            bad_request_message(validate_product_url(Some("ftp://shopee.co.id/x"))),
            "URL protocol is not supported"
        );
        assert_eq!(
            bad_request_message(validate_product_url(Some("https://example.com/shopee"))),
            "Marketplace domain is not supported yet"
        );
    }

    #[tokio::test]
    async fn extracts_fetched_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/produk"))
            .and(header_matcher("user-agent", BROWSER_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head>
                    <meta property="og:title" content="Serum Wajah Glowing">
                    <meta property="product:price:amount" content="35000">
                    <meta property="og:image" content="https://cdn.example/serum.jpg">
                </head></html>"#,
            ))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/produk", server.uri())).unwrap();
        let product = fetch_product(
            &reqwest::Client::new(),
            &url,
            Duration::from_secs(5),
            &NicheRules::default(),
        )
        .await;

        assert_eq!(product.title, "Serum Wajah Glowing");
        assert_eq!(product.price, 35000);
        assert_eq!(product.image, "https://cdn.example/serum.jpg");
        assert_eq!(product.niche.as_deref(), Some("Beauty"));
        assert_eq!(product.source, Marketplace::Other);
    }

    #[tokio::test]
    async fn upstream_error_status_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/p", server.uri())).unwrap();
        let product = fetch_product(
            &reqwest::Client::new(),
            &url,
            Duration::from_secs(5),
            &NicheRules::default(),
        )
        .await;

        assert_eq!(product.title, FALLBACK_TITLE);
        assert_eq!(product.price, DEFAULT_PRICE);
    }

    #[tokio::test]
    async fn timeout_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<title>too late</title>")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let product = fetch_product(
            &reqwest::Client::new(),
            &url,
            Duration::from_millis(100),
            &NicheRules::default(),
        )
        .await;

        assert_eq!(product.title, FALLBACK_TITLE);
    }

    #[tokio::test]
    async fn connection_refused_falls_back() {
        // Port 9 (discard) on localhost is essentially never listening
        let url = Url::parse("http://127.0.0.1:9/shopee").unwrap();
        let product = fetch_product(
            &reqwest::Client::new(),
            &url,
            Duration::from_secs(2),
            &NicheRules::default(),
        )
        .await;

        assert_eq!(product.title, FALLBACK_TITLE);
        assert_eq!(product.source, Marketplace::Shopee);
    }
}
