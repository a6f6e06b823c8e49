//! Product metadata extraction from raw marketplace HTML.
//!
//! This is pattern matching over meta tags and a few well-known fields, not an
//! HTML parser. Every lookup walks an ordered list of candidates and the first
//! non-empty hit wins, so the order of the key lists below matters.

use crate::types::{Marketplace, ProductMetadata, CURRENCY};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

pub const PLACEHOLDER_TITLE: &str = "Produk Marketplace";
pub const PLACEHOLDER_IMAGE: &str =
    "https://images.unsplash.com/photo-1556742031-c6961e8560b0?w=1200&q=80&auto=format&fit=crop";

pub const FALLBACK_TITLE: &str = "Produk Import Best Seller";
pub const FALLBACK_IMAGE: &str =
    "https://images.unsplash.com/photo-1523381210434-271e8be1f52b?w=1200&q=80&auto=format&fit=crop";

/// Substituted by the scrape endpoint when no price could be found.
pub const DEFAULT_PRICE: u64 = 120_000;

const MAX_HASHTAGS: usize = 10;
const MAX_TITLE_WORDS: usize = 4;
const MIN_TITLE_WORD_CHARS: usize = 4;
const FIXED_HASHTAGS: [&str; 4] = ["reseller", "jualanonline", "produkviral", "importir"];

/// A meta key compiled for both attribute orders.
struct MetaKey {
    property_first: Regex,
    content_first: Regex,
}

impl MetaKey {
    fn new(key: &str) -> Self {
        let key = regex::escape(key);
        let property_first = format!(
            r#"(?i)<meta[^>]+(?:property|name)=["']{}["'][^>]+content=["']([^"']+)["'][^>]*>"#,
            key
        );
        let content_first = format!(
            r#"(?i)<meta[^>]+content=["']([^"']+)["'][^>]+(?:property|name)=["']{}["'][^>]*>"#,
            key
        );

        Self {
            property_first: Regex::new(&property_first).expect("meta key pattern compiles"),
            content_first: Regex::new(&content_first).expect("meta key pattern compiles"),
        }
    }

    fn find(&self, html: &str) -> Option<String> {
        self.property_first
            .captures(html)
            .or_else(|| self.content_first.captures(html))
            .and_then(|caps| caps.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|value| !value.is_empty())
    }
}

static TITLE_KEYS: LazyLock<Vec<MetaKey>> =
    LazyLock::new(|| ["og:title", "twitter:title"].map(MetaKey::new).into());

static PRICE_KEYS: LazyLock<Vec<MetaKey>> = LazyLock::new(|| {
    ["product:price:amount", "og:price:amount"]
        .map(MetaKey::new)
        .into()
});

static IMAGE_KEYS: LazyLock<Vec<MetaKey>> =
    LazyLock::new(|| ["og:image", "twitter:image"].map(MetaKey::new).into());

static TITLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<title>([^<]+)</title>").unwrap());

static LD_JSON_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"price"\s*:\s*"?([\d.,]+)"?"#).unwrap());

/// Raw extractor output. `price == 0` means no usable price was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: String,
    pub image: String,
    pub price: u64,
}

pub fn extract(html: &str) -> PageMetadata {
    PageMetadata {
        title: parse_title(html),
        image: parse_image(html),
        price: parse_price(html),
    }
}

fn first_meta(html: &str, keys: &[MetaKey]) -> Option<String> {
    keys.iter().find_map(|key| key.find(html))
}

pub fn parse_title(html: &str) -> String {
    first_meta(html, &TITLE_KEYS)
        .or_else(|| {
            TITLE_TAG
                .captures(html)
                .and_then(|caps| caps.get(1))
                .map(|m| decode_entities(m.as_str().trim()))
                .filter(|title| !title.is_empty())
        })
        .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string())
}

pub fn parse_image(html: &str) -> String {
    first_meta(html, &IMAGE_KEYS).unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string())
}

pub fn parse_price(html: &str) -> u64 {
    let from_meta = first_meta(html, &PRICE_KEYS).and_then(|raw| {
        let numeric: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        positive_amount(&numeric)
    });

    from_meta
        .or_else(|| {
            let raw = LD_JSON_PRICE.captures(html)?.get(1)?.as_str().replace(',', "");
            positive_amount(&raw)
        })
        .unwrap_or(0)
}

fn positive_amount(raw: &str) -> Option<u64> {
    let value: f64 = raw.parse().ok()?;
    (value.is_finite() && value > 0.0).then(|| value.round() as u64)
}

pub fn decode_entities(input: &str) -> String {
    input
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// Keyword table for guessing a product niche from its title. The lists are
/// Indonesian marketplace vocabulary; swap the table, not the matcher.
#[derive(Debug, Clone)]
pub struct NicheRules {
    pub rules: Vec<NicheRule>,
    pub fallback: String,
}

#[derive(Debug, Clone)]
pub struct NicheRule {
    pub niche: String,
    pub keywords: Vec<String>,
}

impl NicheRule {
    fn new(niche: &str, keywords: &[&str]) -> Self {
        Self {
            niche: niche.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Default for NicheRules {
    fn default() -> Self {
        Self {
            rules: vec![
                NicheRule::new(
                    "Fashion",
                    &[
                        "hijab", "dress", "baju", "kaos", "jaket", "celana", "fashion", "tas",
                        "sepatu", "rok",
                    ],
                ),
                NicheRule::new(
                    "Beauty",
                    &[
                        "skincare", "serum", "masker", "kosmetik", "lipstik", "makeup", "sabun",
                        "parfum",
                    ],
                ),
                NicheRule::new(
                    "Home Living",
                    &[
                        "botol", "tumbler", "rak", "dapur", "organizer", "sprei", "bantal",
                        "karpet", "home",
                    ],
                ),
                NicheRule::new(
                    "Gadget",
                    &[
                        "lampu", "kabel", "charger", "headset", "earphone", "speaker",
                        "bluetooth", "smartwatch", "gadget",
                    ],
                ),
                NicheRule::new(
                    "Ibu & Anak",
                    &["bayi", "anak", "mainan", "stroller", "popok", "edukasi"],
                ),
            ],
            fallback: "Produk Viral".to_string(),
        }
    }
}

impl NicheRules {
    /// First rule with a keyword occurring anywhere in the title wins.
    pub fn classify(&self, title: &str) -> &str {
        let normalized = title.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| normalized.contains(k.as_str())))
            .map(|rule| rule.niche.as_str())
            .unwrap_or(&self.fallback)
    }
}

/// Lowercase, keep letters and digits only.
pub fn normalize_hashtag(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Pushes normalized tags into `out`, skipping empties and repeats.
pub fn merge_hashtags<'a>(out: &mut Vec<String>, tags: impl IntoIterator<Item = &'a str>) {
    let mut seen: HashSet<String> = out.iter().cloned().collect();
    for tag in tags {
        let tag = normalize_hashtag(tag);
        if !tag.is_empty() && seen.insert(tag.clone()) {
            out.push(tag);
        }
    }
}

pub fn build_hashtags(title: &str, niche: &str, source: Marketplace) -> Vec<String> {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let mut words: Vec<&str> = Vec::new();
    for word in cleaned.split_whitespace() {
        if words.len() == MAX_TITLE_WORDS {
            break;
        }
        if word.chars().count() >= MIN_TITLE_WORD_CHARS && !words.contains(&word) {
            words.push(word);
        }
    }

    let mut tags = Vec::new();
    merge_hashtags(
        &mut tags,
        FIXED_HASHTAGS
            .into_iter()
            .chain([niche, source.label()])
            .chain(words),
    );
    tags.truncate(MAX_HASHTAGS);
    tags
}

impl ProductMetadata {
    /// Builds the response for a page that was fetched and parsed.
    pub fn from_page(page: PageMetadata, url: &str, niches: &NicheRules) -> Self {
        let source = Marketplace::infer(url);
        let niche = niches.classify(&page.title).to_string();
        let hashtags = build_hashtags(&page.title, &niche, source);
        let price = if page.price == 0 {
            DEFAULT_PRICE
        } else {
            page.price
        };

        Self {
            title: page.title,
            image: page.image,
            price,
            source,
            currency: CURRENCY.to_string(),
            url: url.to_string(),
            niche: Some(niche),
            hashtags: Some(hashtags),
        }
    }

    /// The record served when the page could not be fetched at all.
    pub fn fallback(url: &str, niches: &NicheRules) -> Self {
        Self {
            title: FALLBACK_TITLE.to_string(),
            image: FALLBACK_IMAGE.to_string(),
            price: DEFAULT_PRICE,
            source: Marketplace::infer(url),
            currency: CURRENCY.to_string(),
            url: url.to_string(),
            niche: Some(niches.fallback.clone()),
            hashtags: Some(FIXED_HASHTAGS.iter().map(|t| t.to_string()).collect()),
        }
    }
}
