use crate::{error::Result, extract::merge_hashtags};
use axum::{extract::rejection::JsonRejection, response::IntoResponse, Json};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const BASE_HASHTAGS: [&str; 4] = ["reseller", "importir", "umkm", "jualanonline"];
const TRAILING_HASHTAG: &str = "produkhits";

static HASHTAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#[\p{L}\p{N}_]+").unwrap());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Friendly,
    Urgent,
    Premium,
}

struct ToneStyle {
    emoji: &'static str,
    opener: &'static str,
    cta: &'static str,
}

impl Tone {
    fn style(self) -> ToneStyle {
        match self {
            Tone::Friendly => ToneStyle {
                emoji: "✨🔥",
                opener: "Siap bikin etalase toko kamu makin standout!",
                cta: "Klik link bio / DM sekarang, stok terbatas!",
            },
            Tone::Urgent => ToneStyle {
                emoji: "⚡📦",
                opener: "Flash deal import hari ini, jangan sampai kehabisan!",
                cta: "Amankan slot order kamu sekarang juga via DM!",
            },
            Tone::Premium => ToneStyle {
                emoji: "💎🖤",
                opener: "Pilihan premium untuk pelanggan yang mencari kualitas terbaik.",
                cta: "DM untuk order eksklusif & harga reseller spesial.",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionTemplate {
    #[default]
    Softsell,
    Hardsell,
    Storytelling,
}

impl CaptionTemplate {
    fn wrap(self, text: String) -> String {
        match self {
            CaptionTemplate::Softsell => text,
            CaptionTemplate::Hardsell => {
                format!("🚨 PROMO TERBATAS 🚨\n{}\n\n#buruancheckout", text)
            }
            CaptionTemplate::Storytelling => format!(
                "Awalnya banyak reseller bingung cari produk yang repeat order.\n\n{}\n\nYuk jadikan produk ini andalan etalase kamu.",
                text
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptionRequest {
    pub niche: String,
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub template: CaptionTemplate,
    #[serde(default)]
    pub extra_hashtags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionResponse {
    pub caption: String,
    pub hashtag_count: usize,
}

pub fn build_caption(request: &CaptionRequest) -> String {
    let mut tags = Vec::new();
    merge_hashtags(
        &mut tags,
        BASE_HASHTAGS
            .into_iter()
            .chain([request.niche.as_str(), TRAILING_HASHTAG])
            .chain(request.extra_hashtags.iter().map(String::as_str)),
    );
    let hashtags = tags
        .iter()
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ");

    let style = request.tone.style();
    let body = format!(
        "{emoji} {title}\n\n{opener}\nHarga rekomendasi jual mulai {price}.\n\n\
         ✅ Siap dijual ulang\n✅ Support dropship/reseller\n✅ Cocok untuk UMKM yang ingin scale-up\n\n\
         {cta}\n\n{hashtags}",
        emoji = style.emoji,
        title = request.title,
        opener = style.opener,
        price = format_idr(request.price),
        cta = style.cta,
        hashtags = hashtags,
    );

    request.template.wrap(body)
}

pub fn count_hashtags(caption: &str) -> usize {
    HASHTAG.find_iter(caption).count()
}

/// Rupiah without decimals, dot-grouped: `Rp 1.250.000`.
pub fn format_idr(amount: f64) -> String {
    let rounded = amount.round();
    let digits = (rounded.abs() as u64).to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{}Rp\u{a0}{}", sign, grouped)
}

// POST /api/caption
pub async fn caption_handler(
    payload: std::result::Result<Json<CaptionRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload?;
    let caption = build_caption(&request);
    let hashtag_count = count_hashtags(&caption);
    Ok(Json(CaptionResponse {
        caption,
        hashtag_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CaptionRequest {
        CaptionRequest {
            niche: "Fashion Wanita".into(),
            title: "Tas Selempang Kulit".into(),
            price: 150_900.0,
            tone: Tone::Friendly,
            template: CaptionTemplate::Softsell,
            extra_hashtags: vec!["Tas Wanita".into(), "#reseller".into(), "  ".into()],
        }
    }

    #[test]
    fn formats_rupiah() {
        assert_eq!(format_idr(150_900.0), "Rp\u{a0}150.900");
        assert_eq!(format_idr(999.0), "Rp\u{a0}999");
        assert_eq!(format_idr(1_250_000.4), "Rp\u{a0}1.250.000");
        assert_eq!(format_idr(-5_000.0), "-Rp\u{a0}5.000");
        assert_eq!(format_idr(0.0), "Rp\u{a0}0");
    }

    #[test]
    fn softsell_caption_layout() {
        let caption = build_caption(&request());
        assert!(caption.starts_with("✨🔥 Tas Selempang Kulit\n\nSiap bikin etalase"));
        assert!(caption.contains("Harga rekomendasi jual mulai Rp\u{a0}150.900."));
        assert!(caption.ends_with(
            "#reseller #importir #umkm #jualanonline #fashionwanita #produkhits #taswanita"
        ));
    }

    #[test]
    fn templates_wrap_the_body() {
        let hard = build_caption(&CaptionRequest {
            template: CaptionTemplate::Hardsell,
            ..request()
        });
        assert!(hard.starts_with("🚨 PROMO TERBATAS 🚨\n✨🔥"));
        assert!(hard.ends_with("\n\n#buruancheckout"));

        let story = build_caption(&CaptionRequest {
            template: CaptionTemplate::Storytelling,
            tone: Tone::Premium,
            ..request()
        });
        assert!(story.starts_with("Awalnya banyak reseller"));
        assert!(story.contains("💎🖤 Tas Selempang Kulit"));
        assert!(story.ends_with("andalan etalase kamu."));
    }

    #[test]
    fn counts_hashtags() {
        let caption = build_caption(&request());
        assert_eq!(count_hashtags(&caption), 7);

        let hard = build_caption(&CaptionRequest {
            template: CaptionTemplate::Hardsell,
            ..request()
        });
        assert_eq!(count_hashtags(&hard), 8);
    }

    #[test]
    fn tone_and_template_parse_lowercase() {
        let request: CaptionRequest = serde_json::from_str(
            r#"{"niche":"Gadget","title":"Charger","price":50000,"tone":"urgent","template":"hardsell"}"#,
        )
        .unwrap();
        assert_eq!(request.tone, Tone::Urgent);
        assert_eq!(request.template, CaptionTemplate::Hardsell);
        assert!(request.extra_hashtags.is_empty());
    }
}
