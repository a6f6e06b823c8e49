use crate::{calendar::Settings, error::Result};
use axum::{extract::rejection::JsonRejection, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

const PSYCHOLOGICAL_UNIT: f64 = 1000.0;
const PSYCHOLOGICAL_OFFSET: f64 = 900.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingInput {
    pub base_cost: f64,
    /// Percent of base cost.
    pub markup: f64,
    pub shipping: f64,
    pub platform_fee: f64,
    pub ads: f64,
    pub target_profit: f64,
    pub psychological_pricing: bool,
}

impl Default for PricingInput {
    fn default() -> Self {
        Self::from_settings(0.0, &Settings::default())
    }
}

impl PricingInput {
    pub fn from_settings(base_cost: f64, settings: &Settings) -> Self {
        Self {
            base_cost,
            markup: settings.markup,
            shipping: settings.shipping,
            platform_fee: settings.platform_fee,
            ads: settings.ads,
            target_profit: settings.target_profit,
            psychological_pricing: settings.psychological_pricing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub margin: f64,
    pub raw_price: f64,
    pub final_price: f64,
    pub profit: f64,
    pub break_even_units: u64,
}

pub fn quote(input: &PricingInput) -> PriceQuote {
    let margin = input.base_cost * input.markup / 100.0;
    let costs = input.shipping + input.platform_fee + input.ads;
    let raw_price = input.base_cost + margin + costs;
    let final_price = if input.psychological_pricing {
        psychological_price(raw_price)
    } else {
        raw_price
    };
    let profit = final_price - input.base_cost - costs;
    let break_even_units = if profit > 0.0 {
        (input.target_profit / profit).ceil().max(0.0) as u64
    } else {
        0
    };

    PriceQuote {
        margin,
        raw_price,
        final_price,
        profit,
        break_even_units,
    }
}

/// 150_000 -> 150_900, 149_999 -> 149_900. Small prices are left alone.
pub fn psychological_price(raw_price: f64) -> f64 {
    if raw_price <= PSYCHOLOGICAL_UNIT {
        return raw_price;
    }
    (raw_price / PSYCHOLOGICAL_UNIT).floor() * PSYCHOLOGICAL_UNIT + PSYCHOLOGICAL_OFFSET
}

// POST /api/pricing
pub async fn quote_handler(
    payload: std::result::Result<Json<PricingInput>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(input) = payload?;
    Ok(Json(quote(&input)))
}
