//! Environment configuration.
//!
//! Values come from the process environment (a `.env` file is loaded by the
//! binary first). Missing or unparsable values fall back to defaults with a
//! log line rather than aborting startup.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

use crate::domain::aggregates::{CartPolicy, FulfillmentMethodId, DEFAULT_MAX_QUANTITY, LOW_STOCK_THRESHOLD};

#[derive(Clone, Debug)]
pub struct StorefrontConfig {
    pub port: u16,
    pub shop_api_url: String,
    pub storage_dir: PathBuf,
    /// `fulfillment-methods` for the light shop, `shipping-methods` for the gift shop.
    pub fee_table_path: String,
    pub low_stock_threshold: i64,
    pub cart: CartPolicy,
}

impl StorefrontConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let max_quantity = match try_load(&lookup, "MAX_QTY", DEFAULT_MAX_QUANTITY) {
            0 => {
                warn!("MAX_QTY must be at least 1, using default: {DEFAULT_MAX_QUANTITY}");
                DEFAULT_MAX_QUANTITY
            }
            max => max,
        };
        let default_fulfillment_method = lookup("DEFAULT_FULFILLMENT_METHOD")
            .and_then(|raw| raw.trim().parse::<u32>().map_err(|e| warn!("Invalid DEFAULT_FULFILLMENT_METHOD value: {e}")).ok())
            .map(FulfillmentMethodId);

        Self {
            port: try_load(&lookup, "PORT", 8083),
            shop_api_url: lookup("SHOP_API_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            storage_dir: lookup("CART_STORAGE_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".storefront")),
            fee_table_path: lookup("FEE_TABLE_PATH").unwrap_or_else(|| "fulfillment-methods".to_string()),
            low_stock_threshold: try_load(&lookup, "LOW_STOCK_THRESHOLD", LOW_STOCK_THRESHOLD),
            cart: CartPolicy {
                max_quantity,
                supports_fulfillment_method: boolean(lookup("SUPPORTS_FULFILLMENT_METHOD"), true),
                supports_coupon: boolean(lookup("SUPPORTS_COUPON"), true),
                default_fulfillment_method,
            },
        }
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };
    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value: {e}, using default: {default}");
        default
    })
}

/// Only a case-insensitive `"true"` enables a flag once it is set at all.
fn boolean(raw: Option<String>, default: bool) -> bool {
    match raw {
        Some(value) => value.trim().eq_ignore_ascii_case("true"),
        None => default,
    }
}
