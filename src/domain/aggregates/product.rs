//! Catalog Aggregate
//!
//! Read-only shapes returned by the shop API. Prices arrive as strings and are
//! parsed into [`Money`] while deserializing, so nothing downstream ever sees
//! a float.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::domain::aggregates::cart::{FulfillmentMethodId, LineItem, Selection};
use crate::domain::value_objects::{ItemId, Money, Quantity};

/// Counts below this (and above zero) are flagged as running low.
pub const LOW_STOCK_THRESHOLD: i64 = 5;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Light {
    pub id: u64,
    pub image_url: String,
    pub video_url: Option<String>,
    pub internal_name: String,
    pub display_name: String,
    pub power_type: String,
    pub price_tag: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LightVariant {
    pub id: u64,
    pub light_id: u64,
    pub dimension_id: String,
    pub color: String,
    pub image_url: String,
    pub dimension_str: String,
    #[serde(default)]
    pub descriptions: Vec<String>,
    pub price: Money,
    pub stock: i64,
}

impl LightVariant {
    /// Captures the current price into a cart line; it is never re-fetched.
    pub fn to_line_item(&self, display_name: &str, quantity: Quantity) -> LineItem {
        LineItem {
            item_id: ItemId::prefixed("light", self.id),
            image_url: self.image_url.clone(),
            name: display_name.to_string(),
            dimension: Some(self.dimension_str.clone()),
            unit_price: self.price,
            quantity,
            selection: Selection::LightVariant { light_variant_id: self.id },
        }
    }

    pub fn stock_status(&self, threshold: i64) -> Option<StockStatus> { StockStatus::from_count(self.stock, threshold) }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LightAndVariants {
    pub light_power_type: String,
    pub light_display_name: String,
    pub light_video_url: Option<String>,
    pub light_dimension_type_str: String,
    pub default_light_variant: LightVariant,
    #[serde(default)]
    pub colors_mapping: HashMap<String, u32>,
    #[serde(default)]
    pub dimensions_mapping: HashMap<String, String>,
    #[serde(default)]
    pub color_dimension_to_light_variant_mapping: HashMap<String, LightVariant>,
    #[serde(default)]
    pub default_dimension_to_light_variant_mapping: HashMap<String, LightVariant>,
}

impl LightAndVariants {
    /// Variant for a colour/dimension pick, falling back to the dimension's default.
    pub fn variant_for(&self, color: Option<&str>, dimension_id: &str) -> Option<&LightVariant> {
        color
            .and_then(|c| self.color_dimension_to_light_variant_mapping.get(&format!("{c}{dimension_id}")))
            .or_else(|| self.default_dimension_to_light_variant_mapping.get(dimension_id))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preselection {
    pub id: u64,
    pub image_url: String,
    pub video_url: Option<String>,
    pub name: String,
    pub gender: String,
    pub description: String,
    pub price: Money,
    pub bag_id: u64,
    #[serde(default)]
    pub item_ids: Vec<u64>,
}

impl Preselection {
    pub fn to_line_item(&self, quantity: Quantity) -> LineItem {
        LineItem {
            item_id: ItemId::prefixed("preselection", self.id),
            image_url: self.image_url.clone(),
            name: self.name.clone(),
            dimension: None,
            unit_price: self.price,
            quantity,
            selection: Selection::Preselection { preselection_id: self.id },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentMethod {
    pub id: u32,
    pub name: String,
    pub fee: Money,
    pub discount_fee: Money,
}

/// Fee table. The light shop calls the list `fulfillmentMethods`, the gift
/// shop `shippingMethods`; both read into the same model.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentMethodInfo {
    #[serde(alias = "shippingMethods")]
    pub fulfillment_methods: Vec<FulfillmentMethod>,
    pub free_shipping_threshold: Money,
}

impl FulfillmentMethodInfo {
    pub fn method(&self, id: FulfillmentMethodId) -> Option<&FulfillmentMethod> {
        self.fulfillment_methods.iter().find(|m| m.id == id.0)
    }

    /// Discounted fee once the goods subtotal (before coupons) reaches the
    /// free shipping threshold, the full fee otherwise.
    pub fn shipping_fee(&self, id: FulfillmentMethodId, subtotal: Money) -> Option<Money> {
        let method = self.method(id)?;
        Some(if subtotal >= self.free_shipping_threshold { method.discount_fee } else { method.fee })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StockStatus { OutOfStock, LowInStock }

impl StockStatus {
    pub fn from_count(count: i64, threshold: i64) -> Option<Self> {
        if count < 1 { Some(Self::OutOfStock) }
        else if count < threshold { Some(Self::LowInStock) }
        else { None }
    }
}

/// Stock counts per category (`light`, `bag`, `item`) and id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Inventory(HashMap<String, HashMap<String, i64>>);

impl Inventory {
    pub fn count(&self, category: &str, id: u64) -> Option<i64> {
        self.0.get(category)?.get(&id.to_string()).copied()
    }

    /// Unknown ids count as out of stock.
    pub fn stock_status(&self, category: &str, id: u64, threshold: i64) -> Option<StockStatus> {
        StockStatus::from_count(self.count(category, id).unwrap_or(0), threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_stock_status_boundaries() {
        assert_eq!(StockStatus::from_count(5, LOW_STOCK_THRESHOLD), None);
        assert_eq!(StockStatus::from_count(4, LOW_STOCK_THRESHOLD), Some(StockStatus::LowInStock));
        assert_eq!(StockStatus::from_count(1, LOW_STOCK_THRESHOLD), Some(StockStatus::LowInStock));
        assert_eq!(StockStatus::from_count(0, LOW_STOCK_THRESHOLD), Some(StockStatus::OutOfStock));
    }

    #[test]
    fn test_inventory_lookup() {
        let inventory: Inventory = serde_json::from_str(r#"{"light": {"3": 12, "4": 2}, "bag": {"1": 0}}"#).unwrap();
        assert_eq!(inventory.stock_status("light", 3, LOW_STOCK_THRESHOLD), None);
        assert_eq!(inventory.stock_status("light", 4, LOW_STOCK_THRESHOLD), Some(StockStatus::LowInStock));
        assert_eq!(inventory.stock_status("bag", 1, LOW_STOCK_THRESHOLD), Some(StockStatus::OutOfStock));
        assert_eq!(inventory.stock_status("item", 9, LOW_STOCK_THRESHOLD), Some(StockStatus::OutOfStock));
    }

    #[test]
    fn test_fee_table_accepts_both_shop_shapes() {
        let lights = r#"{"fulfillmentMethods":[{"id":0,"name":"Pickup","fee":"0.00","discountFee":"0.00"},{"id":1,"name":"Standard","fee":"14.95","discountFee":"0.00"}],"freeShippingThreshold":"150.00"}"#;
        let gifts = r#"{"shippingMethods":[{"id":1,"name":"Standard","fee":"9.95","discountFee":"4.95"}],"freeShippingThreshold":"80"}"#;
        let lights: FulfillmentMethodInfo = serde_json::from_str(lights).unwrap();
        let gifts: FulfillmentMethodInfo = serde_json::from_str(gifts).unwrap();
        assert_eq!(lights.fulfillment_methods.len(), 2);
        assert_eq!(gifts.method(FulfillmentMethodId(1)).unwrap().fee.amount(), Decimal::new(995, 2));
    }

    #[test]
    fn test_shipping_fee_uses_threshold() {
        let info: FulfillmentMethodInfo = serde_json::from_str(
            r#"{"fulfillmentMethods":[{"id":1,"name":"Standard","fee":"14.95","discountFee":"0.00"}],"freeShippingThreshold":"150.00"}"#,
        ).unwrap();
        let standard = FulfillmentMethodId::POST_STANDARD;
        assert_eq!(info.shipping_fee(standard, Money::parse("149.99").unwrap()), Some(Money::parse("14.95").unwrap()));
        assert_eq!(info.shipping_fee(standard, Money::parse("150.00").unwrap()), Some(Money::ZERO));
        assert_eq!(info.shipping_fee(FulfillmentMethodId::POST_EXPRESS, Money::ZERO), None);
    }

    #[test]
    fn test_variant_price_must_be_a_string() {
        let ok = r#"{"id":42,"lightId":3,"dimensionId":"M","color":"warm","imageUrl":"i","dimensionStr":"20cm","price":"49.95","stock":3}"#;
        let bad = ok.replace("\"49.95\"", "49.95");
        let variant: LightVariant = serde_json::from_str(ok).unwrap();
        assert!(serde_json::from_str::<LightVariant>(&bad).is_err());

        let line = variant.to_line_item("Moon Lamp", Quantity::new(2).unwrap());
        assert_eq!(line.item_id.as_str(), "light42");
        assert_eq!(line.line_total().unwrap().amount(), Decimal::new(9990, 2));
        assert_eq!(variant.stock_status(LOW_STOCK_THRESHOLD), Some(StockStatus::LowInStock));
    }

    #[test]
    fn test_preselection_line_item() {
        let raw = r#"{"id":5,"imageUrl":"i","videoUrl":null,"name":"For Her","gender":"F","description":"d","price":"89.00","bagId":2,"itemIds":[1,2]}"#;
        let preselection: Preselection = serde_json::from_str(raw).unwrap();
        let line = preselection.to_line_item(Quantity::ONE);
        assert_eq!(line.item_id.as_str(), "preselection5");
        assert_eq!(line.selection, Selection::Preselection { preselection_id: 5 });
    }
}
