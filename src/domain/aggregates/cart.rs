//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::{DiscountPercentage, ItemId, Money, Quantity};

/// Highest quantity reachable through `increase_quantity`, and the most a
/// single add may carry.
pub const DEFAULT_MAX_QUANTITY: u32 = 10;

/// Shop-specific knobs. Both storefronts share this one model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartPolicy {
    pub max_quantity: u32,
    pub supports_fulfillment_method: bool,
    pub supports_coupon: bool,
    pub default_fulfillment_method: Option<FulfillmentMethodId>,
}

impl Default for CartPolicy {
    fn default() -> Self {
        Self {
            max_quantity: DEFAULT_MAX_QUANTITY,
            supports_fulfillment_method: true,
            supports_coupon: true,
            default_fulfillment_method: None,
        }
    }
}

/// What the shopper picked; only read back when building an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    LightVariant {
        #[serde(rename = "lightVariantId")]
        light_variant_id: u64,
    },
    Preselection {
        #[serde(rename = "preselectionId")]
        preselection_id: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub item_id: ItemId,
    pub image_url: String,
    pub name: String,
    #[serde(rename = "dimensionStr", default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    #[serde(rename = "price")]
    pub unit_price: Money,
    pub quantity: Quantity,
    pub selection: Selection,
}

impl LineItem {
    /// `None` when the total does not fit in a `Money`.
    pub fn line_total(&self) -> Option<Money> { self.unit_price.checked_multiply(self.quantity.value()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FulfillmentMethodId(pub u32);

impl FulfillmentMethodId {
    pub const PICKUP: FulfillmentMethodId = FulfillmentMethodId(0);
    pub const POST_STANDARD: FulfillmentMethodId = FulfillmentMethodId(1);
    pub const POST_EXPRESS: FulfillmentMethodId = FulfillmentMethodId(2);

    pub fn is_pickup(&self) -> bool { *self == Self::PICKUP }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    #[serde(rename = "couponCode")]
    pub code: String,
    pub is_valid: bool,
    pub discount_percentage: DiscountPercentage,
}

#[derive(Clone, Debug)]
pub struct Cart {
    policy: CartPolicy,
    items: Vec<LineItem>,
    fulfillment_method: Option<FulfillmentMethodId>,
    coupon: Option<Coupon>,
    subtotal: Money,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

/// Why a cart mutation was refused. The cart is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    QuantityAboveMax { quantity: u32, max: u32 },
    Unpriceable,
}

impl std::error::Error for CartError {}

impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuantityAboveMax { quantity, max } => write!(f, "quantity {quantity} exceeds the maximum of {max}"),
            Self::Unpriceable => write!(f, "cart total is too large to represent"),
        }
    }
}

impl Cart {
    pub fn new(policy: CartPolicy) -> Self {
        let fulfillment_method = policy.default_fulfillment_method;
        Self { policy, items: vec![], fulfillment_method, coupon: None, subtotal: Money::ZERO, updated_at: Utc::now(), events: vec![] }
    }

    /// Rebuilds an empty cart with its persisted fulfillment method and coupon.
    pub fn restore(policy: CartPolicy, fulfillment_method: Option<FulfillmentMethodId>, coupon: Option<Coupon>) -> Self {
        let mut cart = Self::new(policy);
        if fulfillment_method.is_some() { cart.fulfillment_method = fulfillment_method; }
        cart.coupon = coupon;
        cart
    }

    /// Loads persisted lines. Duplicate keys are merged so the
    /// one-entry-per-item rule holds even for hand-edited storage; a set of
    /// lines whose total cannot be represented is rejected whole.
    pub fn restore_items(&mut self, items: Vec<LineItem>) -> Result<(), CartError> {
        let mut merged = Vec::with_capacity(items.len());
        for item in items { merge_into(&mut merged, item); }
        self.subtotal = price(&merged).ok_or(CartError::Unpriceable)?;
        self.items = merged;
        Ok(())
    }

    pub fn policy(&self) -> &CartPolicy { &self.policy }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn item(&self, item_id: &str) -> Option<&LineItem> { self.items.iter().find(|i| i.item_id.as_str() == item_id) }
    pub fn fulfillment_method(&self) -> Option<FulfillmentMethodId> { self.fulfillment_method }
    pub fn coupon(&self) -> Option<&Coupon> { self.coupon.as_ref() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn unit_count(&self) -> u64 { self.items.iter().map(|i| u64::from(i.quantity.value())).sum() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Merges into an existing entry by adding quantities. A single add may
    /// carry at most `max_quantity`, but the merged sum is not clamped; only
    /// increase/decrease enforce the bound on an existing line.
    pub fn add_item(&mut self, item: LineItem) -> Result<(), CartError> {
        let max = self.policy.max_quantity;
        if item.quantity.value() > max {
            return Err(CartError::QuantityAboveMax { quantity: item.quantity.value(), max });
        }
        let mut items = self.items.clone();
        let event = CartEvent::ItemAdded { item_id: item.item_id.clone(), quantity: item.quantity.value() };
        merge_into(&mut items, item);
        self.subtotal = price(&items).ok_or(CartError::Unpriceable)?;
        self.items = items;
        self.raise_event(DomainEvent::Cart(event));
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: &str) -> bool {
        let Some(pos) = self.items.iter().position(|i| i.item_id.as_str() == item_id) else { return false };
        let removed = self.items.remove(pos);
        self.reprice();
        self.raise_event(DomainEvent::Cart(CartEvent::ItemRemoved { item_id: removed.item_id }));
        self.touch();
        true
    }

    /// Takes the quantities of an accepted order out of the cart. Lines added
    /// or raised after the order was built keep the difference; a cart left
    /// empty is reset like `clear`.
    pub fn remove_ordered(&mut self, ordered: &[LineItem]) {
        for line in ordered {
            let Some(pos) = self.items.iter().position(|i| i.item_id == line.item_id) else { continue };
            let left = self.items[pos].quantity.value().checked_sub(line.quantity.value()).and_then(|q| Quantity::new(q).ok());
            match left {
                Some(quantity) => {
                    self.items[pos].quantity = quantity;
                    let event = CartEvent::QuantityChanged { item_id: line.item_id.clone(), quantity: quantity.value() };
                    self.raise_event(DomainEvent::Cart(event));
                }
                None => {
                    let removed = self.items.remove(pos);
                    self.raise_event(DomainEvent::Cart(CartEvent::ItemRemoved { item_id: removed.item_id }));
                }
            }
        }
        if self.items.is_empty() {
            self.clear();
        } else {
            self.reprice();
            self.touch();
        }
    }

    pub fn increase_quantity(&mut self, item_id: &str) -> bool {
        let max = self.policy.max_quantity;
        self.change_quantity(item_id, |q| q.increment(max))
    }

    /// Never drops below one; removal goes through `remove_item`.
    pub fn decrease_quantity(&mut self, item_id: &str) -> bool {
        self.change_quantity(item_id, |q| q.decrement())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.subtotal = Money::ZERO;
        self.fulfillment_method = self.policy.default_fulfillment_method;
        self.coupon = None;
        self.raise_event(DomainEvent::Cart(CartEvent::Cleared));
        self.touch();
    }

    pub fn set_fulfillment_method(&mut self, method: Option<FulfillmentMethodId>) -> bool {
        if !self.policy.supports_fulfillment_method { return false; }
        self.fulfillment_method = method;
        self.raise_event(DomainEvent::Cart(CartEvent::FulfillmentMethodChanged { method_id: method.map(|m| m.0) }));
        self.touch();
        true
    }

    pub fn set_coupon(&mut self, coupon: Option<Coupon>) -> bool {
        if !self.policy.supports_coupon { return false; }
        self.raise_event(DomainEvent::Cart(CartEvent::CouponChanged { code: coupon.as_ref().map(|c| c.code.clone()) }));
        self.coupon = coupon;
        self.touch();
        true
    }

    /// Coupon that actually discounts: present, valid, and allowed by policy.
    pub fn active_coupon(&self) -> Option<&Coupon> {
        self.coupon.as_ref().filter(|c| self.policy.supports_coupon && c.is_valid)
    }

    pub fn subtotal(&self) -> Money { self.subtotal }

    pub fn discounted_subtotal(&self) -> Money {
        let subtotal = self.subtotal();
        match self.active_coupon() {
            Some(coupon) => subtotal.discounted(coupon.discount_percentage),
            None => subtotal,
        }
    }

    /// Goods after discount plus shipping. Discounts never touch the fee.
    pub fn total(&self, shipping_fee: Option<Money>) -> Money {
        self.discounted_subtotal().saturating_add(shipping_fee.unwrap_or(Money::ZERO))
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    fn change_quantity(&mut self, item_id: &str, step: impl FnOnce(Quantity) -> Option<Quantity>) -> bool {
        let Some(pos) = self.items.iter().position(|i| i.item_id.as_str() == item_id) else { return false };
        let Some(quantity) = step(self.items[pos].quantity) else { return false };
        let mut items = self.items.clone();
        items[pos].quantity = quantity;
        let Some(subtotal) = price(&items) else { return false };
        let event = CartEvent::QuantityChanged { item_id: items[pos].item_id.clone(), quantity: quantity.value() };
        self.items = items;
        self.subtotal = subtotal;
        self.raise_event(DomainEvent::Cart(event));
        self.touch();
        true
    }

    /// Removing lines or units only lowers the total, so it always fits.
    fn reprice(&mut self) {
        if let Some(subtotal) = price(&self.items) { self.subtotal = subtotal; }
    }

    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn merge_into(items: &mut Vec<LineItem>, item: LineItem) {
    if let Some(existing) = items.iter_mut().find(|i| i.item_id == item.item_id) {
        existing.quantity = existing.quantity.add(item.quantity);
    } else {
        items.push(item);
    }
}

fn price(items: &[LineItem]) -> Option<Money> {
    items.iter().try_fold(Money::ZERO, |acc, i| acc.checked_add(i.line_total()?))
}
