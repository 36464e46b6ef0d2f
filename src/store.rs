//! Cart store: the single source of truth handed to every consumer.
//!
//! Hydrates once from a [`KeyValueStore`] and writes the full cart back after
//! every mutation before returning. Storage is a best-effort cache: a failed
//! read starts an empty cart and a failed write is logged and dropped, while
//! the in-memory cart stays authoritative.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::aggregates::{Cart, CartError, CartPolicy, Coupon, FulfillmentMethodId, FulfillmentMethodInfo, LineItem};
use crate::domain::value_objects::Money;
use crate::storage::{KeyValueStore, StorageError};

pub const CART_KEY: &str = "cart";
pub const FULFILLMENT_METHOD_KEY: &str = "fulfillmentMethod";
pub const COUPON_KEY: &str = "coupon";

#[derive(Serialize, Deserialize)]
struct StoredFulfillmentMethod {
    id: u32,
}

#[derive(Debug)]
pub struct CartStore<S> {
    cart: Cart,
    storage: S,
}

impl<S: KeyValueStore> CartStore<S> {
    /// Reads each persisted entry independently; anything missing or
    /// malformed falls back to its default.
    pub fn open(storage: S, policy: CartPolicy) -> Self {
        let items: Vec<LineItem> = load(&storage, CART_KEY).unwrap_or_default();
        let fulfillment_method = policy
            .supports_fulfillment_method
            .then(|| load::<StoredFulfillmentMethod, _>(&storage, FULFILLMENT_METHOD_KEY))
            .flatten()
            .map(|m| FulfillmentMethodId(m.id));
        let coupon = policy
            .supports_coupon
            .then(|| load::<Option<Coupon>, _>(&storage, COUPON_KEY).flatten())
            .flatten();

        let mut cart = Cart::restore(policy, fulfillment_method, coupon);
        if let Err(e) = cart.restore_items(items) {
            warn!(key = CART_KEY, error = %e, "discarding persisted cart entry");
        }
        debug!(items = cart.item_count(), units = cart.unit_count(), "cart hydrated");
        Self { cart, storage }
    }

    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn storage(&self) -> &S { &self.storage }

    /// Rejected adds leave both the cart and storage untouched.
    pub fn add_item(&mut self, item: LineItem) -> Result<&Cart, CartError> {
        self.cart.add_item(item)?;
        Ok(self.persist())
    }

    pub fn remove_item(&mut self, item_id: &str) -> &Cart {
        self.cart.remove_item(item_id);
        self.persist()
    }

    pub fn increase_quantity(&mut self, item_id: &str) -> &Cart {
        self.cart.increase_quantity(item_id);
        self.persist()
    }

    pub fn decrease_quantity(&mut self, item_id: &str) -> &Cart {
        self.cart.decrease_quantity(item_id);
        self.persist()
    }

    pub fn clear_cart(&mut self) -> &Cart {
        self.cart.clear();
        self.persist()
    }

    pub fn set_fulfillment_method(&mut self, method: Option<FulfillmentMethodId>) -> &Cart {
        self.cart.set_fulfillment_method(method);
        self.persist()
    }

    pub fn set_coupon(&mut self, coupon: Option<Coupon>) -> &Cart {
        self.cart.set_coupon(coupon);
        self.persist()
    }

    /// Removes what an accepted order contained, keeping anything added since.
    pub fn complete_order(&mut self, ordered: &[LineItem]) -> &Cart {
        self.cart.remove_ordered(ordered);
        self.persist()
    }

    pub fn compute_subtotal(&self) -> Money { self.cart.subtotal() }

    pub fn compute_total(&self, shipping_fee: Option<Money>) -> Money { self.cart.total(shipping_fee) }

    /// Fee for the selected method against the current goods subtotal.
    pub fn shipping_fee(&self, info: &FulfillmentMethodInfo) -> Option<Money> {
        info.shipping_fee(self.cart.fulfillment_method()?, self.cart.subtotal())
    }

    fn persist(&mut self) -> &Cart {
        for event in self.cart.take_events() {
            debug!(?event, "cart changed");
        }

        let items = serde_json::to_string(self.cart.items());
        let fulfillment_method = self
            .cart
            .fulfillment_method()
            .map(|m| serde_json::to_string(&StoredFulfillmentMethod { id: m.0 }))
            .transpose();
        let coupon = self.cart.coupon().map(serde_json::to_string).transpose();

        match items {
            Ok(raw) => self.write(CART_KEY, Some(raw)),
            Err(e) => warn!(key = CART_KEY, error = %e, "cart entry not serializable"),
        }
        match fulfillment_method {
            Ok(raw) => self.write(FULFILLMENT_METHOD_KEY, raw),
            Err(e) => warn!(key = FULFILLMENT_METHOD_KEY, error = %e, "cart entry not serializable"),
        }
        match coupon {
            Ok(raw) => self.write(COUPON_KEY, raw),
            Err(e) => warn!(key = COUPON_KEY, error = %e, "cart entry not serializable"),
        }
        &self.cart
    }

    fn write(&self, key: &str, value: Option<String>) {
        let result: Result<(), StorageError> = match value {
            Some(raw) => self.storage.set(key, &raw),
            None => self.storage.remove(key),
        };
        if let Err(e) = result {
            warn!(key, error = %e, "cart write-through failed, keeping in-memory state");
        }
    }
}

fn load<T: DeserializeOwned, S: KeyValueStore + ?Sized>(storage: &S, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "cart storage unreadable, starting fresh");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "discarding malformed persisted cart entry");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Selection;
    use crate::domain::value_objects::{DiscountPercentage, ItemId, Quantity};
    use crate::storage::MemoryStore;
    use rust_decimal::Decimal;

    fn item(id: &str, price: &str, qty: u32) -> LineItem {
        LineItem {
            item_id: ItemId::new(id).unwrap(),
            image_url: format!("/img/{id}.png"),
            name: format!("Light {id}"),
            dimension: Some("30cm".into()),
            unit_price: Money::parse(price).unwrap(),
            quantity: Quantity::new(qty).unwrap(),
            selection: Selection::LightVariant { light_variant_id: 1 },
        }
    }

    fn ten_percent() -> Coupon {
        Coupon { code: "TEN".into(), is_valid: true, discount_percentage: DiscountPercentage::new(Decimal::new(10, 0)).unwrap() }
    }

    #[test]
    fn test_empty_storage_hydrates_empty_cart() {
        let store = CartStore::open(MemoryStore::new(), CartPolicy::default());
        assert!(store.cart().is_empty());
        assert!(store.cart().coupon().is_none());
    }

    #[test]
    fn test_writes_are_visible_before_return() {
        let backing = MemoryStore::new();
        let mut store = CartStore::open(backing.clone(), CartPolicy::default());
        store.add_item(item("A", "19.99", 1)).unwrap();
        let raw = backing.get(CART_KEY).unwrap().unwrap();
        assert!(raw.contains("\"price\":\"19.99\""));
    }

    #[test]
    fn test_price_survives_reload_exactly() {
        let backing = MemoryStore::new();
        let mut store = CartStore::open(backing.clone(), CartPolicy::default());
        store.add_item(item("A", "19.99", 1)).unwrap();

        let reloaded = CartStore::open(backing, CartPolicy::default());
        assert_eq!(reloaded.cart().item("A").unwrap().unit_price.amount(), Decimal::new(1999, 2));
    }

    #[test]
    fn test_removal_survives_reload() {
        let backing = MemoryStore::new();
        let mut store = CartStore::open(backing.clone(), CartPolicy::default());
        store.add_item(item("A", "1.00", 1)).unwrap();
        store.add_item(item("B", "2.00", 1)).unwrap();
        let cart = store.remove_item("A");
        assert_eq!(cart.item_count(), 1);

        let reloaded = CartStore::open(backing, CartPolicy::default());
        let ids: Vec<&str> = reloaded.cart().items().iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["B"]);
    }

    #[test]
    fn test_fulfillment_and_coupon_round_trip() {
        let backing = MemoryStore::new();
        let mut store = CartStore::open(backing.clone(), CartPolicy::default());
        store.set_fulfillment_method(Some(FulfillmentMethodId::POST_EXPRESS));
        store.set_coupon(Some(ten_percent()));
        assert_eq!(backing.get(FULFILLMENT_METHOD_KEY).unwrap().as_deref(), Some(r#"{"id":2}"#));

        let reloaded = CartStore::open(backing.clone(), CartPolicy::default());
        assert_eq!(reloaded.cart().fulfillment_method(), Some(FulfillmentMethodId::POST_EXPRESS));
        assert_eq!(reloaded.cart().coupon(), Some(&ten_percent()));
    }

    #[test]
    fn test_clear_twice_resets_storage() {
        let backing = MemoryStore::new();
        let mut store = CartStore::open(backing.clone(), CartPolicy::default());
        store.add_item(item("A", "1.00", 1)).unwrap();
        store.set_coupon(Some(ten_percent()));
        store.set_fulfillment_method(Some(FulfillmentMethodId::PICKUP));
        for _ in 0..2 {
            let cart = store.clear_cart();
            assert!(cart.is_empty());
            assert!(cart.coupon().is_none());
            assert!(cart.fulfillment_method().is_none());
            assert_eq!(backing.get(CART_KEY).unwrap().as_deref(), Some("[]"));
            assert_eq!(backing.get(COUPON_KEY).unwrap(), None);
            assert_eq!(backing.get(FULFILLMENT_METHOD_KEY).unwrap(), None);
        }
    }

    #[test]
    fn test_malformed_entries_are_ignored() {
        let backing = MemoryStore::new();
        backing.set(CART_KEY, r#"[{"itemId":"A","imageUrl":"i","name":"n","price":19.99,"quantity":1,"selection":{"lightVariantId":1}}]"#).unwrap();
        backing.set(COUPON_KEY, "{not json").unwrap();
        backing.set(FULFILLMENT_METHOD_KEY, r#"{"id":1}"#).unwrap();

        let store = CartStore::open(backing, CartPolicy::default());
        assert!(store.cart().is_empty());
        assert!(store.cart().coupon().is_none());
        assert_eq!(store.cart().fulfillment_method(), Some(FulfillmentMethodId::POST_STANDARD));
    }

    #[test]
    fn test_unpriceable_entry_hydrates_empty_cart() {
        let backing = MemoryStore::new();
        let line = |id: &str| format!(r#"{{"itemId":"{id}","imageUrl":"i","name":"n","price":"79228162514264337593543950335","quantity":2,"selection":{{"lightVariantId":1}}}}"#);
        backing.set(CART_KEY, &format!("[{}]", line("A"))).unwrap();
        backing.set(FULFILLMENT_METHOD_KEY, r#"{"id":1}"#).unwrap();

        let store = CartStore::open(backing, CartPolicy::default());
        assert!(store.cart().is_empty());
        assert_eq!(store.compute_subtotal(), Money::ZERO);
        assert_eq!(store.cart().fulfillment_method(), Some(FulfillmentMethodId::POST_STANDARD));
    }

    #[test]
    fn test_rejected_add_is_not_persisted() {
        let backing = MemoryStore::new();
        let mut store = CartStore::open(backing.clone(), CartPolicy::default());
        store.add_item(item("A", "1.00", 1)).unwrap();
        assert!(matches!(store.add_item(item("B", "1.00", u32::MAX)), Err(CartError::QuantityAboveMax { .. })));

        let reloaded = CartStore::open(backing, CartPolicy::default());
        assert_eq!(reloaded.cart().item_count(), 1);
        assert_eq!(reloaded.cart().unit_count(), 1);
    }

    #[test]
    fn test_complete_order_keeps_newer_lines() {
        let backing = MemoryStore::new();
        let mut store = CartStore::open(backing.clone(), CartPolicy::default());
        store.add_item(item("A", "1.00", 2)).unwrap();
        let ordered = store.cart().items().to_vec();
        store.add_item(item("B", "2.00", 1)).unwrap();

        store.complete_order(&ordered);
        let reloaded = CartStore::open(backing, CartPolicy::default());
        let ids: Vec<&str> = reloaded.cart().items().iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["B"]);
    }

    #[test]
    fn test_null_coupon_from_older_builds() {
        let backing = MemoryStore::new();
        backing.set(COUPON_KEY, "null").unwrap();
        let store = CartStore::open(backing, CartPolicy::default());
        assert!(store.cart().coupon().is_none());
    }

    #[test]
    fn test_write_failure_keeps_memory_state() {
        let mut store = CartStore::open(MemoryStore::with_quota(8), CartPolicy::default());
        let cart = store.add_item(item("A", "10.00", 2)).unwrap();
        assert_eq!(cart.item_count(), 1);
        store.increase_quantity("A");
        assert_eq!(store.cart().item("A").unwrap().quantity.value(), 3);
        assert_eq!(store.storage().get(CART_KEY).unwrap(), None);
    }

    #[test]
    fn test_totals() {
        let mut store = CartStore::open(MemoryStore::new(), CartPolicy::default());
        store.add_item(item("A", "10.00", 2)).unwrap();
        store.add_item(item("B", "5.50", 1)).unwrap();
        assert_eq!(store.compute_subtotal().amount(), Decimal::new(2550, 2));

        store.clear_cart();
        store.add_item(item("C", "100.00", 1)).unwrap();
        store.set_coupon(Some(ten_percent()));
        let total = store.compute_total(Some(Money::parse("14.95").unwrap()));
        assert_eq!(total.amount(), Decimal::new(10495, 2));
        assert_eq!(total.format(), "104.95");
    }

    #[test]
    fn test_shipping_fee_for_selected_method() {
        let info: FulfillmentMethodInfo = serde_json::from_str(
            r#"{"fulfillmentMethods":[{"id":0,"name":"Pickup","fee":"0","discountFee":"0"},{"id":1,"name":"Standard","fee":"14.95","discountFee":"0"}],"freeShippingThreshold":"150"}"#,
        ).unwrap();
        let mut store = CartStore::open(MemoryStore::new(), CartPolicy::default());
        store.add_item(item("A", "100.00", 1)).unwrap();
        assert_eq!(store.shipping_fee(&info), None);
        store.set_fulfillment_method(Some(FulfillmentMethodId::POST_STANDARD));
        assert_eq!(store.shipping_fee(&info), Some(Money::parse("14.95").unwrap()));
        store.increase_quantity("A");
        assert_eq!(store.shipping_fee(&info), Some(Money::ZERO));
    }

    #[test]
    fn test_unsupported_features_are_not_hydrated() {
        let backing = MemoryStore::new();
        backing.set(FULFILLMENT_METHOD_KEY, r#"{"id":1}"#).unwrap();
        backing.set(COUPON_KEY, serde_json::to_string(&ten_percent()).unwrap().as_str()).unwrap();
        let policy = CartPolicy { supports_fulfillment_method: false, supports_coupon: false, ..CartPolicy::default() };
        let store = CartStore::open(backing, policy);
        assert!(store.cart().fulfillment_method().is_none());
        assert!(store.cart().coupon().is_none());
    }
}
