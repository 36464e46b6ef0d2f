//! Domain events
use crate::domain::value_objects::ItemId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomainEvent {
    Cart(CartEvent),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartEvent {
    ItemAdded { item_id: ItemId, quantity: u32 },
    ItemRemoved { item_id: ItemId },
    QuantityChanged { item_id: ItemId, quantity: u32 },
    FulfillmentMethodChanged { method_id: Option<u32> },
    CouponChanged { code: Option<String> },
    Cleared,
}
