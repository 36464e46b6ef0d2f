//! Order Submission Aggregate

use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::domain::aggregates::cart::{Cart, Selection};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(min = 8, max = 20))]
    pub mobile: String,
    #[validate(email)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// One `{quantity, <selection id>}` pair as the order endpoint expects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub quantity: u32,
    #[serde(flatten)]
    pub selection: Selection,
}

pub fn order_items(cart: &Cart) -> Vec<OrderItem> {
    cart.items().iter().map(|i| OrderItem { quantity: i.quantity.value(), selection: i.selection }).collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    pub order_items: Vec<OrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_method: Option<u32>,
}

impl PaymentIntentRequest {
    pub fn from_cart(cart: &Cart) -> Result<Self, OrderError> {
        if cart.is_empty() { return Err(OrderError::EmptyCart); }
        Ok(Self { order_items: order_items(cart), fulfillment_method: cart.fulfillment_method().map(|m| m.0) })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSubmission {
    pub customer_info: CustomerDetails,
    pub order_items: Vec<OrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_method: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub payment_intent_id: String,
}

impl OrderSubmission {
    /// Builds the order body from the cart as it stands now.
    ///
    /// Pickup orders never carry an address; every other fulfillment method
    /// needs one.
    pub fn from_cart(cart: &Cart, customer: CustomerDetails, delivery_address: Option<String>, payment_intent_id: impl Into<String>) -> Result<Self, OrderError> {
        if cart.is_empty() { return Err(OrderError::EmptyCart); }
        customer.validate().map_err(|e| OrderError::InvalidCustomer(e.to_string()))?;

        let method = cart.fulfillment_method();
        if cart.policy().supports_fulfillment_method && method.is_none() { return Err(OrderError::MissingFulfillmentMethod); }
        let delivery_address = match method {
            Some(m) if m.is_pickup() => None,
            Some(_) => Some(delivery_address.filter(|a| !a.trim().is_empty()).ok_or(OrderError::MissingDeliveryAddress)?),
            None => delivery_address,
        };

        Ok(Self {
            customer_info: customer,
            order_items: order_items(cart),
            fulfillment_method: method.map(|m| m.0),
            delivery_address,
            coupon_code: cart.active_coupon().map(|c| c.code.clone()),
            payment_intent_id: payment_intent_id.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { EmptyCart, MissingFulfillmentMethod, MissingDeliveryAddress, InvalidCustomer(String) }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCart => write!(f, "Cart is empty"),
            Self::MissingFulfillmentMethod => write!(f, "No fulfillment method selected"),
            Self::MissingDeliveryAddress => write!(f, "Delivery address required"),
            Self::InvalidCustomer(reason) => write!(f, "Invalid customer details: {reason}"),
        }
    }
}

/// User-facing outcome of a failed order submission. The cart is left
/// untouched for every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionError { OutOfStock, PaymentFailed, Generic }

impl SubmissionError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::OutOfStock => "Sorry, we are running out of stock for the items you have ordered.",
            Self::PaymentFailed => "There was an error processing the payment for your order. Please check you have sufficient funds and try again.",
            Self::Generic => "There was an unexpected error completing your order. Please try again.",
        }
    }
}

impl std::error::Error for SubmissionError {}
impl std::fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.message()) }
}

/// Maps a `complete-order` response to an order number or a user-facing error.
pub fn classify_submission(status: u16, body: &str) -> Result<String, SubmissionError> {
    let json: Option<serde_json::Value> = serde_json::from_str(body).ok();
    if status == 400 && json.as_ref().and_then(|v| v.get("description")).and_then(|d| d.as_str()) == Some("Out of stock") {
        return Err(SubmissionError::OutOfStock);
    }
    if status == 402 { return Err(SubmissionError::PaymentFailed); }
    if status >= 400 { return Err(SubmissionError::Generic); }
    match json.as_ref().and_then(|v| v.get("orderNumber")) {
        Some(serde_json::Value::String(number)) => Ok(number.clone()),
        Some(serde_json::Value::Number(number)) => Ok(number.to_string()),
        _ => Err(SubmissionError::Generic),
    }
}
