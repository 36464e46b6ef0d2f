//! Typed client for the shop API.
//!
//! Every response is decoded straight into domain types, so prices become
//! [`Money`](crate::Money) at this boundary. Order submission is the one call
//! that never returns a transport error: failures are folded into
//! [`SubmissionError`] for display.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::domain::aggregates::{
    classify_submission, Coupon, FulfillmentMethodInfo, Inventory, Light, LightAndVariants, OrderSubmission, PaymentIntentRequest, Preselection,
    SubmissionError,
};

/// Address queries shorter than this are answered locally with no matches.
pub const MIN_ADDRESS_QUERY_LEN: usize = 3;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{path} returned HTTP {status}")]
    Status { status: u16, path: String },

    #[error("failed to decode {path}: {message}")]
    Decode { path: String, message: String },
}

#[derive(Deserialize)]
struct LightsEnvelope {
    lights: Vec<Light>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LightAndVariantsEnvelope {
    light_and_variants: LightAndVariants,
}

#[derive(Deserialize)]
struct AddressesEnvelope {
    addresses: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentIntentEnvelope {
    client_secret: String,
}

#[derive(Clone, Debug)]
pub struct ShopClient {
    http: Client,
    base_url: String,
    fee_table_path: String,
}

impl ShopClient {
    pub fn new(base_url: &str, fee_table_path: &str) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            fee_table_path: fee_table_path.trim_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    fn url(&self, path: &str) -> String { format!("{}/{}", self.base_url, path) }

    #[instrument(skip(self))]
    pub async fn get_lights(&self) -> Result<Vec<Light>, ClientError> {
        let envelope: LightsEnvelope = self.fetch(self.http.get(self.url("lights")), "lights").await?;
        Ok(envelope.lights)
    }

    #[instrument(skip(self))]
    pub async fn get_light_and_variants(&self, internal_name: &str) -> Result<LightAndVariants, ClientError> {
        let request = self.http.get(self.url("lights/search")).query(&[("internal-name", internal_name)]);
        let envelope: LightAndVariantsEnvelope = self.fetch(request, "lights/search").await?;
        Ok(envelope.light_and_variants)
    }

    #[instrument(skip(self))]
    pub async fn get_inventories(&self) -> Result<Inventory, ClientError> {
        self.fetch(self.http.get(self.url("inventories")), "inventories").await
    }

    #[instrument(skip(self))]
    pub async fn get_fulfillment_method_info(&self) -> Result<FulfillmentMethodInfo, ClientError> {
        self.fetch(self.http.get(self.url(&self.fee_table_path)), &self.fee_table_path).await
    }

    #[instrument(skip(self))]
    pub async fn get_coupon(&self, code: &str) -> Result<Coupon, ClientError> {
        let request = self.http.get(self.url("coupons/search")).query(&[("code", code)]);
        self.fetch(request, "coupons/search").await
    }

    #[instrument(skip(self))]
    pub async fn get_preselections(&self) -> Result<Vec<Preselection>, ClientError> {
        self.fetch(self.http.get(self.url("preselections")), "preselections").await
    }

    #[instrument(skip(self))]
    pub async fn get_preselection_by_name(&self, name: &str) -> Result<Preselection, ClientError> {
        let request = self.http.get(self.url("preselections/search")).query(&[("name", name)]);
        self.fetch(request, "preselections/search").await
    }

    #[instrument(skip(self))]
    pub async fn search_addresses(&self, query: &str) -> Result<Vec<String>, ClientError> {
        if query.chars().count() < MIN_ADDRESS_QUERY_LEN { return Ok(vec![]); }
        let request = self.http.post(self.url("address/auto-complete")).json(&json!({ "search": query }));
        let envelope: AddressesEnvelope = self.fetch(request, "address/auto-complete").await?;
        Ok(envelope.addresses)
    }

    /// Returns the payment gateway's client secret for this cart.
    #[instrument(skip_all)]
    pub async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<String, ClientError> {
        let request = self.http.post(self.url("payment/payment-intent")).json(request);
        let envelope: PaymentIntentEnvelope = self.fetch(request, "payment/payment-intent").await?;
        Ok(envelope.client_secret)
    }

    /// Submits the order and returns its number.
    #[instrument(skip_all, fields(items = order.order_items.len()))]
    pub async fn submit_order(&self, order: &OrderSubmission) -> Result<String, SubmissionError> {
        let response = match self.http.post(self.url("complete-order")).json(order).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "order submission did not reach the shop");
                return Err(SubmissionError::Generic);
            }
        };
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let outcome = classify_submission(status, &body);
        if let Err(e) = &outcome {
            warn!(status, kind = ?e, "order submission rejected");
        }
        outcome
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status { status: status.as_u16(), path: path.to_string() });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode { path: path.to_string(), message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Cart, CartPolicy, CustomerDetails, FulfillmentMethodId, StockStatus, LOW_STOCK_THRESHOLD};
    use crate::domain::value_objects::{Money, Quantity};
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use rust_decimal::Decimal;
    use serde_json::Value;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    const VARIANT: &str = r#"{"id":42,"lightId":3,"dimensionId":"M","color":"warm","imageUrl":"i","dimensionStr":"20cm","price":"49.95","stock":8}"#;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn mock_shop() -> Router {
        let variant: Value = serde_json::from_str(VARIANT).unwrap();
        Router::new()
            .route("/lights", get(|| async { Json(json!({"lights": [{"id":3,"imageUrl":"i","videoUrl":null,"internalName":"moon","displayName":"Moon Lamp","powerType":"USB","priceTag":"From $49.95"}]})) }))
            .route("/lights/search", get(move |Query(q): Query<HashMap<String, String>>| {
                let variant = variant.clone();
                async move {
                    if q.get("internal-name").map(String::as_str) != Some("moon") { return Err(StatusCode::NOT_FOUND); }
                    Ok(Json(json!({"lightAndVariants": {
                        "lightPowerType": "USB", "lightDisplayName": "Moon Lamp", "lightVideoUrl": null, "lightDimensionTypeStr": "Diameter",
                        "defaultLightVariant": variant, "defaultDimensionToLightVariantMapping": {"M": variant}
                    }})))
                }
            }))
            .route("/inventories", get(|| async { Json(json!({"light": {"3": 4}})) }))
            .route("/shipping-methods", get(|| async { Json(json!({"shippingMethods": [{"id":1,"name":"Standard","fee":"9.95","discountFee":"0.00"}], "freeShippingThreshold": "80.00"})) }))
            .route("/coupons/search", get(|Query(q): Query<HashMap<String, String>>| async move {
                let valid = q.get("code").map(String::as_str) == Some("SAVE10");
                Json(json!({"couponCode": q.get("code"), "isValid": valid, "discountPercentage": 10}))
            }))
            .route("/address/auto-complete", post(|Json(body): Json<Value>| async move {
                Json(json!({"addresses": [format!("{} Street", body["search"].as_str().unwrap_or_default())]}))
            }))
            .route("/payment/payment-intent", post(|Json(body): Json<Value>| async move {
                assert_eq!(body["orderItems"][0]["lightVariantId"], 42);
                Json(json!({"clientSecret": "pi_123_secret"}))
            }))
            .route("/complete-order", post(|Json(body): Json<Value>| async move {
                match body["paymentIntentId"].as_str() {
                    Some("pi_declined") => (StatusCode::PAYMENT_REQUIRED, Json(json!({}))),
                    Some("pi_sold_out") => (StatusCode::BAD_REQUEST, Json(json!({"description": "Out of stock"}))),
                    _ => (StatusCode::OK, Json(json!({"orderNumber": "LS-2001"}))),
                }
            }))
    }

    async fn client() -> ShopClient {
        ShopClient::new(&serve(mock_shop()).await, "shipping-methods").unwrap()
    }

    fn order(cart: &Cart, payment_intent_id: &str) -> OrderSubmission {
        let customer = CustomerDetails { first_name: "Ada".into(), last_name: "L".into(), mobile: "0412345678".into(), email: "ada@example.com".into(), address: None };
        OrderSubmission::from_cart(cart, customer, None, payment_intent_id).unwrap()
    }

    #[tokio::test]
    async fn test_catalog_prices_arrive_as_money() {
        let client = client().await;
        let lights = client.get_lights().await.unwrap();
        assert_eq!(lights[0].display_name, "Moon Lamp");

        let light = client.get_light_and_variants("moon").await.unwrap();
        let variant = light.variant_for(None, "M").unwrap();
        assert_eq!(variant.price.amount(), Decimal::new(4995, 2));
        assert!(matches!(client.get_light_and_variants("sun").await, Err(ClientError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_inventory_fee_table_and_coupon() {
        let client = client().await;
        let inventory = client.get_inventories().await.unwrap();
        assert_eq!(inventory.stock_status("light", 3, LOW_STOCK_THRESHOLD), Some(StockStatus::LowInStock));

        let fees = client.get_fulfillment_method_info().await.unwrap();
        assert_eq!(fees.shipping_fee(FulfillmentMethodId(1), Money::parse("20").unwrap()), Some(Money::parse("9.95").unwrap()));

        assert!(client.get_coupon("SAVE10").await.unwrap().is_valid);
        assert!(!client.get_coupon("NOPE").await.unwrap().is_valid);
    }

    #[tokio::test]
    async fn test_short_address_query_skips_request() {
        let client = ShopClient::new("http://127.0.0.1:9", "fulfillment-methods").unwrap();
        assert!(client.search_addresses("ab").await.unwrap().is_empty());

        let client = self::client().await;
        assert_eq!(client.search_addresses("1 Ma").await.unwrap(), vec!["1 Ma Street".to_string()]);
    }

    #[tokio::test]
    async fn test_checkout_calls() {
        let client = client().await;
        let light: LightAndVariants = client.get_light_and_variants("moon").await.unwrap();
        let mut cart = Cart::new(CartPolicy::default());
        cart.add_item(light.default_light_variant.to_line_item(&light.light_display_name, Quantity::new(2).unwrap())).unwrap();
        cart.set_fulfillment_method(Some(FulfillmentMethodId::PICKUP));

        let intent = PaymentIntentRequest::from_cart(&cart).unwrap();
        assert_eq!(client.create_payment_intent(&intent).await.unwrap(), "pi_123_secret");

        assert_eq!(client.submit_order(&order(&cart, "pi_ok")).await, Ok("LS-2001".to_string()));
        assert_eq!(client.submit_order(&order(&cart, "pi_declined")).await, Err(SubmissionError::PaymentFailed));
        assert_eq!(client.submit_order(&order(&cart, "pi_sold_out")).await, Err(SubmissionError::OutOfStock));
    }

    #[tokio::test]
    async fn test_unreachable_shop_is_a_generic_failure() {
        let client = ShopClient::new("http://127.0.0.1:9", "fulfillment-methods").unwrap();
        let mut cart = Cart::new(CartPolicy::default());
        let light: LightAndVariants = serde_json::from_value(json!({
            "lightPowerType": "USB", "lightDisplayName": "Moon", "lightVideoUrl": null, "lightDimensionTypeStr": "D",
            "defaultLightVariant": serde_json::from_str::<Value>(VARIANT).unwrap()
        })).unwrap();
        cart.add_item(light.default_light_variant.to_line_item("Moon", Quantity::ONE)).unwrap();
        cart.set_fulfillment_method(Some(FulfillmentMethodId::PICKUP));
        assert_eq!(client.submit_order(&order(&cart, "pi_ok")).await, Err(SubmissionError::Generic));
    }
}
