//! Local JSON API over the cart.
//!
//! Presentation code drives the cart through these routes. Calls to the shop
//! API are made without holding the cart lock, and their results are applied
//! through the [`ViewScope`] so nothing lands once the server is shutting down.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::domain::aggregates::{
    Cart, Coupon, CustomerDetails, FulfillmentMethodId, LineItem, OrderSubmission, PaymentIntentRequest, StockStatus, SubmissionError,
};
use crate::domain::value_objects::{Money, Quantity};
use crate::scope::ViewScope;
use crate::services::{ClientError, ShopClient};
use crate::storage::SharedStore;
use crate::store::CartStore;
use crate::{Result, StorefrontError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<CartStore<SharedStore>>>,
    pub client: ShopClient,
    pub scope: ViewScope,
    pub low_stock_threshold: i64,
}

impl AppState {
    pub fn new(store: CartStore<SharedStore>, client: ShopClient, scope: ViewScope, low_stock_threshold: i64) -> Self {
        Self { store: Arc::new(Mutex::new(store)), client, scope, low_stock_threshold }
    }

    /// Applies `mutate` to the cart unless the scope has been closed.
    async fn mutate<R>(&self, mutate: impl FnOnce(&mut CartStore<SharedStore>) -> R) -> Result<R> {
        let mut store = self.store.lock().await;
        self.scope.apply(&mut *store, mutate).ok_or(StorefrontError::ShuttingDown)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "lightshop-storefront"})) }))
        .route("/api/v1/cart", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/totals", get(cart_totals))
        .route("/api/v1/cart/items", post(add_item))
        .route("/api/v1/cart/items/:item_id", delete(remove_item))
        .route("/api/v1/cart/items/:item_id/increase", post(increase_quantity))
        .route("/api/v1/cart/items/:item_id/decrease", post(decrease_quantity))
        .route("/api/v1/cart/lights", post(add_light))
        .route("/api/v1/cart/preselections", post(add_preselection))
        .route("/api/v1/cart/fulfillment-method", put(set_fulfillment_method))
        .route("/api/v1/cart/coupon", put(apply_coupon).delete(remove_coupon))
        .route("/api/v1/inventory/:category/:id", get(stock_status))
        .route("/api/v1/address/search", post(search_addresses))
        .route("/api/v1/checkout/payment-intent", post(create_payment_intent))
        .route("/api/v1/checkout", post(checkout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<LineItem>,
    pub fulfillment_method: Option<u32>,
    pub coupon: Option<Coupon>,
    pub item_count: usize,
    pub unit_count: u64,
    pub subtotal: Money,
    pub display_subtotal: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        let subtotal = cart.subtotal();
        Self {
            items: cart.items().to_vec(),
            fulfillment_method: cart.fulfillment_method().map(|m| m.0),
            coupon: cart.coupon().cloned(),
            item_count: cart.item_count(),
            unit_count: cart.unit_count(),
            subtotal,
            display_subtotal: subtotal.format(),
            updated_at: cart.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsView {
    pub subtotal: Money,
    pub discounted_subtotal: Money,
    pub shipping_fee: Option<Money>,
    pub total: Money,
    pub display_total: String,
}

async fn get_cart(State(s): State<AppState>) -> Json<CartView> {
    Json(CartView::from(s.store.lock().await.cart()))
}

/// The fee table is only fetched when a method is selected; if the shop
/// cannot serve it the total is reported without shipping.
async fn cart_totals(State(s): State<AppState>) -> Json<TotalsView> {
    let needs_fee = s.store.lock().await.cart().fulfillment_method().is_some();
    let fees = if needs_fee {
        s.client.get_fulfillment_method_info().await.map_err(|e| warn!(error = %e, "fee table unavailable")).ok()
    } else {
        None
    };

    let store = s.store.lock().await;
    let shipping_fee = fees.as_ref().and_then(|info| store.shipping_fee(info));
    let total = store.compute_total(shipping_fee);
    Json(TotalsView {
        subtotal: store.compute_subtotal(),
        discounted_subtotal: store.cart().discounted_subtotal(),
        shipping_fee,
        total,
        display_total: total.format(),
    })
}

async fn add_item(State(s): State<AppState>, Json(item): Json<LineItem>) -> Result<(StatusCode, Json<CartView>)> {
    let view = s.mutate(|store| store.add_item(item).map(CartView::from)).await??;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn remove_item(State(s): State<AppState>, Path(item_id): Path<String>) -> Result<Json<CartView>> {
    Ok(Json(s.mutate(|store| CartView::from(store.remove_item(&item_id))).await?))
}

async fn increase_quantity(State(s): State<AppState>, Path(item_id): Path<String>) -> Result<Json<CartView>> {
    Ok(Json(s.mutate(|store| CartView::from(store.increase_quantity(&item_id))).await?))
}

async fn decrease_quantity(State(s): State<AppState>, Path(item_id): Path<String>) -> Result<Json<CartView>> {
    Ok(Json(s.mutate(|store| CartView::from(store.decrease_quantity(&item_id))).await?))
}

async fn clear_cart(State(s): State<AppState>) -> Result<Json<CartView>> {
    Ok(Json(s.mutate(|store| CartView::from(store.clear_cart())).await?))
}

fn quantity(raw: Option<u32>) -> Result<Quantity> {
    Quantity::new(raw.unwrap_or(1)).map_err(|e| StorefrontError::InvalidRequest(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLightRequest {
    pub internal_name: String,
    pub dimension_id: Option<String>,
    pub color: Option<String>,
    pub quantity: Option<u32>,
}

async fn add_light(State(s): State<AppState>, Json(r): Json<AddLightRequest>) -> Result<(StatusCode, Json<CartView>)> {
    let quantity = quantity(r.quantity)?;
    let light = s.client.get_light_and_variants(&r.internal_name).await?;
    let variant = match r.dimension_id.as_deref() {
        Some(dimension_id) => light
            .variant_for(r.color.as_deref(), dimension_id)
            .ok_or_else(|| StorefrontError::InvalidRequest(format!("no variant for dimension {dimension_id}")))?,
        None => &light.default_light_variant,
    };
    let item = variant.to_line_item(&light.light_display_name, quantity);
    let view = s.mutate(|store| store.add_item(item).map(CartView::from)).await??;
    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub struct AddPreselectionRequest {
    pub name: String,
    pub quantity: Option<u32>,
}

async fn add_preselection(State(s): State<AppState>, Json(r): Json<AddPreselectionRequest>) -> Result<(StatusCode, Json<CartView>)> {
    let quantity = quantity(r.quantity)?;
    let item = s.client.get_preselection_by_name(&r.name).await?.to_line_item(quantity);
    let view = s.mutate(|store| store.add_item(item).map(CartView::from)).await??;
    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub struct SetFulfillmentMethodRequest {
    pub id: Option<u32>,
}

async fn set_fulfillment_method(State(s): State<AppState>, Json(r): Json<SetFulfillmentMethodRequest>) -> Result<Json<CartView>> {
    let method = r.id.map(FulfillmentMethodId);
    Ok(Json(s.mutate(|store| CartView::from(store.set_fulfillment_method(method))).await?))
}

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
}

/// Looks the code up with the shop; only a valid coupon reaches the cart.
async fn apply_coupon(State(s): State<AppState>, Json(r): Json<ApplyCouponRequest>) -> Result<Json<CartView>> {
    let code = r.code.trim();
    if code.is_empty() { return Err(StorefrontError::InvalidRequest("coupon code is empty".to_string())); }

    let coupon = s.scope.complete(s.client.get_coupon(code)).await.ok_or(StorefrontError::ShuttingDown)??;
    if !coupon.is_valid { return Err(StorefrontError::InvalidCoupon); }
    Ok(Json(s.mutate(|store| CartView::from(store.set_coupon(Some(coupon)))).await?))
}

async fn remove_coupon(State(s): State<AppState>) -> Result<Json<CartView>> {
    Ok(Json(s.mutate(|store| CartView::from(store.set_coupon(None))).await?))
}

#[derive(Debug, Serialize)]
pub struct StockView {
    pub count: i64,
    pub status: Option<StockStatus>,
}

async fn stock_status(State(s): State<AppState>, Path((category, id)): Path<(String, u64)>) -> Result<Json<StockView>> {
    let inventory = s.client.get_inventories().await?;
    let count = inventory.count(&category, id).unwrap_or(0);
    Ok(Json(StockView { count, status: inventory.stock_status(&category, id, s.low_stock_threshold) }))
}

#[derive(Debug, Deserialize)]
pub struct AddressSearchRequest {
    pub search: String,
}

async fn search_addresses(State(s): State<AppState>, Json(r): Json<AddressSearchRequest>) -> Result<Json<serde_json::Value>> {
    let addresses = s.client.search_addresses(&r.search).await?;
    Ok(Json(json!({ "addresses": addresses })))
}

async fn create_payment_intent(State(s): State<AppState>) -> Result<Json<serde_json::Value>> {
    let request = PaymentIntentRequest::from_cart(s.store.lock().await.cart())?;
    let client_secret = s.client.create_payment_intent(&request).await?;
    Ok(Json(json!({ "clientSecret": client_secret })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub customer: CustomerDetails,
    pub delivery_address: Option<String>,
    pub payment_intent_id: String,
}

/// Submits the order and takes the ordered lines out of the cart only once
/// the shop accepts it. An accepted order is recorded even after the scope
/// closes, and lines added while it was in flight stay in the cart.
async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let (order, ordered) = {
        let store = s.store.lock().await;
        let order = OrderSubmission::from_cart(store.cart(), r.customer, r.delivery_address, r.payment_intent_id)?;
        (order, store.cart().items().to_vec())
    };
    let order_number = s.client.submit_order(&order).await?;
    info!(%order_number, "order placed");
    s.store.lock().await.complete_order(&ordered);
    Ok((StatusCode::CREATED, Json(json!({ "orderNumber": order_number }))))
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Client(ClientError::Status { status: 404, .. }) => StatusCode::NOT_FOUND,
            Self::Client(_) => StatusCode::BAD_GATEWAY,
            Self::Submission(SubmissionError::OutOfStock) => StatusCode::CONFLICT,
            Self::Submission(SubmissionError::PaymentFailed) => StatusCode::PAYMENT_REQUIRED,
            Self::Submission(SubmissionError::Generic) => StatusCode::BAD_GATEWAY,
            Self::Order(_) | Self::InvalidCoupon => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Cart(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        };
        let message = match &self {
            Self::Submission(e) => e.message().to_string(),
            other => other.to_string(),
        };
        if status.is_server_error() { warn!(%status, error = %self, "request failed"); }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
