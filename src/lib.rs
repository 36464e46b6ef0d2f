//! Lightshop Storefront
//!
//! Cart core shared by the light shop and the gift preselection shop.
//!
//! ## Features
//! - Persisted shopping cart with bounded quantities
//! - Exact decimal subtotal, coupon discount and shipping fee totals
//! - Typed client for the shop's catalog, coupon, payment and order API
//! - Local JSON API through which presentation code drives the cart

pub mod api;
pub mod config;
pub mod domain;
pub mod scope;
pub mod services;
pub mod storage;
pub mod store;

pub use config::StorefrontConfig;
pub use domain::aggregates::{Cart, CartError, CartPolicy, Coupon, FulfillmentMethodId, LineItem, Selection, StockStatus, SubmissionError};
pub use domain::value_objects::{format_money, ItemId, Money, Quantity};
pub use scope::ViewScope;
pub use services::ShopClient;
pub use storage::{FileStore, KeyValueStore, MemoryStore, SharedStore, StorageError};
pub use store::CartStore;

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Shop API error: {0}")]
    Client(#[from] services::ClientError),

    #[error("Order error: {0}")]
    Order(#[from] domain::aggregates::OrderError),

    #[error("Order submission failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Invalid coupon code")]
    InvalidCoupon,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storefront is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
