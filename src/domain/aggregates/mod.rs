//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{FulfillmentMethod, FulfillmentMethodInfo, Inventory, Light, LightAndVariants, LightVariant, Preselection, StockStatus, LOW_STOCK_THRESHOLD};
pub use order::{classify_submission, order_items, CustomerDetails, OrderError, OrderItem, OrderSubmission, PaymentIntentRequest, SubmissionError};
pub use cart::{Cart, CartError, CartPolicy, Coupon, FulfillmentMethodId, LineItem, Selection, DEFAULT_MAX_QUANTITY};
