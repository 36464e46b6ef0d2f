//! Collaborators reached over the network.
pub mod client;

pub use client::{ClientError, ShopClient, MIN_ADDRESS_QUERY_LEN};
