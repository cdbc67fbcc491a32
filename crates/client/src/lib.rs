//! Client SDK for bidding in sealed-bid token launches.
//!
//! This crate provides a high-level API for:
//! - Sealing bid amounts to the cypher node's public key
//! - Tracking a bid from submission through claim

pub mod bid;
pub mod status;

pub use bid::{prepare_bid, BidBuilder, BidError, PreparedBid};
pub use status::BidStatus;
