//! Order lifecycle and stock-consistency engine.
//!
//! This crate owns every operation that mutates marketplace state: the
//! cart aggregate, the inventory ledger, order creation from both
//! origins (direct checkout and chat estimation), the order status
//! state machine, and the negotiation channel. Each operation runs as
//! one unit of work against the [`market_store::MarketStore`] and is
//! bounded by a timeout, so a stalled store never wedges a caller.

pub mod cart;
pub mod chat;
pub mod config;
pub mod error;
pub mod feed;
pub mod inventory;
pub mod orders;

pub use cart::CartService;
pub use chat::NegotiationService;
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use feed::MessageFeed;
pub use inventory::InventoryLedger;
pub use orders::{EstimationLine, OrderEngine};
