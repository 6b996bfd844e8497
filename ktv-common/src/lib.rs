//! # KTV Common Library
//!
//! Shared code for the KTV channel crates:
//! - Error type
//! - Content category
//! - Clock port and broadcast-day time helpers
//! - Persistence port (key-value store) and its backends
//! - Channel events and the EventBus
//! - Configuration file resolution

pub mod category;
pub mod config;
pub mod error;
pub mod events;
pub mod store;
pub mod time;

pub use category::Category;
pub use error::{Error, Result};
pub use events::{ChannelEvent, EventBus, OffAirReason};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use time::{Clock, FixedClock, SystemClock};
