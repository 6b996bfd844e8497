//! HTTP API for the channel
//!
//! Read-only views of the grid and the playhead, a regenerate trigger and
//! the SSE event stream.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
