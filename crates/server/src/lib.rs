//! HTTP and WebSocket front door of tubetag.
//!
//! The binary wires real components into [`state::AppState`]; tests build
//! the same router over mocks.

pub mod api;
pub mod metrics;
pub mod state;
