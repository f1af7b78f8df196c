//! Per-run progress channels.
//!
//! Every run owns one [`ProgressChannel`]. Subscribers first receive the
//! run's history, then follow live events until a terminal event, so a
//! client that connects late still sees how the run got where it is and
//! never sees another run's events.

mod channel;
mod types;

pub use channel::{ProgressChannel, ProgressStream};
pub use types::ProgressEvent;
