//! Review notifications: a per-project debounce timer, the background
//! batcher that fires it, and per-client email delivery.

pub mod batcher;
pub mod delivery;
pub mod timer;

pub use batcher::{BatchSnapshot, DispatchReport, NotificationBatcher};
pub use timer::{Clock, ReviewTimer, SystemClock};
