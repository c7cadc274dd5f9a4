pub mod client;
pub mod gate;
pub mod validation;

pub use gate::{PortalGate, PortalState, UnavailableReason};
