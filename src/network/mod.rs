//! Network layer: wire codec, transport, subscriptions, supervision.

pub mod constants;
pub mod subscriptions;
pub mod supervisor;
pub mod transport;
pub mod wire;

pub use subscriptions::{NotificationHandler, SubscriptionRegistry};
pub use supervisor::SupervisorState;
pub use transport::{ElectrumTransport, TransportEvent, TransportState};
pub use wire::{Incoming, RawNotification, RawRequest, RawResponse};
