//! WebSocket plumbing for panoview: the viewer-side transport that drives a
//! [`ViewerSession`](panoview_core::ViewerSession), and a fan-out relay that
//! viewers and frontends can share.

pub mod client;
pub mod error;
pub mod frame;
pub mod relay;

pub use client::{ViewerConnection, WsTransport, connect};
pub use error::WsError;
pub use frame::Envelope;
pub use relay::RelayServer;
