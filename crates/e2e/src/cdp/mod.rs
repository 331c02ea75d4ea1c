//! Minimal Chrome DevTools Protocol client.
//!
//! Speaks CDP JSON over the browser WebSocket with flattened sessions: one
//! [`CdpClient`] per browser, one [`PageSession`] per attached page. Events
//! from every session are forwarded, in arrival order, to the receiver
//! returned by [`CdpClient::connect`].

mod client;
mod error;
mod protocol;
mod session;

pub use client::CdpClient;
pub use error::CdpError;
pub use protocol::{CdpEvent, MouseButton, MouseEventType};
pub use session::PageSession;

pub(crate) use session::exception_text;
