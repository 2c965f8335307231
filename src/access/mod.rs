//! TCP+msgpack access transport layer.
//!
//! Exposes the platform's jobs, events, and directory services to external
//! clients over length-prefixed msgpack frames. Requests are JSON-shaped
//! objects `{id, service, method, body}`; responses echo the id and carry
//! either a body, a stream of chunks, or a coded error.

pub mod codec;
pub mod dispatch;
pub mod handlers;
pub mod server;

pub use server::AccessServer;
