//! # Fedra Core - Federation Platform Core
//!
//! Rust implementation of the federation platform core providing:
//! - Typed jobs with factory-based deserialization and an open type registry
//! - Job execution on a bounded FIFO worker pool with panic containment
//! - Typed service directory with metadata lookup and one-shot wait-for
//! - Event service with origin/type-filtered pub/sub fan-out
//! - TCP+msgpack access transport for external clients
//!
//! ## Architecture
//!
//! A [`Platform`] wires four internally synchronized services; the access
//! layer talks to them through shared handles, no global lock:
//! ```text
//!                    ┌─────────────────────────────────┐
//!   TCP requests →   │            Platform             │
//!                    │  ┌─────────┐ ┌─────────┐        │
//!                    │  │ Service │ │  Event  │        │
//!                    │  │Directory│ │   Bus   │        │
//!                    │  └─────────┘ └─────────┘        │
//!                    │  ┌─────────┐ ┌─────────┐        │
//!                    │  │ Factory │ │   Job   │        │
//!                    │  │Registry │ │Executor │        │
//!                    │  └─────────┘ └─────────┘        │
//!                    └─────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod access;
pub mod events;
pub mod jobs;
pub mod platform;
pub mod reply;
pub mod types;

// Internal utilities
pub mod observability;

pub use platform::Platform;
pub use reply::Reply;
pub use types::{Config, Error, Result};
