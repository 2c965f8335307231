//! Access service handlers, one module per exposed service.

pub mod directory;
pub mod events;
pub mod jobs;
