//! Background Tasks Module
//!
//! Fire-and-forget work spawned off the request path.

pub mod background;

pub use background::BackgroundTasks;
