//! Data models for the SecureChat crypto core
//!
//! These types are the serde shapes handed to and received from the transport.

mod types;

pub use types::*;
