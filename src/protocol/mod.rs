//! ClickHouse HTTP protocol helpers
//!
//! This module handles:
//! * Placeholder binding into typed query parameters
//! * Framing and decoding of `JSONCompactEachRow` bodies
//! * Protocol constants (parameter names, headers, settings)

pub mod constants;
pub mod decode;
pub mod params;

pub use decode::{BodyLine, DecodeError};
pub use params::{bind, BoundStatement, Value};
