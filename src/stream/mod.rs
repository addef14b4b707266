//! Row streaming
//!
//! Result bodies are consumed lazily: each call to `next` decodes at most one
//! buffered line and only reads from the network when the buffer runs dry.

mod row;
mod row_stream;

pub use row::{FromRow, FromValue, Row};
pub use row_stream::{Records, RowStream};
