//! Streaming JSON reader and writer used by every adapter.

pub mod error;
pub mod reader;
pub mod writer;

pub use error::{DecodeError, EncodeError};
pub use reader::{JsonReader, Token};
pub use writer::{FlattenToken, JsonWriter};
