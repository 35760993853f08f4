//! Discriminated JSON for sealed type hierarchies.
//!
//! A hierarchy is declared once as a [`ResolutionTable`]: every subtype
//! with its label, optional alternate labels, nested hierarchies and at
//! most one default. A [`SealedAdapter`] then reads `{"type": "label", ...}`
//! objects into the right subtype and writes them back with the primary
//! label.

pub mod adapter;
pub mod cli;
pub mod commands;
pub mod json;
pub mod registry;
pub mod schema;
pub mod sealed;

pub use adapter::{FailOnUnknown, JsonAdapter, Sealed, SerdeAdapter};
pub use json::{DecodeError, EncodeError, JsonReader, JsonWriter};
pub use registry::{AdapterRegistry, SealedHierarchy};
pub use sealed::{
    ConfigError, DefaultPolicy, ResolutionTable, ResolvedTarget, SealedAdapter, SingletonAdapter,
    SubtypeDescriptor,
};
