//! Typed record model
//!
//! Records are what callers work with; the mapper turns them into wire JSON
//! and back.

pub mod record;
pub mod value;

pub use record::{KeyAttributes, Record, RecordRef};
pub use value::Value;
