//! Service schema (CSDL) engine
//!
//! Turns the `$metadata` document into per-entity field maps the mapper uses
//! to translate between logical attribute names and wire field names.

pub mod csdl;
pub mod document;

pub use csdl::parse_csdl;
pub use document::{EntitySchema, NavigationTargets, OutboundMapping, SchemaDocument};
