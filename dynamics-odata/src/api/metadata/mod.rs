//! Rich entity metadata
//!
//! [`MetadataRegistry`] fetches `EntityDefinitions` with their attributes,
//! keys and relationships and decodes them into [`EntityMetadata`].

pub mod enums;
pub mod models;
pub mod registry;

pub use enums::{AttributeRequiredLevel, AttributeTypeCode, OwnershipType};
pub use models::{
    AttributeDetails, AttributeMetadata, EntityKeyMetadata, EntityMetadata, Label,
    LocalizedLabel, ManyToManyRelationshipMetadata, OneToManyRelationshipMetadata,
    OptionMetadata, OptionSetMetadata,
};
pub use registry::MetadataRegistry;
