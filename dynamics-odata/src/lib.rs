//! Typed record access to Microsoft Dynamics 365 / Dataverse
//!
//! The crate reads the instance's CSDL schema to translate between
//! [`Record`]s keyed by logical attribute names and the Web API's OData wire
//! format, and exposes CRUD, query, FetchXML, relationship and custom
//! operation calls through [`DynamicsClient`].
//!
//! ```no_run
//! use dynamics_odata::{ClientSettings, DynamicsClient, Record};
//!
//! # async fn run() -> dynamics_odata::Result<()> {
//! let settings = ClientSettings::with_secret(
//!     "https://contoso.crm.dynamics.com",
//!     "00000000-0000-0000-0000-000000000001",
//!     "secret",
//! );
//! let client = DynamicsClient::new(settings)?;
//!
//! let mut account = Record::new("account");
//! account.set("name", "Contoso");
//! let id = client.create_record(&mut account).await?;
//! println!("created {}", id);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod mapper;
pub mod model;
pub mod schema;

#[cfg(test)]
mod testing;

pub use api::{
    DynamicsClient, Filter, FilterValue, ListResult, MetadataRegistry, Operation, OrderBy,
    QueryOptions, RecordSet, WriteMode,
};
pub use cache::{CacheStore, MemoryCache, NoopCache};
pub use config::{ClientSettings, Credentials};
pub use error::{Error, Result};
pub use mapper::EntityMapper;
pub use model::{Record, RecordRef, Value};
pub use schema::SchemaDocument;
