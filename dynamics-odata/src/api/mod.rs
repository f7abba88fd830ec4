//! Dynamics 365 Web API
//!
//! Transport, authentication, query building and the client that ties them
//! together, plus the rich metadata registry built on top of it.

pub mod auth;
pub mod client;
pub mod constants;
pub mod metadata;
pub mod operations;
pub mod query;
pub mod transport;

pub use auth::{CertificateCredential, Token, TokenProvider};
pub use client::{DynamicsClient, RecordSet};
pub use metadata::{EntityMetadata, MetadataRegistry};
pub use operations::{Operation, OperationResult, WriteMode};
pub use query::{Filter, FilterValue, ListResult, OrderBy, QueryOptions};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
