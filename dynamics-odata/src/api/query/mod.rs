//! OData query options
//!
//! [`QueryOptions`] describes a list request, [`build_query`] turns it into a
//! query string and `Prefer` header, and [`ListResult`] holds what came back.

pub mod build;
pub mod filters;
pub mod options;
pub mod result;

pub use build::build_query;
pub use filters::{Filter, FilterValue};
pub use options::{OrderBy, QueryOptions};
pub use result::ListResult;
