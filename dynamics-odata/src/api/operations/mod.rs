//! Write operations against the Web API
//!
//! An [`Operation`] knows its HTTP method, path and headers; the client
//! executes it and returns an [`OperationResult`].

pub mod operation;

pub use operation::{Operation, OperationResult, WriteMode};
