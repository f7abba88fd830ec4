//! Azure AD authentication for the Web API
//!
//! [`TokenProvider`] discovers the instance's tenant, acquires client
//! credential tokens with a secret or a certificate assertion, and caches
//! them until they expire or a request is rejected.

pub mod assertion;
pub mod provider;
pub mod tenant;
pub mod token;

pub use assertion::CertificateCredential;
pub use provider::TokenProvider;
pub use token::Token;
