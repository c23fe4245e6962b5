//! Federation gateway (VIS) integration.
//!
//! Request envelope construction, bearer/embedded-credential authentication,
//! the HTTP client, and tolerant payload parsing.

pub mod auth;
pub mod client;
pub mod parser;

pub use auth::{AuthError, VisAuthenticator};
pub use client::{VisClient, VisError, VisRequest};
pub use parser::{ParseError, PayloadParser, RawRecord, RegexXmlParser};
