//! OAuth 2.0 HTTP surface over the grant engine
//!
//! Implements:
//! - RFC 8414: OAuth 2.0 Authorization Server Metadata
//! - RFC 7591-style client registration plus owner-scoped management
//! - RFC 6749 authorization and token endpoints, with RFC 7636 PKCE
//! - RFC 7009 revocation and RFC 7662 introspection

pub mod applications;
pub mod authorize;
pub mod client_auth;
pub mod error;
pub mod introspect;
pub mod metadata;
pub mod owner;
pub mod revoke;
pub mod token;
