//! OAuth2 authorization-server core.
//!
//! Registers client applications, runs the authorization-code, implicit,
//! password, client-credentials and refresh-token grants, mints opaque access
//! and refresh tokens plus OpenID Connect ID tokens, and revokes and
//! introspects what it issued. Transport lives elsewhere; everything here is
//! driven through [`GrantEngine`].

pub mod application;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod grant;
pub mod id_token;
pub mod introspection;
pub mod owner;
pub mod registry;
pub mod revocation;
pub mod scope;
pub mod secret;
pub mod store;
pub mod token;

pub use application::{
    Algorithm, Application, ApplicationModel, ApplicationPatch, ClientType, GrantType,
    NewApplication,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use credentials::{AuthMethod, ClientCredentials};
pub use error::{ConfigError, OAuthError, RegistryError, SigningError, StoreError};
pub use events::{AuditEvent, EventBus, Subscription};
pub use grant::{
    AuthorizationRequest, AuthorizationResponse, AuthorizeError, GrantEngine,
    PendingAuthorization, ResponseMode, ResponseType, TokenRequest, TokenResponse,
};
pub use id_token::{KeySource, StaticKeySource};
pub use introspection::Introspection;
pub use owner::{OwnerDirectory, OwnerRecord, ResourceOwner, StaticOwnerDirectory};
pub use registry::{Registration, Registry};
pub use scope::ScopeSet;
pub use store::{Storage, Store};
pub use token::{TokenInfo, TokenKind, TokenRejection};
