pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod issuer;
pub mod roles;
pub mod verifier;

pub use claims::Claims;
pub use config::TokenConfig;
pub use error::{AuthError, AuthResult};
pub use extractors::AuthContext;
pub use issuer::{IssuedToken, TokenIssuer, TokenSubject};
pub use roles::{Role, ROLE_ADMIN, ROLE_CUSTOMER, ROLE_GROOMER};
pub use verifier::{ensure_token_current, TokenVerifier};
