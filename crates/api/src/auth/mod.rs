//! Authentication for chat connections

pub mod jwt;
pub mod resolver;

pub use jwt::{ChatCustomerClaims, JwtError, JwtManager, StaffClaims, TokenType};
pub use resolver::{AuthError, AuthResolver, CustomerTokenValidator, IdentityValidator, StaffTokenValidator};
