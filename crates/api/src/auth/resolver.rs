//! Connection identity resolution
//!
//! A chat socket may be opened either by a staff member carrying an
//! organization-scoped access token or by an anonymous shopper carrying a
//! short-lived chat token. The resolver walks an ordered list of validators;
//! the first one that recognizes the token decides the identity.

use async_trait::async_trait;
use pharmchat_shared::{ClientIdentity, StoreError};
use std::sync::Arc;

use super::jwt::JwtManager;
use crate::store::StaffDirectory;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No token supplied")]
    MissingToken,
    #[error("Token was not accepted by any validator")]
    InvalidToken,
    #[error("Staff account not found")]
    AccountNotFound,
    #[error("Staff account is inactive")]
    AccountInactive,
    #[error("Staff account belongs to a different organization")]
    TenantMismatch,
    #[error("Staff directory error: {0}")]
    Directory(#[from] StoreError),
}

/// One way of turning a bearer token into a connection identity
#[async_trait]
pub trait IdentityValidator: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the token is not of this validator's form and the
    /// next validator should be tried. `Err` rejects the token outright.
    async fn validate(&self, token: &str) -> Result<Option<ClientIdentity>, AuthError>;
}

/// Accepts staff access tokens backed by an active staff account
pub struct StaffTokenValidator {
    jwt: JwtManager,
    directory: Arc<dyn StaffDirectory>,
}

impl StaffTokenValidator {
    pub fn new(jwt: JwtManager, directory: Arc<dyn StaffDirectory>) -> Self {
        Self { jwt, directory }
    }
}

#[async_trait]
impl IdentityValidator for StaffTokenValidator {
    fn name(&self) -> &'static str {
        "staff"
    }

    async fn validate(&self, token: &str) -> Result<Option<ClientIdentity>, AuthError> {
        let claims = match self.jwt.validate_staff_token(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "Token is not a staff access token");
                return Ok(None);
            }
        };

        let account = self
            .directory
            .find_staff(claims.sub)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !account.is_active {
            tracing::warn!(staff_id = %account.id, "Chat auth rejected: staff account inactive");
            return Err(AuthError::AccountInactive);
        }
        if account.tenant_id != claims.org_id {
            tracing::warn!(
                staff_id = %account.id,
                token_org_id = %claims.org_id,
                account_org_id = %account.tenant_id,
                "Chat auth rejected: token organization does not match account"
            );
            return Err(AuthError::TenantMismatch);
        }

        Ok(Some(ClientIdentity::Staff {
            tenant_id: account.tenant_id,
            staff_id: account.id,
            role: account.role,
        }))
    }
}

/// Accepts short-lived anonymous chat-customer tokens
pub struct CustomerTokenValidator {
    jwt: JwtManager,
}

impl CustomerTokenValidator {
    pub fn new(jwt: JwtManager) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl IdentityValidator for CustomerTokenValidator {
    fn name(&self) -> &'static str {
        "chat_customer"
    }

    async fn validate(&self, token: &str) -> Result<Option<ClientIdentity>, AuthError> {
        match self.jwt.validate_customer_token(token) {
            Ok(claims) => Ok(Some(ClientIdentity::Customer {
                tenant_id: claims.tenant_id,
                customer_id: claims.sub,
            })),
            Err(e) => {
                tracing::debug!(error = %e, "Token is not a chat customer token");
                Ok(None)
            }
        }
    }
}

/// Ordered validator chain; first recognized token form wins
pub struct AuthResolver {
    validators: Vec<Box<dyn IdentityValidator>>,
}

impl AuthResolver {
    pub fn new(validators: Vec<Box<dyn IdentityValidator>>) -> Self {
        Self { validators }
    }

    /// Staff tokens first, then chat-customer tokens
    pub fn with_defaults(jwt: JwtManager, directory: Arc<dyn StaffDirectory>) -> Self {
        Self::new(vec![
            Box::new(StaffTokenValidator::new(jwt.clone(), directory)),
            Box::new(CustomerTokenValidator::new(jwt)),
        ])
    }

    pub async fn resolve(&self, token: &str) -> Result<ClientIdentity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        for validator in &self.validators {
            if let Some(identity) = validator.validate(token).await? {
                tracing::debug!(
                    validator = validator.name(),
                    tenant_id = %identity.tenant_id(),
                    "Chat token resolved"
                );
                return Ok(identity);
            }
        }

        Err(AuthError::InvalidToken)
    }
}
