//! JWT token generation and validation
//!
//! Two token forms share one signing key but are distinguished by the
//! `token_type` claim and by their claim shape, so a token can only ever
//! satisfy one of the validators.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Claims carried by a staff access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffClaims {
    /// Subject (staff user ID)
    pub sub: Uuid,
    /// Organization (tenant) ID
    pub org_id: Uuid,
    /// Staff role within the organization
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub token_type: TokenType,
    /// JWT ID (jti) for session tracking and revocation
    pub jti: String,
}

/// Claims carried by a short-lived anonymous chat-customer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCustomerClaims {
    /// Subject (chat customer ID)
    pub sub: Uuid,
    /// Tenant the customer is chatting with
    pub tenant_id: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    ChatCustomer,
}

/// JWT manager for token operations
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_hours: i64,
    chat_token_expiry_minutes: i64,
}

impl JwtManager {
    /// Create a new JWT manager
    pub fn new(secret: &str, access_token_expiry_hours: i64, chat_token_expiry_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expiry_hours,
            chat_token_expiry_minutes,
        }
    }

    /// Generate a staff access token, returning the token and its JTI
    pub fn generate_staff_token(
        &self,
        staff_id: Uuid,
        org_id: Uuid,
        role: &str,
    ) -> Result<(String, String), JwtError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + Duration::hours(self.access_token_expiry_hours);
        let jti = Uuid::new_v4().to_string();

        let claims = StaffClaims {
            sub: staff_id,
            org_id,
            role: role.to_string(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            token_type: TokenType::Access,
            jti: jti.clone(),
        };

        let token = self.sign(&claims)?;
        Ok((token, jti))
    }

    /// Generate a chat-customer token for an anonymous shopper
    pub fn generate_customer_token(&self, customer_id: Uuid, tenant_id: Uuid) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + Duration::minutes(self.chat_token_expiry_minutes);

        let claims = ChatCustomerClaims {
            sub: customer_id,
            tenant_id,
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            token_type: TokenType::ChatCustomer,
        };

        self.sign(&claims)
    }

    /// Validate a staff access token
    pub fn validate_staff_token(&self, token: &str) -> Result<StaffClaims, JwtError> {
        let claims: StaffClaims = self.decode(token)?;
        if claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Validate a chat-customer token
    pub fn validate_customer_token(&self, token: &str) -> Result<ChatCustomerClaims, JwtError> {
        let claims: ChatCustomerClaims = self.decode(token)?;
        if claims.token_type != TokenType::ChatCustomer {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        // Explicit algorithm prevents algorithm confusion attacks
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Wrong token type")]
    WrongTokenType,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}
