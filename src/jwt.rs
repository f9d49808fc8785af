//! Signed session token minting and verification.
//!
//! One `TokenCodec` exists per token kind, each holding its own secret, so a
//! token minted for one kind never verifies as the other.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::clock::Clock;

/// Claim carrying the subject identifier.
pub const SUBJECT_CLAIM: &str = "id";

/// Claim carrying the expiration instant (Unix seconds).
pub const EXPIRY_CLAIM: &str = "exp";

/// Which secret a codec signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Short-lived token proving recent authentication.
    Access,
    /// Long-lived token used only to mint new access tokens.
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Decoded token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user UUID as a string)
    pub id: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Any other claims, carried verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// The claims as a payload suitable for re-minting. `exp` is left out.
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = self.extra.clone();
        payload.insert(SUBJECT_CLAIM.to_string(), Value::String(self.id.clone()));
        payload
    }
}

/// Outcome of verifying a token. Expired, forged and malformed tokens all
/// collapse into `Invalid`; the cause is only logged.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenVerdict {
    Valid(Claims),
    Invalid,
}

impl TokenVerdict {
    pub fn into_claims(self) -> Option<Claims> {
        match self {
            TokenVerdict::Valid(claims) => Some(claims),
            TokenVerdict::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, TokenVerdict::Valid(_))
    }
}

/// Signs and verifies tokens of a single kind.
#[derive(Clone)]
pub struct TokenCodec {
    kind: TokenKind,
    header: Header,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(
        kind: TokenKind,
        secret: &[u8],
        algorithm: Algorithm,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut validation = Validation::new(algorithm);
        // Expiry is checked against our own clock in `decode`.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&[EXPIRY_CLAIM]);

        Self {
            kind,
            header: Header::new(algorithm),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            clock,
        }
    }

    /// Mint a token from a claims payload.
    ///
    /// The payload must contain `id`; a non-string id is stringified. Any
    /// `exp` in the payload is discarded and replaced with `now + lifetime`.
    pub fn mint(
        &self,
        mut payload: Map<String, Value>,
        lifetime: Duration,
    ) -> Result<String, JwtError> {
        let id = match payload.remove(SUBJECT_CLAIM) {
            Some(Value::String(id)) => id,
            Some(Value::Null) | None => return Err(JwtError::MissingSubject),
            Some(other) => other.to_string(),
        };
        payload.remove(EXPIRY_CLAIM);

        let claims = Claims {
            id,
            exp: self.clock.now().saturating_add(lifetime.as_secs()),
            extra: payload,
        };

        jsonwebtoken::encode(&self.header, &claims, &self.encoding_key).map_err(JwtError::Encoding)
    }

    /// Mint a token carrying only the subject id.
    pub fn mint_subject(&self, subject: &str, lifetime: Duration) -> Result<String, JwtError> {
        let mut payload = Map::new();
        payload.insert(SUBJECT_CLAIM.to_string(), Value::String(subject.to_string()));
        self.mint(payload, lifetime)
    }

    /// Verify a token's signature and expiry.
    pub fn verify(&self, token: &str) -> TokenVerdict {
        match self.decode(token) {
            Ok(claims) => TokenVerdict::Valid(claims),
            Err(JwtError::Expired) => {
                debug!(kind = self.kind.as_str(), "Token expired");
                TokenVerdict::Invalid
            }
            Err(e) => {
                warn!(kind = self.kind.as_str(), error = %e, "Token rejected");
                TokenVerdict::Invalid
            }
        }
    }

    fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(JwtError::Decoding)?;

        if self.clock.now() >= data.claims.exp {
            return Err(JwtError::Expired);
        }

        Ok(data.claims)
    }
}

/// Errors that can occur during token operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token (malformed or bad signature)
    Decoding(jsonwebtoken::errors::Error),
    /// Token is past its `exp`
    Expired,
    /// Payload had no `id` claim
    MissingSubject,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::Expired => write!(f, "Token expired"),
            JwtError::MissingSubject => write!(f, "Missing subject claim"),
        }
    }
}

impl std::error::Error for JwtError {}
