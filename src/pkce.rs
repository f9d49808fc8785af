//! PKCE gate: store a challenge on first contact from an origin, check a
//! verifier against it afterwards.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use crate::db::PkceStore;

/// Upper bound on stored challenge and method lengths.
pub const MAX_FIELD_LEN: usize = 255;

const ENVELOPE_ERROR: &str =
    "You can provide either code_verifier or code_challenge and code_challenge_method";

/// Body of a PKCE-gated request. Exactly one mode is active per call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "PkceEnvelope")]
pub enum PkceRequest {
    /// Prove knowledge of the verifier behind a stored challenge.
    Check { code_verifier: String },
    /// Record a challenge for this origin.
    Store {
        code_challenge: String,
        code_challenge_method: String,
    },
}

/// Request body as received, before the mode is decided.
#[derive(Debug, Default, Deserialize)]
pub struct PkceEnvelope {
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl TryFrom<PkceEnvelope> for PkceRequest {
    type Error = String;

    fn try_from(raw: PkceEnvelope) -> Result<Self, Self::Error> {
        let verifier = non_empty(raw.code_verifier);
        let challenge = non_empty(raw.code_challenge);
        let method = non_empty(raw.code_challenge_method);

        match (verifier, challenge, method) {
            (Some(code_verifier), None, None) => Ok(PkceRequest::Check { code_verifier }),
            (None, Some(code_challenge), Some(code_challenge_method)) => {
                if code_challenge.len() > MAX_FIELD_LEN
                    || code_challenge_method.len() > MAX_FIELD_LEN
                {
                    return Err(format!(
                        "code_challenge and code_challenge_method must be at most {} characters",
                        MAX_FIELD_LEN
                    ));
                }
                Ok(PkceRequest::Store {
                    code_challenge,
                    code_challenge_method,
                })
            }
            _ => Err(ENVELOPE_ERROR.to_string()),
        }
    }
}

/// `BASE64URL-NOPAD(SHA-256(verifier))`
pub fn derive_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Errors from the PKCE gate.
#[derive(Debug)]
pub enum PkceError {
    /// The verifier does not match the stored challenge (or none is stored).
    Mismatch,
    /// The record store failed.
    Storage(sqlx::Error),
}

impl std::fmt::Display for PkceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PkceError::Mismatch => write!(f, "Incorrect code verifier"),
            PkceError::Storage(e) => write!(f, "PKCE storage error: {}", e),
        }
    }
}

impl std::error::Error for PkceError {}

/// Store-or-check protocol keyed by request origin.
#[derive(Clone)]
pub struct PkceGate {
    store: PkceStore,
}

impl PkceGate {
    pub fn new(store: PkceStore) -> Self {
        Self { store }
    }

    /// Run the gate in the mode selected by `request`.
    pub async fn check_or_store(
        &self,
        origin: &str,
        request: &PkceRequest,
    ) -> Result<(), PkceError> {
        match request {
            PkceRequest::Check { code_verifier } => self.check(origin, code_verifier).await,
            PkceRequest::Store {
                code_challenge,
                code_challenge_method,
            } => {
                let stored = self
                    .store
                    .insert_if_absent(origin, code_challenge, code_challenge_method)
                    .await
                    .map_err(PkceError::Storage)?;
                if stored {
                    info!(origin = %origin, "Stored PKCE challenge");
                } else {
                    // First writer wins.
                    debug!(origin = %origin, "PKCE challenge already stored for origin");
                }
                Ok(())
            }
        }
    }

    async fn check(&self, origin: &str, verifier: &str) -> Result<(), PkceError> {
        let record = self
            .store
            .get_by_host(origin)
            .await
            .map_err(PkceError::Storage)?
            .ok_or(PkceError::Mismatch)?;

        let derived = derive_challenge(verifier);
        if bool::from(derived.as_bytes().ct_eq(record.code_challenge.as_bytes())) {
            Ok(())
        } else {
            Err(PkceError::Mismatch)
        }
    }
}
