//! Issuing and verifying session resumption tokens.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::session::SessionId;
use crate::Result;

/// Claim set carried by a resumption token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Session identity in string form.
    pub sub: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: u64,
    /// Expires-at, fixed offset from `iat`.
    pub exp: u64,
    /// Issuing server name.
    pub iss: String,
}

/// Signs and verifies session identity assertions.
///
/// Tokens are HS256 JWTs signed with a server-held secret. They are not
/// stored server-side; validity is re-derived on each presentation from the
/// signature and expiry. A token carries no capability beyond "claims to be
/// session X" - the registry lookup is the actual authority check.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    header: Header,
    issuer: String,
    ttl: Duration,
}

impl TokenService {
    /// Create a service signing with `secret`, stamping `issuer`, with
    /// tokens valid for `ttl` after issuance.
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl: Duration) -> Self {
        let issuer = issuer.into();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        // No clock leeway: an expired token is expired.
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            header: Header::new(Algorithm::HS256),
            issuer,
            ttl,
        }
    }

    /// Issue a fresh token asserting `subject`.
    pub fn issue(&self, subject: SessionId) -> Result<String> {
        let iat = unix_now();
        let claims = Claims {
            sub: subject.to_string(),
            iat,
            exp: iat + self.ttl.as_secs(),
            iss: self.issuer.clone(),
        };
        encode(&self.header, &claims, &self.encoding)
            .map_err(|e| RelayError::TokenSigning(e.to_string()))
    }

    /// Verify a presented token and extract the claimed session identity.
    ///
    /// Any failure (bad signature, malformed token, expired, wrong issuer,
    /// unparseable subject) maps to [`RelayError::InvalidToken`].
    pub fn verify(&self, token: &str) -> Result<SessionId> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| RelayError::InvalidToken(e.to_string()))?;
        data.claims.sub.parse()
    }

    /// Token lifetime applied at issuance.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
