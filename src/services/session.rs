//! HS256 session tokens
//!
//! Tokens are compact JWTs: `base64url(header).base64url(claims).base64url(mac)`
//! with an HMAC-SHA256 signature over the first two segments.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::User;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies session tokens with the server secret
#[derive(Clone)]
pub struct SessionKeys {
    secret: Vec<u8>,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Internal(format!("Invalid session secret: {}", e)))
    }

    /// Issues a token for `user`; returns it with its expiry
    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> AppResult<(String, DateTime<Utc>)> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };

        let signing_input = format!(
            "{}.{}",
            encode_segment(&header)?,
            encode_segment(&claims)?
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok((format!("{}.{}", signing_input, signature), expires_at))
    }

    /// Checks signature, algorithm and expiry
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> AppResult<Claims> {
        let invalid = || AppError::Unauthorized("Invalid session token".to_string());

        let mut segments = token.split('.');
        let (header_b64, claims_b64, signature_b64) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(h), Some(c), Some(s), None) => (h, c, s),
                _ => return Err(invalid()),
            };

        let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|_| invalid())?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let header: Header = decode_segment(header_b64).ok_or_else(invalid)?;
        if header.alg != ALGORITHM {
            return Err(invalid());
        }

        let claims: Claims = decode_segment(claims_b64).ok_or_else(invalid)?;
        let expires_at = Utc.timestamp_opt(claims.exp, 0).single().ok_or_else(invalid)?;
        if expires_at <= now {
            return Err(AppError::Unauthorized("Session expired".to_string()));
        }

        Ok(claims)
    }
}

fn encode_segment<T: Serialize>(value: &T) -> AppResult<String> {
    let json = serde_json::to_vec(value)
        .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Option<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}
