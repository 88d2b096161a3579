use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

/// Fixed lifetime of every session token.
pub const SESSION_TTL: Duration = Duration::minutes(30);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature mismatch")]
    SignatureInvalid,
    #[error("token expired")]
    Expired,
}

/// Holds the HS256 signing and verification keys with issuer data.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl TokenService {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }

    pub fn issue(&self, user_id: i64) -> anyhow::Result<String> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, user_id: i64, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + SESSION_TTL;
        let claims = Claims {
            user_id,
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Checks signature, issuer and audience, then expiry against `now`.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked below against the supplied clock
        validation.validate_exp = false;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            let err = match e.kind() {
                ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
                _ => TokenError::Malformed,
            };
            debug!(error = %e, "jwt rejected");
            err
        })?;

        if now.unix_timestamp() > data.claims.exp {
            debug!(user_id = data.claims.user_id, "jwt expired");
            return Err(TokenError::Expired);
        }

        debug!(user_id = data.claims.user_id, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> TokenService {
        TokenService::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
        })
    }

    #[test]
    fn sign_and_verify_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let token = keys.issue(42).expect("sign");
        assert_eq!(token.split('.').count(), 3);

        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn token_valid_at_29_minutes_and_expired_at_31() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let t0 = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let token = keys.issue_at(7, t0).unwrap();

        let claims = keys
            .verify_at(&token, t0 + Duration::minutes(29))
            .expect("still valid");
        assert_eq!(claims.user_id, 7);

        let err = keys
            .verify_at(&token, t0 + Duration::minutes(31))
            .unwrap_err();
        assert_eq!(err, TokenError::Expired);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.issue(1).unwrap();
        let mut parts: Vec<String> = token.split('.').map(str::to_owned).collect();

        // swap one payload character for another valid base64url character
        let mut payload: Vec<char> = parts[1].chars().collect();
        let idx = payload.len() / 2;
        payload[idx] = if payload[idx] == 'A' { 'B' } else { 'A' };
        parts[1] = payload.into_iter().collect();

        assert!(keys.verify(&parts.join(".")).is_err());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.issue(1).unwrap();
        let (head, sig) = token.rsplit_once('.').unwrap();
        let mut sig: Vec<char> = sig.chars().collect();
        sig[0] = if sig[0] == 'A' { 'B' } else { 'A' };
        let forged = format!("{}.{}", head, sig.into_iter().collect::<String>());

        assert_eq!(keys.verify(&forged).unwrap_err(), TokenError::SignatureInvalid);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let ours = make_keys("secret-a", "iss", "aud");
        let theirs = make_keys("secret-b", "iss", "aud");
        let token = theirs.issue(1).unwrap();
        assert_eq!(ours.verify(&token).unwrap_err(), TokenError::SignatureInvalid);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.issue(1).expect("sign");
        assert!(bad_keys.verify(&token).is_err());
    }

    #[test]
    fn garbage_is_malformed() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert_eq!(keys.verify("not-a-jwt").unwrap_err(), TokenError::Malformed);
    }
}
