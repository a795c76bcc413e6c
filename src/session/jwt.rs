//! Unverified JWT payload decode, for local expiry bookkeeping only.
//!
//! This is NOT an authentication check. The token is minted by the controller
//! over the already-authenticated channel and the client holds no signing
//! keys to verify against; all we need from the payload is the `exp` claim so
//! renewal can happen before the controller starts rejecting calls.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JwtDecodeError {
    #[error("token is not a three-part JWT")]
    MalformedToken,
    #[error("token payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("token payload has no numeric `exp` claim")]
    MissingExp,
}

/// Decode the `exp` claim (epoch seconds) from a JWT without verifying its
/// signature.
pub fn decode_exp_unverified(token: &str) -> Result<u64, JwtDecodeError> {
    let payload_b64 = token
        .split('.')
        .nth(1)
        .filter(|_| token.split('.').count() == 3)
        .ok_or(JwtDecodeError::MalformedToken)?;

    let payload = URL_SAFE_NO_PAD.decode(payload_b64.trim_end_matches('='))?;
    let claims: serde_json::Value = serde_json::from_slice(&payload)?;

    claims
        .get("exp")
        .and_then(serde_json::Value::as_u64)
        .ok_or(JwtDecodeError::MissingExp)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an unsigned test token with the given claims object.
    pub(crate) fn fake_token(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn decodes_exp_claim() {
        let token = fake_token(&serde_json::json!({"exp": 1_900_000_000u64, "sub": "admin"}));
        assert_eq!(decode_exp_unverified(&token).unwrap(), 1_900_000_000);
    }

    #[test]
    fn rejects_token_without_exp() {
        let token = fake_token(&serde_json::json!({"sub": "admin"}));
        assert!(matches!(
            decode_exp_unverified(&token),
            Err(JwtDecodeError::MissingExp)
        ));
    }

    #[test]
    fn rejects_two_part_token() {
        assert!(matches!(
            decode_exp_unverified("header.payload"),
            Err(JwtDecodeError::MalformedToken)
        ));
    }

    #[test]
    fn rejects_garbage_payload() {
        assert!(decode_exp_unverified("aaa.!!!not-base64!!!.ccc").is_err());
    }

    #[test]
    fn accepts_padded_payload() {
        // Some issuers emit padded base64url; trailing '=' must not break decode.
        let claims = serde_json::json!({"exp": 42u64});
        let payload = base64::engine::general_purpose::URL_SAFE.encode(claims.to_string());
        let token = format!("h.{payload}.s");
        assert_eq!(decode_exp_unverified(&token).unwrap(), 42);
    }
}
