use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct JwtClaims {
    pub sub: Uuid,
    pub email: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Decode JWT claims without validation.
///
/// The token is received directly from the auth provider over TLS in response
/// to the user's own credentials, and is only used to read `sub`/`email` for
/// the session. Every backend call re-validates it.
pub fn decode_jwt_claims(token: &str) -> Result<JwtClaims> {
    let parts: Vec<&str> = token.split('.').collect();

    if parts.len() != 3 {
        return Err(anyhow::anyhow!("Invalid JWT format"));
    }

    let payload = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| anyhow::anyhow!("Failed to decode JWT payload: {}", e))?;

    let claims: JwtClaims = serde_json::from_slice(&payload)
        .map_err(|e| anyhow::anyhow!("Failed to parse JWT claims: {}", e))?;

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(payload: serde_json::Value) -> String {
        format!(
            "eyJhbGciOiJIUzI1NiJ9.{}.signature",
            general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    #[test]
    fn test_decode_jwt_claims() {
        let token = encode(serde_json::json!({
            "sub": "0b7e7f4c-3f7a-4f62-9a57-7d4b8f6f1a01",
            "email": "test@example.com",
            "exp": 9999999999i64,
            "iat": 1736500000,
            "role": "authenticated"
        }));

        let claims = decode_jwt_claims(&token).unwrap();
        assert_eq!(claims.sub.to_string(), "0b7e7f4c-3f7a-4f62-9a57-7d4b8f6f1a01");
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.role.as_deref(), Some("authenticated"));
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(decode_jwt_claims("not-a-jwt").is_err());
        assert!(decode_jwt_claims("a.%%%.c").is_err());

        let non_uuid_sub = encode(serde_json::json!({ "sub": "user_123", "email": "x@y.z", "exp": 1 }));
        assert!(decode_jwt_claims(&non_uuid_sub).is_err());
    }
}
