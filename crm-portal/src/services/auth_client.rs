use crate::config::BackendSettings;
use crate::models::Identity;
use crate::utils::jwt::decode_jwt_claims;
use crm_core::observability::TracedClientExt;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthClientError {
    #[error("Auth request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Auth provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid access token: {0}")]
    InvalidToken(anyhow::Error),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client for the backend service's auth endpoints (the auth provider).
pub struct AuthClient {
    client: Client,
    settings: BackendSettings,
}

impl AuthClient {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.settings.url
    }

    /// Send a POST to the auth API with trace context propagation.
    async fn post(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, AuthClientError> {
        let url = format!("{}/auth/v1{}", self.settings.url.trim_end_matches('/'), path);
        let anon_key = self.settings.anon_key.expose_secret();

        let response = self
            .client
            .traced_post(&url)
            .header("apikey", anon_key.as_str())
            .bearer_auth(bearer.unwrap_or(anon_key.as_str()))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send POST request to {}: {}", url, e);
                AuthClientError::Transport(e)
            })?;

        Ok(response)
    }

    async fn rejected(response: reqwest::Response) -> AuthClientError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        AuthClientError::Rejected { status, body }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthClientError> {
        let response = self
            .post(
                "/token?grant_type=password",
                None,
                serde_json::json!({ "email": email, "password": password }),
            )
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                return Err(AuthClientError::InvalidCredentials);
            }
            _ => return Err(Self::rejected(response).await),
        }

        let tokens: TokenResponse = response.json().await?;
        let claims = decode_jwt_claims(&tokens.access_token).map_err(AuthClientError::InvalidToken)?;

        Ok(Identity {
            user_id: claims.sub,
            email: claims.email,
            access_token: tokens.access_token,
        })
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthClientError> {
        let response = self
            .post(
                "/signup",
                None,
                serde_json::json!({ "email": email, "password": password }),
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(())
    }

    /// Revokes the session behind `access_token`.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), AuthClientError> {
        let response = self
            .post("/logout", Some(access_token), serde_json::json!({}))
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose, Engine as _};
    use secrecy::Secret;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AuthClient {
        AuthClient::new(BackendSettings {
            url: server.uri(),
            anon_key: Secret::new("anon".to_string()),
        })
    }

    fn token_for(sub: &str, email: &str) -> String {
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(
            json!({ "sub": sub, "email": email, "exp": 9999999999i64, "iat": 1736500000 })
                .to_string(),
        );
        format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", payload)
    }

    #[tokio::test]
    async fn sign_in_returns_identity_from_token() {
        let server = MockServer::start().await;
        let user_id = "0b7e7f4c-3f7a-4f62-9a57-7d4b8f6f1a01";
        let token = token_for(user_id, "jane@acme.io");

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "anon"))
            .and(body_json(json!({ "email": "jane@acme.io", "password": "pw" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token,
                "refresh_token": "refresh-1"
            })))
            .mount(&server)
            .await;

        let identity = client(&server).sign_in("jane@acme.io", "pw").await.unwrap();
        assert_eq!(identity.user_id.to_string(), user_id);
        assert_eq!(identity.email, "jane@acme.io");
        assert_eq!(identity.access_token, token);
    }

    #[tokio::test]
    async fn bad_credentials_are_reported_as_such() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
            .mount(&server)
            .await;

        let err = client(&server).sign_in("jane@acme.io", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthClientError::InvalidCredentials));
    }

    #[tokio::test]
    async fn sign_out_uses_user_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).sign_out("user-token").await.unwrap();
    }
}
