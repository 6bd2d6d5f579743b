use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_client::{http_error, network_error, UnconfiguredRemote};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub user_id: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait AuthHttpClient: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<AuthTokenResponse>, InfraError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthTokenResponse, InfraError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthTokenResponse, InfraError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SupabaseAuthClient {
    client: Client,
    base_url: Url,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct AuthUserPayload {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthSessionPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: Option<AuthUserPayload>,
    // Sign-up without a session returns the bare user object.
    id: Option<String>,
    email: Option<String>,
}

impl AuthSessionPayload {
    fn into_response(self) -> Option<AuthTokenResponse> {
        let access_token = self.access_token.filter(|token| !token.trim().is_empty())?;
        let user = self.user?;
        Some(AuthTokenResponse {
            access_token,
            refresh_token: self.refresh_token,
            expires_in: self.expires_in.unwrap_or(0).max(0),
            user_id: user.id,
            email: user.email,
        })
    }
}

impl SupabaseAuthClient {
    pub fn new(base_url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            anon_key: anon_key.into(),
        }
    }

    fn endpoint(&self, path: &str, grant_type: Option<&str>) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::InvalidConfig("remote url cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("auth");
            segments.push("v1");
            segments.push(path);
        }
        if let Some(grant_type) = grant_type {
            url.query_pairs_mut().append_pair("grant_type", grant_type);
        }
        Ok(url)
    }

    async fn post_json(
        &self,
        url: Url,
        bearer: Option<&str>,
        body: serde_json::Value,
        context: &str,
    ) -> Result<String, InfraError> {
        let mut request = self.client.post(url).header("apikey", &self.anon_key).json(&body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|error| network_error(context, error))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| network_error(context, error))?;
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(InfraError::Unauthorized(format!("{context}: {text}")));
        }
        if !status.is_success() {
            return Err(http_error(context, status, &text));
        }
        Ok(text)
    }

    fn parse_session(text: &str, context: &str) -> Result<AuthSessionPayload, InfraError> {
        serde_json::from_str(text)
            .map_err(|error| InfraError::Remote(format!("invalid {context} payload: {error}; body={text}")))
    }
}

#[async_trait]
impl AuthHttpClient for SupabaseAuthClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<AuthTokenResponse>, InfraError> {
        let url = self.endpoint("signup", None)?;
        let text = self
            .post_json(
                url,
                None,
                serde_json::json!({ "email": email, "password": password }),
                "signing up",
            )
            .await?;
        let payload = Self::parse_session(&text, "sign-up")?;
        if payload.access_token.is_none() && payload.id.is_none() && payload.email.is_none() {
            return Err(InfraError::Remote(format!("unexpected sign-up payload: {text}")));
        }
        Ok(payload.into_response())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthTokenResponse, InfraError> {
        let url = self.endpoint("token", Some("password"))?;
        let text = self
            .post_json(
                url,
                None,
                serde_json::json!({ "email": email, "password": password }),
                "signing in",
            )
            .await?;
        Self::parse_session(&text, "sign-in")?
            .into_response()
            .ok_or_else(|| InfraError::Remote("sign-in response did not include a session".to_string()))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthTokenResponse, InfraError> {
        let url = self.endpoint("token", Some("refresh_token"))?;
        let text = self
            .post_json(
                url,
                None,
                serde_json::json!({ "refresh_token": refresh_token }),
                "refreshing session",
            )
            .await?;
        Self::parse_session(&text, "refresh")?
            .into_response()
            .ok_or_else(|| InfraError::Remote("refresh response did not include a session".to_string()))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), InfraError> {
        let url = self.endpoint("logout", None)?;
        self.post_json(url, Some(access_token), serde_json::json!({}), "signing out")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuthHttpClient for UnconfiguredRemote {
    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Option<AuthTokenResponse>, InfraError> {
        Err(self.error())
    }

    async fn sign_in_with_password(&self, _email: &str, _password: &str) -> Result<AuthTokenResponse, InfraError> {
        Err(self.error())
    }

    async fn refresh_session(&self, _refresh_token: &str) -> Result<AuthTokenResponse, InfraError> {
        Err(self.error())
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), InfraError> {
        Err(self.error())
    }
}
