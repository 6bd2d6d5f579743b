use crate::domain::clock::NowProvider;
use crate::domain::models::Session;
use crate::infrastructure::auth_client::{AuthHttpClient, AuthTokenResponse};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_store::SessionStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;

const SESSION_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureSessionResult {
    Existing(Session),
    Refreshed(Session),
    SignInRequired,
}

impl EnsureSessionResult {
    pub fn into_session(self) -> Option<Session> {
        match self {
            Self::Existing(session) | Self::Refreshed(session) => Some(session),
            Self::SignInRequired => None,
        }
    }
}

pub struct AuthManager<S, C>
where
    S: SessionStore + ?Sized,
    C: AuthHttpClient + ?Sized,
{
    session_store: Arc<S>,
    auth_client: Arc<C>,
    now_provider: NowProvider,
    changes: watch::Sender<Option<Session>>,
}

impl<S, C> AuthManager<S, C>
where
    S: SessionStore + ?Sized,
    C: AuthHttpClient + ?Sized,
{
    pub fn new(session_store: Arc<S>, auth_client: Arc<C>) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            session_store,
            auth_client,
            now_provider: Arc::new(Utc::now),
            changes,
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.changes.subscribe()
    }

    pub fn is_session_valid(&self, session: &Session) -> bool {
        session.is_valid_at((self.now_provider)(), SESSION_LEEWAY_SECONDS)
    }

    pub fn current_session(&self) -> Result<Option<Session>, InfraError> {
        self.session_store.load_session()
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, InfraError> {
        let email = validate_credentials(email, password)?;
        let Some(response) = self.auth_client.sign_up(&email, password).await? else {
            return Ok(None);
        };
        let session = self.session_from_response(response, None);
        self.store(&session)?;
        Ok(Some(session))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, InfraError> {
        let email = validate_credentials(email, password)?;
        let response = self.auth_client.sign_in_with_password(&email, password).await?;
        let session = self.session_from_response(response, None);
        self.store(&session)?;
        Ok(session)
    }

    pub async fn ensure_session(&self) -> Result<EnsureSessionResult, InfraError> {
        let Some(stored) = self.session_store.load_session()? else {
            return Ok(EnsureSessionResult::SignInRequired);
        };

        if self.is_session_valid(&stored) {
            return Ok(EnsureSessionResult::Existing(stored));
        }

        let Some(refresh_token) = stored.refresh_token.clone() else {
            self.clear_local()?;
            return Ok(EnsureSessionResult::SignInRequired);
        };

        match self.auth_client.refresh_session(&refresh_token).await {
            Ok(response) => {
                let session = self.session_from_response(response, stored.refresh_token.clone());
                self.store(&session)?;
                Ok(EnsureSessionResult::Refreshed(session))
            }
            Err(InfraError::Unauthorized(_)) => {
                self.clear_local()?;
                Ok(EnsureSessionResult::SignInRequired)
            }
            Err(error) => Err(error),
        }
    }

    pub async fn sign_out(&self) -> Result<(), InfraError> {
        let remote = match self.session_store.load_session()? {
            Some(session) => self.auth_client.sign_out(&session.access_token).await,
            None => Ok(()),
        };
        self.clear_local()?;
        remote
    }

    pub fn clear_local(&self) -> Result<(), InfraError> {
        self.session_store.delete_session()?;
        self.changes.send_replace(None);
        Ok(())
    }

    fn store(&self, session: &Session) -> Result<(), InfraError> {
        self.session_store.save_session(session)?;
        self.changes.send_replace(Some(session.clone()));
        Ok(())
    }

    fn session_from_response(&self, response: AuthTokenResponse, fallback_refresh_token: Option<String>) -> Session {
        Session {
            user_id: response.user_id,
            email: response.email,
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expires_at: (self.now_provider)() + Duration::seconds(response.expires_in.max(0)),
        }
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<String, InfraError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(InfraError::Validation("email must be a valid address".to_string()));
    }
    if password.is_empty() {
        return Err(InfraError::Validation("password must not be empty".to_string()));
    }
    Ok(email.to_string())
}
