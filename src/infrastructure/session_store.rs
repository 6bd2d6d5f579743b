use crate::domain::models::Session;
use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

pub trait SessionStore: Send + Sync {
    fn save_session(&self, session: &Session) -> Result<(), InfraError>;
    fn load_session(&self) -> Result<Option<Session>, InfraError>;
    fn delete_session(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    service_name: String,
    account_name: String,
}

impl KeyringSessionStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringSessionStore {
    fn default() -> Self {
        Self::new("focusdesk.session", "default")
    }
}

impl SessionStore for KeyringSessionStore {
    fn save_session(&self, session: &Session) -> Result<(), InfraError> {
        let payload = serde_json::to_string(session)
            .map_err(|error| InfraError::Credential(error.to_string()))?;
        self.entry()?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_session(&self) -> Result<Option<Session>, InfraError> {
        let payload = match self.entry()?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(error) => return Err(InfraError::Credential(error.to_string())),
        };

        // An unreadable entry is treated as signed out rather than a hard failure.
        Ok(serde_json::from_str::<Session>(&payload).ok())
    }

    fn delete_session(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl InMemorySessionStore {
    fn with_guard<T>(&self, action: impl FnOnce(&mut Option<Session>) -> T) -> Result<T, InfraError> {
        let mut guard = self
            .session
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(action(&mut guard))
    }
}

impl SessionStore for InMemorySessionStore {
    fn save_session(&self, session: &Session) -> Result<(), InfraError> {
        self.with_guard(|slot| *slot = Some(session.clone()))
    }

    fn load_session(&self) -> Result<Option<Session>, InfraError> {
        self.with_guard(|slot| slot.clone())
    }

    fn delete_session(&self) -> Result<(), InfraError> {
        self.with_guard(|slot| *slot = None)
    }
}
