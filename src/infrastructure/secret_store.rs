use crate::infrastructure::error::InfraError;
use std::collections::HashMap;
use std::sync::Mutex;

pub trait SecretStore: Send + Sync {
    fn save_secret(&self, name: &str, value: &str) -> Result<(), InfraError>;
    fn load_secret(&self, name: &str) -> Result<Option<String>, InfraError>;
    fn delete_secret(&self, name: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct KeyringSecretStore {
    service_name: String,
}

impl KeyringSecretStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new("taskpilot.secrets")
    }
}

impl SecretStore for KeyringSecretStore {
    fn save_secret(&self, name: &str, value: &str) -> Result<(), InfraError> {
        self.entry(name)?
            .set_password(value)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_secret(&self, name: &str) -> Result<Option<String>, InfraError> {
        match self.entry(name)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }

    fn delete_secret(&self, name: &str) -> Result<(), InfraError> {
        match self.entry(name)?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl SecretStore for InMemorySecretStore {
    fn save_secret(&self, name: &str, value: &str) -> Result<(), InfraError> {
        let mut secrets = self
            .secrets
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        secrets.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn load_secret(&self, name: &str) -> Result<Option<String>, InfraError> {
        let secrets = self
            .secrets
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(secrets.get(name).cloned())
    }

    fn delete_secret(&self, name: &str) -> Result<(), InfraError> {
        let mut secrets = self
            .secrets
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        secrets.remove(name);
        Ok(())
    }
}
