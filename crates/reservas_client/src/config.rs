use crate::bohemios::DEFAULT_BASE_URL;
use crate::{ChannelError, Credentials};
use secrecy::SecretString;

#[derive(Clone, Debug)]
pub struct Config {
    pub username: String,
    pub password: SecretString,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ChannelError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function, so tests never have to mutate the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, ChannelError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let username = get("BOHEMIOS_USERNAME")
            .ok_or_else(|| ChannelError::Config("BOHEMIOS_USERNAME missing".into()))?;
        let password = get("BOHEMIOS_PASSWORD")
            .ok_or_else(|| ChannelError::Config("BOHEMIOS_PASSWORD missing".into()))?;
        let base_url = get("BOHEMIOS_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        Ok(Self {
            username,
            password: SecretString::new(password.into()),
            base_url,
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }
}
