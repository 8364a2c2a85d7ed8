//! API-key vault collaborator.
//!
//! The executor only reads credentials; it never writes them back.

use std::collections::HashMap;

use crate::collaborators::http::{AuthOptions, AuthType};
use crate::error::TierError;

/// The user on whose behalf a credential is looked up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiCredential {
    pub service: String,
    pub key: String,
    pub auth_type: AuthType,
    pub header_name: Option<String>,
}

impl ApiCredential {
    /// A bearer-token credential.
    pub fn bearer(service: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            key: key.into(),
            auth_type: AuthType::Bearer,
            header_name: None,
        }
    }
}

#[async_trait::async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn get_api_key(
        &self,
        service: &str,
        user: &UserContext,
    ) -> Result<Option<ApiCredential>, TierError>;

    fn create_auth_config(&self, credential: &ApiCredential) -> AuthOptions {
        AuthOptions {
            auth_type: credential.auth_type,
            credential: credential.key.clone(),
            header_name: credential.header_name.clone(),
        }
    }
}

/// In-memory credentials, optionally scoped per user.
#[derive(Default)]
pub struct StaticCredentialResolver {
    shared: HashMap<String, ApiCredential>,
    per_user: HashMap<(String, String), ApiCredential>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credential available to every user.
    pub fn with_key(mut self, credential: ApiCredential) -> Self {
        self.shared.insert(credential.service.clone(), credential);
        self
    }

    /// Credential for a single user; takes precedence over a shared one.
    pub fn with_user_key(mut self, user_id: impl Into<String>, credential: ApiCredential) -> Self {
        self.per_user
            .insert((user_id.into(), credential.service.clone()), credential);
        self
    }
}

#[async_trait::async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn get_api_key(
        &self,
        service: &str,
        user: &UserContext,
    ) -> Result<Option<ApiCredential>, TierError> {
        let scoped = self
            .per_user
            .get(&(user.user_id.clone(), service.to_string()));
        Ok(scoped.or_else(|| self.shared.get(service)).cloned())
    }
}

/// Credentials from environment variables named `<prefix><SERVICE>`.
///
/// `TIERED_API_KEY_WEATHER_API=...` serves the `weather-api` service as a
/// bearer token.
pub struct EnvCredentialResolver {
    prefix: String,
}

impl EnvCredentialResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(&self, service: &str) -> String {
        let normalized: String = service
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.prefix, normalized)
    }
}

impl Default for EnvCredentialResolver {
    fn default() -> Self {
        Self::new("TIERED_API_KEY_")
    }
}

#[async_trait::async_trait]
impl CredentialResolver for EnvCredentialResolver {
    async fn get_api_key(
        &self,
        service: &str,
        _user: &UserContext,
    ) -> Result<Option<ApiCredential>, TierError> {
        Ok(std::env::var(self.var_name(service))
            .ok()
            .filter(|k| !k.is_empty())
            .map(|key| ApiCredential::bearer(service, key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_user_key_wins_over_shared() {
        let resolver = StaticCredentialResolver::new()
            .with_key(ApiCredential::bearer("weather", "shared"))
            .with_user_key("alice", ApiCredential::bearer("weather", "alice-key"));

        let alice = resolver
            .get_api_key("weather", &UserContext::new("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice.key, "alice-key");

        let bob = resolver
            .get_api_key("weather", &UserContext::new("bob"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bob.key, "shared");

        assert!(resolver
            .get_api_key("maps", &UserContext::new("bob"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_env_resolver_reads_normalized_variable() {
        let resolver = EnvCredentialResolver::new("TIERED_TEST_KEY_");
        assert_eq!(resolver.var_name("weather-api"), "TIERED_TEST_KEY_WEATHER_API");

        std::env::set_var("TIERED_TEST_KEY_WEATHER_API", "sk-123");
        let cred = resolver
            .get_api_key("weather-api", &UserContext::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.key, "sk-123");
        assert_eq!(resolver.create_auth_config(&cred).auth_type, AuthType::Bearer);
        std::env::remove_var("TIERED_TEST_KEY_WEATHER_API");
    }
}
