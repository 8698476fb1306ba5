//! Collaborator interfaces consumed by the resolver.
//!
//! The credential pool, API-key provider list, model registry, and server
//! default all live in an external backend. This crate fixes the data shapes
//! that backend hands us and the async trait used to fetch them, plus a
//! `Noop` implementation that returns empty data so callers can run without a
//! backend wired in.

use {
    async_trait::async_trait,
    serde::{Deserialize, Deserializer, Serialize},
    serde_json::Value,
    tracing::debug,
};

/// Error type returned by backend methods.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{message}")]
    Message { message: String },
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

impl ServiceError {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }
}

impl From<String> for ServiceError {
    fn from(value: String) -> Self {
        Self::message(value)
    }
}

impl From<&str> for ServiceError {
    fn from(value: &str) -> Self {
        Self::message(value)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// ── Data shapes ─────────────────────────────────────────────────────────────

/// Credentials held by the OAuth credential pool for one provider type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthProviderOverview {
    pub provider_type: String,
    /// Credential records are opaque here; only their count matters.
    #[serde(default)]
    pub credentials: Vec<Value>,
}

impl OAuthProviderOverview {
    #[must_use]
    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }
}

/// A user-configured provider authenticated by API key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyProvider {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key_count: u32,
}

/// One entry in the model registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryModel {
    pub id: String,
    pub provider_id: String,
}

impl RegistryModel {
    pub fn new(id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_id: provider_id.into(),
        }
    }
}

/// The server-declared default provider, once its fetch has settled.
///
/// There is no "pending" variant: callers model an unsettled fetch as
/// `Option::<DefaultProvider>::None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DefaultProvider {
    Resolved(String),
    NoDefault,
}

impl DefaultProvider {
    /// Build from a raw wire value; blank strings mean "no default".
    #[must_use]
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(key) if !key.is_empty() => Self::Resolved(key.to_string()),
            _ => Self::NoDefault,
        }
    }

    #[must_use]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Resolved(key) => Some(key),
            Self::NoDefault => None,
        }
    }
}

impl<'de> Deserialize<'de> for DefaultProvider {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Field spellings in precedence order; the first non-blank one wins.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Bare(Option<String>),
            Wrapped {
                #[serde(default)]
                provider: Option<String>,
                #[serde(default)]
                default_provider: Option<String>,
                #[serde(default, rename = "defaultProvider")]
                default_provider_camel: Option<String>,
            },
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Bare(raw) => Self::from_raw(raw.as_deref()),
            Wire::Wrapped {
                provider,
                default_provider,
                default_provider_camel,
            } => [provider, default_provider, default_provider_camel]
                .into_iter()
                .map(|raw| Self::from_raw(raw.as_deref()))
                .find(|d| d.as_key().is_some())
                .unwrap_or(Self::NoDefault),
        })
    }
}

// ── Backend ─────────────────────────────────────────────────────────────────

/// Read-only access to the backend that owns credentials and the registry.
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    async fn provider_pool_overview(&self) -> ServiceResult<Vec<OAuthProviderOverview>>;
    async fn api_key_providers(&self) -> ServiceResult<Vec<ApiKeyProvider>>;
    async fn model_registry(&self) -> ServiceResult<Vec<RegistryModel>>;
    async fn default_provider(&self) -> ServiceResult<DefaultProvider>;
}

pub struct NoopProviderBackend;

#[async_trait]
impl ProviderBackend for NoopProviderBackend {
    async fn provider_pool_overview(&self) -> ServiceResult<Vec<OAuthProviderOverview>> {
        Ok(Vec::new())
    }

    async fn api_key_providers(&self) -> ServiceResult<Vec<ApiKeyProvider>> {
        Ok(Vec::new())
    }

    async fn model_registry(&self) -> ServiceResult<Vec<RegistryModel>> {
        Ok(Vec::new())
    }

    async fn default_provider(&self) -> ServiceResult<DefaultProvider> {
        debug!("provider backend not configured, reporting no default provider");
        Ok(DefaultProvider::NoDefault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_provider_accepts_bare_string() {
        let d: DefaultProvider = serde_json::from_str("\"kiro\"").unwrap();
        assert_eq!(d, DefaultProvider::Resolved("kiro".into()));
    }

    #[test]
    fn default_provider_accepts_null_and_blank() {
        let d: DefaultProvider = serde_json::from_str("null").unwrap();
        assert_eq!(d, DefaultProvider::NoDefault);
        let d: DefaultProvider = serde_json::from_str("\"  \"").unwrap();
        assert_eq!(d, DefaultProvider::NoDefault);
    }

    #[test]
    fn default_provider_accepts_wrapped_object() {
        let d: DefaultProvider = serde_json::from_str(r#"{"provider": "gemini"}"#).unwrap();
        assert_eq!(d.as_key(), Some("gemini"));
        let d: DefaultProvider =
            serde_json::from_str(r#"{"defaultProvider": "qwen"}"#).unwrap();
        assert_eq!(d.as_key(), Some("qwen"));
        let d: DefaultProvider = serde_json::from_str(r#"{"provider": null}"#).unwrap();
        assert_eq!(d, DefaultProvider::NoDefault);
    }

    #[test]
    fn default_provider_field_precedence_is_fixed() {
        let d: DefaultProvider =
            serde_json::from_str(r#"{"provider": "a", "default_provider": "b"}"#).unwrap();
        assert_eq!(d.as_key(), Some("a"));
        let d: DefaultProvider =
            serde_json::from_str(r#"{"defaultProvider": "c", "default_provider": "b"}"#).unwrap();
        assert_eq!(d.as_key(), Some("b"));
        let d: DefaultProvider =
            serde_json::from_str(r#"{"provider": " ", "defaultProvider": "c"}"#).unwrap();
        assert_eq!(d.as_key(), Some("c"));
    }

    #[test]
    fn default_provider_rejects_numbers() {
        assert!(serde_json::from_str::<DefaultProvider>("42").is_err());
    }

    #[test]
    fn overview_tolerates_missing_credentials() {
        let o: OAuthProviderOverview =
            serde_json::from_str(r#"{"provider_type": "kiro"}"#).unwrap();
        assert_eq!(o.credential_count(), 0);
    }

    #[test]
    fn api_key_provider_defaults_to_disabled() {
        let p: ApiKeyProvider =
            serde_json::from_str(r#"{"id": "deepseek", "name": "DeepSeek"}"#).unwrap();
        assert!(!p.enabled);
        assert_eq!(p.api_key_count, 0);
    }

    #[tokio::test]
    async fn noop_backend_is_empty() {
        let backend = NoopProviderBackend;
        assert!(backend.provider_pool_overview().await.unwrap().is_empty());
        assert!(backend.api_key_providers().await.unwrap().is_empty());
        assert!(backend.model_registry().await.unwrap().is_empty());
        assert_eq!(
            backend.default_provider().await.unwrap(),
            DefaultProvider::NoDefault
        );
    }
}
