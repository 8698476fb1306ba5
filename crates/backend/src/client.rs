//! HTTP client for the local backend.

use std::time::Duration;

use {
    async_trait::async_trait,
    modelswitch_config::BackendConfig,
    modelswitch_service_traits::{
        ApiKeyProvider, DefaultProvider, OAuthProviderOverview, ProviderBackend, RegistryModel,
        ServiceResult,
    },
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, de::DeserializeOwned},
    tracing::{debug, warn},
    url::Url,
};

use crate::error::{Error, Result};

const PROVIDER_POOL_OVERVIEW_PATH: &str = "api/provider-pool/overview";
const API_KEY_PROVIDERS_PATH: &str = "api/api-key-providers";
const MODEL_REGISTRY_PATH: &str = "api/models/registry";
const DEFAULT_PROVIDER_PATH: &str = "api/default-provider";

/// List endpoints answer with either a bare array or `{ "data": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListBody<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Wrapped { data: items } => items,
        }
    }
}

/// [`ProviderBackend`] backed by the backend's JSON API.
pub struct HttpProviderBackend {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<Secret<String>>,
}

impl HttpProviderBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: normalize_base_url(&config.base_url)?,
            api_key: config.api_key.clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path)?;
        let mut request = self.client.get(url.clone());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "backend request failed");
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        debug!(url = %url, bytes = body.len(), "backend response");
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        Ok(self.get_json::<ListBody<T>>(path).await?.into_vec())
    }
}

/// Parse the base URL and make sure relative joins append to its path.
fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::message(format!(
            "unsupported backend URL scheme: {}",
            url.scheme()
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait]
impl ProviderBackend for HttpProviderBackend {
    async fn provider_pool_overview(&self) -> ServiceResult<Vec<OAuthProviderOverview>> {
        Ok(self.get_list(PROVIDER_POOL_OVERVIEW_PATH).await?)
    }

    async fn api_key_providers(&self) -> ServiceResult<Vec<ApiKeyProvider>> {
        Ok(self.get_list(API_KEY_PROVIDERS_PATH).await?)
    }

    async fn model_registry(&self) -> ServiceResult<Vec<RegistryModel>> {
        Ok(self.get_list(MODEL_REGISTRY_PATH).await?)
    }

    async fn default_provider(&self) -> ServiceResult<DefaultProvider> {
        Ok(self.get_json(DEFAULT_PROVIDER_PATH).await?)
    }
}

/// Fetch the server default, turning every failure into
/// [`DefaultProvider::NoDefault`] so the initial provider choice can proceed.
pub async fn fetch_default_provider_terminal(backend: &dyn ProviderBackend) -> DefaultProvider {
    match backend.default_provider().await {
        Ok(default) => {
            debug!(default = default.as_key().unwrap_or("<none>"), "server default provider");
            default
        },
        Err(e) => {
            warn!(error = %e, "failed to fetch default provider, continuing without one");
            DefaultProvider::NoDefault
        },
    }
}
