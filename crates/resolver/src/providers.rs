use std::collections::HashSet;

use {
    modelswitch_service_traits::{ApiKeyProvider, OAuthProviderOverview, RegistryModel},
    serde::Serialize,
    tracing::{debug, trace},
};

use crate::tables::{credential_type_config, registry_override};

/// A provider the user can actually select: it has live credentials and a
/// known way to look up its models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguredProvider {
    /// Selection identity: the OAuth provider type or the API-key provider id.
    pub key: String,
    pub label: String,
    /// Join key into [`RegistryModel::provider_id`].
    pub registry_id: String,
}

/// Merge OAuth overviews and API-key providers into the selectable list.
///
/// OAuth entries are folded in first, so on a key collision the OAuth entry
/// wins and the API-key provider is dropped. Output order is first-seen order.
#[must_use]
pub fn build_configured_providers(
    oauth: &[OAuthProviderOverview],
    api_key: &[ApiKeyProvider],
) -> Vec<ConfiguredProvider> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();

    for overview in oauth {
        let key = overview.provider_type.as_str();
        if overview.credential_count() == 0 {
            trace!(provider_type = key, "skipping oauth provider without credentials");
            continue;
        }
        let Some(config) = credential_type_config(key) else {
            trace!(provider_type = key, "skipping unknown oauth provider type");
            continue;
        };
        if !seen.insert(key) {
            continue;
        }
        out.push(ConfiguredProvider {
            key: key.to_string(),
            label: config.label.to_string(),
            registry_id: registry_override(key)
                .unwrap_or(config.registry_id)
                .to_string(),
        });
    }

    for provider in api_key {
        let key = provider.id.as_str();
        if !provider.enabled || provider.api_key_count == 0 {
            trace!(
                provider = key,
                enabled = provider.enabled,
                api_key_count = provider.api_key_count,
                "skipping unusable api-key provider"
            );
            continue;
        }
        if !seen.insert(key) {
            trace!(provider = key, "api-key provider shadowed by an earlier entry");
            continue;
        }
        out.push(ConfiguredProvider {
            key: key.to_string(),
            label: provider.name.clone(),
            registry_id: registry_override(key).unwrap_or(key).to_string(),
        });
    }

    debug!(
        oauth = oauth.len(),
        api_key = api_key.len(),
        configured = out.len(),
        "rebuilt configured providers"
    );
    out
}

/// Registry models owned by `provider`, in registry order.
#[must_use]
pub fn models_for_provider(
    registry: &[RegistryModel],
    provider: &ConfiguredProvider,
) -> Vec<RegistryModel> {
    registry
        .iter()
        .filter(|m| m.provider_id == provider.registry_id)
        .cloned()
        .collect()
}
