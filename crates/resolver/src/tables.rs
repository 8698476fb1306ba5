//! Static provider lookup tables.

/// Display label and registry join key for an OAuth credential type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialTypeConfig {
    pub provider_type: &'static str,
    pub label: &'static str,
    pub registry_id: &'static str,
}

/// OAuth provider-type tags the credential pool may report.
pub const CREDENTIAL_TYPES: &[CredentialTypeConfig] = &[
    CredentialTypeConfig {
        provider_type: "kiro",
        label: "Kiro",
        registry_id: "anthropic",
    },
    CredentialTypeConfig {
        provider_type: "claude_oauth",
        label: "Claude OAuth",
        registry_id: "anthropic",
    },
    CredentialTypeConfig {
        provider_type: "claude",
        label: "Claude",
        registry_id: "anthropic",
    },
    CredentialTypeConfig {
        provider_type: "gemini",
        label: "Gemini OAuth",
        registry_id: "gemini",
    },
    CredentialTypeConfig {
        provider_type: "gemini_api_key",
        label: "Gemini API Key",
        registry_id: "gemini",
    },
    CredentialTypeConfig {
        provider_type: "antigravity",
        label: "Antigravity",
        registry_id: "gemini",
    },
    CredentialTypeConfig {
        provider_type: "vertex",
        label: "Vertex AI",
        registry_id: "gemini",
    },
    CredentialTypeConfig {
        provider_type: "qwen",
        label: "Qwen",
        registry_id: "alibaba",
    },
    CredentialTypeConfig {
        provider_type: "codex",
        label: "Codex",
        registry_id: "openai",
    },
    CredentialTypeConfig {
        provider_type: "openai",
        label: "OpenAI",
        registry_id: "openai",
    },
    CredentialTypeConfig {
        provider_type: "iflow",
        label: "iFlow",
        registry_id: "iflow",
    },
];

/// API-key provider ids whose models are listed under a different registry id.
pub const REGISTRY_OVERRIDES: &[(&str, &str)] = &[
    ("google", "gemini"),
    ("dashscope", "alibaba"),
    ("zhipu", "zhipuai"),
    ("moonshot", "moonshotai"),
    ("azure-openai", "openai"),
    ("openrouter-anthropic", "anthropic"),
];

#[must_use]
pub fn credential_type_config(provider_type: &str) -> Option<&'static CredentialTypeConfig> {
    CREDENTIAL_TYPES
        .iter()
        .find(|c| c.provider_type == provider_type)
}

#[must_use]
pub fn registry_override(provider_id: &str) -> Option<&'static str> {
    REGISTRY_OVERRIDES
        .iter()
        .find(|(id, _)| *id == provider_id)
        .map(|(_, registry_id)| *registry_id)
}
