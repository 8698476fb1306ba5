/// Config schema types (backend connection, polling cadence, selection persistence).
use std::path::{Path, PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelswitchConfig {
    pub backend: BackendConfig,
    pub polling: PollingConfig,
    pub selection: SelectionConfig,
}

/// Connection to the local backend that owns the credential pool,
/// API-key providers, and model registry.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend. Defaults to "http://127.0.0.1:8999".
    pub base_url: String,

    /// Bearer token sent with every request (optional).
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl PartialEq for BackendConfig {
    fn eq(&self, other: &Self) -> bool {
        self.base_url == other.base_url
            && self.request_timeout_secs == other.request_timeout_secs
            && self.api_key.as_ref().map(|k| k.expose_secret())
                == other.api_key.as_ref().map(|k| k.expose_secret())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8999".into(),
            api_key: None,
            request_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    /// Whether `base_url` points at the local machine.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .is_some_and(|host| matches!(host.as_str(), "127.0.0.1" | "localhost" | "[::1]"))
    }
}

/// How often the credential pool and API-key providers are re-fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    /// The model registry changes rarely; it is re-fetched on this slower cadence.
    pub registry_refresh_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            registry_refresh_secs: 300,
        }
    }
}

/// Where the active provider/model selection lives between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// JSON file holding the selection. Defaults to `<config_dir>/selection.json`.
    pub state_file: Option<PathBuf>,
    /// Initial provider key when no persisted selection exists.
    pub provider: Option<String>,
    /// Initial model when no persisted selection exists.
    pub model: Option<String>,
}

impl SelectionConfig {
    /// `state_file` with a leading `~` expanded to the home directory.
    #[must_use]
    pub fn state_file_path(&self) -> Option<PathBuf> {
        let home = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf());
        self.state_file
            .as_deref()
            .map(|path| expand_tilde(path, home.as_deref()))
    }
}

fn expand_tilde(path: &Path, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return path.to_path_buf();
    };
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg: ModelswitchConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.backend.base_url, "http://127.0.0.1:8999");
        assert_eq!(cfg.backend.request_timeout_secs, 10);
        assert_eq!(cfg.polling.interval_secs, 5);
        assert_eq!(cfg.polling.registry_refresh_secs, 300);
        assert!(cfg.selection.state_file.is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let cfg: ModelswitchConfig = toml::from_str(
            r#"
[backend]
api_key = "sk-very-secret"
"#,
        )
        .unwrap();
        let rendered = format!("{:?}", cfg.backend);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("sk-very-secret"));
    }

    #[test]
    fn api_key_round_trips_through_toml() {
        let mut cfg = ModelswitchConfig::default();
        cfg.backend.api_key = Some(Secret::new("token".into()));
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("api_key = \"token\""));
    }

    #[test]
    fn backend_equality_compares_api_key() {
        let mut a = BackendConfig::default();
        let mut b = BackendConfig::default();
        assert_eq!(a, b);
        a.api_key = Some(Secret::new("one".into()));
        assert_ne!(a, b);
        b.api_key = Some(Secret::new("one".into()));
        assert_eq!(a, b);
        b.api_key = Some(Secret::new("two".into()));
        assert_ne!(a, b);
    }

    #[test]
    fn tilde_in_state_file_expands_to_home() {
        let home = Path::new("/home/ada");
        assert_eq!(
            expand_tilde(Path::new("~/.state/selection.json"), Some(home)),
            PathBuf::from("/home/ada/.state/selection.json")
        );
        assert_eq!(expand_tilde(Path::new("~"), Some(home)), PathBuf::from("/home/ada"));
        assert_eq!(
            expand_tilde(Path::new("/var/lib/selection.json"), Some(home)),
            PathBuf::from("/var/lib/selection.json")
        );
        assert_eq!(
            expand_tilde(Path::new("~/x.json"), None),
            PathBuf::from("~/x.json")
        );
    }

    #[test]
    fn loopback_detection() {
        let mut backend = BackendConfig::default();
        assert!(backend.is_loopback());
        backend.base_url = "http://localhost:3000".into();
        assert!(backend.is_loopback());
        backend.base_url = "https://backend.example.com".into();
        assert!(!backend.is_loopback());
        backend.base_url = "not a url".into();
        assert!(!backend.is_loopback());
    }
}
