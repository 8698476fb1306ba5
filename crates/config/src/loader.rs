use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::ModelswitchConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "modelswitch.toml",
    "modelswitch.yaml",
    "modelswitch.yml",
    "modelswitch.json",
];

/// Explicit config directory set via `--config-dir`, overriding discovery.
static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Override the user-global config directory for the rest of the process.
pub fn set_config_dir(path: PathBuf) {
    let mut guard = CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(|e| e.into_inner());
    *guard = Some(path);
}

/// Drop a previously set config directory override.
pub fn clear_config_dir() {
    let mut guard = CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(|e| e.into_inner());
    *guard = None;
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<ModelswitchConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./modelswitch.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/modelswitch/modelswitch.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ModelswitchConfig::default()` if no config file is found or the
/// file fails to parse. Environment overrides are applied in both cases.
pub fn discover_and_load() -> ModelswitchConfig {
    let mut config = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                ModelswitchConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        ModelswitchConfig::default()
    };
    apply_env_overrides(&mut config);
    config
}

/// Apply `MODELSWITCH_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut ModelswitchConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(
    config: &mut ModelswitchConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(url) = lookup("MODELSWITCH_BACKEND_URL").filter(|v| !v.trim().is_empty()) {
        config.backend.base_url = url.trim().to_string();
    }
    if let Some(raw) = lookup("MODELSWITCH_POLL_INTERVAL") {
        match raw.trim().parse::<u64>() {
            Ok(secs) => config.polling.interval_secs = secs,
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid MODELSWITCH_POLL_INTERVAL"),
        }
    }
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/modelswitch/`), or the
/// override set with [`set_config_dir`].
pub fn config_dir() -> Option<PathBuf> {
    let guard = CONFIG_DIR_OVERRIDE
        .read()
        .unwrap_or_else(|e| e.into_inner());
    if let Some(dir) = guard.as_ref() {
        return Some(dir.clone());
    }
    directories::ProjectDirs::from("", "", "modelswitch").map(|d| d.config_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modelswitch.toml")
}

/// Serialize `config` to TOML and write it to `path`, creating parent
/// directories if needed.
pub fn save_config(config: &ModelswitchConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ModelswitchConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
