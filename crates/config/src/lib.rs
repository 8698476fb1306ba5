//! Configuration loading, validation, and env substitution.
//!
//! Config files: `modelswitch.toml`, `modelswitch.yaml`, or `modelswitch.json`
//! Searched in `./` then `~/.config/modelswitch/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values. With the
//! `file-watcher` feature, [`watcher::ConfigWatcher`] reports edits to the
//! active file so long-running commands can reload it.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;
#[cfg(feature = "file-watcher")]
pub mod watcher;

pub use {
    loader::{
        apply_env_overrides, clear_config_dir, config_dir, discover_and_load,
        find_or_default_config_path, load_config, save_config, set_config_dir,
    },
    schema::{BackendConfig, ModelswitchConfig, PollingConfig, SelectionConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
