//! Configuration validation.
//!
//! Validates TOML configuration against the known schema, flags
//! unknown/misspelled fields, and reports semantic problems.

use std::{collections::HashMap, path::Path};

use crate::schema::ModelswitchConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "value", "security", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "polling.interval_secs"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

const BACKEND_FIELDS: &[&str] = &["base_url", "api_key", "request_timeout_secs"];
const POLLING_FIELDS: &[&str] = &["interval_secs", "registry_refresh_secs"];
const SELECTION_FIELDS: &[&str] = &["state_file", "provider", "model"];

/// Known field names per section. Every section is a flat table of scalars.
fn known_sections() -> HashMap<&'static str, &'static [&'static str]> {
    HashMap::from([
        ("backend", BACKEND_FIELDS),
        ("polling", POLLING_FIELDS),
        ("selection", SELECTION_FIELDS),
    ])
}

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

fn unknown_field(path: String, key: &str, candidates: &[&str]) -> Diagnostic {
    let message = match suggest(key, candidates, 3) {
        Some(hint) => format!("unknown field \"{key}\" (did you mean \"{hint}\"?)"),
        None => format!("unknown field \"{key}\""),
    };
    Diagnostic {
        severity: Severity::Warning,
        category: "unknown-field",
        path,
        message,
    }
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    match std::fs::read_to_string(actual_path) {
        Ok(content) => {
            let content = crate::env_subst::substitute_env(&content);
            let is_toml = actual_path
                .extension()
                .and_then(|e| e.to_str())
                .is_none_or(|ext| ext == "toml");
            let mut result = if is_toml {
                validate_toml_str(&content)
            } else {
                validate_other_format(&content, actual_path)
            };
            result.config_path = Some(actual_path.clone());
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: Some(actual_path.clone()),
        },
    }
}

/// Validate a TOML string without file-system side effects.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&toml_value, &mut diagnostics);

    match toml::from_str::<ModelswitchConfig>(toml_str) {
        Ok(config) => diagnostics.extend(validate_config(&config)),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// YAML and JSON get semantic checks only; unknown-key detection is TOML-only.
fn validate_other_format(content: &str, path: &Path) -> ValidationResult {
    let diagnostics = match crate::loader::parse_config(content, path) {
        Ok(config) => validate_config(&config),
        Err(e) => vec![Diagnostic {
            severity: Severity::Error,
            category: "syntax",
            path: String::new(),
            message: format!("failed to parse config: {e}"),
        }],
    };
    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(value: &toml::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_table() else {
        return;
    };
    let sections = known_sections();
    let mut section_names: Vec<&str> = sections.keys().copied().collect();
    section_names.sort_unstable();

    for (key, child) in root {
        let Some(fields) = sections.get(key.as_str()) else {
            diagnostics.push(unknown_field(key.clone(), key, &section_names));
            continue;
        };
        let Some(table) = child.as_table() else {
            continue;
        };
        for field in table.keys() {
            if !fields.contains(&field.as_str()) {
                diagnostics.push(unknown_field(format!("{key}.{field}"), field, fields));
            }
        }
    }
}

/// Semantic checks on an already-parsed config.
#[must_use]
pub fn validate_config(config: &ModelswitchConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    match url::Url::parse(&config.backend.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {},
        Ok(url) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "value",
            path: "backend.base_url".into(),
            message: format!("unsupported scheme \"{}\"", url.scheme()),
        }),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "value",
            path: "backend.base_url".into(),
            message: format!("invalid URL \"{}\": {e}", config.backend.base_url),
        }),
    }

    if config.backend.request_timeout_secs == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "value",
            path: "backend.request_timeout_secs".into(),
            message: "request timeout must be at least 1 second".into(),
        });
    }

    if config.polling.interval_secs == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "value",
            path: "polling.interval_secs".into(),
            message: "polling interval must be at least 1 second".into(),
        });
    }

    if config.polling.registry_refresh_secs < config.polling.interval_secs {
        diagnostics.push(Diagnostic {
            severity: Severity::Info,
            category: "value",
            path: "polling.registry_refresh_secs".into(),
            message: "registry refresh is shorter than the polling interval; it will run every poll"
                .into(),
        });
    }

    if config.backend.api_key.is_none() && !config.backend.is_loopback() {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "security",
            path: "backend.api_key".into(),
            message: format!(
                "no api_key configured for non-local backend {}",
                config.backend.base_url
            ),
        });
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("polling", "poling"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn empty_config_is_valid() {
        let result = validate_toml_str("");
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 0);
    }

    #[test]
    fn syntax_error_detected() {
        let result = validate_toml_str("this is not valid toml [[[");
        assert!(result.has_errors());
        assert!(result.diagnostics.iter().any(|d| d.category == "syntax"));
    }

    #[test]
    fn unknown_section_with_suggestion() {
        let result = validate_toml_str("[poling]\ninterval_secs = 3\n");
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(diag.path, "poling");
        assert!(diag.message.contains("did you mean \"polling\""));
    }

    #[test]
    fn unknown_nested_field_with_suggestion() {
        let result = validate_toml_str("[backend]\nbase_ur = \"http://127.0.0.1:1\"\n");
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(diag.path, "backend.base_ur");
        assert!(diag.message.contains("base_url"));
    }

    #[test]
    fn type_error_detected() {
        let result = validate_toml_str("[polling]\ninterval_secs = \"fast\"\n");
        assert!(result.diagnostics.iter().any(|d| d.category == "type-error"));
    }

    #[test]
    fn zero_interval_is_error() {
        let result = validate_toml_str("[polling]\ninterval_secs = 0\n");
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "polling.interval_secs")
        );
    }

    #[test]
    fn bad_base_url_is_error() {
        let result = validate_toml_str("[backend]\nbase_url = \"::nope\"\n");
        assert!(result.has_errors());

        let result = validate_toml_str("[backend]\nbase_url = \"ftp://127.0.0.1\"\n");
        assert!(result.diagnostics.iter().any(|d| d.message.contains("ftp")));
    }

    #[test]
    fn remote_backend_without_key_warned() {
        let result = validate_toml_str("[backend]\nbase_url = \"https://relay.example.com\"\n");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "security" && d.severity == Severity::Warning)
        );

        let result = validate_toml_str(
            "[backend]\nbase_url = \"https://relay.example.com\"\napi_key = \"k\"\n",
        );
        assert!(!result.diagnostics.iter().any(|d| d.category == "security"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = validate(Some(Path::new("/nonexistent/modelswitch.toml")));
        assert!(result.has_errors());
        assert!(result.config_path.is_some());
    }

    #[test]
    fn yaml_file_gets_semantic_checks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelswitch.yaml");
        std::fs::write(&path, "polling:\n  interval_secs: 0\n").unwrap();
        let result = validate(Some(&path));
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "polling.interval_secs")
        );

        std::fs::write(&path, "polling: [unclosed\n").unwrap();
        let result = validate(Some(&path));
        assert!(result.diagnostics.iter().any(|d| d.category == "syntax"));
    }
}
