//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default vault location, relative to the working directory.
pub const DEFAULT_VAULT_PATH: &str = "./AI_Employee_Vault";

/// Default processor program.
pub const DEFAULT_PROCESSOR_CMD: &str = "python3";

/// Default processor entry point, run with `python3 -c`.
///
/// Reads one event from stdin, hands it to the vault's `WhatsAppProcessor`
/// (the vault root arrives as `sys.argv[1]`) and prints the result as JSON.
/// The module is resolved from the working directory.
pub const PROCESSOR_BOOTSTRAP: &str = r#"
import json
import sys

from src.processors.whatsapp_processor import WhatsAppProcessor

data = json.loads(sys.stdin.read())
processor = WhatsAppProcessor(sys.argv[1])
result = processor.process_message(data)
print(json.dumps(result))
"#;

/// Default upper bound on a single processor invocation.
pub const DEFAULT_HANDOFF_TIMEOUT: Duration = Duration::from_secs(120);

/// Default cap on concurrently running pipeline tasks.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Keyword vocabularies driving the classifier.
///
/// Matching is case-insensitive substring matching, so terms are stored
/// lowercased (see [`ClassifierConfig::normalized`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub urgent_terms: Vec<String>,
    pub business_terms: Vec<String>,
    pub casual_phrases: Vec<String>,
    /// Bodies shorter than this (in characters) are eligible for the casual drop.
    pub short_message_threshold: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            urgent_terms: words(&[
                "urgent",
                "asap",
                "emergency",
                "immediately",
                "critical",
                "invoice",
                "payment",
                "due",
                "overdue",
                "deadline",
            ]),
            business_terms: words(&[
                "invoice", "receipt", "contract", "payment", "proposal", "quote", "order",
                "delivery", "meeting", "project",
            ]),
            casual_phrases: words(&["hey", "hi", "hello", "ok", "yes", "no", "thanks"]),
            short_message_threshold: 20,
        }
    }
}

impl ClassifierConfig {
    /// Load vocabularies from a JSON file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(config.normalized())
    }

    /// Lowercase and trim every term, dropping empties.
    pub fn normalized(self) -> Self {
        Self {
            urgent_terms: normalize_terms(self.urgent_terms),
            business_terms: normalize_terms(self.business_terms),
            casual_phrases: normalize_terms(self.casual_phrases),
            short_message_threshold: self.short_message_threshold,
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| (*w).to_string()).collect()
}

fn normalize_terms(terms: Vec<String>) -> Vec<String> {
    terms
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Root of the vault the processor writes into.
    pub vault_path: PathBuf,
    /// Processor program to spawn per event.
    pub processor_cmd: String,
    /// Arguments passed before the vault root.
    pub processor_args: Vec<String>,
    /// Processor timeout; `None` waits indefinitely.
    pub handoff_timeout: Option<Duration>,
    /// Maximum pipeline runs in flight at once.
    pub max_in_flight: usize,
    /// Classifier vocabularies.
    pub classifier: ClassifierConfig,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            vault_path: PathBuf::from(DEFAULT_VAULT_PATH),
            processor_cmd: DEFAULT_PROCESSOR_CMD.to_string(),
            processor_args: vec!["-c".to_string(), PROCESSOR_BOOTSTRAP.to_string()],
            handoff_timeout: Some(DEFAULT_HANDOFF_TIMEOUT),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl WatcherConfig {
    /// Build configuration from `WHATSAPP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let vault_path = lookup("WHATSAPP_VAULT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.vault_path);

        let processor_cmd = lookup("WHATSAPP_PROCESSOR_CMD")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.processor_cmd);

        let processor_args = lookup("WHATSAPP_PROCESSOR_ARGS")
            .map(|s| split_args(&s))
            .unwrap_or(defaults.processor_args);

        let handoff_timeout = match lookup("WHATSAPP_HANDOFF_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = parse_value("WHATSAPP_HANDOFF_TIMEOUT_SECS", &raw)?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => defaults.handoff_timeout,
        };

        let max_in_flight = match lookup("WHATSAPP_MAX_IN_FLIGHT") {
            Some(raw) => {
                let n: usize = parse_value("WHATSAPP_MAX_IN_FLIGHT", &raw)?;
                if n == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "WHATSAPP_MAX_IN_FLIGHT".into(),
                        message: "must be at least 1".into(),
                    });
                }
                n
            }
            None => defaults.max_in_flight,
        };

        let classifier = match lookup("WHATSAPP_VOCABULARY_FILE") {
            Some(path) => ClassifierConfig::from_file(Path::new(&path))?,
            None => defaults.classifier,
        };

        Ok(Self {
            vault_path,
            processor_cmd,
            processor_args,
            handoff_timeout,
            max_in_flight,
            classifier,
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = WatcherConfig::from_vars(lookup(&[])).unwrap();
        assert_eq!(config.vault_path, PathBuf::from(DEFAULT_VAULT_PATH));
        assert_eq!(config.processor_cmd, "python3");
        assert_eq!(config.processor_args, vec!["-c", PROCESSOR_BOOTSTRAP]);
        assert_eq!(config.handoff_timeout, Some(DEFAULT_HANDOFF_TIMEOUT));
        assert_eq!(config.classifier.short_message_threshold, 20);
        assert!(config.classifier.urgent_terms.contains(&"asap".to_string()));
    }

    #[test]
    fn default_bootstrap_answers_on_stdout() {
        use std::process::{Command, Stdio};

        if Command::new("python3").arg("--version").output().is_err() {
            eprintln!("python3 not available, skipping");
            return;
        }

        let project = tempfile::tempdir().unwrap();
        let module_dir = project.path().join("src/processors");
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(project.path().join("src/__init__.py"), "").unwrap();
        std::fs::write(module_dir.join("__init__.py"), "").unwrap();
        std::fs::write(
            module_dir.join("whatsapp_processor.py"),
            concat!(
                "class WhatsAppProcessor:\n",
                "    def __init__(self, vault_path):\n",
                "        self.vault_path = vault_path\n",
                "    def process_message(self, data):\n",
                "        return {'success': True, 'vault': self.vault_path, 'body': data['body']}\n",
            ),
        )
        .unwrap();

        let config = WatcherConfig::default();
        let mut child = Command::new(&config.processor_cmd)
            .args(&config.processor_args)
            .arg("/srv/vault")
            .current_dir(project.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        child
            .stdin
            .take()
            .unwrap()
            .write_all(br#"{"body": "invoice due"}"#)
            .unwrap();
        let output = child.wait_with_output().unwrap();

        assert!(output.status.success());
        let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["vault"], "/srv/vault");
        assert_eq!(result["body"], "invoice due");
    }

    #[test]
    fn reads_overrides() {
        let config = WatcherConfig::from_vars(lookup(&[
            ("WHATSAPP_VAULT_PATH", "/srv/vault"),
            ("WHATSAPP_PROCESSOR_CMD", "node"),
            ("WHATSAPP_PROCESSOR_ARGS", "processor.js  --quiet"),
            ("WHATSAPP_MAX_IN_FLIGHT", "4"),
        ]))
        .unwrap();
        assert_eq!(config.vault_path, PathBuf::from("/srv/vault"));
        assert_eq!(config.processor_cmd, "node");
        assert_eq!(config.processor_args, vec!["processor.js", "--quiet"]);
        assert_eq!(config.max_in_flight, 4);
    }

    #[test]
    fn zero_timeout_disables() {
        let config =
            WatcherConfig::from_vars(lookup(&[("WHATSAPP_HANDOFF_TIMEOUT_SECS", "0")])).unwrap();
        assert!(config.handoff_timeout.is_none());
    }

    #[test]
    fn invalid_timeout_rejected() {
        let err = WatcherConfig::from_vars(lookup(&[("WHATSAPP_HANDOFF_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "WHATSAPP_HANDOFF_TIMEOUT_SECS"));
    }

    #[test]
    fn zero_in_flight_rejected() {
        let err =
            WatcherConfig::from_vars(lookup(&[("WHATSAPP_MAX_IN_FLIGHT", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn vocabulary_file_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"urgent_terms": ["  PRONTO "], "short_message_threshold": 10}}"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config =
            WatcherConfig::from_vars(lookup(&[("WHATSAPP_VOCABULARY_FILE", path.as_str())]))
                .unwrap();
        assert_eq!(config.classifier.urgent_terms, vec!["pronto"]);
        assert_eq!(config.classifier.short_message_threshold, 10);
        // untouched keys keep their defaults
        assert_eq!(
            config.classifier.business_terms,
            ClassifierConfig::default().business_terms
        );
    }

    #[test]
    fn vocabulary_file_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = ClassifierConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
