//! API key lookup and storage.

use std::collections::BTreeMap;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{Error, Result};

/// Environment variable consulted first.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const PROVIDER: &str = "openai";
const DEFAULT_KEY: &str = "default";
const GITIGNORE_ENTRY: &str = "\n# API Keys\n**/secrets.json\nsecrets.json\n";

/// Where a key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// The [`API_KEY_ENV`] environment variable.
    Environment,
    /// The agent's `secrets.json`.
    SecretsFile,
}

/// The contents of `secrets.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secrets {
    /// Always `openai`.
    #[serde(default)]
    pub provider: String,
    /// Keys by model id, plus `default`.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

impl Secrets {
    /// The key for `model`, falling back to the default key.
    pub fn key_for(&self, model: &str) -> Option<&str> {
        self.keys
            .get(model)
            .or_else(|| self.keys.get(DEFAULT_KEY))
            .map(String::as_str)
            .filter(|k| !k.is_empty())
    }
}

/// Find a key without prompting: the environment first, then `secrets`.
pub fn resolve_api_key(secrets: &Path, model: &str) -> Option<(String, KeySource)> {
    let from_env = env::var(API_KEY_ENV).ok();
    resolve_from(from_env, secrets, model)
}

fn resolve_from(
    from_env: Option<String>,
    secrets: &Path,
    model: &str,
) -> Option<(String, KeySource)> {
    if let Some(key) = from_env.filter(|k| !k.trim().is_empty()) {
        info!("Using API key from environment variable");
        return Some((key, KeySource::Environment));
    }
    if !secrets.exists() {
        return None;
    }
    match read_secrets(secrets) {
        Ok(stored) => {
            let key = stored.key_for(model)?.to_string();
            info!("Using API key from secrets file");
            Some((key, KeySource::SecretsFile))
        }
        Err(err) => {
            error!("Error reading secrets file: {err}");
            None
        }
    }
}

fn read_secrets(path: &Path) -> Result<Secrets> {
    let raw = fs::read_to_string(path)
        .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Store `key` as both the default and the `model` key, and make sure
/// `gitignore` excludes secrets files.
pub fn save_api_key(secrets: &Path, gitignore: &Path, model: &str, key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::validation(
            "API key is required",
            Some("api_key".to_string()),
        ));
    }
    let mut keys = BTreeMap::new();
    keys.insert(DEFAULT_KEY.to_string(), key.to_string());
    keys.insert(model.to_string(), key.to_string());
    let stored = Secrets {
        provider: PROVIDER.to_string(),
        keys,
    };
    if let Some(parent) = secrets.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| Error::io(format!("failed to create {}", parent.display()), err))?;
    }
    let body = serde_json::to_string_pretty(&stored)?;
    fs::write(secrets, body)
        .map_err(|err| Error::io(format!("failed to write {}", secrets.display()), err))?;
    ensure_gitignored(gitignore)?;
    info!("API key saved (length: {})", key.len());
    Ok(())
}

fn ensure_gitignored(gitignore: &Path) -> Result<()> {
    let existing = if gitignore.exists() {
        fs::read_to_string(gitignore)
            .map_err(|err| Error::io(format!("failed to read {}", gitignore.display()), err))?
    } else {
        String::new()
    };
    if existing.contains("secrets.json") {
        return Ok(());
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(gitignore)
        .map_err(|err| Error::io(format!("failed to open {}", gitignore.display()), err))?;
    file.write_all(GITIGNORE_ENTRY.as_bytes())
        .map_err(|err| Error::io(format!("failed to write {}", gitignore.display()), err))
}

/// Show enough of `key` to recognize it: `sk-p...yz`, or `***` for short keys.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 6 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking() {
        assert_eq!(mask_key("sk-proj-abcdefyz"), "sk-p...yz");
        assert_eq!(mask_key("abcdefg"), "abcd...fg");
        assert_eq!(mask_key("abcdef"), "***");
        assert_eq!(mask_key(""), "***");
    }

    #[test]
    fn environment_wins() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().join("secrets.json");
        save_api_key(&secrets, &dir.path().join(".gitignore"), "gpt-5", "from-file").unwrap();
        let (key, source) = resolve_from(Some("from-env".into()), &secrets, "gpt-5").unwrap();
        assert_eq!(key, "from-env");
        assert_eq!(source, KeySource::Environment);
        let (key, source) = resolve_from(Some("  ".into()), &secrets, "gpt-5").unwrap();
        assert_eq!(key, "from-file");
        assert_eq!(source, KeySource::SecretsFile);
    }

    #[test]
    fn model_key_then_default() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().join("secrets.json");
        fs::write(
            &secrets,
            r#"{"provider":"openai","keys":{"default":"d","gpt-5-mini":"m"}}"#,
        )
        .unwrap();
        assert_eq!(resolve_from(None, &secrets, "gpt-5-mini").unwrap().0, "m");
        assert_eq!(resolve_from(None, &secrets, "gpt-5").unwrap().0, "d");
    }

    #[test]
    fn missing_or_corrupt_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().join("secrets.json");
        assert!(resolve_from(None, &secrets, "gpt-5").is_none());
        fs::write(&secrets, "not json").unwrap();
        assert!(resolve_from(None, &secrets, "gpt-5").is_none());
    }

    #[test]
    fn save_writes_keys_and_gitignore_once() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().join("agents/a/secrets.json");
        let gitignore = dir.path().join(".gitignore");
        fs::write(&gitignore, "target/\n").unwrap();
        save_api_key(&secrets, &gitignore, "gpt-5-nano", "sk-123456").unwrap();
        save_api_key(&secrets, &gitignore, "gpt-5-nano", "sk-123456").unwrap();

        let stored: Secrets = serde_json::from_str(&fs::read_to_string(&secrets).unwrap()).unwrap();
        assert_eq!(stored.provider, "openai");
        assert_eq!(stored.keys["default"], "sk-123456");
        assert_eq!(stored.keys["gpt-5-nano"], "sk-123456");

        let ignore = fs::read_to_string(&gitignore).unwrap();
        assert!(ignore.starts_with("target/\n"));
        assert_eq!(ignore.matches("**/secrets.json").count(), 1);
    }

    #[test]
    fn empty_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_api_key(
            &dir.path().join("secrets.json"),
            &dir.path().join(".gitignore"),
            "gpt-5",
            "  ",
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
