//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Rule file name, looked up under the mail root.
pub const RULES_FILE_NAME: &str = "notmuch-filter.json";

/// Store database location relative to the mail root.
pub const DEFAULT_DB_RELATIVE_PATH: &str = ".mail-retag/index.db";

/// Tag selecting the messages a run classifies.
pub const DEFAULT_SOURCE_TAG: &str = "new";

/// Runtime configuration for one retag run.
#[derive(Debug, Clone)]
pub struct RetagConfig {
    /// Root of the mail store (`<base>/Maildir`).
    pub mail_root: PathBuf,
    /// JSON rule stream.
    pub rules_path: PathBuf,
    /// libSQL database holding messages and tags.
    pub db_path: PathBuf,
    /// Number of classification workers.
    pub pool_size: usize,
    /// Messages carrying this tag are classified.
    pub source_tag: String,
}

impl RetagConfig {
    /// Build a config rooted at `mail_root` with every other value defaulted.
    pub fn with_mail_root(mail_root: impl Into<PathBuf>) -> Self {
        let mail_root = mail_root.into();
        Self {
            rules_path: mail_root.join(RULES_FILE_NAME),
            db_path: mail_root.join(DEFAULT_DB_RELATIVE_PATH),
            mail_root,
            pool_size: default_pool_size(),
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
        }
    }

    /// Load configuration from the process environment.
    ///
    /// `MAILTAG_HOME` overrides the base directory, falling back to `HOME`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = lookup("MAILTAG_HOME")
            .filter(|s| !s.is_empty())
            .or_else(|| lookup("HOME").filter(|s| !s.is_empty()))
            .ok_or_else(|| ConfigError::MissingEnvVar("HOME".to_string()))?;

        let mut config = Self::with_mail_root(PathBuf::from(base).join("Maildir"));

        if let Some(rules) = lookup("MAILTAG_RULES").filter(|s| !s.is_empty()) {
            config.rules_path = PathBuf::from(rules);
        }

        if let Some(db) = lookup("MAILTAG_DB_PATH").filter(|s| !s.is_empty()) {
            config.db_path = PathBuf::from(db);
        }

        if let Some(workers) = lookup("MAILTAG_WORKERS") {
            config.pool_size = match workers.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                Ok(_) => {
                    return Err(ConfigError::InvalidValue {
                        key: "MAILTAG_WORKERS".into(),
                        message: "must be at least 1".into(),
                    });
                }
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        key: "MAILTAG_WORKERS".into(),
                        message: e.to_string(),
                    });
                }
            };
        }

        if let Some(tag) = lookup("MAILTAG_SOURCE_TAG") {
            let tag = tag.trim();
            if tag.is_empty() || tag.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidValue {
                    key: "MAILTAG_SOURCE_TAG".into(),
                    message: format!("{tag:?} is not a single tag name"),
                });
            }
            config.source_tag = tag.to_string();
        }

        Ok(config)
    }
}

/// One worker per core plus one to absorb file I/O latency.
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        + 1
}
