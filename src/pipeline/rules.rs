//! User-defined tagging rules.
//!
//! The rule file is a stream of JSON objects, one per rule:
//!
//! ```json
//! {"Field": "List-Id", "Pattern": "rust-dev", "Tags": "+list +rust -inbox"}
//! ```
//!
//! A record with a pattern that fails to compile stays in the set but
//! never matches. A record that is not valid JSON aborts loading.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ConfigError;

/// On-disk shape of a rule.
#[derive(Debug, Clone, Default, Deserialize)]
struct RuleRecord {
    #[serde(rename = "Field", alias = "field", default)]
    field: String,
    #[serde(rename = "Pattern", alias = "pattern", default)]
    pattern: String,
    #[serde(rename = "Tags", alias = "tags", default)]
    tags: String,
}

/// A single header rule with its compiled regex.
#[derive(Debug, Clone)]
pub struct TagRule {
    /// Header name to match against.
    pub field: String,
    /// Regex source as written in the rule file.
    pub pattern: String,
    /// Compiled regex; `None` when `pattern` failed to compile.
    pub regex: Option<Regex>,
    /// Tag delta appended when the rule matches, e.g. `+archive -inbox`.
    pub tags: String,
}

impl TagRule {
    /// Compile a rule. A bad pattern is logged and leaves the rule inert.
    pub fn new(field: impl Into<String>, pattern: impl Into<String>, tags: impl Into<String>) -> Self {
        let field = field.into();
        let pattern = pattern.into();
        let regex = match Regex::new(&pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(
                    field = %field,
                    pattern = %pattern,
                    error = %e,
                    "Rule pattern failed to compile, rule will never match"
                );
                None
            }
        };
        Self {
            field,
            pattern,
            regex,
            tags: tags.into(),
        }
    }

    /// Whether this rule fires for the given header value.
    pub fn matches(&self, value: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(value))
    }

    /// True when the pattern failed to compile.
    pub fn is_inert(&self) -> bool {
        self.regex.is_none()
    }
}

/// Ordered, immutable list of tagging rules for one run.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<TagRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<TagRule>) -> Self {
        Self { rules }
    }

    /// Load the rule file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::RulesUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = Self::from_reader(BufReader::new(file))?;
        if rules.is_empty() {
            warn!(path = %path.display(), "Rule file holds no rules, nothing will be tagged");
        }
        info!(
            path = %path.display(),
            rules = rules.len(),
            inert = rules.inert_count(),
            "Rules loaded"
        );
        Ok(rules)
    }

    /// Read a stream of JSON rule records until end of input.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let stream = serde_json::Deserializer::from_reader(reader).into_iter::<RuleRecord>();

        let mut rules = Vec::new();
        for (index, record) in stream.enumerate() {
            let record = record.map_err(|source| ConfigError::MalformedRule {
                index: index + 1,
                source,
            })?;
            debug!(field = %record.field, tags = %record.tags, "Rule read");
            rules.push(TagRule::new(record.field, record.pattern, record.tags));
        }
        Ok(Self { rules })
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of rules whose pattern failed to compile.
    pub fn inert_count(&self) -> usize {
        self.rules.iter().filter(|r| r.is_inert()).count()
    }
}
