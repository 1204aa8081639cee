//! Read-only header view of a mail file.

use std::path::Path;

use mail_parser::MessageParser;

use crate::error::PipelineError;

/// Header fields of one message, in file order, with folded values
/// joined onto one line.
#[derive(Debug, Clone, Default)]
pub struct HeaderView {
    headers: Vec<(String, String)>,
}

impl HeaderView {
    /// Parse the header block of a raw RFC 5322 message.
    ///
    /// Values are the raw (undecoded) header text. Returns `None` when the
    /// input has no header, or when any line of the header block is neither
    /// a `name: value` field nor a folded continuation.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if !is_well_formed_header_block(raw) {
            return None;
        }
        let message = MessageParser::default().parse(raw)?;

        let headers: Vec<(String, String)> = message
            .headers()
            .iter()
            .map(|header| {
                let start = header.offset_start as usize;
                let end = (header.offset_end as usize).min(raw.len());
                let value = raw
                    .get(start..end)
                    .map(|bytes| unfold(&String::from_utf8_lossy(bytes)))
                    .unwrap_or_default();
                (header.name.as_str().to_string(), value)
            })
            .collect();

        if headers.is_empty() {
            return None;
        }
        Some(Self { headers })
    }

    /// Read and parse the mail file at `path`.
    pub async fn read(path: &Path) -> Result<Self, PipelineError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|source| PipelineError::MailUnreadable {
                path: path.to_path_buf(),
                source,
            })?;

        Self::parse(&raw).ok_or_else(|| PipelineError::MailUnparsable {
            path: path.to_path_buf(),
        })
    }

    /// Build a view from explicit name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of the first header named `name` (case-insensitive), or the
    /// empty string when the message has no such header.
    pub fn get(&self, name: &str) -> &str {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }
}

/// Check every line up to the first empty one: a field must start with a
/// non-empty name of printable ASCII (33..=126) followed by `:`, and
/// continuation lines may only follow a field.
fn is_well_formed_header_block(raw: &[u8]) -> bool {
    let mut seen_field = false;
    for line in raw.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(&first) = line.first() else {
            break;
        };
        if first == b' ' || first == b'\t' {
            if !seen_field {
                return false;
            }
            continue;
        }
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return false;
        };
        let name = &line[..colon];
        if name.is_empty() || !name.iter().all(|b| (33..=126).contains(b)) {
            return false;
        }
        seen_field = true;
    }
    seen_field
}

/// Join folded continuation lines with single spaces and trim.
fn unfold(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
