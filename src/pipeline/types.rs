//! Shared types for the classification pipeline.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::PipelineError;
use crate::store::TagOp;

/// A Message-ID header value in its `<...>` form.
static MESSAGE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<(.+)>$").expect("static regex"));

/// One signed tag fragment of a tag delta.
static TAG_OP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([+-])(\S+)").expect("static regex"));

// ── Channel messages ────────────────────────────────────────────────

/// Unit of work handed to a classification worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Classify the mail file at this path.
    Mail(PathBuf),
    /// No more input; the receiving worker reports `Finished` and exits.
    Stop,
}

/// Outcome of classifying one mail file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Raw Message-ID header value, angle brackets included.
    pub message_id: String,
    /// Space-joined tag fragments of every matching rule, in rule order.
    pub tag_delta: String,
    /// Mail file the classification came from.
    pub filename: PathBuf,
}

/// Everything a worker can report on the shared result channel.
#[derive(Debug)]
pub enum WorkerEvent {
    Classified(Classification),
    /// The worker consumed its `Stop` and will send nothing further.
    Finished { worker: usize },
    /// The worker hit a fatal error and has exited.
    Failed { worker: usize, error: PipelineError },
}

// ── Parsing helpers ─────────────────────────────────────────────────

/// Parse a tag delta such as `" +archive -inbox"` into ordered operations.
///
/// Text that is not a signed token is ignored.
pub fn parse_tag_delta(delta: &str) -> Vec<TagOp> {
    TAG_OP_RE
        .captures_iter(delta)
        .map(|caps| {
            let tag = caps[2].to_string();
            if &caps[1] == "+" {
                TagOp::Add(tag)
            } else {
                TagOp::Remove(tag)
            }
        })
        .collect()
}

/// Strip the angle brackets from a Message-ID header value.
///
/// Returns `None` when the value does not have the `<...>` shape.
pub fn strip_message_id(raw: &str) -> Option<&str> {
    MESSAGE_ID_RE
        .captures(raw.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
