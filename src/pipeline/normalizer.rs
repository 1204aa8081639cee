//! Inbox normalization.
//!
//! After classification, a fixed list of rewrite rules restores the
//! cross-message inbox invariants:
//! 1. deleted or archived mail leaves the inbox
//! 2. seen mail leaves the inbox (and is archived unless it came from a list)
//! 3. killed threads leave the inbox entirely
//! 4. a thread is in the inbox if any of its messages is
//!
//! Rules run once each, in order. The last rule deliberately re-adds
//! `inbox` to thread siblings stripped by the earlier ones.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{Query, TagOp, TagStore};

/// What a rule does to the messages its selector returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Apply these operations to each selected message.
    Message(Vec<TagOp>),
    /// Apply this operation to every message in each selected thread.
    Thread(TagOp),
}

/// One selector/effect rewrite rule.
#[derive(Debug, Clone)]
pub struct NormalizeRule {
    pub name: &'static str,
    pub selector: Query,
    pub effect: Effect,
}

/// Outcome of one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHits {
    pub name: &'static str,
    /// Messages the selector returned.
    pub selected: usize,
    /// Messages the effect was applied to.
    pub touched: usize,
}

fn tag(name: &str) -> Query {
    Query::tag(name)
}

fn remove(name: &str) -> TagOp {
    TagOp::Remove(name.to_string())
}

fn add(name: &str) -> TagOp {
    TagOp::Add(name.to_string())
}

/// The inbox rules, in application order.
pub fn inbox_rules() -> Vec<NormalizeRule> {
    vec![
        NormalizeRule {
            name: "deleted",
            selector: tag("inbox").and(tag("delete")),
            effect: Effect::Message(vec![remove("inbox")]),
        },
        NormalizeRule {
            name: "archived",
            selector: tag("inbox").and(tag("archive")),
            effect: Effect::Message(vec![remove("inbox")]),
        },
        NormalizeRule {
            name: "seen",
            selector: tag("inbox").and(tag("seen")).and(tag("list").negate()),
            effect: Effect::Message(vec![add("archive"), remove("inbox")]),
        },
        NormalizeRule {
            name: "seen-list",
            selector: tag("inbox").and(tag("seen")).and(tag("list")),
            effect: Effect::Message(vec![remove("inbox")]),
        },
        NormalizeRule {
            name: "seen-bug",
            selector: tag("inbox").and(tag("seen")).and(tag("bug")),
            effect: Effect::Message(vec![remove("inbox")]),
        },
        NormalizeRule {
            name: "killed-thread",
            selector: tag("inbox").and(tag("killed")),
            effect: Effect::Thread(remove("inbox")),
        },
        NormalizeRule {
            name: "inbox-thread",
            selector: tag("inbox"),
            effect: Effect::Thread(add("inbox")),
        },
    ]
}

/// Runs the inbox rules against a writable store.
pub struct TagNormalizer {
    store: Arc<dyn TagStore>,
    rules: Vec<NormalizeRule>,
}

impl TagNormalizer {
    pub fn new(store: Arc<dyn TagStore>) -> Self {
        Self {
            store,
            rules: inbox_rules(),
        }
    }

    /// Apply every rule once, in order.
    pub async fn run(&self) -> Result<Vec<RuleHits>, StoreError> {
        let mut hits = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let outcome = self.apply_rule(rule).await?;
            if outcome.selected > 0 {
                info!(
                    rule = rule.name,
                    selector = %rule.selector,
                    selected = outcome.selected,
                    touched = outcome.touched,
                    "Normalization rule applied"
                );
            }
            hits.push(outcome);
        }
        Ok(hits)
    }

    async fn apply_rule(&self, rule: &NormalizeRule) -> Result<RuleHits, StoreError> {
        let selected = self.store.search(&rule.selector).await?;
        let mut touched = 0;

        match &rule.effect {
            Effect::Message(ops) => {
                for msg in &selected {
                    self.store.apply_tags(&msg.id, ops).await?;
                    touched += 1;
                }
            }
            Effect::Thread(op) => {
                let mut seen_threads = HashSet::new();
                let ops = std::slice::from_ref(op);
                for msg in &selected {
                    if !seen_threads.insert(msg.thread_id.as_str()) {
                        continue;
                    }
                    let members = self.store.search(&Query::thread(&msg.thread_id)).await?;
                    debug!(
                        thread = %msg.thread_id,
                        members = members.len(),
                        op = %op,
                        "Propagating to thread"
                    );
                    for member in &members {
                        self.store.apply_tags(&member.id, ops).await?;
                        touched += 1;
                    }
                }
            }
        }

        Ok(RuleHits {
            name: rule.name,
            selected: selected.len(),
            touched,
        })
    }
}
