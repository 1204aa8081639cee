//! Typed boolean tag queries.
//!
//! A `Query` renders to the store's textual query language
//! (`tag:inbox and not tag:list`, `id:<id>`, `thread:<id>`) through
//! `Display`, and backends translate the same tree into their own
//! filtering.

use std::fmt;

/// A boolean expression over message tags and identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Messages carrying the tag.
    Tag(String),
    /// The message with this exact identifier (angle brackets stripped).
    Id(String),
    /// Every message in the thread.
    Thread(String),
    /// Complement of the inner query.
    Not(Box<Query>),
    /// Conjunction. An empty conjunction matches every message.
    And(Vec<Query>),
}

impl Query {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag(tag.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self::Thread(thread_id.into())
    }

    /// Every message in the store.
    pub fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Negate this query.
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Conjoin with another query, flattening nested conjunctions.
    pub fn and(self, other: Query) -> Self {
        let mut terms = match self {
            Self::And(terms) => terms,
            single => vec![single],
        };
        match other {
            Self::And(more) => terms.extend(more),
            single => terms.push(single),
        }
        Self::And(terms)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "tag:{tag}"),
            Self::Id(id) => write!(f, "id:{id}"),
            Self::Thread(thread) => write!(f, "thread:{thread}"),
            Self::Not(inner) => match inner.as_ref() {
                Self::And(terms) if terms.len() > 1 => write!(f, "not ({inner})"),
                _ => write!(f, "not {inner}"),
            },
            Self::And(terms) if terms.is_empty() => f.write_str("*"),
            Self::And(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    write!(f, "{term}")?;
                }
                Ok(())
            }
        }
    }
}
