//! Classification and tagging pipeline.
//!
//! Every run flows through:
//! 1. `RuleSet::load()`: header rules, compiled once
//! 2. `WorkerPool`: N workers parse mail headers and run `match_headers()`
//! 3. `ResultStream`: one consumer drains results until every worker finished
//! 4. `TagMutator`: one atomic tag batch per classified message
//! 5. `TagNormalizer`: fixed inbox rewrite rules over the whole store
//!
//! Only steps 4 and 5 write to the store, sequentially, through one handle.

pub mod aggregator;
pub mod headers;
pub mod matcher;
pub mod mutator;
pub mod normalizer;
pub mod orchestrator;
pub mod rules;
pub mod types;
pub mod workers;

pub use orchestrator::{Orchestrator, RunSummary, run};
