//! mail-retag: rule-driven mail classification and tag normalization.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
