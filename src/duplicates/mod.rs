//! Duplicate detection module.
//!
//! This module provides:
//! - Duplicate groups read from the file index ([`grouper`], [`groups`])
//! - Folder patterns and batch keep/discard rules ([`patterns`])

pub mod grouper;
pub mod groups;
pub mod patterns;

pub use grouper::DuplicateGrouper;
pub use groups::{DuplicateGroup, DuplicatePage};
pub use patterns::{
    collect_patterns, pattern_id, plan_disposals, DisposalPlan, DisposalRule, FolderPattern,
    RejectedRule, RuleParseError,
};
