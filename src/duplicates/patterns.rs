//! Folder patterns and batch keep/discard rules.
//!
//! # Overview
//!
//! Duplicates usually come from whole folders being copied around, so the same
//! set of folders shows up in many groups. A [`FolderPattern`] is one such set:
//! its identity is the group's distinct folders, sorted and joined with `|`.
//! Groups with the same folder set share a pattern.
//!
//! A [`DisposalRule`] says which folder of a pattern to keep. [`plan_disposals`]
//! applies rules to every group of their pattern at once and lists the files
//! outside the kept folder.
//!
//! # Example
//!
//! ```
//! use imgdedup::duplicates::DisposalRule;
//!
//! let rule: DisposalRule = "/a|/b=>/a".parse().unwrap();
//! assert_eq!(rule.pattern_id, "/a|/b");
//! assert_eq!(rule.keep_folder, "/a");
//! ```

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::groups::DuplicateGroup;
use crate::scanner::path_utils::to_slash;

/// Separator between folders in a pattern identity.
pub const PATTERN_SEPARATOR: &str = "|";

/// Separator between pattern and keep folder in a textual rule.
pub const RULE_SEPARATOR: &str = "=>";

/// A set of folders that duplicate groups are spread over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderPattern {
    /// Sorted folders joined with `|`
    pub id: String,
    /// The folders, sorted
    pub folders: Vec<String>,
    /// Groups with exactly this folder set
    pub duplicate_count: usize,
    /// Files across those groups
    pub total_files: usize,
}

/// Pattern identity of one group.
#[must_use]
pub fn pattern_id(group: &DuplicateGroup) -> String {
    group.folders().join(PATTERN_SEPARATOR)
}

/// Aggregate groups by folder set, most frequent pattern first.
#[must_use]
pub fn collect_patterns(groups: &[DuplicateGroup]) -> Vec<FolderPattern> {
    let mut by_id: HashMap<String, FolderPattern> = HashMap::new();
    for group in groups {
        let folders = group.folders();
        let id = folders.join(PATTERN_SEPARATOR);
        let pattern = by_id.entry(id).or_insert_with_key(|id| FolderPattern {
            id: id.clone(),
            folders: folders.iter().map(|f| (*f).to_string()).collect(),
            duplicate_count: 0,
            total_files: 0,
        });
        pattern.duplicate_count += 1;
        pattern.total_files += group.len();
    }

    let mut patterns: Vec<FolderPattern> = by_id.into_values().collect();
    patterns.sort_by(|a, b| {
        b.duplicate_count
            .cmp(&a.duplicate_count)
            .then_with(|| a.id.cmp(&b.id))
    });
    patterns
}

/// Keep `keep_folder` in every group of pattern `pattern_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisposalRule {
    pub pattern_id: String,
    pub keep_folder: String,
}

impl DisposalRule {
    /// Build a rule, bringing the keep folder into index key form.
    #[must_use]
    pub fn new(pattern_id: impl Into<String>, keep_folder: impl AsRef<str>) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            keep_folder: normalize_folder(keep_folder.as_ref()),
        }
    }
}

/// Error parsing a `PATTERN=>FOLDER` rule.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("Rule '{0}' is not of the form PATTERN=>FOLDER")]
    MissingSeparator(String),
    #[error("Rule '{0}' has an empty pattern or folder")]
    Empty(String),
}

impl FromStr for DisposalRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pattern, folder) = s
            .rsplit_once(RULE_SEPARATOR)
            .ok_or_else(|| RuleParseError::MissingSeparator(s.to_string()))?;
        let (pattern, folder) = (pattern.trim(), folder.trim());
        if pattern.is_empty() || folder.is_empty() {
            return Err(RuleParseError::Empty(s.to_string()));
        }
        Ok(Self::new(pattern, folder))
    }
}

/// A rule that could not be applied to one group because its keep folder is
/// not among the group's folders. Applying it would remove every copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRule {
    pub pattern_id: String,
    pub keep_folder: String,
    pub digest: String,
    pub size: u64,
}

/// Files selected for disposal by a rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisposalPlan {
    /// Keys to dispose, in group order
    pub paths: Vec<String>,
    /// Groups a rule was applied to
    pub groups_matched: usize,
    /// Groups no rule mentioned
    pub groups_untouched: usize,
    /// Groups whose rule was rejected
    pub rejected: Vec<RejectedRule>,
}

impl DisposalPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Resolve `rules` against `groups`.
///
/// A group whose pattern has a rule gives up every member outside the kept
/// folder. Several rules for one pattern: the last one wins.
///
/// A rule naming a keep folder that is not among the pattern's folders would
/// select every copy of the group. Such a group is skipped instead of emptied:
/// nothing from it lands in [`DisposalPlan::paths`] and it is listed in
/// [`DisposalPlan::rejected`]. Callers relying on "dispose of everything
/// outside the kept folder" for foreign folders get no files for that group.
#[must_use]
pub fn plan_disposals(groups: &[DuplicateGroup], rules: &[DisposalRule]) -> DisposalPlan {
    let by_pattern: HashMap<&str, &str> = rules
        .iter()
        .map(|rule| (rule.pattern_id.as_str(), rule.keep_folder.as_str()))
        .collect();

    let mut plan = DisposalPlan::default();
    for group in groups {
        let folders = group.folders();
        let id = folders.join(PATTERN_SEPARATOR);
        let Some(&keep) = by_pattern.get(id.as_str()) else {
            plan.groups_untouched += 1;
            continue;
        };

        if !folders.contains(&keep) {
            log::warn!(
                "Rule for pattern {id} keeps {keep}, which holds no copy of {}; group skipped",
                group.digest
            );
            plan.rejected.push(RejectedRule {
                pattern_id: id,
                keep_folder: keep.to_string(),
                digest: group.digest.clone(),
                size: group.size,
            });
            continue;
        }

        plan.groups_matched += 1;
        plan.paths.extend(
            group
                .files
                .iter()
                .filter(|file| file.folder() != keep)
                .map(|file| file.path.clone()),
        );
    }
    plan
}

/// Bring a user-supplied folder into the form [`crate::index::FileRecord::folder`]
/// produces: `/` separators, no trailing slash except on a root.
#[must_use]
pub fn normalize_folder(folder: &str) -> String {
    let mut folder = to_slash(folder.trim()).into_owned();
    while folder.len() > 1 && folder.ends_with('/') && !folder.ends_with(":/") {
        folder.pop();
    }
    folder
}
