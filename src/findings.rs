//! Dead rules, missing labels and archive/star conflicts

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::models::{LabelCatalog, MessageId};
use crate::replay::Replay;
use crate::rules::{CompiledRule, RuleAction};

pub const DEAD_RULE_REASON: &str = "no messages matched in lookback";
pub const ARCHIVE_STAR_CONFLICT: &str = "archive and star rules overlap";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFinding {
    pub name: String,
    pub reason: String,
}

/// Rules whose effects contradict on at least one sampled message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Sorted, unique rule names
    pub rules: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Findings {
    pub dead_rules: Vec<RuleFinding>,
    pub missing_labels: Vec<String>,
    pub conflicts: Vec<Conflict>,
}

impl Findings {
    pub fn is_empty(&self) -> bool {
        self.dead_rules.is_empty() && self.missing_labels.is_empty() && self.conflicts.is_empty()
    }
}

/// Derive all findings for one replay
pub fn analyze(rules: &[CompiledRule], replay: &Replay, catalog: &LabelCatalog) -> Findings {
    Findings {
        dead_rules: dead_rules(rules, replay),
        missing_labels: missing_labels(rules, catalog),
        conflicts: detect_conflicts(rules, replay),
    }
}

/// Evaluable rules that matched nothing, in compile order
///
/// Rules that were never replayed are not dead.
pub fn dead_rules(rules: &[CompiledRule], replay: &Replay) -> Vec<RuleFinding> {
    rules
        .iter()
        .filter(|rule| rule.evaluation.is_evaluable())
        .filter(|rule| replay.matches_for(&rule.name).map_or(false, <[_]>::is_empty))
        .map(|rule| RuleFinding {
            name: rule.name.clone(),
            reason: DEAD_RULE_REASON.to_string(),
        })
        .collect()
}

/// Label names referenced by rules but absent from the live catalog
///
/// Deduplicated, in first-seen order.
pub fn missing_labels(rules: &[CompiledRule], catalog: &LabelCatalog) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for label in rules.iter().flat_map(|rule| rule.action.labels.iter()) {
        if !catalog.contains_name(label) && !missing.contains(label) {
            missing.push(label.clone());
        }
    }
    missing
}

/// Messages hit by both an archiving rule and a starring rule
///
/// Each distinct rule set is reported once, ordered by its `|`-joined key, so
/// the output does not depend on sample or map iteration order.
pub fn detect_conflicts(rules: &[CompiledRule], replay: &Replay) -> Vec<Conflict> {
    let mut by_message: HashMap<&MessageId, Vec<(&str, &RuleAction)>> = HashMap::new();
    for rule in rules {
        let Some(ids) = replay.matches_for(&rule.name) else {
            continue;
        };
        for id in ids {
            by_message
                .entry(id)
                .or_default()
                .push((rule.name.as_str(), &rule.action));
        }
    }

    let mut keyed: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for summaries in by_message.values() {
        let archive: Vec<&str> = summaries
            .iter()
            .filter(|(_, action)| action.archive)
            .map(|(name, _)| *name)
            .collect();
        let star: Vec<&str> = summaries
            .iter()
            .filter(|(_, action)| action.star)
            .map(|(name, _)| *name)
            .collect();
        if archive.is_empty() || star.is_empty() {
            continue;
        }

        let mut combined: Vec<String> = archive
            .into_iter()
            .chain(star)
            .map(str::to_string)
            .collect();
        combined.sort();
        combined.dedup();
        keyed.entry(combined.join("|")).or_insert(combined);
    }

    keyed
        .into_values()
        .map(|rules| Conflict {
            rules,
            description: ARCHIVE_STAR_CONFLICT.to_string(),
        })
        .collect()
}
