//! Replays compiled rules over the message sample

use std::collections::HashMap;

use crate::matcher;
use crate::models::{MessageId, MessageMetadata};
use crate::rules::CompiledRule;

/// Matches per rule name for one sample
///
/// Every evaluable rule has an entry, possibly empty. Non-evaluable rules have
/// none, which is how findings tell "never matched" from "never replayed".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replay {
    matches: HashMap<String, Vec<MessageId>>,
}

impl Replay {
    pub fn matches_for(&self, rule_name: &str) -> Option<&[MessageId]> {
        self.matches.get(rule_name).map(Vec::as_slice)
    }

    /// Whether the rule was replayed at all
    pub fn ran(&self, rule_name: &str) -> bool {
        self.matches.contains_key(rule_name)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Evaluate every evaluable rule against every message
///
/// Ids appear in sample order. Rules sharing a name share one entry, appended
/// in rule order.
pub fn evaluate(rules: &[CompiledRule], messages: &[MessageMetadata]) -> Replay {
    let mut matches: HashMap<String, Vec<MessageId>> = HashMap::with_capacity(rules.len());

    for rule in rules {
        let Some(matchers) = rule.evaluation.matchers() else {
            continue;
        };
        let entry = matches.entry(rule.name.clone()).or_default();
        entry.extend(
            messages
                .iter()
                .filter(|msg| matcher::matches(matchers, msg))
                .map(|msg| msg.id.clone()),
        );
    }

    Replay { matches }
}
