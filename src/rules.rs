//! Compiles a gmailctl export into replayable rules

use std::collections::HashMap;
use std::fmt;

use crate::export::{FilterAction, FilterCriteria, FilterExport};
use crate::matcher::Matcher;
use crate::models::LabelCatalog;
use crate::normalize::{normalize_list_id, split_candidates};

/// Name given to rules with no name, id, or describable criterion
pub const PLACEHOLDER_RULE_NAME: &str = "gmailctl-rule";

/// Why a rule was excluded from replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonEvaluableReason {
    /// No criterion produced a matcher
    NoMatchers,
    /// The query contains a negation, which is never approximated
    NegatedQuery(String),
    /// The query contains a token outside the replayable subset
    UnsupportedQuery(String),
}

impl fmt::Display for NonEvaluableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NonEvaluableReason::NoMatchers => write!(f, "no replayable criteria"),
            NonEvaluableReason::NegatedQuery(token) => write!(f, "negated query token {}", token),
            NonEvaluableReason::UnsupportedQuery(token) => {
                write!(f, "unsupported query token {}", token)
            }
        }
    }
}

/// Outcome of compiling a rule's criteria
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Conjunction of matchers, never empty
    Evaluable(Vec<Matcher>),
    NotEvaluable(NonEvaluableReason),
}

impl Evaluation {
    pub fn matchers(&self) -> Option<&[Matcher]> {
        match self {
            Evaluation::Evaluable(matchers) => Some(matchers),
            Evaluation::NotEvaluable(_) => None,
        }
    }

    pub fn is_evaluable(&self) -> bool {
        matches!(self, Evaluation::Evaluable(_))
    }
}

/// Effects a rule has on the messages it matches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleAction {
    pub archive: bool,
    pub mark_read: bool,
    pub star: bool,
    /// Resolved label names, sorted and unique
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub name: String,
    pub action: RuleAction,
    pub evaluation: Evaluation,
}

/// Compile every filter of the export, preserving export order
///
/// Label ids resolve through the live catalog merged with the labels embedded
/// in the export; the export wins on collisions.
pub fn compile_rules(export: &FilterExport, catalog: &LabelCatalog) -> Vec<CompiledRule> {
    let mut label_names: HashMap<&str, &str> = catalog
        .by_id
        .iter()
        .map(|(id, name)| (id.as_str(), name.as_str()))
        .collect();
    for label in &export.labels {
        if !label.id.is_empty() && !label.name.is_empty() {
            label_names.insert(label.id.as_str(), label.name.as_str());
        }
    }

    export
        .filters
        .iter()
        .map(|filter| {
            let name = [filter.name.trim(), filter.id.trim()]
                .into_iter()
                .find(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| describe_criteria(&filter.criteria));

            CompiledRule {
                name,
                action: map_actions(&filter.action, &label_names),
                evaluation: build_evaluation(&filter.criteria),
            }
        })
        .collect()
}

fn build_evaluation(criteria: &FilterCriteria) -> Evaluation {
    let mut matchers = Vec::new();

    let substring_criteria: [(&str, fn(Vec<String>) -> Matcher); 3] = [
        (criteria.from.as_str(), Matcher::From),
        (criteria.to.as_str(), Matcher::To),
        (criteria.subject.as_str(), Matcher::Subject),
    ];
    for (raw, make) in substring_criteria {
        let candidates = split_candidates(raw);
        if !candidates.is_empty() {
            matchers.push(make(candidates));
        }
    }

    let list_id = normalize_list_id(&criteria.list);
    if !list_id.is_empty() {
        matchers.push(Matcher::ListId(list_id));
    }

    if !criteria.query.trim().is_empty() {
        match parse_query(&criteria.query) {
            Ok(query_matchers) => matchers.extend(query_matchers),
            Err(reason) => return Evaluation::NotEvaluable(reason),
        }
    }

    if matchers.is_empty() {
        Evaluation::NotEvaluable(NonEvaluableReason::NoMatchers)
    } else {
        Evaluation::Evaluable(matchers)
    }
}

fn parse_query(query: &str) -> Result<Vec<Matcher>, NonEvaluableReason> {
    let mut matchers = Vec::new();

    for raw in query.split_whitespace() {
        let token = raw.trim_matches(&['(', ')', '"', '\''][..]);
        if token.is_empty() || token.eq_ignore_ascii_case("or") {
            continue;
        }
        if token.starts_with('-') {
            return Err(NonEvaluableReason::NegatedQuery(token.to_string()));
        }
        let matcher = matcher_from_token(token)
            .ok_or_else(|| NonEvaluableReason::UnsupportedQuery(token.to_string()))?;
        matchers.push(matcher);
    }

    if matchers.is_empty() {
        return Err(NonEvaluableReason::UnsupportedQuery(query.trim().to_string()));
    }
    Ok(matchers)
}

fn matcher_from_token(token: &str) -> Option<Matcher> {
    let (prefix, value) = token.split_once(':')?;
    let prefix = prefix.to_ascii_lowercase();

    if prefix == "list" {
        let list_id = normalize_list_id(value);
        return (!list_id.is_empty()).then_some(Matcher::ListId(list_id));
    }

    let make: fn(Vec<String>) -> Matcher = match prefix.as_str() {
        "from" => Matcher::From,
        "to" => Matcher::To,
        "subject" => Matcher::Subject,
        _ => return None,
    };
    let candidates = split_candidates(value);
    (!candidates.is_empty()).then(|| make(candidates))
}

fn map_actions(action: &FilterAction, label_names: &HashMap<&str, &str>) -> RuleAction {
    let mut result = RuleAction::default();

    for id in &action.remove_label_ids {
        match id.as_str() {
            "INBOX" => result.archive = true,
            "UNREAD" => result.mark_read = true,
            _ => {}
        }
    }

    for id in &action.add_label_ids {
        if id == "STARRED" {
            result.star = true;
            continue;
        }
        if let Some(name) = label_names.get(id.as_str()).filter(|n| !n.is_empty()) {
            result.labels.push((*name).to_string());
        }
    }

    result.labels.sort();
    result.labels.dedup();
    result
}

fn describe_criteria(criteria: &FilterCriteria) -> String {
    if !criteria.from.trim().is_empty() {
        return format!("from:{}", criteria.from.trim());
    }
    if !criteria.list.trim().is_empty() {
        return format!("list:{}", criteria.list.trim());
    }
    if !criteria.subject.trim().is_empty() {
        return format!("subject:{}", criteria.subject.trim());
    }
    if !criteria.query.trim().is_empty() {
        return criteria.query.trim().to_string();
    }
    PLACEHOLDER_RULE_NAME.to_string()
}
