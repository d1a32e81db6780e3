//! Noisiest senders and lists, label coverage and archive suggestions

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::models::{LabelCatalog, MessageMetadata};
use crate::normalize::{domain_of, normalize_list_id};

/// Maximum number of suggested archive snippets
pub const MAX_ARCHIVE_SUGGESTIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderStat {
    pub domain: String,
    pub count: usize,
    pub preview_subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListStat {
    pub list_id: String,
    pub count: usize,
    pub preview_subject: String,
}

#[derive(Default)]
struct Tally {
    count: usize,
    preview: String,
}

impl Tally {
    fn record(&mut self, subject: &str) {
        self.count += 1;
        if self.preview.is_empty() {
            self.preview = subject.to_string();
        }
    }
}

/// Rank sender domains and List-Ids by volume
///
/// Ties break on the key ascending. Both tables are cut to `top_n`.
pub fn build_rankings(
    messages: &[MessageMetadata],
    top_n: usize,
) -> (Vec<SenderStat>, Vec<ListStat>) {
    let mut senders: HashMap<String, Tally> = HashMap::new();
    let mut lists: HashMap<String, Tally> = HashMap::new();

    for msg in messages {
        let subject = msg.header("Subject");

        let domain = domain_of(msg.header("From"));
        if !domain.is_empty() {
            senders.entry(domain).or_default().record(subject);
        }

        let list_id = normalize_list_id(msg.header("List-Id"));
        if !list_id.is_empty() {
            lists.entry(list_id).or_default().record(subject);
        }
    }

    let senders = rank(senders, top_n)
        .into_iter()
        .map(|(domain, tally)| SenderStat {
            domain,
            count: tally.count,
            preview_subject: tally.preview,
        })
        .collect();
    let lists = rank(lists, top_n)
        .into_iter()
        .map(|(list_id, tally)| ListStat {
            list_id,
            count: tally.count,
            preview_subject: tally.preview,
        })
        .collect();

    (senders, lists)
}

fn rank(table: HashMap<String, Tally>, top_n: usize) -> Vec<(String, Tally)> {
    let mut entries: Vec<(String, Tally)> = table.into_iter().collect();
    entries.sort_by(|(a_key, a), (b_key, b)| {
        b.count.cmp(&a.count).then_with(|| a_key.cmp(b_key))
    });
    entries.truncate(top_n);
    entries
}

/// Count sampled messages per live label name
///
/// A message with k resolvable labels contributes to k buckets.
pub fn build_coverage(
    messages: &[MessageMetadata],
    catalog: &LabelCatalog,
) -> BTreeMap<String, usize> {
    let mut coverage = BTreeMap::new();
    for msg in messages {
        for name in msg.label_ids.iter().filter_map(|id| catalog.name_of(id)) {
            *coverage.entry(name.to_string()).or_insert(0) += 1;
        }
    }
    coverage
}

/// gmailctl Jsonnet snippets archiving the top lists, then the top senders
pub fn build_archive_rules(lists: &[ListStat], senders: &[SenderStat]) -> Vec<String> {
    let list_rules = lists.iter().map(|list| {
        format!(
            "{{\n  filter: {{ list: \"{}\" }},\n  \
             actions: {{ archive: true, markRead: true }},\n}}",
            list.list_id
        )
    });
    let sender_rules = senders.iter().map(|sender| {
        format!(
            "{{\n  filter: {{ from: \"*@{}\" }},\n  \
             actions: {{ archive: true, markRead: true }},\n}}",
            sender.domain
        )
    });

    list_rules
        .chain(sender_rules)
        .take(MAX_ARCHIVE_SUGGESTIONS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, from: &str, list: &str, subject: &str) -> MessageMetadata {
        MessageMetadata::new(id)
            .with_header("From", from)
            .with_header("List-Id", list)
            .with_header("Subject", subject)
    }

    #[test]
    fn test_rankings_count_and_first_preview() {
        let sample = vec![
            msg("1", "Alerts <alerts@example.com>", "<alerts.example.com>", ""),
            msg("2", "alerts@example.com", "<alerts.example.com>", "Disk 90%"),
            msg("3", "Bob <bob@other.example>", "", "Lunch?"),
            msg("4", "ops@example.com", "Alerts.Example.com", "Disk 95%"),
        ];
        let (senders, lists) = build_rankings(&sample, 20);

        assert_eq!(senders[0].domain, "example.com");
        assert_eq!(senders[0].count, 3);
        assert_eq!(senders[0].preview_subject, "Disk 90%");
        assert_eq!(senders[1].domain, "other.example");

        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].list_id, "alerts.example.com");
        assert_eq!(lists[0].count, 3);
    }

    #[test]
    fn test_rankings_tie_break_and_truncate() {
        let sample = vec![
            msg("1", "a@zeta.example", "", "z"),
            msg("2", "a@alpha.example", "", "a"),
            msg("3", "a@mid.example", "", "m"),
        ];
        let (senders, _) = build_rankings(&sample, 2);
        let domains: Vec<_> = senders.iter().map(|s| s.domain.as_str()).collect();
        assert_eq!(domains, vec!["alpha.example", "mid.example"]);
    }

    #[test]
    fn test_coverage_counts_live_labels_only() {
        let catalog: LabelCatalog = [("INBOX", "INBOX"), ("Label_1", "bulk")]
            .into_iter()
            .collect();
        let sample = vec![
            MessageMetadata::new("1").with_labels(["INBOX", "Label_1"]),
            MessageMetadata::new("2").with_labels(["Label_1", "Label_gone"]),
        ];
        let coverage = build_coverage(&sample, &catalog);
        assert_eq!(coverage.get("bulk"), Some(&2));
        assert_eq!(coverage.get("INBOX"), Some(&1));
        assert_eq!(coverage.len(), 2);
    }

    #[test]
    fn test_archive_rules_lists_first_and_capped() {
        let lists: Vec<ListStat> = (0..8)
            .map(|i| ListStat {
                list_id: format!("list{}.example", i),
                count: 1,
                preview_subject: String::new(),
            })
            .collect();
        let senders: Vec<SenderStat> = (0..5)
            .map(|i| SenderStat {
                domain: format!("sender{}.example", i),
                count: 1,
                preview_subject: String::new(),
            })
            .collect();

        let rules = build_archive_rules(&lists, &senders);
        assert_eq!(rules.len(), MAX_ARCHIVE_SUGGESTIONS);
        assert_eq!(
            rules[0],
            "{\n  filter: { list: \"list0.example\" },\n  \
             actions: { archive: true, markRead: true },\n}"
        );
        assert_eq!(
            rules[8],
            "{\n  filter: { from: \"*@sender0.example\" },\n  \
             actions: { archive: true, markRead: true },\n}"
        );
        assert!(rules[9].contains("*@sender1.example"));
    }
}
