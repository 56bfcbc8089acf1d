//! Rubric topics and the keyword-based completion tracker.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

/// A rubric topic the learner is expected to cover.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(deserialize_with = "deserialize_keywords")]
    keywords: BTreeSet<String>,
    #[serde(default)]
    is_completed: bool,
}

impl Topic {
    /// Creates an incomplete topic.
    pub fn new<I, S>(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        keywords: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            keywords: normalize_keywords(keywords),
            is_completed: false,
        }
    }

    /// Returns the identifier of this topic.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the display name of this topic.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description of this topic.
    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the lower-cased keywords of this topic.
    #[inline]
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(String::as_str)
    }

    /// Returns `true` once the learner has mentioned any keyword.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    fn matches(&self, haystack: &str) -> bool {
        self.keywords.iter().any(|keyword| haystack.contains(keyword))
    }
}

fn normalize_keywords<I, S>(keywords: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|keyword| keyword.as_ref().trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

fn deserialize_keywords<'de, D>(
    deserializer: D,
) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(deserializer).map(normalize_keywords)
}

/// Tracks which topics the learner's messages have covered.
///
/// Evidence is cumulative: every evaluation looks at all learner
/// messages so far, and a completed topic never becomes incomplete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopicTracker {
    topics: Vec<Topic>,
}

impl TopicTracker {
    /// Creates a tracker for the given topics.
    ///
    /// Topics that arrive already completed, e.g. from a snapshot, stay
    /// completed.
    pub fn new(topics: impl IntoIterator<Item = Topic>) -> Self {
        Self {
            topics: topics.into_iter().collect(),
        }
    }

    /// Returns all topics in rubric order.
    #[inline]
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Returns the number of completed topics and the total.
    pub fn progress(&self) -> (usize, usize) {
        let completed = self.topics.iter().filter(|t| t.is_completed).count();
        (completed, self.topics.len())
    }

    /// Returns `true` if every topic has been completed.
    ///
    /// A tracker without topics is never considered complete.
    pub fn all_completed(&self) -> bool {
        !self.topics.is_empty() && self.topics.iter().all(|t| t.is_completed)
    }

    /// Re-evaluates incomplete topics against the learner's messages and
    /// returns the ids of the topics completed by this call.
    ///
    /// Matching is a case-insensitive substring search over the
    /// concatenated messages. Each message is separated by a newline, so a
    /// keyword never matches across two messages.
    pub fn evaluate<'a>(
        &mut self,
        user_texts: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        if self.topics.iter().all(|t| t.is_completed) {
            return vec![];
        }

        let haystack = user_texts
            .into_iter()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("\n");

        let mut newly_completed = vec![];
        for topic in self.topics.iter_mut().filter(|t| !t.is_completed) {
            if topic.matches(&haystack) {
                debug!("topic completed: {}", topic.id);
                topic.is_completed = true;
                newly_completed.push(topic.id.clone());
            }
        }
        newly_completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checks_and_balances() -> Topic {
        Topic::new(
            "t1",
            "Checks and Balances",
            "How the branches limit each other",
            ["veto", " Judicial Review ", ""],
        )
    }

    #[test]
    fn test_keywords_are_normalized() {
        let topic = checks_and_balances();
        let keywords: Vec<_> = topic.keywords().collect();
        assert_eq!(keywords, ["judicial review", "veto"]);
    }

    #[test]
    fn test_evaluate_is_case_insensitive() {
        let mut tracker = TopicTracker::new([checks_and_balances()]);
        let newly = tracker.evaluate(["The president can VETO a bill"]);
        assert_eq!(newly, ["t1"]);
        assert!(tracker.topics()[0].is_completed());
        assert!(tracker.all_completed());
    }

    #[test]
    fn test_completion_is_monotonic() {
        let mut tracker = TopicTracker::new([checks_and_balances()]);
        tracker.evaluate(["what about judicial review?"]);
        assert_eq!(tracker.progress(), (1, 1));

        // A later evaluation without the keyword keeps the topic done.
        let newly = tracker.evaluate(["unrelated"]);
        assert!(newly.is_empty());
        assert_eq!(tracker.progress(), (1, 1));
    }

    #[test]
    fn test_evidence_is_cumulative() {
        let mut tracker = TopicTracker::new([
            checks_and_balances(),
            Topic::new("t2", "Federalism", "", ["federalism"]),
        ]);
        assert!(tracker.evaluate(["I think a veto"]).contains(&"t1".into()));
        assert_eq!(tracker.progress(), (1, 2));
        assert!(!tracker.all_completed());

        let newly = tracker.evaluate(["I think a veto", "and federalism"]);
        assert_eq!(newly, ["t2"]);
        assert!(tracker.all_completed());
    }

    #[test]
    fn test_keyword_does_not_span_messages() {
        let mut tracker = TopicTracker::new([Topic::new(
            "t1",
            "Judicial review",
            "",
            ["judicial review"],
        )]);
        assert!(tracker.evaluate(["judicial", "review"]).is_empty());
    }

    #[test]
    fn test_empty_tracker_is_never_complete() {
        let mut tracker = TopicTracker::default();
        assert!(tracker.evaluate(["anything"]).is_empty());
        assert_eq!(tracker.progress(), (0, 0));
        assert!(!tracker.all_completed());
    }

    #[test]
    fn test_topic_serde() {
        let topic: Topic = serde_json::from_value(serde_json::json!({
            "id": "t1",
            "name": "Checks and Balances",
            "keywords": ["  Veto ", "", "VETO", "Override"],
        }))
        .unwrap();
        assert!(!topic.is_completed());
        assert_eq!(topic.description(), "");
        assert_eq!(topic.keywords().collect::<Vec<_>>(), ["override", "veto"]);

        let value = serde_json::to_value(&topic).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "t1",
                "name": "Checks and Balances",
                "description": "",
                "keywords": ["override", "veto"],
                "isCompleted": false,
            })
        );
    }
}
