//! Decides whether a query needs retrieval.
//!
//! Rules are evaluated top to bottom and the first hit wins. When nothing
//! matches, a small additive scorer takes over. Every result names the rule
//! that fired or carries the raw scores.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::domain::{ClassificationResult, ClassifierScores, QueryCategory};

const OVERRIDE_PHRASES: &[&str] = &[
    "just chat",
    "just talk",
    "let's chat",
    "lets chat",
    "without my notes",
    "without notes",
    "don't use my notes",
    "dont use my notes",
    "don't search my notes",
    "dont search my notes",
    "ignore my notes",
    "skip the notes",
];

const CONVERSATIONAL_PATTERNS: &[(&str, &str)] = &[
    ("greeting", r"^(hi|hello|hey|hiya|howdy|yo|sup|greetings)\b"),
    ("greeting", r"^good\s+(morning|afternoon|evening|day)\b"),
    ("thanks", r"\b(thanks|thank\s+you|thx|cheers|much\s+appreciated)\b"),
    ("farewell", r"^(bye|goodbye|good\s*night|see\s+you|see\s+ya|later|farewell)\b"),
    ("small talk", r"\bhow\s+are\s+you\b"),
    ("small talk", r"\bhow('s|\s+is)\s+(it|everything)\s+going\b"),
    ("small talk", r"\bwhat'?s\s+up\b"),
    ("small talk", r"^(ok|okay|cool|nice|great|awesome|lol|haha|wow)[\s!.]*$"),
    ("identity", r"\bwho\s+are\s+you\b"),
    ("identity", r"\bwhat('s|\s+is)\s+your\s+name\b"),
    ("identity", r"\bwhat\s+can\s+you\s+do\b"),
    ("identity", r"\bare\s+you\s+(a\s+|an\s+)?(bot|robot|ai|human|real)\b"),
];

const KNOWLEDGE_PATTERNS: &[(&str, &str)] = &[
    (
        "direct question",
        r"^(what|how|why|when|where|who|which)\s+(is|are|was|were|does|do|did|can|could|should|would|many|much)\b",
    ),
    (
        "explanation request",
        r"\b(explain|define|describe|summari[sz]e|elaborate\s+on|meaning\s+of)\b",
    ),
    (
        "retrieval request",
        r"\b(tell\s+me\s+about|find|search\s+for|look\s+up|show\s+me)\b",
    ),
    (
        "list or compare request",
        r"\b(list|compare|difference\s+between|differences\s+between|pros\s+and\s+cons)\b",
    ),
    (
        "corpus reference",
        r"\b(my\s+notes|my\s+documents?|my\s+files|the\s+notes|according\s+to|from\s+my)\b",
    ),
];

const DOMAIN_TERMS: &[&str] = &[
    "concept",
    "theory",
    "method",
    "principle",
    "definition",
    "algorithm",
    "formula",
    "process",
    "example",
    "model",
    "system",
    "function",
    "equation",
    "framework",
];

const WH_WORDS: &[&str] = &["what", "why", "how", "when", "where", "who", "which"];

const KNOWLEDGE_SUFFIXES: &[&str] = &[
    "tion", "sion", "ism", "ology", "ment", "ity", "ness", "ance", "ence", "ics",
];

const CASUAL_FILLERS: &[&str] = &[
    "lol", "haha", "hmm", "yeah", "yep", "nope", "ok", "okay", "cool", "nice", "wow", "btw",
    "lmao", "yay", "meh", "sure",
];

const OVERRIDE_CONFIDENCE: f32 = 1.0;
const STRONG_PATTERN_CONFIDENCE: f32 = 0.95;

enum Predicate {
    Phrases(&'static [&'static str]),
    Pattern(Regex),
}

impl Predicate {
    fn matches(&self, normalized: &str) -> bool {
        match self {
            Predicate::Phrases(phrases) => phrases.iter().any(|p| normalized.contains(p)),
            Predicate::Pattern(regex) => regex.is_match(normalized),
        }
    }
}

struct Rule {
    name: String,
    predicate: Predicate,
    category: QueryCategory,
    confidence: f32,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let mut rules = vec![Rule {
        name: "explicit override".into(),
        predicate: Predicate::Phrases(OVERRIDE_PHRASES),
        category: QueryCategory::Conversational,
        confidence: OVERRIDE_CONFIDENCE,
    }];

    let compiled = |patterns: &[(&str, &str)], category: QueryCategory| -> Vec<Rule> {
        patterns
            .iter()
            .map(|(name, pattern)| Rule {
                name: format!("{category} pattern: {name}"),
                predicate: Predicate::Pattern(
                    Regex::new(pattern).expect("classifier pattern is valid"),
                ),
                category,
                confidence: STRONG_PATTERN_CONFIDENCE,
            })
            .collect()
    };

    rules.extend(compiled(
        CONVERSATIONAL_PATTERNS,
        QueryCategory::Conversational,
    ));
    rules.extend(compiled(KNOWLEDGE_PATTERNS, QueryCategory::Knowledge));
    rules
});

/// Cheap, side-effect free query classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryClassifier;

impl QueryClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, query: &str) -> ClassificationResult {
        let normalized = query.trim().to_lowercase();

        let result = match RULES.iter().find(|rule| rule.predicate.matches(&normalized)) {
            Some(rule) => ClassificationResult {
                category: rule.category,
                confidence: rule.confidence,
                reason: format!("matched {}", rule.name),
                scores: None,
            },
            None => score_query(&normalized),
        };

        debug!(
            target: "edith::classifier",
            category = %result.category,
            confidence = result.confidence,
            reason = %result.reason,
            "classified query"
        );
        result
    }

    /// True when the query should go through retrieval at `threshold`.
    pub fn should_retrieve(&self, query: &str, threshold: f32) -> bool {
        let classification = self.classify(query);
        classification.category.seeks_knowledge() && classification.confidence >= threshold
    }
}

fn score_query(normalized: &str) -> ClassificationResult {
    let tokens: Vec<&str> = normalized
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty())
        .collect();
    let word_count = tokens.len();
    let has_question_mark = normalized.contains('?');

    let mut knowledge = 0u32;
    for token in &tokens {
        if DOMAIN_TERMS.iter().any(|term| token.starts_with(term)) {
            knowledge += 1;
        }
        if WH_WORDS.contains(token) {
            knowledge += 2;
        }
        if token.len() > 5 && KNOWLEDGE_SUFFIXES.iter().any(|suffix| token.ends_with(suffix)) {
            knowledge += 1;
        }
    }
    if has_question_mark {
        knowledge += 1;
    }

    let mut conversational = 0u32;
    if word_count <= 3 {
        conversational += 1;
    }
    conversational += count_u32(tokens.iter().filter(|t| CASUAL_FILLERS.contains(*t)).count());
    if normalized.contains('!') {
        conversational += 1;
    }
    if word_count <= 5 && !has_question_mark {
        conversational += 1;
    }

    let scores = ClassifierScores {
        knowledge,
        conversational,
    };
    let (category, confidence) = if conversational >= 2 {
        (QueryCategory::Conversational, 0.75)
    } else if knowledge >= 3 {
        (QueryCategory::Knowledge, 0.80)
    } else if knowledge > 0 {
        (QueryCategory::Knowledge, 0.60)
    } else if word_count <= 4 {
        (QueryCategory::Conversational, 0.65)
    } else {
        (QueryCategory::Knowledge, 0.55)
    };

    ClassificationResult {
        category,
        confidence,
        reason: format!(
            "scored knowledge={knowledge} conversational={conversational} words={word_count}"
        ),
        scores: Some(scores),
    }
}

fn count_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(query: &str) -> ClassificationResult {
        QueryClassifier::new().classify(query)
    }

    #[test]
    fn thanks_is_conversational() {
        let result = classify("Hey, thanks!");
        assert_eq!(result.category, QueryCategory::Conversational);
        assert!(result.confidence >= 0.9);
        assert!(result.scores.is_none());
    }

    #[test]
    fn direct_question_is_knowledge() {
        let result = classify("What is polymorphism in object-oriented programming?");
        assert_eq!(result.category, QueryCategory::Knowledge);
        assert!(result.confidence >= 0.9);
        assert!(result.reason.contains("direct question"));
    }

    #[test]
    fn override_phrase_beats_everything() {
        let result = classify("Just chat with me, what is a monad?");
        assert_eq!(result.category, QueryCategory::Conversational);
        assert_eq!(result.confidence, 1.0);
        assert!(result.reason.contains("override"));
    }

    #[test]
    fn conversational_patterns_outrank_knowledge_patterns() {
        let result = classify("How are you today?");
        assert_eq!(result.category, QueryCategory::Conversational);
        assert_eq!(result.confidence, 0.95);

        let result = classify("Who are you?");
        assert_eq!(result.category, QueryCategory::Conversational);
    }

    #[test]
    fn corpus_references_are_knowledge() {
        let result = classify("anything in my notes on photosynthesis");
        assert_eq!(result.category, QueryCategory::Knowledge);
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn retrieval_request_matches_find() {
        let result = classify("Find the meeting agenda from March");
        assert_eq!(result.category, QueryCategory::Knowledge);
    }

    #[test]
    fn domain_heavy_phrase_scores_as_knowledge() {
        let result = classify("polymorphism and inheritance concepts");
        let scores = result.scores.unwrap();
        assert!(scores.knowledge >= 3, "{scores:?}");
        assert_eq!(result.category, QueryCategory::Knowledge);
        assert_eq!(result.confidence, 0.80);
    }

    #[test]
    fn casual_fillers_score_as_conversational() {
        let result = classify("lol ok");
        assert_eq!(result.category, QueryCategory::Conversational);
        assert_eq!(result.confidence, 0.75);
    }

    #[test]
    fn short_unclear_input_defaults_to_chat() {
        let result = classify("purple elephant dancing slowly");
        assert_eq!(result.category, QueryCategory::Conversational);
        assert_eq!(result.confidence, 0.65);
    }

    #[test]
    fn long_unclear_input_defaults_to_knowledge() {
        let result = classify("banana bread recipe tomorrow afternoon with family");
        assert_eq!(result.category, QueryCategory::Knowledge);
        assert_eq!(result.confidence, 0.55);
    }

    #[test]
    fn any_knowledge_signal_beats_weak_chat_signal() {
        let result = classify("photosynthesis?");
        let scores = result.scores.unwrap();
        assert_eq!(scores.knowledge, 1);
        assert_eq!(scores.conversational, 1);
        assert_eq!(result.category, QueryCategory::Knowledge);
        assert_eq!(result.confidence, 0.60);
    }

    #[test]
    fn classification_is_idempotent() {
        for query in ["Hey, thanks!", "random words here please", "photosynthesis?"] {
            assert_eq!(classify(query), classify(query));
        }
    }

    #[test]
    fn should_retrieve_honours_threshold() {
        let classifier = QueryClassifier::new();
        assert!(classifier.should_retrieve("What is entropy?", 0.4));
        assert!(!classifier.should_retrieve("hello there", 0.4));
        assert!(!classifier.should_retrieve("banana bread recipe tomorrow afternoon with family", 0.6));
    }
}
