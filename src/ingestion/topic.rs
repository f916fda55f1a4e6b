//! Topic/concept normalization: lowercase, collapse whitespace, strip
//! stopwords, canonicalize abbreviations. Also provides the per-document
//! topic/concept derivation prompt plus a deterministic fallback used by the
//! ingestion pipeline when the LLM call fails.

use std::collections::HashSet;
use std::sync::LazyLock;

const STOPWORDS: &[&str] = &["the", "a", "an", "of", "in", "on", "at", "to", "for"];

static ABBREVIATIONS: LazyLock<Vec<(&'static str, &'static str)>> = LazyLock::new(|| {
    vec![
        ("co2", "carbon dioxide"),
        ("o2", "oxygen"),
        ("h2o", "water"),
        ("ai", "artificial intelligence"),
        ("ml", "machine learning"),
        ("rag", "retrieval augmented generation"),
        ("llm", "large language model"),
        ("gpu", "graphics processing unit"),
    ]
});

/// Lowercase, collapse internal whitespace, strip leading/trailing
/// whitespace, and remove stopword tokens.
pub fn normalize_topic(topic: &str) -> String {
    let lowered = topic.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    let filtered: Vec<&str> = collapsed
        .split(' ')
        .filter(|w| !STOPWORDS.contains(w))
        .collect();
    filtered.join(" ").trim().to_string()
}

/// Canonicalize a concept through the abbreviation table (matched either
/// direction: abbreviation → expansion, or exact expansion passthrough).
pub fn normalize_concept(concept: &str) -> String {
    let lowered = concept.to_lowercase();
    for (abbrev, expansion) in ABBREVIATIONS.iter() {
        if lowered == *abbrev {
            return expansion.to_string();
        }
    }
    lowered
}

fn is_stop_or_question_word(word: &str) -> bool {
    const QUESTION_WORDS: &[&str] = &[
        "what", "which", "when", "where", "who", "whom", "whose", "why", "how", "does", "do",
        "did", "is", "are", "was", "were", "will", "would", "could", "should", "can",
    ];
    STOPWORDS.contains(&word) || QUESTION_WORDS.contains(&word)
}

/// Extract up to `max_concepts` distinct alphabetic tokens of length >= 3,
/// skipping stopwords/question-words, lowercased. Mirrors
/// `topic_utils.py::extract_concepts_from_text`.
pub fn extract_concepts_from_text(text: &str, max_concepts: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut concepts = Vec::new();

    for raw_word in text.split(|c: char| !c.is_ascii_alphabetic()) {
        if raw_word.len() < 3 {
            continue;
        }
        let word = raw_word.to_lowercase();
        if is_stop_or_question_word(&word) {
            continue;
        }
        if seen.insert(word.clone()) {
            concepts.push(word);
            if concepts.len() >= max_concepts {
                break;
            }
        }
    }

    concepts
}

/// Exact match, then substring either direction, then Jaccard over
/// whitespace-split tokens >= `threshold`. Mirrors `topics_match`.
pub fn topics_match(a: &str, b: &str, threshold: f32) -> bool {
    let (a, b) = (normalize_topic(a), normalize_topic(b));
    if a == b {
        return true;
    }
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a.contains(&b) || b.contains(&a) {
        return true;
    }
    jaccard(&a, &b) >= threshold
}

fn jaccard(a: &str, b: &str) -> f32 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Exact/substring concept match ratio >= `threshold`. Mirrors
/// `concepts_match`.
pub fn concepts_match(query_concepts: &[String], doc_concepts: &[String], threshold: f32) -> bool {
    if query_concepts.is_empty() || doc_concepts.is_empty() {
        return false;
    }
    let matches = query_concepts
        .iter()
        .filter(|qc| {
            doc_concepts
                .iter()
                .any(|dc| *qc == dc || dc.contains(qc.as_str()) || qc.contains(dc.as_str()))
        })
        .count();
    (matches as f32 / query_concepts.len() as f32) >= threshold
}

/// Deterministic fallback for topic/concept derivation when the LLM prompt
/// fails to parse, matching `query_analysis_node.py`'s filename-based
/// fallback: first 2-3 words, title-cased for the topic, lowercased for
/// concepts.
pub fn fallback_topic_and_concepts(source_text: &str) -> (String, Vec<String>) {
    let words: Vec<&str> = source_text.split_whitespace().collect();

    let topic = words
        .iter()
        .take(2)
        .map(|w| title_case(w))
        .collect::<Vec<_>>()
        .join(" ");

    let concepts = words
        .iter()
        .take(3)
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
        .collect();

    (topic, concepts)
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Prompt sent to the LLM to derive a document's topic/concepts, matching
/// the format `query_analysis_node.py` requests:
/// `"Topic: [topic name] | Concepts: [concept1, concept2, concept3]"`.
pub fn topic_derivation_prompt(document_excerpt: &str) -> String {
    format!(
        "Analyze the following document excerpt and identify its main topic \
         and key concepts.\n\n\
         Document excerpt:\n{document_excerpt}\n\n\
         Respond in exactly this format:\n\
         Topic: [topic name] | Concepts: [concept1, concept2, concept3]"
    )
}

/// Parse the LLM's `"Topic: X | Concepts: a, b, c"` response. Returns `None`
/// on any deviation from the expected shape, so the caller can fall back.
pub fn parse_topic_response(response: &str) -> Option<(String, Vec<String>)> {
    let (topic_part, concepts_part) = response.split_once('|')?;

    let topic = topic_part
        .trim()
        .strip_prefix("Topic:")?
        .trim()
        .to_string();
    if topic.is_empty() {
        return None;
    }

    let concepts_raw = concepts_part.trim().strip_prefix("Concepts:")?.trim();
    let concepts: Vec<String> = concepts_raw
        .split(',')
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    Some((topic, concepts))
}
