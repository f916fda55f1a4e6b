//! Generator: two prompt modes (grounded vs conflict-aware), called at most
//! once per query, with post-processing (duplicate-sentence removal,
//! bracketed citation list, grounding check against a fixed hedging-phrase
//! list).

use std::sync::Arc;

use crate::error::CoreError;
use crate::llm::{GenerationOptions, LlmGateway};
use crate::query::conflict::ConflictFinding;
use crate::query::grader::GradedChunk;
use crate::types::Citation;

/// Phrases that signal model-internal speculation rather than a claim
/// grounded in the provided evidence — if the post-processed answer contains
/// one of these, the Generator treats it as ungrounded.
const HEDGING_PHRASES: &[&str] = &[
    "i think",
    "i believe",
    "in my opinion",
    "generally speaking",
    "as everyone knows",
    "it's commonly known",
    "i would assume",
    "typically",
];

const STOP_SEQUENCES: &[&str] = &["\n\nEvidence", "\n\nUser Question", "Answer:", "\n\n\n"];

pub struct GeneratedAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

pub struct Generator {
    llm: Arc<LlmGateway>,
}

impl Generator {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    #[tracing::instrument(skip(self, query, passed_chunks, conflict))]
    pub async fn generate(
        &self,
        query: &str,
        passed_chunks: &[GradedChunk],
        conflict: Option<&ConflictFinding>,
    ) -> Result<GeneratedAnswer, CoreError> {
        let prompt = match conflict {
            Some(finding) => build_conflict_aware_prompt(query, passed_chunks, finding),
            None => build_grounded_prompt(query, passed_chunks),
        };

        let options = GenerationOptions {
            temperature: 0.2,
            max_tokens: 512,
            stop_sequences: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
        };

        let raw = self.llm.generate(&prompt, &options).await?;
        let cleaned = strip_quotes(raw.trim());
        let deduped = remove_repeated_sentences(&cleaned);

        if is_ungrounded(&deduped) {
            return Err(CoreError::Ungrounded);
        }

        let citations = collect_citations(passed_chunks);
        let answer = append_citations(&deduped, &citations);

        Ok(GeneratedAnswer { answer, citations })
    }
}

fn build_grounded_prompt(query: &str, chunks: &[GradedChunk]) -> String {
    let evidence = chunks
        .iter()
        .map(|c| c.hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "You are a retrieval-grounded assistant.\n\
         Answer ONLY using the provided evidence.\n\
         If evidence exists, you MUST answer.\n\
         Return ONE concise plain-text answer.\n\
         Do NOT repeat sentences.\n\
         Do NOT output JSON or lists.\n\
         Do NOT mention sources or files.\n\n\
         Evidence:\n{evidence}\n\n\
         User Question: {query}\n\
         Answer:"
    )
}

fn build_conflict_aware_prompt(query: &str, chunks: &[GradedChunk], finding: &ConflictFinding) -> String {
    let evidence = chunks
        .iter()
        .map(|c| c.hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "You are a retrieval-grounded assistant. There is a conflict in the evidence.\n\
         {} indicates one perspective, whereas {} suggests another: {}\n\
         Based on the available evidence, present both perspectives, attributing each \
         one to its source by file name, and note the disagreement. Return ONE concise \
         plain-text answer. Do NOT repeat sentences. Do NOT output JSON or lists.\n\n\
         Evidence:\n{evidence}\n\n\
         User Question: {query}\n\
         Answer:",
        finding.file_a, finding.file_b, finding.description,
    )
}

fn strip_quotes(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'').to_string()
}

/// Split on '.', drop case-insensitive duplicate sentences, rejoin with '. '.
fn remove_repeated_sentences(text: &str) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut kept = Vec::new();

    for sentence in text.split('.') {
        let trimmed = sentence.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            kept.push(trimmed);
        }
    }

    if kept.is_empty() {
        return text.trim().to_string();
    }

    let mut result = kept.join(". ");
    result.push('.');
    result
}

fn is_ungrounded(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    if answer.trim().is_empty() {
        return true;
    }
    HEDGING_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Format as `"{filename}, Page {page}"` when a page number is present,
/// deduplicating by that formatted string.
fn collect_citations(chunks: &[GradedChunk]) -> Vec<Citation> {
    let mut seen = std::collections::HashSet::new();
    let mut citations = Vec::new();

    for chunk in chunks {
        let citation = &chunk.hit.chunk.citation;
        let formatted = format_citation(citation);
        if seen.insert(formatted) {
            citations.push(citation.clone());
        }
    }

    citations
}

fn format_citation(citation: &Citation) -> String {
    match citation.page_number {
        Some(page) => format!("{}, Page {}", citation.file_name, page),
        None => citation.file_name.clone(),
    }
}

fn append_citations(answer: &str, citations: &[Citation]) -> String {
    if citations.is_empty() {
        return answer.to_string();
    }
    let formatted: Vec<String> = citations.iter().map(format_citation).collect();
    format!("{answer} [{}]", formatted.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_repeated_sentences_drops_case_insensitive_duplicates() {
        let text = "Water boils at 100C. WATER BOILS AT 100C. It freezes at 0C.";
        let result = remove_repeated_sentences(text);
        assert_eq!(result, "Water boils at 100C. It freezes at 0C.");
    }

    #[test]
    fn test_is_ungrounded_detects_hedging_phrase() {
        assert!(is_ungrounded("I think the capital is Arcadia."));
        assert!(is_ungrounded("Typically, water boils at 100 degrees Celsius."));
        assert!(!is_ungrounded("Water boils at 100 degrees Celsius."));
    }

    #[test]
    fn test_is_ungrounded_detects_empty_answer() {
        assert!(is_ungrounded("   "));
    }

    #[test]
    fn test_format_citation_includes_page_when_present() {
        let citation = Citation {
            file_name: "report.pdf".to_string(),
            page_number: Some(4),
        };
        assert_eq!(format_citation(&citation), "report.pdf, Page 4");
    }

    #[test]
    fn test_format_citation_omits_page_when_absent() {
        let citation = Citation {
            file_name: "notes.txt".to_string(),
            page_number: None,
        };
        assert_eq!(format_citation(&citation), "notes.txt");
    }

    #[test]
    fn test_collect_citations_dedups_by_formatted_string() {
        let chunks = vec![
            make_chunk("report.pdf", Some(4)),
            make_chunk("report.pdf", Some(4)),
            make_chunk("report.pdf", Some(5)),
        ];
        let citations = collect_citations(&chunks);
        assert_eq!(citations.len(), 2);
    }

    #[test]
    fn test_append_citations_formats_bracketed_list() {
        let citations = vec![
            Citation { file_name: "a.pdf".to_string(), page_number: Some(1) },
            Citation { file_name: "b.txt".to_string(), page_number: None },
        ];
        let result = append_citations("The answer.", &citations);
        assert_eq!(result, "The answer. [a.pdf, Page 1; b.txt]");
    }

    fn make_chunk(file_name: &str, page: Option<u32>) -> GradedChunk {
        use crate::types::{Chunk, Modality, SearchHit, SourceType};
        GradedChunk {
            hit: SearchHit {
                chunk: Chunk {
                    id: "id".to_string(),
                    scope_id: "scope-a".to_string(),
                    doc_id: "doc".to_string(),
                    chunk_index: 0,
                    text: "text".to_string(),
                    modality: Modality::Text,
                    source_type: SourceType::Pdf,
                    file_name: file_name.to_string(),
                    document_topic: "topic".to_string(),
                    document_concepts: Vec::new(),
                    citation: Citation {
                        file_name: file_name.to_string(),
                        page_number: page,
                    },
                    created_at: 0,
                },
                similarity: 0.9,
                matched_spaces: vec![Modality::Text],
            },
            score: 0.9,
            passed: true,
        }
    }
}
