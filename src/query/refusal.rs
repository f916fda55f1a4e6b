//! Maps the pipeline's internal decision points to a typed `RefusalReason`,
//! in priority order: gate denial first, then no retrieved candidates, then
//! insufficient evidence, then a generic generation failure as the catch-all.

use crate::error::RefusalReason;
use crate::query::gate::GateDecision;

pub fn from_gate_denial(decision: &GateDecision) -> RefusalReason {
    match decision {
        GateDecision::Deny { reason } if reason == "empty_knowledge_base" => {
            RefusalReason::EmptyKnowledgeBase
        }
        GateDecision::Deny { reason } if reason == "compatibility_check_failed" => {
            RefusalReason::CompatibilityCheckFailed
        }
        GateDecision::Deny { reason } if reason.starts_with("no_match") => RefusalReason::NoMatch {
            gate_reason: reason.clone(),
        },
        GateDecision::Deny { reason } => RefusalReason::NoMatch {
            gate_reason: reason.clone(),
        },
        GateDecision::Allow => unreachable!("from_gate_denial called on an Allow decision"),
    }
}

pub fn no_retrieved_documents() -> RefusalReason {
    RefusalReason::NoRetrievedDocuments
}

pub fn insufficient_evidence() -> RefusalReason {
    RefusalReason::InsufficientEvidence
}

pub fn topic_drift() -> RefusalReason {
    RefusalReason::TopicDrift
}

pub fn generation_failed() -> RefusalReason {
    RefusalReason::GenerationFailed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_knowledge_base_maps_correctly() {
        let decision = GateDecision::Deny {
            reason: "empty_knowledge_base".to_string(),
        };
        assert_eq!(from_gate_denial(&decision), RefusalReason::EmptyKnowledgeBase);
    }

    #[test]
    fn test_no_match_reason_carries_gate_detail() {
        let decision = GateDecision::Deny {
            reason: "no_match: 'cooking' does not relate to this scope's documents".to_string(),
        };
        match from_gate_denial(&decision) {
            RefusalReason::NoMatch { gate_reason } => {
                assert!(gate_reason.starts_with("no_match"));
            }
            other => panic!("expected NoMatch, got {other:?}"),
        }
    }

    #[test]
    fn test_compatibility_check_failed_maps_correctly() {
        let decision = GateDecision::Deny {
            reason: "compatibility_check_failed".to_string(),
        };
        assert_eq!(
            from_gate_denial(&decision),
            RefusalReason::CompatibilityCheckFailed
        );
    }
}
