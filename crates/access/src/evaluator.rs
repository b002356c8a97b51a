//! Notification access evaluation.
//!
//! The dispatcher asks one question per notification attribute: may content
//! with this editorial desk (or this publication) be delivered to standard
//! consumers? The [`AccessEvaluator`] trait is the seam; the shipped
//! [`RuleTableEvaluator`] answers from configured tables, and any policy
//! engine that can answer the same query shape may replace it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single access question about a notification attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AccessQuery {
    #[serde(rename = "EditorialDesk")]
    EditorialDesk(String),
    #[serde(rename = "Publication")]
    Publication(String),
}

/// Outcome of an access evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allow: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl PolicyDecision {
    pub fn allowed() -> Self {
        Self {
            allow: true,
            reasons: Vec::new(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reasons: vec![reason.into()],
        }
    }
}

#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("error evaluating policy: {0}")]
    Evaluation(String),
}

/// Decides whether a notification attribute is deliverable to standard
/// consumers. Implementations must be cheap and non-blocking; the dispatcher
/// calls this inline during fan-out.
pub trait AccessEvaluator: Send + Sync {
    fn evaluate(&self, query: &AccessQuery) -> Result<PolicyDecision, EvaluatorError>;
}

/// Rule-table evaluator backed by startup configuration.
///
/// Editorial desks listed in `blocked_desks` are denied. Publications are
/// denied unless `allowed_publications` is empty or contains the UUID.
#[derive(Debug, Default, Clone)]
pub struct RuleTableEvaluator {
    blocked_desks: Vec<String>,
    allowed_publications: Vec<String>,
}

impl RuleTableEvaluator {
    pub fn new(blocked_desks: Vec<String>, allowed_publications: Vec<String>) -> Self {
        Self {
            blocked_desks,
            allowed_publications,
        }
    }
}

impl AccessEvaluator for RuleTableEvaluator {
    fn evaluate(&self, query: &AccessQuery) -> Result<PolicyDecision, EvaluatorError> {
        match query {
            AccessQuery::EditorialDesk(desk) => {
                if !desk.is_empty() && self.blocked_desks.iter().any(|b| b == desk) {
                    Ok(PolicyDecision::denied(format!(
                        "editorial desk {desk} is not cleared for distribution"
                    )))
                } else {
                    Ok(PolicyDecision::allowed())
                }
            }
            AccessQuery::Publication(uuid) => {
                if self.allowed_publications.is_empty()
                    || self.allowed_publications.iter().any(|p| p == uuid)
                {
                    Ok(PolicyDecision::allowed())
                } else {
                    Ok(PolicyDecision::denied(format!(
                        "publication {uuid} is not in the allowed set"
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tables_allow_everything() {
        let evaluator = RuleTableEvaluator::default();
        let decision = evaluator
            .evaluate(&AccessQuery::EditorialDesk("/FT/Money".to_string()))
            .unwrap();
        assert!(decision.allow);

        let decision = evaluator
            .evaluate(&AccessQuery::Publication(
                "88fdde6c-2aa4-4f78-af02-9f680097cfd6".to_string(),
            ))
            .unwrap();
        assert!(decision.allow);
    }

    #[test]
    fn blocked_desk_is_denied_with_a_reason() {
        let evaluator = RuleTableEvaluator::new(vec!["/FT/Lex".to_string()], vec![]);
        let decision = evaluator
            .evaluate(&AccessQuery::EditorialDesk("/FT/Lex".to_string()))
            .unwrap();
        assert!(!decision.allow);
        assert_eq!(decision.reasons.len(), 1);
    }

    #[test]
    fn publication_outside_the_allowed_set_is_denied() {
        let evaluator = RuleTableEvaluator::new(
            vec![],
            vec!["88fdde6c-2aa4-4f78-af02-9f680097cfd6".to_string()],
        );

        let allowed = evaluator
            .evaluate(&AccessQuery::Publication(
                "88fdde6c-2aa4-4f78-af02-9f680097cfd6".to_string(),
            ))
            .unwrap();
        assert!(allowed.allow);

        let denied = evaluator
            .evaluate(&AccessQuery::Publication(
                "8e6c705e-1132-42a2-8db0-c295e29e8658".to_string(),
            ))
            .unwrap();
        assert!(!denied.allow);
    }

    #[test]
    fn access_query_serializes_to_the_engine_input_shape() {
        let query = AccessQuery::EditorialDesk("/FT/Professional".to_string());
        let json = serde_json::to_string(&query).unwrap();
        assert_eq!(json, r#"{"EditorialDesk":"/FT/Professional"}"#);
    }
}
