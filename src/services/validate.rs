//! Response validation and confidence scoring
//!
//! The last stage before a result leaves the pipeline. Whatever upstream
//! produced is coerced into the strict `QueryResult` shape: a broken answer
//! becomes the fixed apology, malformed sources are dropped rather than
//! failing the response, and every number is clamped into range.

use serde::Serialize;
use tracing::warn;

use crate::index::{RetrievedMatch, SourceMetadata};

/// Fixed answer used whenever generation produced nothing usable.
pub const FALLBACK_ANSWER: &str =
    "I apologize, but I couldn't generate a proper response to your question.";

/// Maximum characters of source content returned to clients.
const MAX_SOURCE_CONTENT_CHARS: usize = 1000;

/// Answers shorter than this are treated as generation failures.
const MIN_ANSWER_CHARS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub content: String,
    pub metadata: SourceMetadata,
    pub score: f32,
}

/// The sole externally visible output of a query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<Source>,
    pub confidence: f32,
    pub num_sources: usize,
}

/// Raw pipeline output, before coercion.
#[derive(Debug)]
pub struct RawQueryOutcome {
    pub answer: String,
    pub matches: Vec<RetrievedMatch>,
    pub confidence: f32,
}

/// Mean retrieval similarity over all matches, clamped into [0, 1].
/// No matches scores 0.0; matches without a single usable score sit at a
/// neutral 0.5.
pub fn confidence(matches: &[RetrievedMatch]) -> f32 {
    if matches.is_empty() {
        return 0.0;
    }

    let total: f32 = matches
        .iter()
        .map(|m| m.score)
        .filter(|s| s.is_finite())
        .sum();

    if total <= 0.0 {
        0.5
    } else {
        (total / matches.len() as f32).clamp(0.0, 1.0)
    }
}

/// Coerce a raw outcome into the strict result shape.
pub fn validate(raw: RawQueryOutcome) -> QueryResult {
    let trimmed = raw.answer.trim();
    let answer = if trimmed.len() < MIN_ANSWER_CHARS {
        warn!(answer_len = trimmed.len(), "unusable answer, substituting fallback");
        FALLBACK_ANSWER.to_string()
    } else {
        trimmed.to_string()
    };

    let sources: Vec<Source> = raw.matches.into_iter().filter_map(source_from_match).collect();

    let confidence = if raw.confidence.is_finite() {
        raw.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    // Recomputed from the validated list, not trusted from upstream.
    let num_sources = sources.len();

    QueryResult {
        answer,
        sources,
        confidence,
        num_sources,
    }
}

/// The deterministic result every failed or empty query collapses to.
pub fn fallback_result(message: &str) -> QueryResult {
    QueryResult {
        answer: message.to_string(),
        sources: Vec::new(),
        confidence: 0.0,
        num_sources: 0,
    }
}

fn source_from_match(m: RetrievedMatch) -> Option<Source> {
    let content = m.text.trim();
    if content.is_empty() {
        warn!(id = %m.id, "dropping source without content");
        return None;
    }

    let content: String = content.chars().take(MAX_SOURCE_CONTENT_CHARS).collect();
    let score = if m.score.is_finite() {
        m.score.clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(Source {
        content,
        metadata: m.metadata,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn match_with_score(score: f32) -> RetrievedMatch {
        RetrievedMatch {
            id: "m".into(),
            score,
            text: "some passage content".into(),
            metadata: SourceMetadata::default(),
        }
    }

    #[test]
    fn no_matches_scores_zero() {
        assert_eq!(confidence(&[]), 0.0);
    }

    #[test]
    fn unusable_scores_sit_at_neutral() {
        let matches = vec![match_with_score(f32::NAN), match_with_score(f32::NAN)];
        assert_eq!(confidence(&matches), 0.5);

        let zeros = vec![match_with_score(0.0), match_with_score(0.0)];
        assert_eq!(confidence(&zeros), 0.5);
    }

    #[test]
    fn confidence_is_the_mean_of_scores() {
        let matches = vec![match_with_score(0.8), match_with_score(0.4)];
        assert!((confidence(&matches) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn confidence_is_always_in_unit_interval() {
        let cases: Vec<Vec<RetrievedMatch>> = vec![
            vec![],
            vec![match_with_score(5.0)],
            vec![match_with_score(-3.0)],
            vec![match_with_score(f32::INFINITY)],
            vec![match_with_score(f32::NAN), match_with_score(0.7)],
        ];
        for matches in cases {
            let c = confidence(&matches);
            assert!((0.0..=1.0).contains(&c), "confidence {c} out of range");
        }
    }

    #[test]
    fn short_answers_become_the_fallback() {
        let result = validate(RawQueryOutcome {
            answer: "ok".into(),
            matches: vec![match_with_score(0.9)],
            confidence: 0.9,
        });
        assert_eq!(result.answer, FALLBACK_ANSWER);
    }

    #[test]
    fn whitespace_answers_become_the_fallback() {
        let result = validate(RawQueryOutcome {
            answer: "   \n ".into(),
            matches: vec![],
            confidence: 0.0,
        });
        assert_eq!(result.answer, FALLBACK_ANSWER);
    }

    #[test]
    fn real_answers_pass_through_trimmed() {
        let result = validate(RawQueryOutcome {
            answer: "  A real answer with substance.  ".into(),
            matches: vec![],
            confidence: 0.3,
        });
        assert_eq!(result.answer, "A real answer with substance.");
    }

    #[test]
    fn content_is_capped_at_a_thousand_chars() {
        let mut m = match_with_score(0.5);
        m.text = "x".repeat(5000);
        let result = validate(RawQueryOutcome {
            answer: "A sufficiently long answer.".into(),
            matches: vec![m],
            confidence: 0.5,
        });
        assert_eq!(result.sources[0].content.chars().count(), 1000);
    }

    #[test]
    fn empty_sources_are_dropped_and_count_recomputed() {
        let mut empty = match_with_score(0.5);
        empty.text = "   ".into();
        let result = validate(RawQueryOutcome {
            answer: "A sufficiently long answer.".into(),
            matches: vec![empty, match_with_score(0.5)],
            confidence: 0.5,
        });
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.num_sources, 1);
    }

    #[test]
    fn source_scores_and_confidence_are_clamped() {
        let result = validate(RawQueryOutcome {
            answer: "A sufficiently long answer.".into(),
            matches: vec![match_with_score(7.5), match_with_score(f32::NAN)],
            confidence: f32::NAN,
        });
        assert_eq!(result.sources[0].score, 1.0);
        assert_eq!(result.sources[1].score, 0.0);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn fallback_result_is_deterministic() {
        let result = fallback_result(FALLBACK_ANSWER);
        assert_eq!(result.answer, FALLBACK_ANSWER);
        assert!(result.sources.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.num_sources, 0);
    }
}
