//! Context assembly under a token budget
//!
//! Retrieved passages are folded into a single context string, best-first:
//! passages are walked in rank order, included whole while they fit, and the
//! first passage that does not fit is truncated into the remaining budget.
//! The estimator is a deliberate approximation (characters over a fixed
//! divisor) kept behind a trait so a real tokenizer could be swapped in.

use std::collections::HashSet;

use crate::index::RetrievedMatch;

pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;

    /// Upper bound on the characters that fit into `tokens`. Used to size
    /// truncation prefixes; `estimate` stays the source of truth.
    fn max_chars_for(&self, tokens: usize) -> usize {
        tokens * 4
    }
}

/// Character-count heuristic, conservative on purpose.
#[derive(Debug, Clone)]
pub struct CharTokenEstimator {
    pub chars_per_token: usize,
}

impl Default for CharTokenEstimator {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl TokenEstimator for CharTokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.len() / self.chars_per_token.max(1)
    }

    fn max_chars_for(&self, tokens: usize) -> usize {
        tokens * self.chars_per_token.max(1)
    }
}

pub const TRUNCATION_MARKER: &str = "... [truncated]";

const PASSAGE_SEPARATOR: &str = "\n\n";

/// Floor applied when the budget computes non-positive.
const MIN_CONTEXT_TOKENS: usize = 100;

/// Smallest remainder worth filling with a truncated passage.
const MIN_TRUNCATED_TOKENS: usize = 50;

/// At most this many passages are considered for one context.
const MAX_CONTEXT_PASSAGES: usize = 10;

#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub max_total_tokens: usize,
    pub base_prompt_tokens: usize,
    pub safety_buffer_tokens: usize,
}

pub struct ContextAssembler {
    config: AssemblerConfig,
    estimator: Box<dyn TokenEstimator>,
}

impl ContextAssembler {
    pub fn new(config: AssemblerConfig, estimator: Box<dyn TokenEstimator>) -> Self {
        Self { config, estimator }
    }

    /// Tokens left for context once the completion, the prompt template, a
    /// safety buffer and the query itself are spoken for. Never zero: a
    /// non-positive budget is floored instead of propagated as an error.
    pub fn available_tokens(&self, query: &str, reserved_generation_tokens: usize) -> usize {
        let fixed = reserved_generation_tokens
            + self.config.base_prompt_tokens
            + self.config.safety_buffer_tokens
            + self.estimator.estimate(query);

        let available = self.config.max_total_tokens.saturating_sub(fixed);
        if available == 0 {
            tracing::warn!(
                fixed,
                max_total = self.config.max_total_tokens,
                "token budget exhausted before context, applying floor"
            );
            MIN_CONTEXT_TOKENS
        } else {
            available
        }
    }

    /// Build the context string from ranked passages. The estimated cost of
    /// the result never exceeds `available_tokens(query, reserved)`.
    pub fn assemble(
        &self,
        passages: &[RetrievedMatch],
        query: &str,
        reserved_generation_tokens: usize,
    ) -> String {
        let available = self.available_tokens(query, reserved_generation_tokens);

        let mut context = String::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut included = 0usize;

        for passage in passages {
            if included >= MAX_CONTEXT_PASSAGES {
                break;
            }

            let text = passage.text.trim();
            if text.is_empty() || seen.contains(text) {
                continue;
            }

            let header = format!(
                "[Source {}: {}, chunk {}]",
                included + 1,
                passage.metadata.document_name,
                passage.metadata.chunk_index
            );
            let part = format!("{header}\n{text}");
            let candidate = if context.is_empty() {
                part
            } else {
                format!("{context}{PASSAGE_SEPARATOR}{part}")
            };

            if self.estimator.estimate(&candidate) <= available {
                context = candidate;
                seen.insert(text);
                included += 1;
                continue;
            }

            // Boundary passage: include a truncated prefix when enough
            // budget remains, then stop either way.
            let remaining = available.saturating_sub(self.estimator.estimate(&context));
            if remaining > MIN_TRUNCATED_TOKENS {
                let overhead = if context.is_empty() {
                    0
                } else {
                    PASSAGE_SEPARATOR.len()
                } + header.len()
                    + 1
                    + TRUNCATION_MARKER.len();

                let mut prefix_len = self
                    .estimator
                    .max_chars_for(remaining)
                    .saturating_sub(overhead)
                    .min(text.len());

                loop {
                    while prefix_len > 0 && !text.is_char_boundary(prefix_len) {
                        prefix_len -= 1;
                    }
                    if prefix_len == 0 {
                        break;
                    }

                    let truncated =
                        format!("{header}\n{}{TRUNCATION_MARKER}", &text[..prefix_len]);
                    let candidate = if context.is_empty() {
                        truncated
                    } else {
                        format!("{context}{PASSAGE_SEPARATOR}{truncated}")
                    };

                    if self.estimator.estimate(&candidate) <= available {
                        context = candidate;
                        included += 1;
                        break;
                    }
                    prefix_len = prefix_len.saturating_sub(prefix_len / 8 + 1);
                }
            }
            break;
        }

        tracing::debug!(
            passages = included,
            estimated_tokens = self.estimator.estimate(&context),
            available,
            "context assembled"
        );

        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SourceMetadata;

    fn assembler() -> ContextAssembler {
        ContextAssembler::new(
            AssemblerConfig {
                max_total_tokens: 2048,
                base_prompt_tokens: 150,
                safety_buffer_tokens: 50,
            },
            Box::new(CharTokenEstimator::default()),
        )
    }

    fn passage(document: &str, index: usize, text: &str, score: f32) -> RetrievedMatch {
        RetrievedMatch {
            id: format!("{document}-{index}"),
            score,
            text: text.to_string(),
            metadata: SourceMetadata {
                document_name: document.to_string(),
                chunk_index: index,
                ..Default::default()
            },
        }
    }

    #[test]
    fn budget_subtracts_all_reservations() {
        let a = assembler();
        // 2048 - 400 - 150 - 50 - (40 chars / 4) = 1438
        assert_eq!(a.available_tokens(&"q".repeat(40), 400), 1438);
    }

    #[test]
    fn exhausted_budget_is_floored_not_an_error() {
        let a = assembler();
        assert_eq!(a.available_tokens("question", 4000), MIN_CONTEXT_TOKENS);
    }

    #[test]
    fn estimated_cost_never_exceeds_budget() {
        let a = assembler();
        let estimator = CharTokenEstimator::default();
        let passages: Vec<RetrievedMatch> = (0..12)
            .map(|i| passage("doc", i, &format!("passage {i} ").repeat(60), 0.9))
            .collect();

        for reserved in [0, 50, 400, 1500, 1900, 4000] {
            let context = a.assemble(&passages, "what is the answer?", reserved);
            let available = a.available_tokens("what is the answer?", reserved);
            assert!(
                estimator.estimate(&context) <= available,
                "reserved={reserved}: {} > {available}",
                estimator.estimate(&context)
            );
        }
    }

    #[test]
    fn includes_passages_in_rank_order() {
        let a = assembler();
        let passages = vec![
            passage("doc", 0, "first ranked passage", 0.9),
            passage("doc", 1, "second ranked passage", 0.7),
        ];

        let context = a.assemble(&passages, "q", 400);
        let first = context.find("first ranked passage").unwrap();
        let second = context.find("second ranked passage").unwrap();
        assert!(first < second);
        assert!(context.contains("[Source 1: doc, chunk 0]"));
        assert!(context.contains("[Source 2: doc, chunk 1]"));
    }

    #[test]
    fn boundary_passage_is_truncated_with_marker() {
        let a = assembler();
        let passages = vec![
            passage("doc", 0, &"lead content ".repeat(400), 0.9),
            passage("doc", 1, &"tail content ".repeat(400), 0.8),
        ];

        let context = a.assemble(&passages, "q", 400);
        assert!(context.contains("lead content"));
        assert!(context.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn duplicate_content_appears_once() {
        let a = assembler();
        let passages = vec![
            passage("doc-a", 0, "the same exact paragraph", 0.9),
            passage("doc-b", 3, "the same exact paragraph", 0.8),
            passage("doc-c", 1, "something different", 0.7),
        ];

        let context = a.assemble(&passages, "q", 400);
        assert_eq!(context.matches("the same exact paragraph").count(), 1);
        assert!(context.contains("something different"));
    }

    #[test]
    fn empty_and_blank_passages_are_skipped() {
        let a = assembler();
        let passages = vec![
            passage("doc", 0, "   ", 0.9),
            passage("doc", 1, "real content", 0.8),
        ];

        let context = a.assemble(&passages, "q", 400);
        assert!(context.starts_with("[Source 1:"));
        assert!(context.contains("real content"));
    }

    #[test]
    fn no_passages_yields_empty_context() {
        let a = assembler();
        assert!(a.assemble(&[], "q", 400).is_empty());
    }

    #[test]
    fn considers_at_most_ten_passages() {
        let a = ContextAssembler::new(
            AssemblerConfig {
                max_total_tokens: 100_000,
                base_prompt_tokens: 150,
                safety_buffer_tokens: 50,
            },
            Box::new(CharTokenEstimator::default()),
        );
        let passages: Vec<RetrievedMatch> = (0..15)
            .map(|i| passage("doc", i, &format!("unique passage number {i}"), 0.9))
            .collect();

        let context = a.assemble(&passages, "q", 400);
        assert!(context.contains("[Source 10:"));
        assert!(!context.contains("[Source 11:"));
        assert!(!context.contains("unique passage number 10"));
    }
}
