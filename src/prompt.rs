//! Prompt construction
//!
//! One fixed template. It stays short and deterministic so its token cost
//! is predictable; the context assembler subtracts it up front as the base
//! prompt reservation.

const INSTRUCTIONS: &str = "\
You are an assistant that answers questions using the provided document excerpts.

INSTRUCTIONS:
- Base your answer only on the context below
- Cite sources by their bracketed labels where relevant
- Say so plainly when the context is insufficient
- Do not state facts that are absent from the context";

/// Render the final prompt from a question and an assembled context block.
pub fn build_prompt(query: &str, context: &str) -> String {
    format!("{INSTRUCTIONS}\n\nCONTEXT:\n{context}\n\nQUESTION: {query}\n\nANSWER:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CharTokenEstimator, TokenEstimator};

    #[test]
    fn prompt_contains_question_and_context() {
        let prompt = build_prompt("What is chunking?", "[Source 1]\nchunking is splitting");
        assert!(prompt.contains("QUESTION: What is chunking?"));
        assert!(prompt.contains("[Source 1]\nchunking is splitting"));
        assert!(prompt.ends_with("ANSWER:"));
    }

    #[test]
    fn template_overhead_stays_under_base_reservation() {
        // 150 tokens is what the assembler reserves for the template.
        let overhead = build_prompt("", "");
        assert!(CharTokenEstimator::default().estimate(&overhead) <= 150);
    }

    #[test]
    fn template_is_deterministic() {
        assert_eq!(build_prompt("q", "c"), build_prompt("q", "c"));
    }
}
