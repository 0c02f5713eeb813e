//! Text Chunking
//!
//! Fits oversized text into a prompt budget by operating on whitespace words.
//! Word counts stand in for token counts, so both algorithms measure again
//! after every cut instead of trusting the arithmetic.
//!
//! ## Algorithms
//! - [`TextChunker::split`]: binary split at the middle word with a shared
//!   overlap window, until every piece fits. Pieces keep left-to-right order.
//! - [`TextChunker::truncate`]: cut the tail by the measured over-budget ratio
//!   and repeat until the text fits.
//!
//! Both run on an explicit work list, so input length never translates into
//! call-stack depth.
//!
//! The `measure` closure returns the token count of the whole prompt with the
//! candidate text substituted in, which is what the budget applies to.

use tracing::debug;

use crate::ai::tokenizer::TokenCount;
use crate::constants::long_text::{OVERLAP_SIZE, TEXT_KEY};
use crate::types::{AllmError, Result, ValidationError};

/// Splits or truncates text against a prompt-token budget
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    max_prompt_tokens: usize,
    overlap_size: usize,
}

impl TextChunker {
    pub fn new(max_prompt_tokens: usize) -> Self {
        Self {
            max_prompt_tokens,
            overlap_size: OVERLAP_SIZE,
        }
    }

    pub fn with_overlap(mut self, overlap_size: usize) -> Self {
        self.overlap_size = overlap_size;
        self
    }

    pub fn max_prompt_tokens(&self) -> usize {
        self.max_prompt_tokens
    }

    /// Prompt tokens that are not the text itself
    ///
    /// Measured with a one-word stand-in rather than an empty string, since an
    /// empty value can merge with surrounding whitespace when tokenized.
    fn fixed_overhead(&self, measure: &impl Fn(&str) -> usize) -> usize {
        measure(TEXT_KEY)
    }

    /// Split `text` into chunks whose prompts each fit the budget
    pub fn split(&self, text: &str, measure: impl Fn(&str) -> usize) -> Result<Vec<String>> {
        let budget = self.max_prompt_tokens;
        if measure(text) <= budget {
            return Ok(vec![text.to_string()]);
        }

        let overhead = self.fixed_overhead(&measure);
        if overhead > budget {
            return Err(ValidationError::PromptInstructionTooLong { overhead, budget }.into());
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        let mut chunks = Vec::new();
        let mut pending = Vec::new();
        self.push_halves(&mut pending, 0, words.len(), measure(text))?;

        while let Some((start, end)) = pending.pop() {
            let candidate = words[start..end].join(" ");
            let tokens = measure(&candidate);
            if tokens <= budget {
                chunks.push(candidate);
            } else {
                self.push_halves(&mut pending, start, end, tokens)?;
            }
        }

        debug!(chunks = chunks.len(), words = words.len(), "Split long text");
        Ok(chunks)
    }

    /// Queue both halves of `words[start..end]`, right first so left pops first
    ///
    /// Each side takes half of the overlap window. Spans shorter than twice the
    /// window cap each side at a quarter of the span, which keeps every half at
    /// most three quarters of its parent.
    fn push_halves(
        &self,
        pending: &mut Vec<(usize, usize)>,
        start: usize,
        end: usize,
        tokens: usize,
    ) -> Result<()> {
        if end - start < 2 {
            return Err(AllmError::Unsplittable {
                tokens,
                budget: self.max_prompt_tokens,
            });
        }

        let len = end - start;
        let cap = len / 4;
        let overlap_left = (self.overlap_size / 2).min(cap);
        let overlap_right = (self.overlap_size - self.overlap_size / 2).min(cap);
        let mid = start + len / 2;

        let left_end = mid + overlap_left;
        let right_start = mid - overlap_right;

        pending.push((right_start, end));
        pending.push((start, left_end));
        Ok(())
    }

    /// Drop trailing words until the prompt fits the budget
    pub fn truncate<C>(
        &self,
        text: &str,
        measure: impl Fn(&str) -> usize,
        counter: &C,
    ) -> Result<String>
    where
        C: TokenCount + ?Sized,
    {
        let budget = self.max_prompt_tokens;
        let mut current = text.to_string();

        loop {
            let tokens = measure(&current);
            if tokens <= budget {
                return Ok(current);
            }

            let overhead = self.fixed_overhead(&measure);
            let available = budget.saturating_sub(overhead);
            if available == 0 {
                return Err(ValidationError::PromptInstructionTooLong { overhead, budget }.into());
            }

            let words: Vec<&str> = current.split_whitespace().collect();
            if words.is_empty() {
                return Err(AllmError::Unsplittable { tokens, budget });
            }

            let ratio = counter.count_tokens(&current) as f64 / available as f64;
            let keep = ((words.len() as f64 / ratio) as usize).min(words.len() - 1);

            debug!(from = words.len(), to = keep, "Truncating text");
            current = words[..keep].join(" ");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Prompt of `overhead` words around the text, one token per word
    fn measure_with_overhead(overhead: usize) -> impl Fn(&str) -> usize {
        move |text: &str| overhead + text.split_whitespace().count()
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn word_count(text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// Index of the first and last `w{i}` word in a chunk
    fn bounds(chunk: &str) -> (usize, usize) {
        let index = |w: &str| w[1..].parse::<usize>().unwrap();
        let first = chunk.split_whitespace().next().unwrap();
        let last = chunk.split_whitespace().last().unwrap();
        (index(first), index(last))
    }

    #[test]
    fn test_split_fitting_text_is_single_chunk() {
        let text = "  keep   original\nspacing ";
        let chunks = TextChunker::new(100)
            .split(text, measure_with_overhead(5))
            .unwrap();
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_split_halves_with_overlap() {
        let chunker = TextChunker::new(70).with_overlap(10);
        let chunks = chunker.split(&words(100), measure_with_overhead(10)).unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("w0 "));
        assert!(chunks[0].ends_with(" w54"));
        assert!(chunks[1].starts_with("w45 "));
        assert!(chunks[1].ends_with(" w99"));
    }

    #[test]
    fn test_split_default_overlap_adds_half_window_per_side() {
        let text = words(100);
        let chunks = TextChunker::new(80).split(&text, word_count).unwrap();

        let all: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], all[0..75].join(" "));
        assert_eq!(chunks[1], all[25..100].join(" "));
    }

    #[test]
    fn test_split_short_text_with_large_overlap_terminates() {
        let chunker = TextChunker::new(6);
        let chunks = chunker.split(&words(8), measure_with_overhead(2)).unwrap();
        assert!(chunks.iter().all(|c| word_count(c) + 2 <= 6));
        assert_eq!(chunks.first().unwrap().split_whitespace().next(), Some("w0"));
        assert_eq!(chunks.last().unwrap().split_whitespace().last(), Some("w7"));
    }

    #[test]
    fn test_split_overhead_over_budget() {
        let err = TextChunker::new(10)
            .split(&words(50), measure_with_overhead(20))
            .unwrap_err();
        assert!(matches!(
            err,
            AllmError::Validation(ValidationError::PromptInstructionTooLong { .. })
        ));
    }

    #[test]
    fn test_split_single_huge_word_is_unsplittable() {
        let measure = |text: &str| text.len();
        let text = format!("{} b", "a".repeat(100));
        let err = TextChunker::new(20).split(&text, measure).unwrap_err();
        assert!(matches!(err, AllmError::Unsplittable { .. }));
    }

    #[test]
    fn test_truncate_fitting_text_unchanged() {
        let counter = |text: &str| word_count(text);
        let text = words(10);
        let out = TextChunker::new(50)
            .truncate(&text, measure_with_overhead(5), &counter)
            .unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_truncate_keeps_prefix() {
        let counter = |text: &str| word_count(text);
        let out = TextChunker::new(40)
            .truncate(&words(200), measure_with_overhead(10), &counter)
            .unwrap();
        assert!(word_count(&out) + 10 <= 40);
        assert!(out.starts_with("w0 w1"));
    }

    #[test]
    fn test_truncate_instruction_too_long() {
        let counter = |text: &str| word_count(text);
        let err = TextChunker::new(10)
            .truncate(&words(50), measure_with_overhead(10), &counter)
            .unwrap_err();
        assert!(matches!(
            err,
            AllmError::Validation(ValidationError::PromptInstructionTooLong {
                overhead: 11,
                budget: 10
            })
        ));
    }

    #[test]
    fn test_truncate_with_underestimating_counter_still_shrinks() {
        // Counter sees half the real tokens, so every ratio underestimates
        let counter = |text: &str| word_count(text) / 2;
        let out = TextChunker::new(30)
            .truncate(&words(100), measure_with_overhead(5), &counter)
            .unwrap();
        assert!(word_count(&out) + 5 <= 30);
    }

    proptest! {
        #[test]
        fn prop_split_terminates_within_budget(
            n in 0usize..300,
            overhead in 0usize..20,
            extra in 3usize..60,
            overlap in 0usize..80,
        ) {
            let budget = overhead + extra;
            let text = words(n);
            let chunker = TextChunker::new(budget).with_overlap(overlap);
            let chunks = chunker.split(&text, measure_with_overhead(overhead)).unwrap();

            prop_assert!(!chunks.is_empty());
            for chunk in &chunks {
                prop_assert!(overhead + word_count(chunk) <= budget);
            }
        }

        #[test]
        fn prop_split_covers_every_word(n in 1usize..300, extra in 2usize..40) {
            let text = words(n);
            let chunks = TextChunker::new(extra).with_overlap(6)
                .split(&text, measure_with_overhead(0))
                .unwrap();

            let seen: std::collections::HashSet<&str> =
                chunks.iter().flat_map(|c| c.split_whitespace()).collect();
            prop_assert_eq!(seen.len(), n);
            prop_assert_eq!(chunks[0].split_whitespace().next(), Some("w0"));
            let last = chunks.last().unwrap().split_whitespace().last().unwrap().to_string();
            prop_assert_eq!(last, format!("w{}", n - 1));
        }

        #[test]
        fn prop_adjacent_chunks_share_at_most_the_window(
            n in 1usize..300,
            extra in 3usize..60,
            overlap in 0usize..40,
        ) {
            let chunks = TextChunker::new(extra).with_overlap(overlap)
                .split(&words(n), measure_with_overhead(0))
                .unwrap();

            for pair in chunks.windows(2) {
                let (_, left_last) = bounds(&pair[0]);
                let (right_first, _) = bounds(&pair[1]);
                prop_assert!(right_first <= left_last + 1);
                prop_assert!(left_last + 1 - right_first <= overlap);
            }
        }

        #[test]
        fn prop_large_span_gets_half_window_per_side(
            overlap in 0usize..40,
            slack in 0usize..200,
        ) {
            let n = 4 * overlap + 4 + slack;
            let mid = n / 2;
            // Both halves fit, the whole text does not
            let budget = n - mid + overlap;
            let chunks = TextChunker::new(budget).with_overlap(overlap)
                .split(&words(n), measure_with_overhead(0))
                .unwrap();

            prop_assert_eq!(chunks.len(), 2);
            prop_assert_eq!(bounds(&chunks[0]), (0, mid + overlap / 2 - 1));
            prop_assert_eq!(bounds(&chunks[1]), (mid - (overlap - overlap / 2), n - 1));
        }

        #[test]
        fn prop_truncate_converges(n in 0usize..500, overhead in 0usize..20, extra in 2usize..80) {
            let budget = overhead + extra;
            let counter = |text: &str| word_count(text);
            let out = TextChunker::new(budget)
                .truncate(&words(n), measure_with_overhead(overhead), &counter)
                .unwrap();
            prop_assert!(overhead + word_count(&out) <= budget);
            prop_assert!(word_count(&out) <= n);
        }
    }
}
