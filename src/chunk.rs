//! Overlapping text chunker.
//!
//! Splits extracted document text into [`Segment`]s of at most
//! `max_chunk_size` characters, each starting `overlap` characters before
//! the end of its predecessor. Boundaries prefer a natural breakpoint
//! (newline, sentence end, whitespace) within a small lookback window and
//! fall back to a hard character cut. Breakpoint choice affects retrieval
//! quality, never correctness.
//!
//! Invariant: concatenating a document's segments in ordinal order, dropping
//! the first `overlap` characters of every segment after the first, yields
//! the extracted text exactly. No gaps, no silent truncation.

use crate::config::ChunkingConfig;
use crate::models::Segment;

/// Split text into overlapping segments. Empty text yields zero segments;
/// text shorter than `max_chunk_size` yields exactly one.
///
/// Operates on characters, not bytes, so multi-byte UTF-8 never splits.
pub fn chunk_text(document_identity: &str, text: &str, cfg: &ChunkingConfig) -> Vec<Segment> {
    let max = cfg.max_chunk_size;
    let overlap = cfg.overlap;

    // Byte offset of every char boundary, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = bounds.len() - 1;

    if n == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut ordinal = 0i64;

    loop {
        let hard_end = (start + max).min(n);
        let end = if hard_end < n {
            find_breakpoint(&chars, start, hard_end, max, overlap).unwrap_or(hard_end)
        } else {
            hard_end
        };

        segments.push(Segment {
            document_identity: document_identity.to_string(),
            ordinal,
            text: text[bounds[start]..bounds[end]].to_string(),
        });

        if end == n {
            break;
        }
        ordinal += 1;
        // Guard keeps progress even if a breakpoint landed inside the
        // overlap region of a pathologically small max.
        start = end.saturating_sub(overlap).max(start + 1);
    }

    segments
}

/// Look backwards from `hard_end` for a natural cut, in priority order:
/// line break, sentence end followed by whitespace, any whitespace. The cut
/// must leave the segment longer than `overlap` so the next segment's start
/// stays behind this segment's end.
fn find_breakpoint(
    chars: &[char],
    start: usize,
    hard_end: usize,
    max: usize,
    overlap: usize,
) -> Option<usize> {
    let lookback = (max / 4).clamp(1, 48);
    let window_start = hard_end.saturating_sub(lookback).max(start);
    let acceptable = |cut: usize| cut > start + overlap;

    for p in (window_start..hard_end).rev() {
        if chars[p] == '\n' && acceptable(p + 1) {
            return Some(p + 1);
        }
    }

    // The cut lands after the whitespace, so punctuation sitting on the
    // window edge must not push the segment past hard_end.
    for p in (window_start..hard_end).rev() {
        if matches!(chars[p], '.' | '!' | '?')
            && chars.get(p + 1).is_some_and(|c| c.is_whitespace())
            && p + 2 <= hard_end
            && acceptable(p + 2)
        {
            return Some(p + 2);
        }
    }

    for p in (window_start..hard_end).rev() {
        if chars[p].is_whitespace() && acceptable(p + 1) {
            return Some(p + 1);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_chunk_size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chunk_size,
            overlap,
        }
    }

    /// Stitch segments back together, dropping each duplicated overlap.
    fn reconstruct(segments: &[Segment], overlap: usize) -> String {
        let mut out = String::new();
        for (i, seg) in segments.iter().enumerate() {
            if i == 0 {
                out.push_str(&seg.text);
            } else {
                out.extend(seg.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn empty_text_yields_zero_segments() {
        let segments = chunk_text("doc", "", &cfg(100, 10));
        assert!(segments.is_empty());
    }

    #[test]
    fn short_text_yields_single_segment() {
        let segments = chunk_text("doc", "Hello, world!", &cfg(100, 10));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].ordinal, 0);
        assert_eq!(segments[0].text, "Hello, world!");
    }

    #[test]
    fn ordinals_are_contiguous_from_zero() {
        let text = "word ".repeat(200);
        let segments = chunk_text("doc", &text, &cfg(40, 8));
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.ordinal, i as i64);
        }
    }

    #[test]
    fn segments_never_exceed_max() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(30);
        let segments = chunk_text("doc", &text, &cfg(64, 12));
        for seg in &segments {
            assert!(seg.text.chars().count() <= 64, "segment too long");
        }
    }

    #[test]
    fn adjacent_segments_share_exactly_the_overlap() {
        let text = "Sentence one here. Sentence two follows. Sentence three ends it. And more text to spill over.";
        let overlap = 5;
        let segments = chunk_text("doc", text, &cfg(30, overlap));
        assert!(segments.len() > 1);
        for pair in segments.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let tail: String = prev[prev.len() - overlap..].iter().collect();
            let head: String = pair[1].text.chars().take(overlap).collect();
            assert_eq!(tail, head, "overlap mismatch between ordinals");
        }
    }

    #[test]
    fn reconstruction_is_exact() {
        let texts = [
            "A single short line.",
            "Paragraph one.\n\nParagraph two is a bit longer than the first.\n\nThird.",
            &"abcdefghij".repeat(57),
            "Unicode: caffè età, näive résumé. Ünïcödé wörds spréad äcross chünks hère.",
        ];
        for text in texts {
            for (max, overlap) in [(12, 3), (25, 0), (40, 10)] {
                let segments = chunk_text("doc", text, &cfg(max, overlap));
                assert_eq!(
                    reconstruct(&segments, overlap),
                    *text,
                    "reconstruction failed for max={max} overlap={overlap}"
                );
            }
        }
    }

    #[test]
    fn sentence_boundary_scenario() {
        // max=12/overlap=3 over three short sentences: four segments, each
        // within bounds, sharing exactly three characters with its neighbor.
        let text = "A cat sat. A dog ran. A bird flew.";
        let segments = chunk_text("doc", text, &cfg(12, 3));
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].text, "A cat sat. ");
        for seg in &segments {
            assert!(seg.text.chars().count() <= 12);
        }
        for pair in segments.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let tail: String = prev[prev.len() - 3..].iter().collect();
            let head: String = pair[1].text.chars().take(3).collect();
            assert_eq!(tail, head);
        }
        assert_eq!(reconstruct(&segments, 3), text);
    }

    #[test]
    fn sentence_end_at_cut_boundary_stays_within_max() {
        // '.' at index max-1 with whitespace after it: the sentence cut
        // would land one past the hard end, so it must be rejected.
        let text = "abcdefghi. jklmnop";
        let segments = chunk_text("doc", text, &cfg(10, 2));
        for seg in &segments {
            assert!(
                seg.text.chars().count() <= 10,
                "segment {:?} exceeds max",
                seg.text
            );
        }
        assert_eq!(reconstruct(&segments, 2), text);
    }

    #[test]
    fn breakpoint_prefers_newline_over_space() {
        let text = "first line\nsecond line that keeps going for a while here";
        let segments = chunk_text("doc", text, &cfg(12, 2));
        assert_eq!(segments[0].text, "first line\n");
    }

    #[test]
    fn deterministic_across_calls() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta iota kappa.";
        let a = chunk_text("doc", text, &cfg(20, 4));
        let b = chunk_text("doc", text, &cfg(20, 4));
        assert_eq!(a, b);
    }
}
