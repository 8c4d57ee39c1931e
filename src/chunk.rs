//! Sliding-window text chunker with fixed overlap.
//!
//! Splits extracted document text into bounded, overlapping substrings.
//! Window ends are snapped backward to natural boundaries (paragraph,
//! sentence, line, word) so chunks rarely cut mid-sentence; each window
//! starts a fixed overlap before the previous end so neighboring chunks
//! share trailing context.
//!
//! Chunks are exact substrings of the input — no trimming — and carry
//! their byte offsets. Chunk coverage advances monotonically: a boundary
//! is only accepted if it leaves the chunk extending past its
//! predecessor's end, so concatenating the non-overlapping portions
//! reconstructs the source text for every overlap smaller than the
//! maximum chunk size.

/// A contiguous substring of the extracted document text, the unit of
/// retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position in document order, contiguous from 0.
    pub index: usize,
    pub text: String,
    /// Byte offset of the chunk's first byte in the source text.
    pub start: usize,
    /// Byte offset one past the chunk's last byte.
    pub end: usize,
}

/// Split `text` into chunks of at most `max_chars` bytes with `overlap`
/// bytes shared between neighbors. Both limits are snapped down to char
/// boundaries, never splitting a code point.
///
/// Text no longer than `max_chars` yields a single chunk equal to the
/// input; empty text yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<Chunk> {
    debug_assert!(overlap < max_chars);

    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_chars {
        return vec![Chunk {
            index: 0,
            text: text.to_string(),
            start: 0,
            end: text.len(),
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut prev_end = 0usize;

    while start < text.len() {
        let hard_end = floor_char_boundary(text, (start + max_chars).min(text.len()));
        let mut end = if hard_end < text.len() {
            // A boundary is usable only if it leaves this chunk extending
            // past the previous chunk's end; otherwise the overlap step
            // would walk coverage backwards and reconstruction breaks.
            let min_offset = prev_end - start;
            find_break_point(&text[start..hard_end], min_offset)
                .map(|offset| start + offset)
                .unwrap_or(hard_end)
        } else {
            hard_end
        };
        if end <= prev_end {
            // Reachable only when the overlap is within a few bytes of the
            // maximum and the window lands mid-code-point: force minimal
            // forward progress instead of regressing.
            end = ceil_char_boundary(text, prev_end + 1);
        }

        chunks.push(Chunk {
            index: chunks.len(),
            text: text[start..end].to_string(),
            start,
            end,
        });

        if end >= text.len() {
            break;
        }

        prev_end = end;

        // Step back by the overlap; if the chunk was no larger than the
        // overlap, continue from its end instead of looping in place.
        let next = floor_char_boundary(text, end.saturating_sub(overlap));
        start = if next > start { next } else { end };
    }

    chunks
}

/// Find a break point near the end of a window, preferring paragraph,
/// then sentence, line, then word boundaries. A boundary qualifies only
/// if it lies in the window's final two thirds and past `min_offset`
/// (the overlap this window shares with its predecessor), so every chunk
/// contributes new text. Returns the byte offset one past the boundary,
/// or `None` if no boundary qualifies.
fn find_break_point(window: &str, min_offset: usize) -> Option<usize> {
    let len = window.len();
    let usable = |offset: usize| offset > len / 3 && offset > min_offset;

    if let Some(pos) = window.rfind("\n\n") {
        if usable(pos + 2) {
            return Some(pos + 2);
        }
    }

    for pattern in &[". ", "! ", "? ", ".\n", "!\n", "?\n"] {
        if let Some(pos) = window.rfind(pattern) {
            if usable(pos + pattern.len()) {
                return Some(pos + pattern.len());
            }
        }
    }

    if let Some(pos) = window.rfind('\n') {
        if usable(pos + 1) {
            return Some(pos + 1);
        }
    }

    window.rfind(' ').map(|pos| pos + 1).filter(|&o| usable(o))
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
