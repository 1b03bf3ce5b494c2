
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::tokenizer::{CHARS_PER_TOKEN, TokenCounter, TokenStream};

/// Progress callback: status label, completed fraction, optional detail.
/// Callers that do not care pass `None` and nothing is reported.
pub type ProgressFn = dyn Fn(&str, f32, Option<&str>) + Send + Sync;

/// Status label reported while a document is being split.
pub const CHUNKING_STATUS: &str = "chunking";

/// Configuration for token-window splitting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Token ceiling for every produced chunk.
    pub chunk_size: usize,
    /// Approximate tokens shared between adjacent chunks.
    pub chunk_overlap: usize,
    /// How many tokens past the raw window to search for a sentence end.
    pub boundary_lookahead: usize,
    /// Inputs at or above this many bytes skip sentence-boundary search.
    pub large_document_threshold: usize,
    /// Hard cap on split iterations for a single document.
    pub max_iterations: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            boundary_lookahead: 50,
            large_document_threshold: 100_000,
            max_iterations: 10_000,
        }
    }
}

/// A bounded slice of document text with its byte span in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub token_count: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Split `text` into chunks of at most `chunk_size` tokens, with adjacent
/// chunks sharing roughly `chunk_overlap` tokens. Sentence boundaries are
/// preferred for readability on smaller inputs.
///
/// The pipeline is split → validate → repair → final check; every stage
/// degrades rather than fails, so this returns a chunk list for any input.
#[inline]
pub fn split_text(
    text: &str,
    counter: &TokenCounter,
    config: &ChunkingConfig,
    progress: Option<&ProgressFn>,
) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    if config.chunk_overlap >= config.chunk_size {
        warn!(
            "chunk_overlap ({}) >= chunk_size ({}); windows will be forced forward one token at a time",
            config.chunk_overlap, config.chunk_size
        );
    }

    let stream = match counter.encode(text) {
        Ok(stream) => stream,
        Err(e) => {
            error!(
                "Document could not be encoded ({}), using character-window split",
                e
            );
            return char_window_split(text, 0, counter, config.chunk_size);
        }
    };

    let total_tokens = stream.len();
    if total_tokens <= config.chunk_size {
        return vec![TextChunk {
            text: text.to_string(),
            token_count: total_tokens,
            start_offset: 0,
            end_offset: text.len(),
        }];
    }

    let chunks = primary_split(text, &stream, counter, config, progress);
    let chunks = validate_and_repair(chunks, counter, config);

    // A multi-window document collapsing to one chunk means both repair
    // passes failed; the character split is the absolute last resort.
    if chunks.len() == 1 && total_tokens > config.chunk_size {
        error!(
            "Document of {} tokens produced a single chunk against a ceiling of {}; applying character-window split",
            total_tokens, config.chunk_size
        );
        return char_window_split(text, 0, counter, config.chunk_size);
    }

    chunks
}

/// Windowed token-boundary split with sentence-end lookahead.
fn primary_split(
    text: &str,
    stream: &TokenStream,
    counter: &TokenCounter,
    config: &ChunkingConfig,
    progress: Option<&ProgressFn>,
) -> Vec<TextChunk> {
    let total_tokens = stream.len();
    let use_lookahead = text.len() < config.large_document_threshold;
    let advance = config
        .chunk_size
        .saturating_sub(config.chunk_overlap)
        .max(1);
    let expected_chunks = total_tokens.div_ceil(advance);
    let cadence = progress_cadence(expected_chunks);
    let started = Instant::now();

    let mut chunks = Vec::with_capacity(expected_chunks);
    let mut start_idx = 0usize;
    let mut iterations = 0usize;

    while start_idx < total_tokens {
        iterations += 1;
        if iterations > config.max_iterations {
            error!(
                "Splitting exceeded {} iterations at token {}/{}; emitting the remainder as one window",
                config.max_iterations, start_idx, total_tokens
            );
            chunks.push(make_chunk(text, stream, counter, start_idx, total_tokens));
            break;
        }

        let raw_end = (start_idx + config.chunk_size).min(total_tokens);
        let end_idx = if use_lookahead && raw_end < total_tokens {
            extend_to_sentence_end(text, stream, counter, config, start_idx, raw_end)
        } else {
            raw_end
        };

        chunks.push(make_chunk(text, stream, counter, start_idx, end_idx));

        if chunks.len() % cadence == 0 {
            report_progress(progress, start_idx, total_tokens, &started, chunks.len());
        }

        if end_idx >= total_tokens {
            break;
        }

        let next_start = end_idx.saturating_sub(config.chunk_overlap);
        start_idx = if next_start > start_idx {
            next_start
        } else {
            // The overlap swallowed the whole window; without this the loop
            // would never advance.
            warn!(
                "Window [{}, {}) makes no progress with overlap {}; advancing by one token",
                start_idx, end_idx, config.chunk_overlap
            );
            start_idx + 1
        };
    }

    if let Some(callback) = progress {
        let detail = format!("{} chunks", chunks.len());
        callback(CHUNKING_STATUS, 1.0, Some(&detail));
    }

    chunks
}

/// Build the chunk for the token window `[start_idx, end_idx)`. The byte
/// span runs to the start of the token after the window so that adjacent
/// spans stay contiguous regardless of inter-token whitespace.
fn make_chunk(
    text: &str,
    stream: &TokenStream,
    counter: &TokenCounter,
    start_idx: usize,
    end_idx: usize,
) -> TextChunk {
    let start_offset = if start_idx == 0 {
        0
    } else {
        stream.start_of(start_idx).unwrap_or(0)
    };
    let end_offset = if end_idx >= stream.len() {
        text.len()
    } else {
        stream.start_of(end_idx).unwrap_or(text.len())
    };
    let slice = text.get(start_offset..end_offset).unwrap_or_default();

    TextChunk {
        text: slice.to_string(),
        token_count: counter.count_tokens(slice),
        start_offset,
        end_offset,
    }
}

/// Search up to `boundary_lookahead` tokens past `raw_end` for a sentence
/// end and cut there instead, as long as the extended window re-encodes
/// within the chunk size. Returns `raw_end` unchanged when no boundary fits.
fn extend_to_sentence_end(
    text: &str,
    stream: &TokenStream,
    counter: &TokenCounter,
    config: &ChunkingConfig,
    start_idx: usize,
    raw_end: usize,
) -> usize {
    let limit = (raw_end + config.boundary_lookahead).min(stream.len());

    for cut in (raw_end + 1)..=limit {
        if !is_sentence_end(text, stream, cut) {
            continue;
        }

        let span_start = if start_idx == 0 {
            0
        } else {
            stream.start_of(start_idx).unwrap_or(0)
        };
        let span_end = if cut >= stream.len() {
            text.len()
        } else {
            stream.start_of(cut).unwrap_or(text.len())
        };
        let Some(candidate) = text.get(span_start..span_end) else {
            break;
        };

        if counter.count_tokens(candidate) <= config.chunk_size {
            debug!(
                "Extended window to sentence end at token {} (+{} tokens)",
                cut,
                cut - raw_end
            );
            return cut;
        }
        // Farther boundaries only grow the window.
        break;
    }

    raw_end
}

/// A window cut at token index `cut` lands on a sentence end when the last
/// included token ends with `.`, `!` or `?` followed by whitespace, or when
/// a blank line separates it from the next token.
fn is_sentence_end(text: &str, stream: &TokenStream, cut: usize) -> bool {
    let Some(last_end) = stream.end_of(cut - 1) else {
        return false;
    };

    let before = text.get(..last_end).and_then(|s| s.chars().next_back());
    if matches!(before, Some('.' | '!' | '?')) {
        let after = text.get(last_end..).and_then(|s| s.chars().next());
        if after.is_none_or(char::is_whitespace) {
            return true;
        }
    }

    let next_start = if cut >= stream.len() {
        text.len()
    } else {
        stream.start_of(cut).unwrap_or(last_end)
    };
    text.get(last_end..next_start)
        .is_some_and(|gap| gap.matches('\n').count() >= 2)
}

/// Re-encode every chunk and force-split any that exceed the ceiling.
fn validate_and_repair(
    chunks: Vec<TextChunk>,
    counter: &TokenCounter,
    config: &ChunkingConfig,
) -> Vec<TextChunk> {
    let mut repaired = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        if chunk.token_count <= config.chunk_size {
            repaired.push(chunk);
            continue;
        }

        warn!(
            "Chunk at [{}, {}) holds {} tokens against a ceiling of {}; force splitting",
            chunk.start_offset, chunk.end_offset, chunk.token_count, config.chunk_size
        );
        repaired.extend(force_split(
            &chunk.text,
            chunk.start_offset,
            counter,
            config.chunk_size,
        ));
    }

    repaired
}

/// Fixed-width token-window split with no boundary search, used to repair
/// oversized chunks. Guaranteed to terminate: each recursion level halves
/// the window, bottoming out at one token per piece.
fn force_split(
    slice: &str,
    base_offset: usize,
    counter: &TokenCounter,
    ceiling: usize,
) -> Vec<TextChunk> {
    force_split_window(slice, base_offset, counter, ceiling, ceiling.max(1))
}

fn force_split_window(
    slice: &str,
    base_offset: usize,
    counter: &TokenCounter,
    ceiling: usize,
    window: usize,
) -> Vec<TextChunk> {
    let Ok(stream) = counter.encode(slice) else {
        return char_window_split(slice, base_offset, counter, ceiling);
    };
    let total = stream.len();
    if total == 0 {
        return Vec::new();
    }

    let mut pieces = Vec::with_capacity(total.div_ceil(window));
    let mut start = 0usize;

    while start < total {
        let end = (start + window).min(total);
        let span_start = if start == 0 {
            0
        } else {
            stream.start_of(start).unwrap_or(0)
        };
        let span_end = if end >= total {
            slice.len()
        } else {
            stream.start_of(end).unwrap_or(slice.len())
        };
        let piece = slice.get(span_start..span_end).unwrap_or_default();
        let token_count = counter.count_tokens(piece);

        if token_count > ceiling && window > 1 {
            // Re-encoding can disagree with the window width at merge
            // boundaries; a narrower window always converges.
            pieces.extend(force_split_window(
                piece,
                base_offset + span_start,
                counter,
                ceiling,
                window / 2,
            ));
        } else {
            if token_count > ceiling {
                error!(
                    "Single-token window still re-encodes to {} tokens (ceiling {}); keeping it",
                    token_count, ceiling
                );
            }
            pieces.push(TextChunk {
                text: piece.to_string(),
                token_count,
                start_offset: base_offset + span_start,
                end_offset: base_offset + span_end,
            });
        }

        start = end;
    }

    pieces
}

/// Last-resort split into fixed character windows sized by the
/// chars-per-token heuristic. Used when encoding itself is unavailable.
fn char_window_split(
    text: &str,
    base_offset: usize,
    counter: &TokenCounter,
    ceiling: usize,
) -> Vec<TextChunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let window_chars = (ceiling * CHARS_PER_TOKEN).max(1);
    let mut boundaries = vec![0usize];
    for (count, (byte_idx, _)) in text.char_indices().enumerate() {
        if count > 0 && count % window_chars == 0 {
            boundaries.push(byte_idx);
        }
    }
    boundaries.push(text.len());

    boundaries
        .windows(2)
        .filter(|pair| pair[1] > pair[0])
        .map(|pair| {
            let piece = text.get(pair[0]..pair[1]).unwrap_or_default();
            TextChunk {
                text: piece.to_string(),
                token_count: counter.count_tokens(piece),
                start_offset: base_offset + pair[0],
                end_offset: base_offset + pair[1],
            }
        })
        .collect()
}

/// Reporting cadence scales down for large documents.
fn progress_cadence(expected_chunks: usize) -> usize {
    match expected_chunks {
        0..=100 => 2,
        101..=500 => 5,
        _ => 10,
    }
}

fn report_progress(
    progress: Option<&ProgressFn>,
    start_idx: usize,
    total_tokens: usize,
    started: &Instant,
    emitted: usize,
) {
    let Some(callback) = progress else {
        return;
    };

    let fraction = (start_idx as f32 / total_tokens as f32).clamp(0.0, 1.0);
    let detail = if fraction > 0.0 {
        let elapsed = started.elapsed().as_secs_f32();
        let remaining = elapsed / fraction * (1.0 - fraction);
        format!("{} chunks, ~{:.0}s remaining", emitted, remaining)
    } else {
        format!("{} chunks", emitted)
    };
    callback(CHUNKING_STATUS, fraction, Some(&detail));
}
