
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokenizers::Tokenizer;
use tracing::{debug, warn};

use crate::{RagError, Result};

/// Chars-per-token ratio used when encoding is unavailable.
pub const CHARS_PER_TOKEN: usize = 4;

/// Whitespace word-level tokenizer definition, in the standard
/// tokenizer.json format. Every word and punctuation run maps to the
/// single unknown entry, which is all counting and offset tracking need.
const WORD_LEVEL_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": { "type": "Whitespace" },
  "post_processor": null,
  "decoder": null,
  "model": { "type": "WordLevel", "vocab": { "[UNK]": 0 }, "unk_token": "[UNK]" }
}"#;

/// Ground truth for every size decision in the chunking pipeline. The
/// splitter and the counter share one encoding; a different estimate on
/// either side would silently break the chunk size ceiling.
#[derive(Clone)]
pub struct TokenCounter {
    tokenizer: Arc<Tokenizer>,
    origin: Option<FileOrigin>,
}

#[derive(Debug, Clone)]
struct FileOrigin {
    path: PathBuf,
    mtime: SystemTime,
}

/// Encoded text: token ids plus each token's byte span in the source string.
/// Chunk text is produced by slicing the source at token-boundary offsets,
/// so no decode step is involved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenStream {
    ids: Vec<u32>,
    offsets: Vec<(usize, usize)>,
}

impl TokenStream {
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Byte offset where token `idx` starts in the source text.
    #[inline]
    pub fn start_of(&self, idx: usize) -> Option<usize> {
        self.offsets.get(idx).map(|span| span.0)
    }

    /// Byte offset where token `idx` ends in the source text.
    #[inline]
    pub fn end_of(&self, idx: usize) -> Option<usize> {
        self.offsets.get(idx).map(|span| span.1)
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl TokenCounter {
    /// Load a tokenizer definition (tokenizer.json) from disk. The file's
    /// modification time is recorded so [`Self::refresh_if_stale`] can reload
    /// it when the file changes.
    #[inline]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            RagError::Tokenizer(format!(
                "Failed to load tokenizer from {}: {}",
                path.display(),
                e
            ))
        })?;
        let mtime = std::fs::metadata(path)?.modified()?;

        debug!("Loaded tokenizer from {}", path.display());
        Ok(Self {
            tokenizer: Arc::new(tokenizer),
            origin: Some(FileOrigin {
                path: path.to_path_buf(),
                mtime,
            }),
        })
    }

    /// Build a tokenizer from in-memory tokenizer.json contents.
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let tokenizer = Tokenizer::from_bytes(bytes)
            .map_err(|e| RagError::Tokenizer(format!("Failed to parse tokenizer: {}", e)))?;
        Ok(Self {
            tokenizer: Arc::new(tokenizer),
            origin: None,
        })
    }

    /// Built-in whitespace word-level tokenizer, used when no
    /// tokenizer.json is configured. Every word and punctuation run counts
    /// as one token.
    #[inline]
    pub fn word_level() -> Result<Self> {
        Self::from_bytes(WORD_LEVEL_JSON.as_bytes())
    }

    /// Persist the tokenizer definition to disk.
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.tokenizer.save(path, false).map_err(|e| {
            RagError::Tokenizer(format!("Failed to save tokenizer to {}: {}", path.display(), e))
        })
    }

    /// Reload the tokenizer definition if the backing file changed since it
    /// was last read. Returns `true` when a reload happened. Counters built
    /// from memory have nothing to refresh and always return `false`.
    #[inline]
    pub fn refresh_if_stale(&mut self) -> Result<bool> {
        let Some(origin) = self.origin.clone() else {
            return Ok(false);
        };

        let modified = std::fs::metadata(&origin.path)?.modified()?;
        if modified <= origin.mtime {
            return Ok(false);
        }

        debug!(
            "Tokenizer file {} changed on disk, reloading",
            origin.path.display()
        );
        *self = Self::from_file(&origin.path)?;
        Ok(true)
    }

    /// Exact token count for `text`. Never fails: encoding falls back
    /// progressively and bottoms out at a character-count estimate, since
    /// parsed documents routinely contain stray control-like substrings that
    /// collide with reserved token text.
    #[inline]
    pub fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len(),
            Err(first) => match self.tokenizer.encode(text, true) {
                Ok(encoding) => encoding.get_ids().len(),
                Err(second) => {
                    warn!(
                        "Token encoding failed twice ({}; {}), estimating from character count",
                        first, second
                    );
                    (text.chars().count() / CHARS_PER_TOKEN).max(1)
                }
            },
        }
    }

    /// Encode `text` into a token stream with source offsets. Retries with
    /// special tokens allowed before giving up; callers fall back to
    /// character-window splitting on `Err`.
    #[inline]
    pub fn encode(&self, text: &str) -> Result<TokenStream> {
        let encoding = match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding,
            Err(first) => {
                debug!(
                    "Encoding failed ({}), retrying with special tokens allowed",
                    first
                );
                self.tokenizer.encode(text, true).map_err(|e| {
                    RagError::Tokenizer(format!("Failed to encode text: {}; retry failed: {}", first, e))
                })?
            }
        };

        Ok(TokenStream {
            ids: encoding.get_ids().to_vec(),
            offsets: encoding.get_offsets().to_vec(),
        })
    }
}
