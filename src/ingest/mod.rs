#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::chunking::{ChunkingConfig, ProgressFn, split_text};
use crate::keywords::detect_language;
use crate::pages::{
    Attribution, ImageRef, PageBlock, PageExtraction, PageMap, attribute_span, concatenate_blocks,
};
use crate::tokenizer::TokenCounter;

/// What a citation ultimately points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
}

/// Fully annotated, persistence-ready chunk record: the unit of indexing
/// and retrieval. Immutable once produced; re-ingesting a document replaces
/// its chunks wholesale instead of patching them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    /// Name of the document this chunk was cut from.
    pub source: String,
    pub text: String,
    pub token_count: usize,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Byte span in the document's concatenated text.
    pub start_offset: usize,
    pub end_offset: usize,
    /// Dominant page, always at least 1.
    pub page: u32,
    /// Provenance of the page number, for debugging only.
    pub extraction: PageExtraction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<ImageRef>,
    pub content_type: ContentType,
    /// Detected document language tag, when one could be determined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Drives the splitter and the page attributor over one document at a time,
/// producing [`DocumentChunk`] records ready for embedding and indexing.
pub struct ChunkAssembler {
    counter: TokenCounter,
    config: ChunkingConfig,
}

impl ChunkAssembler {
    #[inline]
    pub fn new(counter: TokenCounter, config: ChunkingConfig) -> Self {
        Self { counter, config }
    }

    #[inline]
    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Chunk a parsed document given its ordered page blocks.
    #[inline]
    pub fn assemble(
        &self,
        source: &str,
        blocks: &[PageBlock],
        total_pages: Option<u32>,
        progress: Option<&ProgressFn>,
    ) -> Vec<DocumentChunk> {
        let (text, map) = concatenate_blocks(blocks, total_pages);
        self.assemble_mapped(source, &text, &map, None, progress)
    }

    /// Chunk raw text with no page-block map. Page attribution falls back
    /// to markers embedded in the text, then `inherited_page`, then page 1.
    #[inline]
    pub fn assemble_text(
        &self,
        source: &str,
        text: &str,
        inherited_page: Option<u32>,
        progress: Option<&ProgressFn>,
    ) -> Vec<DocumentChunk> {
        self.assemble_mapped(source, text, &PageMap::default(), inherited_page, progress)
    }

    fn assemble_mapped(
        &self,
        source: &str,
        text: &str,
        map: &PageMap,
        inherited_page: Option<u32>,
        progress: Option<&ProgressFn>,
    ) -> Vec<DocumentChunk> {
        let pieces = split_text(text, &self.counter, &self.config, progress);
        let total_chunks = pieces.len();
        let language = detect_language(text).tag().map(str::to_string);
        let created_at = Utc::now();

        let chunks: Vec<DocumentChunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, piece)| {
                let Attribution {
                    page,
                    method,
                    image_ref,
                } = attribute_span(
                    map,
                    &piece.text,
                    piece.start_offset,
                    piece.end_offset,
                    inherited_page,
                );
                let content_type = if image_ref.is_some() {
                    ContentType::Image
                } else {
                    ContentType::Text
                };

                DocumentChunk {
                    id: Uuid::new_v4(),
                    source: source.to_string(),
                    text: piece.text,
                    token_count: piece.token_count,
                    chunk_index,
                    total_chunks,
                    start_offset: piece.start_offset,
                    end_offset: piece.end_offset,
                    page,
                    extraction: method,
                    image_ref,
                    content_type,
                    language: language.clone(),
                    created_at,
                }
            })
            .collect();

        info!("Assembled {} chunks for '{}'", total_chunks, source);
        chunks
    }
}
