use std::collections::HashSet;

use super::*;
use crate::pages::BlockType;

fn assembler(chunk_size: usize, chunk_overlap: usize) -> ChunkAssembler {
    let counter = TokenCounter::word_level().expect("can build word-level tokenizer");
    ChunkAssembler::new(
        counter,
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
            ..ChunkingConfig::default()
        },
    )
}

fn two_page_blocks() -> Vec<PageBlock> {
    vec![
        PageBlock::text(
            1,
            "This is the first page of the document and it carries most of the content \
             that the reader will care about when searching later.",
        ),
        PageBlock::text(2, "A short closing page."),
    ]
}

#[test]
fn small_document_becomes_one_annotated_chunk() {
    let assembler = assembler(500, 50);

    let chunks = assembler.assemble("manual.pdf", &two_page_blocks(), Some(2), None);

    assert_eq!(chunks.len(), 1);
    let chunk = &chunks[0];
    assert_eq!(chunk.source, "manual.pdf");
    assert_eq!(chunk.chunk_index, 0);
    assert_eq!(chunk.total_chunks, 1);
    assert!(chunk.end_offset > chunk.start_offset);
    assert!(chunk.token_count > 0);
    // Page 1 holds most of the text, so it dominates.
    assert_eq!(chunk.page, 1);
    assert_eq!(chunk.extraction, PageExtraction::PageBlocksDominant);
    assert_eq!(chunk.content_type, ContentType::Text);
    assert_eq!(chunk.language.as_deref(), Some("en"));
}

#[test]
fn every_chunk_gets_a_page_and_a_unique_id() {
    let assembler = assembler(20, 5);

    let chunks = assembler.assemble("manual.pdf", &two_page_blocks(), Some(2), None);

    assert!(chunks.len() > 1);
    let ids: HashSet<Uuid> = chunks.iter().map(|chunk| chunk.id).collect();
    assert_eq!(ids.len(), chunks.len());

    for (idx, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, idx);
        assert_eq!(chunk.total_chunks, chunks.len());
        assert!(chunk.page >= 1);
    }
}

#[test]
fn image_block_attaches_to_overlapping_chunk() {
    let assembler = assembler(500, 50);
    let mut blocks = two_page_blocks();
    blocks.push(PageBlock::image(1, 0, Some([10.0, 10.0, 200.0, 120.0]), Some(17)));
    assert_eq!(blocks[2].block_type, BlockType::Image);

    let chunks = assembler.assemble("manual.pdf", &blocks, Some(2), None);

    assert_eq!(chunks.len(), 1);
    let chunk = &chunks[0];
    assert_eq!(chunk.content_type, ContentType::Image);
    let image = chunk.image_ref.as_ref().expect("image ref is attached");
    assert_eq!(image.page, 1);
    assert_eq!(image.xref, Some(17));
}

#[test]
fn raw_text_uses_inherited_page_metadata() {
    let assembler = assembler(500, 50);

    let chunks = assembler.assemble_text(
        "notes.txt",
        "Plain extracted text with no page structure at all.",
        Some(4),
        None,
    );

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].page, 4);
    assert_eq!(chunks[0].extraction, PageExtraction::ExistingMetadata);
}

#[test]
fn raw_text_without_any_evidence_lands_on_page_one() {
    let assembler = assembler(500, 50);

    let chunks = assembler.assemble_text("notes.txt", "No structure here.", None, None);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].page, 1);
    assert_eq!(chunks[0].extraction, PageExtraction::FallbackPage1);
}

#[test]
fn empty_document_yields_no_chunks() {
    let assembler = assembler(500, 50);

    let chunks = assembler.assemble("empty.pdf", &[], None, None);

    assert!(chunks.is_empty());
}

#[test]
fn chunk_records_serialize_with_stable_field_names() {
    let assembler = assembler(500, 50);
    let chunks = assembler.assemble("manual.pdf", &two_page_blocks(), Some(2), None);

    let value = serde_json::to_value(&chunks[0]).expect("can serialize chunk");

    assert_eq!(value["source"], "manual.pdf");
    assert_eq!(value["page"], 1);
    assert_eq!(value["extraction"], "page_blocks_dominant");
    assert_eq!(value["content_type"], "text");
    assert_eq!(value["language"], "en");
    // Absent optional fields stay out of the serialized record.
    assert!(value.get("image_ref").is_none());
}

#[test]
fn chunk_spans_cover_the_concatenated_text() {
    let assembler = assembler(15, 3);
    let blocks = two_page_blocks();
    let (text, _) = crate::pages::concatenate_blocks(&blocks, Some(2));

    let chunks = assembler.assemble("manual.pdf", &blocks, Some(2), None);

    assert!(chunks.len() > 1);
    assert_eq!(chunks[0].start_offset, 0);
    assert_eq!(
        chunks.last().expect("chunks exist").end_offset,
        text.len()
    );
    for pair in chunks.windows(2) {
        assert!(pair[1].start_offset <= pair[0].end_offset);
    }
}
