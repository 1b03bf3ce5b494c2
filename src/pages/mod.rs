
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Weight on absolute overlap when scoring candidate pages.
const OVERLAP_WEIGHT: f64 = 0.7;
/// Weight on the share of the chunk the page covers.
const COVERAGE_WEIGHT: f64 = 0.3;
/// Dominant pages holding less than this share of a chunk get logged.
const DOMINANCE_FLOOR: f64 = 0.7;

static PAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"--- Page (\d+) ---").expect("page marker pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Text,
    Image,
}

/// A per-page segment emitted by the upstream parser, ordered by page and,
/// within a page, by extraction order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageBlock {
    pub page: u32,
    pub text: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xref: Option<u64>,
}

impl PageBlock {
    #[inline]
    pub fn text(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
            block_type: BlockType::Text,
            image_index: None,
            bbox: None,
            xref: None,
        }
    }

    #[inline]
    pub fn image(page: u32, image_index: u32, bbox: Option<[f64; 4]>, xref: Option<u64>) -> Self {
        Self {
            page,
            text: String::new(),
            block_type: BlockType::Image,
            image_index: Some(image_index),
            bbox,
            xref,
        }
    }
}

/// Reference to an image region detected within a chunk's page range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub page: u32,
    pub image_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xref: Option<u64>,
}

/// How a chunk's page number was determined. Kept for debugging provenance;
/// nothing branches on it downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageExtraction {
    PageBlocksDominant,
    TextMarker,
    ExistingMetadata,
    TextMarkerFallback,
    FallbackPage1,
    ImageRefOverride,
}

/// Byte spans of each page within the concatenated document text, plus the
/// document's detected image regions.
#[derive(Debug, Clone, Default)]
pub struct PageMap {
    spans: Vec<PageSpan>,
    images: Vec<ImageRef>,
    total_pages: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
struct PageSpan {
    page: u32,
    start: usize,
    end: usize,
}

/// The page a chunk is attributed to, with provenance and any overlapping
/// image region.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub page: u32,
    pub method: PageExtraction,
    pub image_ref: Option<ImageRef>,
}

/// Join a document's page blocks into the text the splitter operates on,
/// inserting a `--- Page N ---` marker ahead of each page and recording
/// every page's byte span in the joined text.
#[inline]
pub fn concatenate_blocks(blocks: &[PageBlock], total_pages: Option<u32>) -> (String, PageMap) {
    let mut text = String::new();
    let mut spans: Vec<PageSpan> = Vec::new();
    let mut images = Vec::new();
    let mut current_page: Option<u32> = None;

    for block in blocks {
        match block.block_type {
            BlockType::Image => {
                images.push(ImageRef {
                    page: block.page,
                    image_index: block.image_index.unwrap_or(0),
                    bbox: block.bbox,
                    xref: block.xref,
                });
            }
            BlockType::Text => {
                let start = text.len();
                if current_page == Some(block.page) {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                } else {
                    if !text.is_empty() {
                        text.push_str("\n\n");
                    }
                    let _ = write!(text, "--- Page {} ---\n\n", block.page);
                    current_page = Some(block.page);
                }
                text.push_str(&block.text);

                let end = text.len();
                match spans.last_mut() {
                    Some(span) if span.page == block.page => span.end = end,
                    _ => spans.push(PageSpan {
                        page: block.page,
                        start,
                        end,
                    }),
                }
            }
        }
    }

    (
        text,
        PageMap {
            spans,
            images,
            total_pages,
        },
    )
}

impl PageMap {
    /// Build only the map, discarding the joined text.
    #[inline]
    pub fn from_blocks(blocks: &[PageBlock], total_pages: Option<u32>) -> Self {
        concatenate_blocks(blocks, total_pages).1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    #[inline]
    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    /// Per-page overlap in bytes with the span `[start, end)`.
    fn page_overlaps(&self, start: usize, end: usize) -> BTreeMap<u32, usize> {
        let mut overlaps = BTreeMap::new();
        for span in &self.spans {
            let overlap_start = span.start.max(start);
            let overlap_end = span.end.min(end);
            if overlap_end > overlap_start {
                *overlaps.entry(span.page).or_insert(0) += overlap_end - overlap_start;
            }
        }
        overlaps
    }

    /// The image on `page`, or failing that on a neighboring page.
    fn image_for_page(&self, page: u32) -> Option<&ImageRef> {
        self.images
            .iter()
            .find(|image| image.page == page)
            .or_else(|| {
                self.images
                    .iter()
                    .find(|image| image.page + 1 == page || image.page == page + 1)
            })
    }
}

/// Attribute the chunk spanning `[start, end)` of the concatenated document
/// text to a single page. Always yields a page: the fallback chain ends at
/// page 1 so citations can never show a missing page number.
#[inline]
pub fn attribute_span(
    map: &PageMap,
    chunk_text: &str,
    start: usize,
    end: usize,
    inherited_page: Option<u32>,
) -> Attribution {
    let overlaps = map.page_overlaps(start, end);

    let (page, method) = if overlaps.is_empty() {
        fallback_page(map, chunk_text, inherited_page)
    } else {
        let page = dominant_page(&overlaps, end.saturating_sub(start));
        (page, PageExtraction::PageBlocksDominant)
    };

    // An image is more authoritative about its own location than the
    // text-overlap heuristic.
    match map.image_for_page(page) {
        Some(image) if image.page != page => Attribution {
            page: image.page,
            method: PageExtraction::ImageRefOverride,
            image_ref: Some(image.clone()),
        },
        image => Attribution {
            page,
            method,
            image_ref: image.cloned(),
        },
    }
}

/// Weighted combination of absolute overlap and chunk-coverage share; the
/// highest score wins, lowest page number on ties.
fn dominant_page(overlaps: &BTreeMap<u32, usize>, chunk_len: usize) -> u32 {
    let chunk_len = chunk_len.max(1) as f64;
    let mut best_page = 1u32;
    let mut best_score = f64::NEG_INFINITY;

    for (&page, &overlap) in overlaps {
        let overlap = overlap as f64;
        let coverage = overlap / chunk_len;
        let score = OVERLAP_WEIGHT.mul_add(overlap, COVERAGE_WEIGHT * coverage * chunk_len);
        if score > best_score {
            best_score = score;
            best_page = page;
        }
    }

    if overlaps.len() > 1 {
        let dominant_share =
            overlaps.get(&best_page).copied().unwrap_or(0) as f64 / chunk_len;
        if dominant_share < DOMINANCE_FLOOR {
            debug!(
                "Chunk spans {} pages; dominant page {} holds only {:.0}% of it",
                overlaps.len(),
                best_page,
                dominant_share * 100.0
            );
        }
    }

    best_page
}

/// Priority chain when no page block overlaps the chunk: a literal page
/// marker inside the chunk text, then inherited metadata, then page 1.
fn fallback_page(
    map: &PageMap,
    chunk_text: &str,
    inherited_page: Option<u32>,
) -> (u32, PageExtraction) {
    let marker_method = if map.is_empty() {
        PageExtraction::TextMarker
    } else {
        PageExtraction::TextMarkerFallback
    };

    if let Some(page) = marker_page(chunk_text, map.total_pages()) {
        return (page, marker_method);
    }

    if let Some(page) = inherited_page.filter(|&page| validated(page, map.total_pages())) {
        return (page, PageExtraction::ExistingMetadata);
    }

    warn!("No page evidence for chunk; defaulting to page 1");
    (1, PageExtraction::FallbackPage1)
}

/// First page marker in `text` that parses and passes validation against
/// the known page count.
fn marker_page(text: &str, total_pages: Option<u32>) -> Option<u32> {
    PAGE_MARKER
        .captures_iter(text)
        .flatten()
        .filter_map(|captures| {
            captures
                .get(1)
                .and_then(|group| group.as_str().parse::<u32>().ok())
        })
        .find(|&page| validated(page, total_pages))
}

/// A page number above the document's known total is unreliable and gets
/// discarded in favor of the next fallback.
fn validated(page: u32, total_pages: Option<u32>) -> bool {
    page >= 1 && total_pages.is_none_or(|total| page <= total)
}
