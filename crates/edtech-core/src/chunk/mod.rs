//! Structure-aware, token-bounded chunking.
//!
//! Generalizes the teacher's `document/chunker.rs` (a flat char-sliding
//! window) into the five-step algorithm of spec §4.6, grounded in the
//! original's `token_based_chunker.py` (heading-split loop, per-section
//! token accounting, overlap math).

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::model::{Chunk, ChunkStrategy, DocumentMetadata};
use crate::parser::Heading;
use crate::tokens;

#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub max_tokens: usize,
    pub chunk_overlap: usize,
    pub merge_peers: bool,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            chunk_overlap: 50,
            merge_peers: true,
        }
    }
}

struct RawUnit {
    heading_chain: Vec<String>,
    section_title: Option<String>,
    section_level: Option<u8>,
    text: String,
    token_count: usize,
    /// Set when this unit is one of several produced by splitting a single
    /// region that itself exceeded `max_tokens`; peer merging must not
    /// re-join units across that split boundary.
    no_merge_neighbor: bool,
}

struct Region {
    heading_chain: Vec<String>,
    section_title: Option<String>,
    section_level: Option<u8>,
    text: String,
}

/// Entry point: produce the final chunk sequence for `content`, using the
/// hierarchical strategy when `structure` is usable, degrading to the
/// token-window fallback otherwise. Always deterministic for identical
/// input.
pub fn chunk_document(
    content: &str,
    structure: &[Heading],
    opts: ChunkOptions,
    document_id: Uuid,
    metadata: DocumentMetadata,
) -> Vec<Chunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let line_count = content.lines().count();
    let structure_usable = structure.iter().all(|h| h.line_offset < line_count);

    let raw_units = if structure_usable {
        hierarchical_units(content, structure, opts)
    } else {
        fallback_units(content, opts)
    };

    let merged = if opts.merge_peers {
        merge_peers(raw_units, opts.max_tokens)
    } else {
        raw_units
    };

    let strategy = if structure_usable {
        ChunkStrategy::Hierarchical
    } else {
        ChunkStrategy::TokenWindow
    };

    merged
        .into_iter()
        .enumerate()
        .map(|(index, unit)| {
            let contextualized_text = contextualize(&unit.heading_chain, &unit.text);
            Chunk {
                document_id,
                chunk_index: index as i64,
                text: unit.text,
                contextualized_text,
                token_count: unit.token_count,
                section_title: unit.section_title,
                strategy,
                metadata: metadata.clone(),
            }
        })
        .collect()
}

fn contextualize(heading_chain: &[String], body: &str) -> String {
    if heading_chain.is_empty() {
        return body.to_string();
    }
    format!("{}\n\n{}", heading_chain.join("\n"), body)
}

/// Step 1 + 2 + 3 for the structure-aware path: split into regions by the
/// heading sequence, refine each region into token-bounded units.
fn hierarchical_units(content: &str, structure: &[Heading], opts: ChunkOptions) -> Vec<RawUnit> {
    let regions = split_by_structure(content, structure);
    let mut units = Vec::new();
    for region in regions {
        let pieces = refine_region(&region.text, opts.max_tokens, opts.chunk_overlap);
        let multi = pieces.len() > 1;
        for (text, token_count) in pieces {
            units.push(RawUnit {
                heading_chain: region.heading_chain.clone(),
                section_title: region.section_title.clone(),
                section_level: region.section_level,
                text,
                token_count,
                no_merge_neighbor: multi,
            });
        }
    }
    units
}

fn split_by_structure(content: &str, structure: &[Heading]) -> Vec<Region> {
    if structure.is_empty() {
        return vec![Region {
            heading_chain: Vec::new(),
            section_title: None,
            section_level: None,
            text: content.to_string(),
        }];
    }

    let lines: Vec<&str> = content.lines().collect();
    let mut by_offset = std::collections::HashMap::new();
    for h in structure {
        by_offset.insert(h.line_offset, h);
    }

    let mut regions = Vec::new();
    let mut stack: Vec<(u8, String)> = Vec::new();
    let mut current_chain: Vec<String> = Vec::new();
    let mut current_title: Option<String> = None;
    let mut current_level: Option<u8> = None;
    let mut current_lines: Vec<&str> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if let Some(h) = by_offset.get(&i) {
            if !current_lines.is_empty() {
                regions.push(Region {
                    heading_chain: current_chain.clone(),
                    section_title: current_title.clone(),
                    section_level: current_level,
                    text: current_lines.join("\n"),
                });
                current_lines.clear();
            }
            while let Some((lvl, _)) = stack.last() {
                if *lvl >= h.level {
                    stack.pop();
                } else {
                    break;
                }
            }
            stack.push((h.level, h.title.clone()));
            current_chain = stack.iter().map(|(_, t)| t.clone()).collect();
            current_title = Some(h.title.clone());
            current_level = Some(h.level);
        }
        current_lines.push(line);
    }
    if !current_lines.is_empty() {
        regions.push(Region {
            heading_chain: current_chain,
            section_title: current_title,
            section_level: current_level,
            text: current_lines.join("\n"),
        });
    }
    regions
        .into_iter()
        .filter(|r| !r.text.trim().is_empty())
        .collect()
}

/// Within one region: emit units that respect paragraph/sentence
/// boundaries but never exceed `max_tokens`.
fn refine_region(text: &str, max_tokens: usize, overlap: usize) -> Vec<(String, usize)> {
    let paragraphs: Vec<&str> = text.split("\n\n").filter(|p| !p.trim().is_empty()).collect();
    if paragraphs.is_empty() {
        return Vec::new();
    }

    let mut units = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    for para in paragraphs {
        let para_tokens = tokens::count_tokens(para);
        if para_tokens > max_tokens {
            if !current.is_empty() {
                units.push((std::mem::take(&mut current), current_tokens));
                current_tokens = 0;
            }
            units.extend(split_oversize_paragraph(para, max_tokens, overlap));
        } else if current_tokens + para_tokens > max_tokens && !current.is_empty() {
            units.push((std::mem::take(&mut current), current_tokens));
            current.push_str(para);
            current_tokens = para_tokens;
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
            current_tokens += para_tokens;
        }
    }
    if !current.is_empty() {
        units.push((current, current_tokens));
    }
    units
}

static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").expect("static regex"));

fn split_sentences(text: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut last = 0;
    for m in SENTENCE_BOUNDARY.find_iter(text) {
        let piece = text[last..m.end()].trim();
        if !piece.is_empty() {
            result.push(piece);
        }
        last = m.end();
    }
    let tail = text[last..].trim();
    if !tail.is_empty() {
        result.push(tail);
    }
    result
}

/// A paragraph alone larger than `max_tokens`: split by sentence, falling
/// back to the token-window strategy for any single sentence still too
/// large. Never merged with neighbors (region too large is the documented
/// edge case where peer-merging does not cross the split boundary).
fn split_oversize_paragraph(para: &str, max_tokens: usize, overlap: usize) -> Vec<(String, usize)> {
    let mut units = Vec::new();
    let mut buf = String::new();
    let mut buf_tokens = 0usize;

    for sentence in split_sentences(para) {
        let sentence_tokens = tokens::count_tokens(sentence);
        if sentence_tokens > max_tokens {
            if !buf.is_empty() {
                units.push((std::mem::take(&mut buf), buf_tokens));
                buf_tokens = 0;
            }
            for window in token_window_split(sentence, max_tokens, overlap) {
                let wt = tokens::count_tokens(&window);
                units.push((window, wt));
            }
            continue;
        }
        if buf_tokens + sentence_tokens > max_tokens && !buf.is_empty() {
            units.push((std::mem::take(&mut buf), buf_tokens));
            buf_tokens = 0;
        }
        if !buf.is_empty() {
            buf.push(' ');
        }
        buf.push_str(sentence);
        buf_tokens += sentence_tokens;
    }
    if !buf.is_empty() {
        units.push((buf, buf_tokens));
    }
    units
}

/// Step 5: the deterministic fallback — slide a window of `max_tokens`
/// with `overlap` across the tokenized content.
fn fallback_units(content: &str, opts: ChunkOptions) -> Vec<RawUnit> {
    token_window_split(content, opts.max_tokens, opts.chunk_overlap)
        .into_iter()
        .map(|text| {
            let token_count = tokens::count_tokens(&text);
            RawUnit {
                heading_chain: Vec::new(),
                section_title: None,
                section_level: None,
                text,
                token_count,
                no_merge_neighbor: true,
            }
        })
        .collect()
}

/// Deterministic token-window split, reused by both the whole-document
/// fallback and by the oversize-paragraph escape hatch within the
/// hierarchical path.
pub fn token_window_split(text: &str, max_tokens: usize, overlap: usize) -> Vec<String> {
    let toks = tokens::tokenize(text);
    if toks.is_empty() {
        return Vec::new();
    }
    let step = max_tokens.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < toks.len() {
        let end = (start + max_tokens).min(toks.len());
        chunks.push(toks[start..end].join(" "));
        if end >= toks.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Step 3: merge adjacent units sharing the same heading when the
/// combined text still fits `max_tokens`, preserving reading order.
fn merge_peers(units: Vec<RawUnit>, max_tokens: usize) -> Vec<RawUnit> {
    let mut merged: Vec<RawUnit> = Vec::new();
    for unit in units {
        let can_merge = merged.last().is_some_and(|last| {
            !last.no_merge_neighbor
                && !unit.no_merge_neighbor
                && last.section_title == unit.section_title
                && last.section_level == unit.section_level
                && last.token_count + unit.token_count <= max_tokens
        });
        if can_merge {
            let last = merged.last_mut().expect("checked above");
            last.text.push_str("\n\n");
            last.text.push_str(&unit.text);
            last.token_count += unit.token_count;
        } else {
            merged.push(unit);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::model::FileType;

    fn meta() -> DocumentMetadata {
        DocumentMetadata::default()
    }

    #[test]
    fn empty_document_yields_zero_chunks() {
        let chunks = chunk_document("", &[], ChunkOptions::default(), Uuid::new_v4(), meta());
        assert!(chunks.is_empty());
    }

    #[test]
    fn chunk_indices_are_dense_from_zero() {
        let content = "# A\n\npara one.\n\n# B\n\npara two.";
        let parsed = parser::parse(content.as_bytes(), FileType::Md).unwrap();
        let chunks = chunk_document(
            &parsed.content,
            &parsed.structure,
            ChunkOptions::default(),
            Uuid::new_v4(),
            meta(),
        );
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn contextualized_text_prefixes_heading_chain() {
        let content = "# Top\n\n## Nested\n\nbody text here.";
        let parsed = parser::parse(content.as_bytes(), FileType::Md).unwrap();
        let chunks = chunk_document(
            &parsed.content,
            &parsed.structure,
            ChunkOptions::default(),
            Uuid::new_v4(),
            meta(),
        );
        let last = chunks.last().unwrap();
        assert!(last.contextualized_text.starts_with("Top\nNested"));
    }

    #[test]
    fn small_adjacent_sibling_sections_merge_when_enabled() {
        let content = "# A\n\nshort.\n\n# A\n\nalso short.";
        let parsed = parser::parse(content.as_bytes(), FileType::Md).unwrap();
        let opts = ChunkOptions {
            max_tokens: 512,
            chunk_overlap: 0,
            merge_peers: true,
        };
        let chunks = chunk_document(&parsed.content, &parsed.structure, opts, Uuid::new_v4(), meta());
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn oversize_region_falls_back_to_token_window_without_cross_merge() {
        let long_word_list = (0..2000).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let content = format!("# Huge\n\n{long_word_list}");
        let parsed = parser::parse(content.as_bytes(), FileType::Md).unwrap();
        let opts = ChunkOptions {
            max_tokens: 100,
            chunk_overlap: 10,
            merge_peers: true,
        };
        let chunks = chunk_document(&parsed.content, &parsed.structure, opts, Uuid::new_v4(), meta());
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.token_count <= 110);
        }
    }

    #[test]
    fn fallback_strategy_is_deterministic() {
        let content = "a ".repeat(1000);
        let a = fallback_units(&content, ChunkOptions::default());
        let b = fallback_units(&content, ChunkOptions::default());
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
        }
    }
}
