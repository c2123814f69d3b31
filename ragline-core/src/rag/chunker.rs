//! Section-aware document chunking.
//!
//! A document is parsed into sections at markdown headers (ATX `#` lines and
//! setext `===`/`---` underlines, ignoring fenced code). Each section is cut
//! into units at the coarsest separator that makes them fit, and units are
//! packed greedily into cores of at most `chunk_size` characters. A repair
//! pass then folds cores shorter than `min_chunk_size`, and cores made only
//! of whitespace, into a neighbor. Every chunk after the first is prefixed
//! with the tail of its predecessor.
//!
//! All lengths are counted in characters, and cores always partition the
//! document: concatenating them gives back the input unchanged.

use super::types::{Chunk, ChunkMetadata};
use super::{RagError, Result};
use crate::config::RagConfig;
use std::ops::Range;
use tracing::debug;

/// Split points tried in order, coarsest first.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// Splits documents into overlapping, header-annotated chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_size: usize,
}

/// A header-delimited span of the document.
#[derive(Debug)]
struct Section {
    start: usize,
    /// First byte after the header line(s).
    body_start: usize,
    end: usize,
    header: String,
    level: u8,
}

/// A chunk's own content before overlap is added.
#[derive(Debug)]
struct Core {
    range: Range<usize>,
    chars: usize,
    section: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, min_chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
            min_chunk_size,
        }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, config.min_chunk_size)
    }

    /// Chunks raw document bytes, rejecting anything that is not text.
    pub fn chunk_bytes(&self, bytes: &[u8], source: &str) -> Result<Vec<Chunk>> {
        let text = decode_text(bytes, source)?;
        Ok(self.chunk_document(text, source))
    }

    /// Splits `text` into chunks with ids `{source}_chunk_{n}`.
    ///
    /// Empty and whitespace-only documents produce no chunks. A document that
    /// fits in `chunk_size` produces exactly one.
    pub fn chunk_document(&self, text: &str, source: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let sections = parse_sections(text);

        let mut cores = Vec::new();
        if char_len(text) <= self.chunk_size {
            cores.push(Core {
                range: 0..text.len(),
                chars: char_len(text),
                section: 0,
            });
        } else {
            for (idx, section) in sections.iter().enumerate() {
                let mut units = Vec::new();
                split_units(text, section.start..section.end, self.chunk_size, &SEPARATORS, &mut units);
                self.pack(text, units, idx, &mut cores);
            }
            self.repair(text, &mut cores);
        }

        debug!(source, sections = sections.len(), chunks = cores.len(), "chunked document");
        self.assemble(text, source, &sections, cores)
    }

    /// Greedily packs consecutive units into cores of at most `chunk_size` chars.
    fn pack(&self, text: &str, units: Vec<Range<usize>>, section: usize, cores: &mut Vec<Core>) {
        let mut current: Option<Core> = None;

        for unit in units {
            let chars = char_len(&text[unit.clone()]);
            if let Some(core) = current.as_mut() {
                if core.chars + chars <= self.chunk_size {
                    core.range.end = unit.end;
                    core.chars += chars;
                    continue;
                }
            }
            let next = Core { range: unit, chars, section };
            if let Some(done) = current.replace(next) {
                cores.push(done);
            }
        }

        cores.extend(current);
    }

    /// Folds undersized cores into a neighbor.
    ///
    /// A core is undersized when it is shorter than `min_chunk_size` or holds
    /// only whitespace, whatever its length. The following core is preferred
    /// when the merge fits in `chunk_size`, then the preceding one. When
    /// neither fits the following core still absorbs it, so no undersized
    /// core survives. The absorbing core keeps its own section metadata.
    fn repair(&self, text: &str, cores: &mut Vec<Core>) {
        let undersized = |c: &Core| c.chars < self.min_chunk_size || text[c.range.clone()].trim().is_empty();

        while cores.len() > 1 {
            let Some(i) = cores.iter().position(undersized) else {
                break;
            };

            let fits = |j: usize| cores[i].chars + cores[j].chars <= self.chunk_size;
            let next = (i + 1 < cores.len()).then_some(i + 1);
            let prev = i.checked_sub(1);
            let target = match (next, prev) {
                (Some(n), _) if fits(n) => n,
                (_, Some(p)) if fits(p) => p,
                (Some(n), _) => n,
                (None, Some(p)) => p,
                (None, None) => break,
            };

            let small = cores.remove(i);
            let target = if target > i { target - 1 } else { target };
            let core = &mut cores[target];
            core.range = core.range.start.min(small.range.start)..core.range.end.max(small.range.end);
            core.chars += small.chars;
        }
    }

    fn assemble(&self, text: &str, source: &str, sections: &[Section], cores: Vec<Core>) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::with_capacity(cores.len());

        for (position, core) in cores.into_iter().enumerate() {
            let overlap = chunks
                .last()
                .map(|prev| tail_chars(&prev.text, self.chunk_overlap).to_string())
                .unwrap_or_default();

            let section = &sections[core.section];
            let mut chunk_text = String::with_capacity(overlap.len() + core.range.len());
            chunk_text.push_str(&overlap);
            chunk_text.push_str(&text[core.range]);

            chunks.push(Chunk {
                id: format!("{source}_chunk_{position}"),
                text: chunk_text,
                overlap_len: overlap.len(),
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    header: section.header.clone(),
                    level: section.level,
                    position,
                },
            });
        }

        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The last `n` characters of `s`, or all of it if it is shorter.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// Lines as `(byte offset, byte length including newline, content without newline)`.
fn line_spans(text: &str) -> Vec<(usize, usize, &str)> {
    let mut offset = 0;
    text.split_inclusive('\n')
        .map(|raw| {
            let start = offset;
            offset += raw.len();
            (start, raw.len(), raw.trim_end_matches(|c: char| c == '\n' || c == '\r'))
        })
        .collect()
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Parses `#`-style headers: one to six hashes, then whitespace or end of line.
fn atx_header(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }

    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }

    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(|c: char| c == ' ' || c == '\t') {
        return None;
    }

    let title = rest.trim().trim_end_matches('#').trim();
    Some((level as u8, title.to_string()))
}

/// Level of a setext underline (`===` is 1, `---` is 2), at least three characters.
fn setext_level(line: &str) -> Option<u8> {
    let trimmed = line.trim();
    if trimmed.len() < 3 {
        return None;
    }
    if trimmed.chars().all(|c| c == '=') {
        Some(1)
    } else if trimmed.chars().all(|c| c == '-') {
        Some(2)
    } else {
        None
    }
}

/// Splits the document into contiguous sections covering every byte.
fn parse_sections(text: &str) -> Vec<Section> {
    let lines = line_spans(text);
    let mut headers: Vec<Section> = Vec::new();
    let mut in_fence = false;
    let mut i = 0;

    while i < lines.len() {
        let (start, len, line) = lines[i];

        if is_fence(line) {
            in_fence = !in_fence;
            i += 1;
            continue;
        }
        if in_fence {
            i += 1;
            continue;
        }

        if let Some((level, header)) = atx_header(line) {
            headers.push(Section { start, body_start: start + len, end: text.len(), header, level });
            i += 1;
            continue;
        }

        if let Some(&(next_start, next_len, next)) = lines.get(i + 1) {
            if !line.trim().is_empty() {
                if let Some(level) = setext_level(next) {
                    headers.push(Section {
                        start,
                        body_start: next_start + next_len,
                        end: text.len(),
                        header: line.trim().to_string(),
                        level,
                    });
                    i += 2;
                    continue;
                }
            }
        }

        i += 1;
    }

    for idx in 1..headers.len() {
        headers[idx - 1].end = headers[idx].start;
    }

    let mut sections = Vec::with_capacity(headers.len() + 1);
    let first = headers.first().map_or(text.len(), |h| h.start);
    if first > 0 {
        sections.push(Section { start: 0, body_start: 0, end: first, header: String::new(), level: 0 });
    }
    sections.extend(headers);

    merge_empty_sections(text, sections)
}

/// Attaches sections with no body to the next section that has one.
///
/// A trailing empty section joins the one before it instead.
fn merge_empty_sections(text: &str, sections: Vec<Section>) -> Vec<Section> {
    let count = sections.len();
    let mut merged: Vec<Section> = Vec::with_capacity(count);
    let mut pending: Option<usize> = None;

    for (idx, mut section) in sections.into_iter().enumerate() {
        let empty = text[section.body_start..section.end].trim().is_empty();
        if empty && idx + 1 < count {
            pending.get_or_insert(section.start);
            continue;
        }
        if let Some(start) = pending.take() {
            section.start = start;
        }
        if empty {
            if let Some(prev) = merged.last_mut() {
                prev.end = section.end;
                continue;
            }
        }
        merged.push(section);
    }

    merged
}

/// Interprets document bytes as text: valid UTF-8 without NUL bytes.
pub(crate) fn decode_text<'a>(bytes: &'a [u8], source: &str) -> Result<&'a str> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| RagError::InvalidInput(format!("document '{source}' is not valid UTF-8: {e}")))?;
    if text.contains('\0') {
        return Err(RagError::InvalidInput(format!("document '{source}' contains NUL bytes")));
    }
    Ok(text)
}

/// Cuts `range` into units of at most `limit` chars, at the coarsest separator possible.
fn split_units(text: &str, range: Range<usize>, limit: usize, separators: &[&str], units: &mut Vec<Range<usize>>) {
    if range.is_empty() {
        return;
    }
    let piece = &text[range.clone()];
    if char_len(piece) <= limit {
        units.push(range);
        return;
    }

    let Some((separator, rest)) = separators.split_first() else {
        hard_split(text, range, limit, units);
        return;
    };

    let mut start = range.start;
    for segment in split_keeping_separator(piece, separator) {
        let end = start + segment.len();
        split_units(text, start..end, limit, rest, units);
        start = end;
    }
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Last resort for text with no separators: fixed windows of `limit` chars.
fn hard_split(text: &str, range: Range<usize>, limit: usize, units: &mut Vec<Range<usize>>) {
    let mut start = range.start;
    let mut count = 0;

    for (offset, _) in text[range.clone()].char_indices() {
        if count == limit {
            units.push(start..range.start + offset);
            start = range.start + offset;
            count = 0;
        }
        count += 1;
    }

    if start < range.end {
        units.push(start..range.end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn filler(chars: usize) -> String {
        "voice agents answer calls ".chars().cycle().take(chars).collect()
    }

    fn cores(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.core()).collect()
    }

    #[test]
    fn test_empty_document() {
        let chunker = Chunker::new(500, 50, 50);
        assert!(chunker.chunk_document("", "kb").is_empty());
        assert!(chunker.chunk_document("  \n\n\t ", "kb").is_empty());
    }

    #[test]
    fn test_small_document_is_single_chunk() {
        let chunker = Chunker::new(500, 50, 50);
        let chunks = chunker.chunk_document("## Pricing Plans\nStarter, Pro and Enterprise.", "kb");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "kb_chunk_0");
        assert_eq!(chunks[0].overlap_len, 0);
        assert_eq!(chunks[0].metadata.header, "Pricing Plans");
        assert_eq!(chunks[0].metadata.level, 2);
    }

    #[test]
    fn test_short_fragment_is_single_chunk_below_minimum() {
        let chunker = Chunker::new(500, 50, 50);
        let chunks = chunker.chunk_document("Hi.", "kb");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hi.");
    }

    #[test]
    fn test_two_section_document() {
        // 1200 chars: a 700-char section split at its paragraph break and a
        // 500-char section that fits in one chunk.
        let text = format!(
            "# Overview\n{}\n\n{}\n# Pricing\n{}\n",
            filler(337),
            filler(349),
            filler(489)
        );
        assert_eq!(text.chars().count(), 1200);

        let chunker = Chunker::new(500, 50, 50);
        let chunks = chunker.chunk_document(&text, "kb");

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 550);
        }
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].overlap().chars().count(), 50);
            assert!(pair[0].text.ends_with(pair[1].overlap()));
        }
        assert_eq!(chunks[0].metadata.header, "Overview");
        assert_eq!(chunks[1].metadata.header, "Overview");
        assert_eq!(chunks[2].metadata.header, "Pricing");
        assert_eq!(cores(&chunks), text);
    }

    #[test]
    fn test_header_without_content_attaches_to_next_section() {
        let text = format!(
            "# Company\n\n## About\n{}\n## Contact\n{}\n",
            filler(80),
            filler(40)
        );
        let chunker = Chunker::new(60, 10, 10);
        let chunks = chunker.chunk_document(&text, "kb");

        assert!(chunks[0].text.starts_with("# Company\n\n## About"));
        assert_eq!(chunks[0].metadata.header, "About");
        assert!(chunks.iter().all(|c| c.metadata.header != "Company"));
        assert_eq!(cores(&chunks), text);
    }

    #[test]
    fn test_small_tail_merges_backward() {
        let text = format!("# A\n{}\n\n# B\nShort.\n", filler(200));
        let chunker = Chunker::new(100, 10, 30);
        let chunks = chunker.chunk_document(&text, "kb");

        let last = chunks.last().unwrap();
        assert!(last.core().ends_with("# B\nShort.\n"));
        assert!(chunks.iter().all(|c| c.core().chars().count() >= 30));
        assert_eq!(cores(&chunks), text);
    }

    #[test]
    fn test_blank_core_folds_into_neighbor() {
        let chunker = Chunker::new(10, 0, 1);
        let chunks = chunker.chunk_document("aaaaaaaaaa\nbbbbbbbbbb", "kb");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "aaaaaaaaaa");
        assert_eq!(chunks[1].text, "\nbbbbbbbbbb");
        assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));

        let chunks = chunker.chunk_document("aaaaaaaaaa\n\n\n\n\n\n\n\n\n\n\n\nbbbbbbbbbb", "kb");
        assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
    }

    #[test]
    fn test_setext_headers() {
        let text = "Getting Started\n===============\nCall the support line.\n";
        let chunks = Chunker::new(500, 50, 50).chunk_document(text, "kb");
        assert_eq!(chunks[0].metadata.header, "Getting Started");
        assert_eq!(chunks[0].metadata.level, 1);

        let sections = parse_sections("intro\n\nFAQ\n---\nQ and A\n");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].header, "FAQ");
        assert_eq!(sections[1].level, 2);
    }

    #[test]
    fn test_fenced_code_is_not_a_header() {
        let text = "```bash\n# install the agent\npip install voara\n```\nRun it.\n";
        let sections = parse_sections(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].header, "");
        assert_eq!(sections[0].level, 0);
    }

    #[test]
    fn test_atx_header_parsing() {
        assert_eq!(atx_header("## Pricing Plans ##"), Some((2, "Pricing Plans".to_string())));
        assert_eq!(atx_header("#"), Some((1, String::new())));
        assert_eq!(atx_header("#hashtag"), None);
        assert_eq!(atx_header("####### too deep"), None);
        assert_eq!(atx_header("    # indented code"), None);
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "é".repeat(1000);
        let chunker = Chunker::new(100, 10, 10);
        let chunks = chunker.chunk_document(&text, "kb");

        assert_eq!(chunks.len(), 10);
        assert_eq!(chunks[1].overlap(), "é".repeat(10));
        assert_eq!(cores(&chunks), text);
    }

    #[test]
    fn test_chunk_bytes_rejects_non_text() {
        let chunker = Chunker::new(500, 50, 50);
        assert!(matches!(
            chunker.chunk_bytes(&[0xff, 0xfe, 0x00], "blob"),
            Err(RagError::InvalidInput(_))
        ));
        assert!(matches!(
            chunker.chunk_bytes(b"text\0with nul", "blob"),
            Err(RagError::InvalidInput(_))
        ));
        assert_eq!(chunker.chunk_bytes(b"plain text", "kb").unwrap().len(), 1);
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 5), "ab");
        assert_eq!(tail_chars("abc", 0), "");
    }

    fn params() -> impl Strategy<Value = (usize, usize, usize)> {
        (20usize..300).prop_flat_map(|size| (Just(size), 0..size, 0..=size / 2))
    }

    proptest! {
        #[test]
        fn prop_cores_reconstruct_document(
            text in "[a-z #\n.!?é]{1,1500}",
            (size, overlap, min) in params(),
        ) {
            let chunks = Chunker::new(size, overlap, min).chunk_document(&text, "doc");
            if text.trim().is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert_eq!(cores(&chunks), text);
            }
        }

        #[test]
        fn prop_overlap_is_suffix_of_previous(
            text in "[a-z #\n.!?é]{1,1500}",
            (size, overlap, min) in params(),
        ) {
            let chunks = Chunker::new(size, overlap, min).chunk_document(&text, "doc");
            if let Some(first) = chunks.first() {
                prop_assert_eq!(first.overlap_len, 0);
            }
            for pair in chunks.windows(2) {
                let expected = overlap.min(pair[0].text.chars().count());
                prop_assert_eq!(pair[1].overlap().chars().count(), expected);
                prop_assert!(pair[0].text.ends_with(pair[1].overlap()));
            }
        }

        #[test]
        fn prop_no_undersized_core(
            text in "[a-z #\n.!?é]{1,1500}",
            (size, overlap, min) in params(),
        ) {
            let chunks = Chunker::new(size, overlap, min).chunk_document(&text, "doc");
            if chunks.len() > 1 {
                for chunk in &chunks {
                    let core = chunk.core();
                    prop_assert!(core.chars().count() >= min);
                    let visible = core.chars().filter(|c| !c.is_whitespace()).count();
                    prop_assert!(visible < size + 2 * min.max(1));
                }
            }
            for chunk in &chunks {
                prop_assert!(!chunk.core().trim().is_empty());
            }
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(&chunk.id, &format!("doc_chunk_{i}"));
                prop_assert_eq!(chunk.metadata.position, i);
            }
        }
    }
}
