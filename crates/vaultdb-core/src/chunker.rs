//! Splits notes into length-bounded, overlapping chunks.
//!
//! A note is first cut into blocks at natural boundaries: headings, blank-line
//! paragraph breaks and top-level bullets. Blocks are then packed greedily into
//! chunks of at most `max_chars` characters. A heading closes the running chunk
//! once it holds `min_chars`, so sections stay together when they are small and
//! split cleanly when they are not. Only a block that alone exceeds the budget
//! is cut, preferring sentence ends, then whitespace, then a hard cut.
//!
//! With `overlap_chars > 0` every chunk after the first starts with the
//! word-aligned tail of its predecessor.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, Note};

const BLOCK_SEPARATOR: &str = "\n\n";
const MIN_MAX_CHARS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
    pub strip_front_matter: bool,
    /// Lines starting with any of these prefixes (after leading whitespace) are dropped.
    pub drop_line_prefixes: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1200,
            overlap_chars: 150,
            min_chars: 200,
            strip_front_matter: true,
            drop_line_prefixes: Vec::new(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_chars < MIN_MAX_CHARS {
            return Err(Error::InvalidConfig(format!(
                "chunking.max_chars must be at least {MIN_MAX_CHARS}, got {}",
                self.max_chars
            )));
        }
        if self.overlap_chars * 2 >= self.max_chars {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap_chars ({}) must be less than half of max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        if self.min_chars > self.max_chars {
            return Err(Error::InvalidConfig(format!(
                "chunking.min_chars ({}) exceeds max_chars ({})",
                self.min_chars, self.max_chars
            )));
        }
        Ok(())
    }

    /// Largest piece that still fits after an overlap tail and a separator.
    fn piece_limit(&self) -> usize {
        self.max_chars - self.overlap_chars - BLOCK_SEPARATOR.len()
    }
}

#[derive(Debug, Clone)]
struct Block {
    text: String,
    header: Option<String>,
    opens_section: bool,
}

pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk every note, keeping note order. Fails if two chunks share an id,
    /// which only happens when the same note path is passed twice.
    pub fn chunk_notes(&self, notes: &[Note]) -> Result<Vec<Chunk>> {
        let mut all = Vec::new();
        let mut seen = HashSet::new();
        for note in notes {
            let chunks = self.chunk_note(note);
            if chunks.is_empty() {
                tracing::debug!(path = %note.path, "note produced no chunks");
            }
            for chunk in chunks {
                if !seen.insert(chunk.id.clone()) {
                    return Err(Error::IndexBuildFailure(format!("duplicate chunk id {}", chunk.id)));
                }
                all.push(chunk);
            }
        }
        tracing::info!(notes = notes.len(), chunks = all.len(), "chunking finished");
        Ok(all)
    }

    pub fn chunk_note(&self, note: &Note) -> Vec<Chunk> {
        let body = if self.config.strip_front_matter {
            match strip_front_matter(&note.text) {
                Some(body) => body,
                None => {
                    tracing::warn!(path = %note.path, "unterminated front matter; indexing it as text");
                    note.text.as_str()
                }
            }
        } else {
            note.text.as_str()
        };

        let blocks = self.split_blocks(body);
        let packed = self.pack(blocks);
        let total = packed.len();
        packed
            .into_iter()
            .enumerate()
            .map(|(position, (text, header))| Chunk {
                id: Chunk::make_id(&note.path, position),
                note_path: note.path.clone(),
                title: note.title.clone(),
                header,
                text,
                position,
                total,
            })
            .collect()
    }

    fn split_blocks(&self, body: &str) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut header: Option<String> = None;
        let mut lines: Vec<&str> = Vec::new();
        let mut lines_header: Option<String> = None;

        let flush = |lines: &mut Vec<&str>, lines_header: &Option<String>, blocks: &mut Vec<Block>| {
            if !lines.is_empty() {
                blocks.push(Block { text: lines.join("\n"), header: lines_header.clone(), opens_section: false });
                lines.clear();
            }
        };

        for line in body.lines() {
            let trimmed = line.trim();
            if self.is_dropped(trimmed) {
                continue;
            }
            if trimmed.is_empty() {
                flush(&mut lines, &lines_header, &mut blocks);
                continue;
            }
            if let Some(title) = heading_text(line) {
                flush(&mut lines, &lines_header, &mut blocks);
                header = Some(title.to_string());
                blocks.push(Block { text: trimmed.to_string(), header: header.clone(), opens_section: true });
                continue;
            }
            if is_top_level_bullet(line) {
                flush(&mut lines, &lines_header, &mut blocks);
            }
            if lines.is_empty() {
                lines_header = header.clone();
            }
            lines.push(line.trim_end());
        }
        flush(&mut lines, &lines_header, &mut blocks);
        blocks
    }

    fn is_dropped(&self, trimmed: &str) -> bool {
        self.config
            .drop_line_prefixes
            .iter()
            .any(|p| !p.is_empty() && trimmed.starts_with(p.as_str()))
    }

    fn pack(&self, blocks: Vec<Block>) -> Vec<(String, Option<String>)> {
        let limit = self.config.piece_limit();
        let mut out = Vec::new();
        let mut buf = String::new();
        let mut buf_len = 0usize;
        let mut has_content = false;
        let mut buf_header: Option<String> = None;

        for block in blocks {
            for (i, piece) in split_long(&block.text, limit).into_iter().enumerate() {
                let piece_len = char_len(&piece);
                let opens_section = block.opens_section && i == 0;
                let sep = if buf.is_empty() { 0 } else { BLOCK_SEPARATOR.len() };
                let overflows = buf_len + sep + piece_len > self.config.max_chars;
                let section_break = opens_section && buf_len >= self.config.min_chars;
                if has_content && (overflows || section_break) {
                    let tail = overlap_tail(&buf, self.config.overlap_chars).to_string();
                    out.push((std::mem::take(&mut buf), buf_header.take()));
                    buf_len = char_len(&tail);
                    buf = tail;
                    has_content = false;
                }
                if !buf.is_empty() {
                    buf.push_str(BLOCK_SEPARATOR);
                    buf_len += BLOCK_SEPARATOR.len();
                }
                buf.push_str(&piece);
                buf_len += piece_len;
                if !has_content {
                    buf_header = block.header.clone();
                    has_content = true;
                }
            }
        }
        if has_content {
            out.push((buf, buf_header));
        }
        out
    }
}

/// Rough token count used for context budgets: about four tokens per three words.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words * 4).div_ceil(3)
}

/// Returns the body after a leading `---` … `---` block, the whole text when
/// there is no front matter, and `None` when the block is never closed.
fn strip_front_matter(text: &str) -> Option<&str> {
    let mut lines = text.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return Some(text),
    }
    let mut offset = text.find('\n').map_or(text.len(), |i| i + 1);
    for line in lines {
        offset += line.len();
        if line.trim_end() == "---" {
            return Some(&text[offset..]);
        }
    }
    None
}

fn heading_text(line: &str) -> Option<&str> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') {
        Some(rest.trim())
    } else {
        None
    }
}

fn is_top_level_bullet(line: &str) -> bool {
    line.starts_with("- ") || line.starts_with("* ") || line.starts_with("+ ")
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

/// Cut `text` into pieces of at most `limit` characters.
fn split_long(text: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text.trim();
    while char_len(rest) > limit {
        let window = &rest[..byte_offset_of_char(rest, limit)];
        let cut = sentence_cut(window)
            .or_else(|| window.rfind(char::is_whitespace).filter(|&i| i > 0))
            .unwrap_or(window.len());
        pieces.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Byte offset just past the last sentence end (or line break) inside `window`.
fn sentence_cut(window: &str) -> Option<usize> {
    let mut best = None;
    let mut chars = window.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let next_is_space = chars.peek().is_some_and(|&(_, n)| n.is_whitespace());
        if matches!(c, '.' | '!' | '?') && next_is_space {
            best = Some(i + c.len_utf8());
        } else if c == '\n' && i > 0 {
            best = Some(i);
        }
    }
    best.filter(|&i| i > 0)
}

/// Word-aligned suffix of `text` no longer than `max` characters.
fn overlap_tail(text: &str, max: usize) -> &str {
    if max == 0 {
        return "";
    }
    let len = char_len(text);
    if len <= max {
        return text.trim();
    }
    let start = byte_offset_of_char(text, len - max);
    let starts_on_boundary = text[..start].ends_with(char::is_whitespace);
    let tail = &text[start..];
    if starts_on_boundary {
        return tail.trim();
    }
    match tail.find(char::is_whitespace) {
        Some(i) => tail[i..].trim(),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn note(path: &str, text: &str) -> Note {
        Note::new(path, text, Utc::now())
    }

    fn chunker(max: usize, overlap: usize, min: usize) -> Chunker {
        Chunker::new(ChunkingConfig {
            max_chars: max,
            overlap_chars: overlap,
            min_chars: min,
            ..ChunkingConfig::default()
        })
        .expect("valid config")
    }

    fn squash(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn long_note() -> String {
        let mut text = String::from("# Retrieval\n\n");
        for i in 0..12 {
            text.push_str(&format!(
                "Paragraph {i} talks about sparse and dense retrieval. It has a second sentence, too.\n\n"
            ));
        }
        text.push_str("## Generation\n\n- bullet one about decoding\n  continued line\n- bullet two about sampling\n");
        text
    }

    #[test]
    fn empty_note_yields_no_chunks() {
        let c = chunker(200, 0, 50);
        assert!(c.chunk_note(&note("empty.md", "")).is_empty());
        assert!(c.chunk_note(&note("blank.md", "  \n\n \t\n")).is_empty());
    }

    #[test]
    fn short_note_yields_one_chunk() {
        let c = chunker(200, 20, 100);
        let chunks = c.chunk_note(&note("short.md", "# Title\n\nTiny body.\n\n- a bullet"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "short.md#0");
        assert_eq!(chunks[0].total, 1);
        assert_eq!(chunks[0].header.as_deref(), Some("Title"));
    }

    #[test]
    fn chunks_are_bounded_and_reconstruct_the_note() {
        let text = long_note();
        let c = chunker(160, 0, 60);
        let chunks = c.chunk_note(&note("rag.md", &text));
        assert!(chunks.len() > 3);
        for ch in &chunks {
            assert!(char_len(&ch.text) <= 160, "chunk too long: {}", ch.text.len());
            assert!(!ch.text.trim().is_empty());
        }
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(squash(&joined), squash(&text));
    }

    #[test]
    fn adjacent_chunks_overlap() {
        let text = long_note();
        let c = chunker(160, 40, 60);
        let chunks = c.chunk_note(&note("rag.md", &text));
        for pair in chunks.windows(2) {
            assert!(char_len(&pair[1].text) <= 160);
            let first_word = pair[1].text.split_whitespace().next().expect("non-empty");
            assert!(
                pair[0].text.contains(first_word),
                "chunk {} does not start with a tail of chunk {}",
                pair[1].position,
                pair[0].position
            );
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = long_note();
        let c = chunker(160, 40, 60);
        let a = c.chunk_note(&note("rag.md", &text));
        let b = c.chunk_note(&note("rag.md", &text));
        assert_eq!(a, b);
    }

    #[test]
    fn headings_start_new_chunks_once_min_reached() {
        let text = format!("# One\n\n{}\n\n# Two\n\nshort", "word ".repeat(30));
        let c = chunker(400, 0, 50);
        let chunks = c.chunk_note(&note("h.md", &text));
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].text.starts_with("# Two"));
        assert_eq!(chunks[1].header.as_deref(), Some("Two"));
        assert_eq!(chunks[0].header.as_deref(), Some("One"));
    }

    #[test]
    fn long_paragraph_prefers_sentence_boundaries() {
        let sentence = "This sentence is exactly long enough to matter. ";
        let text = sentence.repeat(10);
        let c = chunker(120, 0, 20);
        let chunks = c.chunk_note(&note("s.md", &text));
        assert!(chunks.len() > 1);
        for ch in &chunks {
            assert!(ch.text.ends_with('.'), "cut mid-sentence: {:?}", ch.text);
        }
    }

    #[test]
    fn unbroken_text_falls_back_to_hard_cuts() {
        let text = "x".repeat(250);
        let c = chunker(100, 0, 10);
        let chunks = c.chunk_note(&note("x.md", &text));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|ch| char_len(&ch.text) <= 100));
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundaries() {
        let text = "日本語のノート。".repeat(40);
        let c = chunker(64, 8, 10);
        let chunks = c.chunk_note(&note("jp.md", &text));
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|ch| char_len(&ch.text) <= 64));
    }

    #[test]
    fn front_matter_is_stripped() {
        let text = "---\ntags: [ml]\n---\nRetrieval body.\n";
        let c = chunker(200, 0, 10);
        let chunks = c.chunk_note(&note("fm.md", text));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Retrieval body.");
    }

    #[test]
    fn unterminated_front_matter_is_kept() {
        let text = "---\ntitle: oops\nbody";
        let c = chunker(200, 0, 10);
        let chunks = c.chunk_note(&note("fm.md", text));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("body"));
    }

    #[test]
    fn dropped_prefixes_are_removed() {
        let config = ChunkingConfig {
            max_chars: 200,
            overlap_chars: 0,
            min_chars: 10,
            drop_line_prefixes: vec!["- tag".into(), "![](assets".into()],
            ..ChunkingConfig::default()
        };
        let c = Chunker::new(config).expect("config");
        let chunks = c.chunk_note(&note("d.md", "- tag: ml\nkept line\n![](assets/img.png)\n"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "kept line");
    }

    #[test]
    fn duplicate_note_paths_are_rejected() {
        let c = chunker(200, 0, 10);
        let n = note("same.md", "text");
        let err = c.chunk_notes(&[n.clone(), n]).unwrap_err();
        assert!(matches!(err, Error::IndexBuildFailure(_)));
    }

    #[test]
    fn chunk_ids_are_unique_across_notes() {
        let c = chunker(120, 20, 30);
        let notes = vec![note("a.md", &long_note()), note("b.md", &long_note()), note("c.md", "tiny")];
        let chunks = c.chunk_notes(&notes).expect("chunks");
        let ids: HashSet<_> = chunks.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        let config = ChunkingConfig { max_chars: 100, overlap_chars: 50, min_chars: 10, ..ChunkingConfig::default() };
        assert!(Chunker::new(config).is_err());
    }

    #[test]
    fn token_estimate_scales_with_words() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one two three"), 4);
    }
}
