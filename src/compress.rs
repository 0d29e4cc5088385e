//! Type-aware text compression for oversized memory content
//!
//! Content above [`crate::types::COMPRESSION_THRESHOLD_BYTES`] is summarized
//! before storage. Compression is lossy: decompression returns the stored
//! summary, and the only record of the original is `metadata.originalSize` /
//! `metadata.compressionRatio`.

use serde::{Deserialize, Serialize};

/// Compression strategy, selected from content shape and memory type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    Code,
    Conversation,
    Document,
    Generic,
}

impl CompressionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Conversation => "conversation",
            Self::Document => "document",
            Self::Generic => "generic",
        }
    }
}

/// Quality metrics reported alongside a compression. Informational only;
/// no behavior depends on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Fraction of distinct original words surviving in the summary
    pub information_retention: f64,
    /// Inverse of mean sentence length, scaled into [0, 1]
    pub readability: f64,
    /// Fraction of the most frequent original words surviving
    pub keyword_preservation: f64,
}

/// Result of compressing one text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionResult {
    pub compressed: String,
    pub original_size: usize,
    pub compressed_size: usize,
    /// compressed / original
    pub ratio: f64,
    pub kind: CompressionKind,
    pub quality: QualityMetrics,
}

const CONVERSATION_KEYWORDS: &[&str] = &["important", "critical", "must", "should", "need"];
const DOCUMENT_KEYWORDS: &[&str] = &["summary", "conclusion", "important", "key", "main"];
const ELISION_MARKER: &str = "\n[...]\n";

/// Compression engine with a configurable base target ratio
#[derive(Debug, Clone)]
pub struct CompressionEngine {
    /// Target compressed/original ratio for the generic strategy
    pub target_ratio: f64,
}

impl Default for CompressionEngine {
    fn default() -> Self {
        Self { target_ratio: 0.3 }
    }
}

impl CompressionEngine {
    pub fn new(target_ratio: f64) -> Self {
        Self {
            target_ratio: target_ratio.clamp(0.05, 1.0),
        }
    }

    /// Pick a strategy from the memory type and the text shape
    pub fn kind_for(memory_type: crate::types::MemoryType, text: &str) -> CompressionKind {
        if memory_type == crate::types::MemoryType::Conversation {
            return CompressionKind::Conversation;
        }
        if looks_like_code(text) {
            return CompressionKind::Code;
        }
        if looks_like_document(text) {
            return CompressionKind::Document;
        }
        CompressionKind::Generic
    }

    /// Compress text with the given strategy at this engine's target ratio
    pub fn compress(&self, text: &str, kind: CompressionKind) -> CompressionResult {
        self.compress_with_ratio(text, kind, self.target_ratio)
    }

    /// Compress text toward an explicit target ratio
    pub fn compress_with_ratio(
        &self,
        text: &str,
        kind: CompressionKind,
        ratio: f64,
    ) -> CompressionResult {
        let ratio = ratio.clamp(0.05, 1.0);
        let target_len = ((text.len() as f64) * ratio).ceil() as usize;

        let compressed = match kind {
            CompressionKind::Code => compress_code(text, target_len),
            CompressionKind::Conversation => compress_conversation(text, target_len),
            CompressionKind::Document => compress_document(text, target_len),
            CompressionKind::Generic => compress_generic(text, ratio),
        };

        let quality = quality_metrics(text, &compressed);
        CompressionResult {
            original_size: text.len(),
            compressed_size: compressed.len(),
            ratio: if text.is_empty() {
                1.0
            } else {
                compressed.len() as f64 / text.len() as f64
            },
            compressed,
            kind,
            quality,
        }
    }

    /// Age-tiered compression: the ratio shrinks by `0.7^level`, where level
    /// is the number of age thresholds the memory has passed.
    pub fn hierarchical_compress(
        &self,
        text: &str,
        kind: CompressionKind,
        age_days: f64,
        thresholds_days: &[f64],
    ) -> CompressionResult {
        let level = thresholds_days.iter().filter(|t| age_days > **t).count();
        let ratio = self.target_ratio * 0.7f64.powi(level as i32);
        self.compress_with_ratio(text, kind, ratio)
    }

    /// Compression is one-way; the stored summary is all that remains
    pub fn decompress(&self, compressed: &str) -> String {
        compressed.to_string()
    }
}

fn looks_like_code(text: &str) -> bool {
    let sample: String = text.chars().take(4000).collect();
    let signals = [
        "fn ", "def ", "class ", "import ", "function ", "=> {", "#include", "pub fn",
        "const ", "return ",
    ];
    let hits = signals.iter().filter(|s| sample.contains(*s)).count();
    let braces = sample.matches('{').count() + sample.matches(';').count();
    hits >= 2 || (hits >= 1 && braces > 10)
}

fn looks_like_document(text: &str) -> bool {
    let sample: String = text.chars().take(4000).collect();
    sample.lines().any(|l| l.starts_with('#')) || sample.contains("\n\n")
}

/// Strip comments and collapse whitespace; fall back to a structural
/// skeleton when the stripped form is still too long.
fn compress_code(text: &str, target_len: usize) -> String {
    let mut out = String::with_capacity(text.len() / 2);
    let mut in_block_comment = false;

    for line in text.lines() {
        let mut line = line.to_string();
        if in_block_comment {
            if let Some(end) = line.find("*/") {
                line = line[end + 2..].to_string();
                in_block_comment = false;
            } else {
                continue;
            }
        }
        while let Some(start) = line.find("/*") {
            if let Some(end) = line[start..].find("*/") {
                line = format!("{}{}", &line[..start], &line[start + end + 2..]);
            } else {
                line = line[..start].to_string();
                in_block_comment = true;
                break;
            }
        }
        if let Some(idx) = line.find("//") {
            line = line[..idx].to_string();
        }
        let trimmed = line.trim_end();
        if !trimmed.trim().is_empty() {
            out.push_str(trimmed);
            out.push('\n');
        }
    }

    if out.len() <= target_len {
        return out;
    }

    // Skeleton: imports plus leading signatures
    let lines: Vec<&str> = out.lines().collect();
    let imports: Vec<&str> = lines
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("use ")
                || t.starts_with("import ")
                || t.starts_with("from ")
                || t.starts_with("#include")
        })
        .copied()
        .collect();
    let signatures: Vec<&str> = lines
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("fn ")
                || t.starts_with("pub fn ")
                || t.starts_with("def ")
                || t.starts_with("class ")
                || t.starts_with("function ")
                || t.starts_with("struct ")
                || t.starts_with("pub struct ")
        })
        .take(25)
        .copied()
        .collect();

    let mut skeleton = String::new();
    for line in imports.iter().chain(signatures.iter()) {
        skeleton.push_str(line.trim());
        skeleton.push('\n');
    }
    skeleton.push_str(&format!(
        "// {} lines, {} definitions elided\n",
        lines.len(),
        signatures.len()
    ));
    skeleton
}

/// Keep question lines, role markers, and keyword-bearing lines; bracket
/// with head and tail fragments when still over target.
fn compress_conversation(text: &str, target_len: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let kept: Vec<&str> = lines
        .iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            line.contains('?')
                || is_role_marker(line)
                || CONVERSATION_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .copied()
        .collect();

    let joined = kept.join("\n");
    if !joined.is_empty() && joined.len() <= target_len {
        return joined;
    }

    let source = if joined.is_empty() { text } else { &joined };
    head_tail(source, target_len)
}

fn is_role_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed
        .split_once(':')
        .map(|(role, _)| {
            !role.is_empty()
                && role.len() <= 20
                && role.chars().all(|c| c.is_alphanumeric() || c == '_')
        })
        .unwrap_or(false)
}

fn head_tail(text: &str, target_len: usize) -> String {
    if text.len() <= target_len {
        return text.to_string();
    }
    let keep = target_len.saturating_sub(ELISION_MARKER.len()).max(16);
    let head_len = keep * 2 / 3;
    let tail_len = keep - head_len;

    let head: String = text.chars().take(head_len).collect();
    let tail_start = text.chars().count().saturating_sub(tail_len);
    let tail: String = text.chars().skip(tail_start).collect();
    format!("{head}{ELISION_MARKER}{tail}")
}

/// First paragraph, leading headers, and keyword paragraphs, truncated to
/// the target length
fn compress_document(text: &str, target_len: usize) -> String {
    let paragraphs: Vec<&str> = text.split("\n\n").filter(|p| !p.trim().is_empty()).collect();
    let mut pieces: Vec<String> = Vec::new();

    if let Some(first) = paragraphs.first() {
        pieces.push(first.chars().take(200).collect());
    }

    let headers: Vec<&str> = text
        .lines()
        .filter(|l| l.trim_start().starts_with('#'))
        .take(5)
        .collect();
    pieces.extend(headers.iter().map(|h| h.trim().to_string()));

    for paragraph in paragraphs.iter().skip(1) {
        let lower = paragraph.to_lowercase();
        if DOCUMENT_KEYWORDS.iter().any(|k| lower.contains(k)) {
            pieces.push(paragraph.trim().to_string());
        }
    }

    let mut out = pieces.join("\n\n");
    if out.len() > target_len {
        out = out.chars().take(target_len).collect();
    }
    out
}

/// Sentence-split, then stride-pick first/middle/last up to
/// `ceil(n * ratio)` sentences
fn compress_generic(text: &str, ratio: f64) -> String {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return String::new();
    }

    let keep = ((sentences.len() as f64) * ratio).ceil().max(1.0) as usize;
    if keep >= sentences.len() {
        return sentences.join(" ");
    }

    let mut picked: Vec<usize> = Vec::with_capacity(keep);
    picked.push(0);
    if keep >= 3 {
        // Even stride through the middle
        let middle = keep - 2;
        for k in 1..=middle {
            let idx = k * (sentences.len() - 1) / (middle + 1);
            if !picked.contains(&idx) {
                picked.push(idx);
            }
        }
    }
    if keep >= 2 {
        picked.push(sentences.len() - 1);
    }
    picked.sort_unstable();
    picked.dedup();

    picked
        .into_iter()
        .map(|i| sentences[i].as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let s = current.trim().to_string();
            if !s.is_empty() {
                sentences.push(s);
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

fn quality_metrics(original: &str, compressed: &str) -> QualityMetrics {
    use std::collections::{HashMap, HashSet};

    let original_words: Vec<String> = original
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() > 2)
        .collect();
    let compressed_set: HashSet<String> = compressed
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .collect();

    let distinct: HashSet<&String> = original_words.iter().collect();
    let information_retention = if distinct.is_empty() {
        1.0
    } else {
        distinct
            .iter()
            .filter(|w| compressed_set.contains(**w))
            .count() as f64
            / distinct.len() as f64
    };

    let mut freq: HashMap<&String, usize> = HashMap::new();
    for w in &original_words {
        *freq.entry(w).or_insert(0) += 1;
    }
    let mut top: Vec<(&String, usize)> = freq.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1));
    top.truncate(10);
    let keyword_preservation = if top.is_empty() {
        1.0
    } else {
        top.iter().filter(|(w, _)| compressed_set.contains(*w)).count() as f64 / top.len() as f64
    };

    let sentences = split_sentences(compressed);
    let readability = if sentences.is_empty() {
        0.0
    } else {
        let mean_len: f64 = sentences
            .iter()
            .map(|s| s.split_whitespace().count() as f64)
            .sum::<f64>()
            / sentences.len() as f64;
        (25.0 / (mean_len + 5.0)).clamp(0.0, 1.0)
    };

    QualityMetrics {
        information_retention,
        readability,
        keyword_preservation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;

    #[test]
    fn test_kind_selection() {
        assert_eq!(
            CompressionEngine::kind_for(MemoryType::Conversation, "a: hi"),
            CompressionKind::Conversation
        );
        let code = "use std::io;\npub fn main() { let x = 1; }\nfn helper() {}\n";
        assert_eq!(
            CompressionEngine::kind_for(MemoryType::Fact, code),
            CompressionKind::Code
        );
        let doc = "# Title\n\nIntro paragraph.\n\nMore text.";
        assert_eq!(
            CompressionEngine::kind_for(MemoryType::Fact, doc),
            CompressionKind::Document
        );
    }

    #[test]
    fn test_code_strips_comments() {
        let engine = CompressionEngine::default();
        let code = "// leading comment\nfn main() { /* inline */ work(); }\n// trailing\n";
        let result = engine.compress_with_ratio(code, CompressionKind::Code, 0.9);
        assert!(!result.compressed.contains("leading comment"));
        assert!(!result.compressed.contains("inline"));
        assert!(result.compressed.contains("fn main()"));
    }

    #[test]
    fn test_code_skeleton_when_over_target() {
        let engine = CompressionEngine::default();
        let mut code = String::from("use std::fmt;\n");
        for i in 0..200 {
            code.push_str(&format!("fn generated_{i}() {{ body_{i}(); body_{i}(); }}\n"));
        }
        let result = engine.compress_with_ratio(&code, CompressionKind::Code, 0.05);
        assert!(result.compressed.contains("use std::fmt;"));
        assert!(result.compressed.contains("elided"));
        assert!(result.compressed_size < code.len() / 4);
    }

    #[test]
    fn test_conversation_keeps_questions_and_keywords() {
        let engine = CompressionEngine::default();
        let convo = "alice: hello there\n\
                     bob: hi\n\
                     narrator filler line with nothing of note\n\
                     alice: what should we deploy?\n\
                     bob: the important thing is the rollback plan\n";
        let result = engine.compress_with_ratio(convo, CompressionKind::Conversation, 0.9);
        assert!(result.compressed.contains("what should we deploy?"));
        assert!(result.compressed.contains("important thing"));
    }

    #[test]
    fn test_conversation_head_tail_when_still_long() {
        let engine = CompressionEngine::default();
        let long_line = "q: ".to_string() + &"why? ".repeat(2000);
        let result = engine.compress_with_ratio(&long_line, CompressionKind::Conversation, 0.05);
        assert!(result.compressed.contains("[...]"));
        assert!(result.compressed_size < long_line.len() / 4);
    }

    #[test]
    fn test_document_keeps_first_paragraph_and_headers() {
        let engine = CompressionEngine::default();
        let doc = "Opening paragraph of the report.\n\n\
                   # Findings\n\n\
                   Body text without markers.\n\n\
                   In summary the approach works.\n";
        let result = engine.compress_with_ratio(doc, CompressionKind::Document, 0.9);
        assert!(result.compressed.contains("Opening paragraph"));
        assert!(result.compressed.contains("# Findings"));
        assert!(result.compressed.contains("In summary"));
    }

    #[test]
    fn test_generic_stride_cap() {
        let engine = CompressionEngine::default();
        let text: String = (0..10)
            .map(|i| format!("Sentence number {i}."))
            .collect::<Vec<_>>()
            .join(" ");
        let result = engine.compress_with_ratio(&text, CompressionKind::Generic, 0.3);
        let kept = split_sentences(&result.compressed).len();
        assert_eq!(kept, 3);
        assert!(result.compressed.contains("Sentence number 0."));
        assert!(result.compressed.contains("Sentence number 9."));
    }

    #[test]
    fn test_hierarchical_levels_shrink_ratio() {
        let engine = CompressionEngine::default();
        let text: String = (0..100)
            .map(|i| format!("Sentence number {i} carries some words."))
            .collect::<Vec<_>>()
            .join(" ");

        let young = engine.hierarchical_compress(&text, CompressionKind::Generic, 1.0, &[7.0, 30.0, 90.0]);
        let old = engine.hierarchical_compress(&text, CompressionKind::Generic, 120.0, &[7.0, 30.0, 90.0]);
        assert!(old.compressed_size < young.compressed_size);
    }

    #[test]
    fn test_decompress_is_identity() {
        let engine = CompressionEngine::default();
        assert_eq!(engine.decompress("summary text"), "summary text");
    }

    #[test]
    fn test_quality_metrics_bounds() {
        let engine = CompressionEngine::default();
        let text = "Important words live here. More important words follow.";
        let result = engine.compress_with_ratio(text, CompressionKind::Generic, 0.5);
        let q = &result.quality;
        assert!((0.0..=1.0).contains(&q.information_retention));
        assert!((0.0..=1.0).contains(&q.readability));
        assert!((0.0..=1.0).contains(&q.keyword_preservation));
    }
}
