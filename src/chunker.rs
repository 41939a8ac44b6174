//! Boundary-aware text chunker.
//!
//! Splits document text into overlapping chunks that respect a configurable
//! character budget. Splitting prefers blank-line paragraph boundaries and
//! falls back to sentence boundaries (`。！？.!?`) for oversized paragraphs,
//! so each chunk stays semantically coherent.
//!
//! Short texts are exempt from splitting entirely: anything at or below
//! `min_chunk_size`, or at or below `chunk_size × no_split_multiplier`,
//! is returned as a single chunk.
//!
//! All sizes are measured in characters, not bytes — CJK text is first-class.

use crate::config::ChunkingConfig;

/// Characters that end a sentence.
const SENTENCE_ENDINGS: [char; 6] = ['。', '！', '？', '.', '!', '?'];

/// Sentence-boundary markers recognized when trimming overlap forward.
/// Includes newline so overlap can also begin at a line break.
const OVERLAP_MARKERS: [char; 7] = ['。', '！', '？', '.', '!', '?', '\n'];

/// Split text into ordered chunks per the chunking policy.
///
/// Returns an empty vector for blank input. Every chunk after the first
/// carries up to `overlap` trailing characters of its predecessor, trimmed
/// forward to the nearest sentence boundary, prepended with a paragraph
/// separator. Overlap is always sourced from the pre-overlap chunk list,
/// so it never reaches back into a previous chunk's own prepended overlap.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let total_chars = char_len(text);

    // Short-text exemption: avoid fragmenting texts that fit comfortably
    // in one chunk.
    if total_chars <= config.min_chunk_size {
        return vec![text.to_string()];
    }
    let no_split_limit = (config.chunk_size as f64 * config.no_split_multiplier) as usize;
    if total_chars <= no_split_limit {
        return vec![text.to_string()];
    }

    let chunks = split_into_chunks(text, config.chunk_size);

    if config.overlap > 0 && chunks.len() > 1 {
        apply_overlap(&chunks, config.overlap)
    } else {
        chunks
    }
}

/// Accumulate paragraphs into chunks, flushing whenever the next paragraph
/// would push the running chunk past `chunk_size`.
fn split_into_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in split_paragraphs(text) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        let para_chars = char_len(paragraph);

        // +2 accounts for the blank-line separator between paragraphs.
        if char_len(&current) + para_chars + 2 > chunk_size {
            if !current.is_empty() {
                chunks.push(current.trim().to_string());
                current.clear();
            }

            if para_chars > chunk_size {
                // A single paragraph exceeds the budget: fall back to
                // sentence-boundary splitting inside it.
                let mut temp = String::new();
                for sentence in split_sentences(paragraph) {
                    if char_len(&temp) + char_len(&sentence) + 1 > chunk_size {
                        if !temp.is_empty() {
                            chunks.push(temp.trim().to_string());
                        }
                        temp = sentence;
                    } else {
                        temp.push_str(&sentence);
                    }
                }
                current = temp;
            } else {
                current = paragraph.to_string();
            }
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
    }

    if !current.is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

/// Split on blank-line boundaries. A boundary line may contain whitespace.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
}

/// Split a paragraph into sentences, each keeping its terminator.
/// Text after the last terminator forms a final sentence.
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in paragraph.chars() {
        current.push(c);
        if SENTENCE_ENDINGS.contains(&c) {
            if !current.trim().is_empty() {
                sentences.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }

    sentences
}

/// Prepend up to `overlap` trailing characters of each chunk's predecessor,
/// trimmed forward to the first sentence boundary inside that window.
///
/// Reads from the pre-overlap `chunks` slice only, so overlap text is always
/// original content.
fn apply_overlap(chunks: &[String], overlap: usize) -> Vec<String> {
    let mut overlapped = Vec::with_capacity(chunks.len());
    overlapped.push(chunks[0].clone());

    for i in 1..chunks.len() {
        let prev: Vec<char> = chunks[i - 1].chars().collect();

        let overlap_text = if prev.len() > overlap {
            let overlap_start = prev.len() - overlap;
            let mut best_start = overlap_start;
            for (j, &c) in prev.iter().enumerate().skip(overlap_start) {
                if OVERLAP_MARKERS.contains(&c) && j + 1 < prev.len() {
                    best_start = j + 1;
                    break;
                }
            }
            prev[best_start..].iter().collect::<String>().trim().to_string()
        } else {
            chunks[i - 1].clone()
        };

        if overlap_text.is_empty() {
            overlapped.push(chunks[i].clone());
        } else {
            overlapped.push(format!("{}\n\n{}", overlap_text, chunks[i]));
        }
    }

    overlapped
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, overlap: usize, min_chunk_size: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            overlap,
            min_chunk_size,
            no_split_multiplier: 1.2,
        }
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(split_text("", &config(500, 100, 100)).is_empty());
        assert!(split_text("   \n\t  ", &config(500, 100, 100)).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let cfg = config(500, 100, 100);
        let text = "A short note about nothing in particular.";
        assert_eq!(split_text(text, &cfg), vec![text.to_string()]);
    }

    #[test]
    fn test_text_at_min_chunk_size_boundary_not_split() {
        let cfg = config(500, 100, 100);
        let text: String = std::iter::repeat('x').take(100).collect();
        assert_eq!(split_text(&text, &cfg), vec![text.clone()]);
    }

    #[test]
    fn test_text_at_no_split_limit_boundary_not_split() {
        // chunk_size 500 × multiplier 1.2 = 600: exactly 600 chars must not split.
        let cfg = config(500, 100, 100);
        let para: String = std::iter::repeat('y').take(299).collect();
        let text = format!("{}\n\n{}", para, para); // 299 + 2 + 299 = 600 chars
        assert_eq!(split_text(&text, &cfg).len(), 1);
    }

    #[test]
    fn test_paragraphs_accumulate_until_budget() {
        let cfg = config(500, 0, 10);
        // Four ~300-char paragraphs: no pair fits in 500 together.
        let para = |seed: char| -> String {
            let body: String = std::iter::repeat(seed).take(295).collect();
            format!("{} end.", body)
        };
        let text = format!(
            "{}\n\n{}\n\n{}\n\n{}",
            para('a'),
            para('b'),
            para('c'),
            para('d')
        );
        let chunks = split_text(&text, &cfg);
        assert_eq!(chunks.len(), 4);
        assert!(chunks[0].starts_with('a'));
        assert!(chunks[3].starts_with('d'));
    }

    #[test]
    fn test_oversized_paragraph_falls_back_to_sentences() {
        let cfg = config(100, 0, 10);
        // One paragraph of ten 30-char sentences; must split on sentence
        // boundaries, not mid-sentence.
        let sentence = "This sentence runs 30 chars x."; // 30 chars
        let text: String = std::iter::repeat(sentence).take(10).collect();
        let chunks = split_text(&text, &cfg);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.ends_with('.'), "chunk cut mid-sentence: {:?}", chunk);
        }
    }

    #[test]
    fn test_prose_scenario_produces_overlapping_chunks() {
        // ~1200 chars of prose with paragraph breaks roughly every 300 chars.
        let cfg = config(500, 100, 100);
        let para = |seed: &str| -> String {
            let mut p = String::new();
            while p.chars().count() < 280 {
                p.push_str(seed);
            }
            p.push('.');
            p
        };
        let text = format!(
            "{}\n\n{}\n\n{}\n\n{}",
            para("The reactor hummed through the night shift. "),
            para("Maintenance crews logged every reading twice. "),
            para("By morning the pressure had stabilized again. "),
            para("Nobody mentioned the anomaly in the report. ")
        );
        let chunks = split_text(&text, &cfg);
        assert!(
            (2..=4).contains(&chunks.len()),
            "expected 2-4 chunks, got {}",
            chunks.len()
        );
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(100).collect();
            let shared = pair[1]
                .split("\n\n")
                .next()
                .expect("chunk missing overlap prefix");
            assert!(!shared.is_empty());
            // The overlap prefix must come from the predecessor's tail.
            let tail_fwd: String = tail.chars().rev().collect();
            assert!(
                tail_fwd.contains(shared.chars().take(20).collect::<String>().as_str()),
                "overlap prefix not found in predecessor tail"
            );
        }
    }

    #[test]
    fn test_overlap_prefix_bounded_by_overlap_len() {
        let cfg = config(200, 50, 10);
        let para = |seed: char| -> String {
            let body: String = std::iter::repeat(seed).take(180).collect();
            format!("{}.", body)
        };
        let text = format!("{}\n\n{}", para('a'), para('b'));
        let chunks = split_text(&text, &cfg);
        assert_eq!(chunks.len(), 2);
        let prefix = chunks[1].split("\n\n").next().unwrap();
        assert!(prefix.chars().count() <= 50);
    }

    #[test]
    fn test_overlap_sourced_from_original_content_only() {
        // Three chunks: chunk 3's overlap must come from chunk 2's original
        // text, never from the overlap chunk 2 itself received.
        let cfg = config(200, 60, 10);
        let para = |seed: char| -> String {
            let body: String = std::iter::repeat(seed).take(180).collect();
            format!("{}.", body)
        };
        let text = format!("{}\n\n{}\n\n{}", para('a'), para('b'), para('c'));
        let chunks = split_text(&text, &cfg);
        assert_eq!(chunks.len(), 3);
        let third_prefix = chunks[2].split("\n\n").next().unwrap();
        assert!(
            !third_prefix.contains('a'),
            "overlap leaked through a prior chunk's own overlap"
        );
        assert!(third_prefix.contains('b'));
    }

    #[test]
    fn test_content_reconstruction_modulo_overlap() {
        let cfg = config(300, 0, 10);
        let paras: Vec<String> = (0..6)
            .map(|i| {
                format!(
                    "Paragraph number {} talks about topic {} in considerable and repetitive detail.",
                    i,
                    i * 7
                )
            })
            .collect();
        let text = paras.join("\n\n");
        let chunks = split_text(&text, &cfg);
        let rejoined = chunks.join("\n\n");
        for para in &paras {
            assert!(rejoined.contains(para.as_str()));
        }
    }

    #[test]
    fn test_cjk_text_counted_in_chars() {
        // 720 CJK chars (3 bytes each) must split by char count, not bytes.
        let cfg = config(500, 100, 100);
        let para: String = std::iter::repeat('山').take(358).chain("。".chars()).collect();
        let text = format!("{}\n\n{}", para, para);
        let chunks = split_text(&text, &cfg);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_deterministic() {
        let cfg = config(300, 50, 10);
        let text = (0..10)
            .map(|i| format!("Sentence group {} describing subsystem {}.", i, i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let a = split_text(&text, &cfg);
        let b = split_text(&text, &cfg);
        assert_eq!(a, b);
    }
}
