//! Pure text transforms shared by the splitter and chunker: the metadata
//! filter that drops front/back matter, and the sentence/paragraph-bounded
//! chunking algorithm.

const METADATA_KEYWORDS: &[&str] = &[
    "table of contents",
    "toc",
    "index",
    "contents",
    "copyright",
    "foreword",
    "preface",
    "acknowledgments",
    "introduction",
    "prologue",
    "epilogue",
    "afterword",
    "appendix",
    "dedication",
    "about the author",
    "bibliography",
    "glossary",
    "colophon",
    "cover",
    "isbn",
    "edition",
    "front matter",
    "back matter",
];

const MIN_CHAPTER_LEN: usize = 100;
const MAX_PUNCTUATION_RATIO: f64 = 0.30;
const MAX_URL_HITS: usize = 5;

/// True if a chapter candidate should be dropped as metadata rather than
/// treated as narrative content.
pub fn is_metadata(title: &str, text: &str) -> bool {
    let normalized_title = title.trim().to_lowercase();
    if METADATA_KEYWORDS
        .iter()
        .any(|kw| normalized_title.contains(kw))
    {
        return true;
    }

    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_CHAPTER_LEN {
        return true;
    }

    let total = trimmed.chars().count();
    let non_alnum = trimmed.chars().filter(|c| !c.is_alphanumeric() && !c.is_whitespace()).count();
    if total > 0 && (non_alnum as f64 / total as f64) > MAX_PUNCTUATION_RATIO {
        return true;
    }

    if trimmed.matches("http").count() > MAX_URL_HITS || trimmed.matches("www.").count() > MAX_URL_HITS {
        return true;
    }

    false
}

pub const MAX_CHUNK_BYTES: usize = 5000;

/// Split chapter text into size-bounded chunks without breaking sentences
/// or paragraphs. The size limit is a soft bound: a single sentence longer
/// than `MAX_CHUNK_BYTES` is still emitted whole, as its own chunk.
pub fn split_into_chunks(text: &str, max_chunk_bytes: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        if paragraph.trim().is_empty() {
            continue;
        }

        let sentences = split_sentences(paragraph);
        for sentence in sentences {
            if !current.is_empty() && current.len() + sentence.len() > max_chunk_bytes {
                chunks.push(current.clone());
                current.clear();
            }
            current.push_str(&sentence);
        }
        current.push_str("\n\n");
    }

    let remainder = current.trim();
    if !remainder.is_empty() {
        chunks.push(remainder.to_string());
    }

    chunks
}

/// Split a paragraph into sentences on ". ", restoring the separator to
/// every sentence but the (possibly unterminated) last one.
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences: Vec<String> = paragraph
        .split(". ")
        .map(|s| s.to_string())
        .collect();

    let last_index = sentences.len().saturating_sub(1);
    for (i, sentence) in sentences.iter_mut().enumerate() {
        if sentence.trim().is_empty() {
            continue;
        }
        if i != last_index || paragraph.ends_with(". ") || paragraph.ends_with('.') {
            if !sentence.trim_end().ends_with('.') {
                sentence.push_str(". ");
            }
        }
    }

    sentences.retain(|s| !s.trim().is_empty());
    sentences
}

/// Collapse a soft-hyphen line break (`-\n` -> ``) and normalise non-
/// breaking spaces to regular spaces, as the splitter does per document.
pub fn normalize_extracted_text(raw: &str) -> String {
    raw.replace("-\n", "").replace('\u{a0}', " ")
}
