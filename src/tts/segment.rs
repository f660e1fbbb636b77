//! Sentence segmentation for incremental TTS synthesis.

/// Units shorter than this (in characters, after trimming) are dropped.
pub const DEFAULT_MIN_UNIT_CHARS: usize = 5;

/// Longest unit handed to a synthesizer in one request.
pub const DEFAULT_MAX_UNIT_CHARS: usize = 800;

/// One speakable sentence of an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    /// Position among the retained units (0-based, contiguous).
    pub index: usize,
    /// Trimmed sentence text, terminator included.
    pub text: String,
}

/// Splits text into ordered sentence units.
///
/// Sentences end at `.`, `!` or `?` followed by whitespace or end of input.
/// Runs of terminators (`...`, `?!`) and closing quotes or brackets stay with
/// the sentence they end. Fragments below `min_chars` are discarded rather
/// than merged. Sentences above `max_chars` are split on word boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    min_chars: usize,
    max_chars: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_UNIT_CHARS, DEFAULT_MAX_UNIT_CHARS)
    }
}

impl Segmenter {
    pub fn new(min_chars: usize, max_chars: usize) -> Self {
        Self {
            min_chars,
            max_chars: max_chars.max(1),
        }
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Segment `text` into units. Empty or blank input yields no units.
    pub fn segment(&self, text: &str) -> Vec<TextUnit> {
        let mut pieces: Vec<String> = Vec::new();

        for sentence in split_sentences(text) {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            if sentence.chars().count() > self.max_chars {
                pieces.extend(split_long(sentence, self.max_chars));
            } else {
                pieces.push(sentence.to_string());
            }
        }

        pieces
            .into_iter()
            .filter(|p| p.chars().count() >= self.min_chars.max(1))
            .enumerate()
            .map(|(index, text)| TextUnit { index, text })
            .collect()
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}')
}

/// Split at sentence boundaries, keeping terminators attached.
///
/// Returned slices are untrimmed and, concatenated, reproduce `text`.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }

        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if is_terminator(next) || is_closer(next) {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }

        // "3.14", "v1.2", "e.g.x" are not boundaries
        let at_boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
        if at_boundary {
            out.push(&text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Break an oversized sentence into word-aligned chunks of at most
/// `max_chars` characters.
fn split_long(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in sentence.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_len = needed;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
