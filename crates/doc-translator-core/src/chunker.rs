//! Sentence-aligned text chunking.
//!
//! Chunks are built in two greedy passes: sentences are packed into chunks of
//! at most `max_chars` characters, then adjacent chunks are merged while they
//! still fit. Joining the chunks with single spaces gives back the source
//! text with every run of whitespace between sentences collapsed to a space.
//! A single sentence longer than `max_chars` becomes its own oversized chunk.

/// Split `text` into sentences at `.`, `!` or `?` followed by whitespace.
///
/// The terminator stays with its sentence; the whitespace after it is dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(ws_start, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }

        let end = i + c.len_utf8();
        debug_assert_eq!(end, ws_start);
        push_trimmed(&mut sentences, &text[start..end]);

        while chars.peek().is_some_and(|&(_, c)| c.is_whitespace()) {
            chars.next();
        }
        start = chars.peek().map_or(text.len(), |&(j, _)| j);
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece);
    }
}

/// Split `text` into ordered chunks of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);

    // Pass 1: pack sentences
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();
        if current.is_empty() {
            current.push_str(sentence);
            current_len = sentence_len;
        } else if current_len + 1 + sentence_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current.push_str(sentence);
            current_len = sentence_len;
        } else {
            current.push(' ');
            current.push_str(sentence);
            current_len += 1 + sentence_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    // Pass 2: merge small neighbours
    let mut merged: Vec<String> = Vec::with_capacity(chunks.len());
    let mut merged_len = 0;
    for chunk in chunks {
        let chunk_len = chunk.chars().count();
        match merged.last_mut() {
            Some(last) if merged_len + 1 + chunk_len <= max_chars => {
                last.push(' ');
                last.push_str(&chunk);
                merged_len += 1 + chunk_len;
            }
            _ => {
                merged.push(chunk);
                merged_len = chunk_len;
            }
        }
    }

    merged
}
