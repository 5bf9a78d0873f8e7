/// A sentence boundary is only used when it keeps at least this share of the limit
const MIN_SENTENCE_WINDOW_PERCENT: usize = 30;

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…' | '。' | '！' | '？')
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Each chunk ends on the last sentence boundary inside the window when that
/// boundary is not too early, otherwise on the last whitespace, and only as a
/// last resort mid-word. Chunks are trimmed; empty chunks are never produced.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let min_sentence_chars = max_chars * MIN_SENTENCE_WINDOW_PERCENT / 100;
    let mut chunks = Vec::new();
    let mut remaining = text.trim();

    while !remaining.is_empty() {
        let Some((limit, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let mut sentence_cut = None;
        let mut word_cut = None;
        for (position, (index, c)) in remaining[..limit].char_indices().enumerate() {
            let end = index + c.len_utf8();
            if c == '\n' && position >= min_sentence_chars {
                sentence_cut = Some(end);
            } else if is_sentence_end(c) && position + 1 >= min_sentence_chars {
                let followed_by_space = remaining[end..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace);
                if followed_by_space {
                    sentence_cut = Some(end);
                }
            }
            if c.is_whitespace() && index > 0 {
                word_cut = Some(index);
            }
        }
        // the char right at the limit may itself be the separator
        if remaining[limit..].starts_with(char::is_whitespace) {
            word_cut = Some(limit);
        }

        let cut = sentence_cut.or(word_cut).unwrap_or(limit);
        let chunk = remaining[..cut].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        remaining = remaining[cut..].trim_start();
    }

    chunks
}
