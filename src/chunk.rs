use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("max chunk size must be greater than zero")]
pub struct InvalidChunkSize;

/// Split `text` into provider-safe chunks of at most `max_chars` characters.
///
/// Splits prefer the last whitespace inside the window so words stay whole,
/// but never trim or rewrite anything: concatenating the returned chunks in
/// order reproduces `text` exactly. A single run longer than the window is
/// hard-cut at `max_chars`.
pub fn split_text(text: &str, max_chars: usize) -> Result<Vec<String>, InvalidChunkSize> {
    if max_chars == 0 {
        return Err(InvalidChunkSize);
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return Ok(vec![text.to_string()]);
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        if chars.len() - start <= max_chars {
            chunks.push(chars[start..].iter().collect());
            break;
        }
        let window_end = start + max_chars;
        // The whitespace stays at the end of the leading chunk.
        let cut = chars[start..window_end]
            .iter()
            .rposition(|c| c.is_whitespace())
            .map(|p| start + p + 1)
            .unwrap_or(window_end);
        chunks.push(chars[start..cut].iter().collect());
        start = cut;
    }
    debug!("Split {} chars into {} chunks", chars.len(), chunks.len());
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("hello world", 50).unwrap();
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn chunks_reassemble_exactly_and_respect_the_limit() {
        let text = "The quick brown fox jumps over the lazy dog. \
                    Pack my box with five dozen liquor jugs. \
                    How vexingly quick daft zebras jump!";
        let chunks = split_text(text, 30).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 30, "chunk too long: {:?}", c);
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn unbroken_run_falls_back_to_fixed_width() {
        let text = "a".repeat(1000);
        let chunks = split_text(&text, 250).unwrap();
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() == 250));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn splits_on_char_boundaries_for_multibyte_text() {
        let text = "こんにちは 世界のポッドキャスト へようこそ、今日は面白い話があります";
        let chunks = split_text(text, 10).unwrap();
        for c in &chunks {
            assert!(c.chars().count() <= 10);
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert_eq!(split_text("anything", 0), Err(InvalidChunkSize));
    }

    #[test]
    fn empty_text_is_a_single_empty_chunk() {
        assert_eq!(split_text("", 10).unwrap(), vec![String::new()]);
    }
}
