//! Word-by-word display pacing.
//!
//! The vision call returns the whole note at once. For a terminal that looks
//! like a long pause followed by a wall of text, so the CLI re-streams the
//! finished markdown one word at a time with a short delay. The library
//! itself never uses this; it is purely presentational.

use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;

/// Delay between words used by the CLI.
pub const DEFAULT_WORD_DELAY: Duration = Duration::from_millis(20);

/// A boxed stream of text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Split `text` into chunks of one word plus the whitespace that follows it.
///
/// Concatenating the chunks gives back `text` exactly, newlines included.
pub fn word_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut in_space = false;

    for ch in text.chars() {
        let is_space = ch.is_whitespace();
        if in_space && !is_space {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
        in_space = is_space;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Emit `text` word by word, sleeping `delay` before each chunk after the first.
///
/// A zero `delay` yields every chunk immediately.
pub fn pace_words(text: &str, delay: Duration) -> TextStream {
    let chunks = word_chunks(text);
    let s = stream::iter(chunks.into_iter().enumerate()).then(move |(i, chunk)| async move {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        chunk
    });
    Box::pin(s)
}
