use itertools::Itertools;
use std::str::SplitWhitespace;

/// Splits a text blob into word-bounded display lines.
///
/// Every produced line holds at most `words_per_line` tokens joined by single
/// spaces and ends with one trailing space, so the space keystroke that
/// finishes the last word also finishes the line.
#[derive(Debug, Clone, Copy)]
pub struct Chunker<'a> {
    text: &'a str,
    words_per_line: usize,
}

impl<'a> Chunker<'a> {
    pub fn new(text: &'a str, words_per_line: usize) -> Self {
        Self {
            text,
            words_per_line: words_per_line.max(1),
        }
    }

    /// Lazy line sequence; each call starts over from the first token.
    pub fn lines(&self) -> Lines<'a> {
        Lines {
            tokens: self.text.split_whitespace(),
            words_per_line: self.words_per_line,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lines<'a> {
    tokens: SplitWhitespace<'a>,
    words_per_line: usize,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut group = self.tokens.by_ref().take(self.words_per_line).peekable();
        group.peek()?;
        let mut line = group.join(" ");
        line.push(' ');
        Some(line)
    }
}

/// Whitespace-delimited token count.
pub fn word_count(line: &str) -> usize {
    line.split_whitespace().count()
}
