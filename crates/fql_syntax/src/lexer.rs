//! Nesting-aware scanning of field query text.
//!
//! Every split and search in the grammar must ignore symbols that sit
//! inside `(...)`, `<...>`, `[...]` or a quoted string. The [`Scanner`]
//! walks the bytes once, tracking the open delimiters on a stack, and
//! reports for every byte whether it is at the top level.

use crate::symbols::QuerySyntax;
use memchr::{memchr, memchr2, memchr3};
use std::ops::Range;
use thiserror::Error;

/// Unbalanced delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    /// An opening delimiter was never closed.
    #[error("delimiter '{open}' at position {position} is never closed")]
    Unclosed { open: char, position: usize },
    /// A closing delimiter has no matching opener.
    #[error("unexpected '{close}' at position {position}")]
    Unexpected { close: char, position: usize },
    /// A quoted string was never terminated.
    #[error("quote at position {position} is never closed")]
    UnterminatedQuote { position: usize },
}

/// One scanned byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scanned {
    pub index: usize,
    pub byte: u8,
    /// True when the byte is outside every nesting level and every quote.
    /// Opening delimiters at depth zero are top-level; their closers are not.
    pub top_level: bool,
}

/// Where a boundary symbol was found.
///
/// Splitting cannot tell "no symbol" apart from "the symbol is the whole
/// affix", so searches report both edges explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// No symbol at the top level.
    Absent,
    /// The symbol is the first byte.
    AtStart,
    /// The symbol is somewhere in the middle.
    Inner(usize),
    /// The symbol is the last byte.
    AtEnd(usize),
}

impl Boundary {
    /// Returns the byte offset, if a symbol was found.
    #[must_use]
    pub fn position(self) -> Option<usize> {
        match self {
            Self::Absent => None,
            Self::AtStart => Some(0),
            Self::Inner(pos) | Self::AtEnd(pos) => Some(pos),
        }
    }
}

/// A byte scanner that tracks nesting.
pub struct Scanner<'a> {
    syntax: &'a QuerySyntax,
    bytes: &'a [u8],
    pos: usize,
    stack: Vec<(u8, usize)>,
    quote_start: Option<usize>,
    error: Option<LexError>,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner over `text`.
    pub fn new(syntax: &'a QuerySyntax, text: &'a str) -> Self {
        Self {
            syntax,
            bytes: text.as_bytes(),
            pos: 0,
            stack: Vec::new(),
            quote_start: None,
            error: None,
        }
    }

    /// Current nesting depth.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Returns true while inside a quoted string.
    #[inline]
    pub fn in_quotes(&self) -> bool {
        self.quote_start.is_some()
    }

    /// Consumes the scanner and reports the first balance problem.
    pub fn finish(mut self) -> Result<(), LexError> {
        while self.next().is_some() {}
        if let Some(error) = self.error {
            return Err(error);
        }
        if let Some(position) = self.quote_start {
            return Err(LexError::UnterminatedQuote { position });
        }
        if let Some(&(_, position)) = self.stack.first() {
            return Err(LexError::Unclosed {
                open: self.bytes[position] as char,
                position,
            });
        }
        Ok(())
    }
}

impl Iterator for Scanner<'_> {
    type Item = Scanned;

    fn next(&mut self) -> Option<Scanned> {
        let byte = *self.bytes.get(self.pos)?;
        let index = self.pos;
        self.pos += 1;

        let top_level = if self.quote_start.is_some() {
            if byte == self.syntax.quote {
                self.quote_start = None;
            }
            false
        } else if byte == self.syntax.quote {
            self.quote_start = Some(index);
            false
        } else if let Some(closer) = self.syntax.closer_of(byte) {
            let top = self.stack.is_empty();
            self.stack.push((closer, index));
            top
        } else if self.syntax.is_closer(byte) {
            match self.stack.last() {
                Some(&(expected, _)) if expected == byte => {
                    self.stack.pop();
                }
                _ => {
                    if self.error.is_none() {
                        self.error = Some(LexError::Unexpected {
                            close: byte as char,
                            position: index,
                        });
                    }
                }
            }
            false
        } else {
            self.stack.is_empty()
        };

        Some(Scanned {
            index,
            byte,
            top_level,
        })
    }
}

/// Checks that every delimiter in `text` is balanced.
pub fn check_balanced(syntax: &QuerySyntax, text: &str) -> Result<(), LexError> {
    Scanner::new(syntax, text).finish()
}

/// Returns true if any of `symbols` occurs anywhere in `text`.
fn contains_any(text: &str, symbols: &[u8]) -> bool {
    let bytes = text.as_bytes();
    match symbols {
        [] => false,
        [a] => memchr(*a, bytes).is_some(),
        [a, b] => memchr2(*a, *b, bytes).is_some(),
        [a, b, c] => memchr3(*a, *b, *c, bytes).is_some(),
        _ => bytes.iter().any(|b| symbols.contains(b)),
    }
}

/// Splits `text` at every top-level `separator`, returning byte ranges.
pub fn split_ranges(syntax: &QuerySyntax, text: &str, separator: u8) -> Vec<Range<usize>> {
    if memchr(separator, text.as_bytes()).is_none() {
        return vec![0..text.len()];
    }
    let mut ranges = Vec::new();
    let mut start = 0;
    for scanned in Scanner::new(syntax, text) {
        if scanned.top_level && scanned.byte == separator {
            ranges.push(start..scanned.index);
            start = scanned.index + 1;
        }
    }
    ranges.push(start..text.len());
    ranges
}

/// Splits `text` at every top-level `separator`.
///
/// Like [`str::split`], an empty input yields one empty piece.
pub fn split_outside<'t>(syntax: &QuerySyntax, text: &'t str, separator: u8) -> Vec<&'t str> {
    split_ranges(syntax, text, separator)
        .into_iter()
        .map(|range| &text[range])
        .collect()
}

/// Splits `text` at the first top-level `separator`.
pub fn split_once_outside<'t>(
    syntax: &QuerySyntax,
    text: &'t str,
    separator: u8,
) -> Option<(&'t str, &'t str)> {
    let pos = find_outside(syntax, text, &[separator])?;
    Some((&text[..pos], &text[pos + 1..]))
}

/// Returns the offset of the first top-level byte among `symbols`.
pub fn find_outside(syntax: &QuerySyntax, text: &str, symbols: &[u8]) -> Option<usize> {
    if !contains_any(text, symbols) {
        return None;
    }
    Scanner::new(syntax, text)
        .find(|scanned| scanned.top_level && symbols.contains(&scanned.byte))
        .map(|scanned| scanned.index)
}

/// Like [`find_outside`], classifying the position.
pub fn find_boundary(syntax: &QuerySyntax, text: &str, symbols: &[u8]) -> Boundary {
    match find_outside(syntax, text, symbols) {
        None => Boundary::Absent,
        Some(0) => Boundary::AtStart,
        Some(pos) if pos + 1 == text.len() => Boundary::AtEnd(pos),
        Some(pos) => Boundary::Inner(pos),
    }
}

/// Returns the offset of the delimiter closing the opener at `open`.
pub fn matching_close(syntax: &QuerySyntax, text: &str, open: usize) -> Option<usize> {
    let tail = text.get(open..)?;
    let first = *tail.as_bytes().first()?;
    syntax.closer_of(first)?;

    let mut scanner = Scanner::new(syntax, tail);
    while let Some(scanned) = scanner.next() {
        if scanned.index > 0 && scanner.depth() == 0 && !scanner.in_quotes() {
            return syntax
                .is_closer(scanned.byte)
                .then_some(open + scanned.index);
        }
    }
    None
}
