//! Reserved symbols of the field query grammar.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The reserved symbols of the grammar.
///
/// ```text
/// query   = section ("," section)*
/// section = level ("." level)*
/// level   = field ("|" field)*
/// field   = name ["(" arg (";" arg)* ")"] ["@" alias] ["[" bookmark "]"] ["<" directive ("," directive)* ">"]
/// arg     = [key ":"] value
/// value   = "$" variable | "[" value (";" value)* "]" | '"' text '"' | field | text
/// ```
///
/// Every symbol is a single ASCII byte except the fragment prefix and the
/// previous-path bookmark name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct QuerySyntax {
    pub args_open: u8,
    pub args_close: u8,
    pub arg_separator: u8,
    pub arg_key_value_separator: u8,
    pub array_open: u8,
    pub array_close: u8,
    pub array_separator: u8,
    pub quote: u8,
    pub variable_prefix: u8,
    pub fragment_prefix: String,
    pub alias_prefix: u8,
    pub bookmark_open: u8,
    pub bookmark_close: u8,
    pub previous_path_bookmark: String,
    pub directives_open: u8,
    pub directives_close: u8,
    pub directive_separator: u8,
    pub relational_separator: u8,
    pub sibling_separator: u8,
    pub section_separator: u8,
    /// Appended with a counter to repeated directive tokens. Never legal in
    /// user input.
    pub repetition_separator: u8,
}

impl Default for QuerySyntax {
    fn default() -> Self {
        Self {
            args_open: b'(',
            args_close: b')',
            arg_separator: b';',
            arg_key_value_separator: b':',
            array_open: b'[',
            array_close: b']',
            array_separator: b';',
            quote: b'"',
            variable_prefix: b'$',
            fragment_prefix: "--".to_string(),
            alias_prefix: b'@',
            bookmark_open: b'[',
            bookmark_close: b']',
            previous_path_bookmark: "^".to_string(),
            directives_open: b'<',
            directives_close: b'>',
            directive_separator: b',',
            relational_separator: b'.',
            sibling_separator: b'|',
            section_separator: b',',
            repetition_separator: b'|',
        }
    }
}

impl QuerySyntax {
    /// Creates the default grammar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the closing byte for an opening delimiter, if `byte` opens
    /// a nesting level.
    #[must_use]
    pub fn closer_of(&self, byte: u8) -> Option<u8> {
        if byte == self.args_open {
            Some(self.args_close)
        } else if byte == self.directives_open {
            Some(self.directives_close)
        } else if byte == self.array_open {
            Some(self.array_close)
        } else if byte == self.bookmark_open {
            Some(self.bookmark_close)
        } else {
            None
        }
    }

    /// Returns true if `byte` closes a nesting level.
    #[must_use]
    pub fn is_closer(&self, byte: u8) -> bool {
        byte == self.args_close
            || byte == self.directives_close
            || byte == self.array_close
            || byte == self.bookmark_close
    }

    /// Bytes that end a field name.
    #[must_use]
    pub fn name_boundaries(&self) -> [u8; 4] {
        [
            self.args_open,
            self.alias_prefix,
            self.directives_open,
            self.bookmark_open,
        ]
    }

    /// Returns true if `name` is a legal field or directive name.
    #[must_use]
    pub fn is_valid_name(&self, name: &str) -> bool {
        !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }
}
