//! Typed argument values.

use crate::error::{QueryError, QueryResult};
use crate::lexer::{check_balanced, matching_close, split_outside};
use crate::symbols::QuerySyntax;

/// An argument value, classified once when the raw text is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// The bare word `null`.
    Null,
    /// Plain text. Quotes, if any, have been removed.
    Literal(String),
    /// `$name`, resolved against the request variables.
    Variable(String),
    /// `[a;b;c]`.
    Array(Vec<ArgValue>),
    /// A field evaluated against the result item, e.g. `isStatus(draft)`.
    NestedField(String),
}

impl ArgValue {
    /// Parses the raw text of one argument value.
    pub fn parse(syntax: &QuerySyntax, raw: &str) -> QueryResult<Self> {
        let raw = raw.trim();
        let bytes = raw.as_bytes();
        check_balanced(syntax, raw).map_err(|e| {
            QueryError::covering(format!("Argument value '{raw}' is malformed: {e}"), raw)
        })?;

        if bytes.len() >= 2 && bytes[0] == syntax.quote && bytes[bytes.len() - 1] == syntax.quote {
            return Ok(Self::Literal(raw[1..raw.len() - 1].to_string()));
        }

        if bytes.first() == Some(&syntax.variable_prefix) {
            let name = &raw[1..];
            if !syntax.is_valid_name(name) {
                return Err(QueryError::covering(
                    format!("Variable name in '{raw}' is not valid"),
                    raw,
                ));
            }
            return Ok(Self::Variable(name.to_string()));
        }

        if bytes.first() == Some(&syntax.array_open)
            && matching_close(syntax, raw, 0) == Some(raw.len() - 1)
        {
            let inner = &raw[1..raw.len() - 1];
            if inner.trim().is_empty() {
                return Ok(Self::Array(Vec::new()));
            }
            return split_outside(syntax, inner, syntax.array_separator)
                .into_iter()
                .map(|element| Self::parse(syntax, element))
                .collect::<QueryResult<Vec<_>>>()
                .map(Self::Array);
        }

        if is_field(syntax, raw) {
            return Ok(Self::NestedField(raw.to_string()));
        }

        if raw == "null" {
            return Ok(Self::Null);
        }
        Ok(Self::Literal(raw.to_string()))
    }

    /// Returns true if this value, or any array element, is a nested field.
    #[must_use]
    pub fn has_nested_field(&self) -> bool {
        match self {
            Self::NestedField(_) => true,
            Self::Array(elements) => elements.iter().any(Self::has_nested_field),
            _ => false,
        }
    }
}

/// `name(args)` optionally followed by `<directives>`, spanning the whole
/// text. A bare word is a literal, not a field.
fn is_field(syntax: &QuerySyntax, raw: &str) -> bool {
    let Some(open) = raw.bytes().position(|b| b == syntax.args_open) else {
        return false;
    };
    if !syntax.is_valid_name(&raw[..open]) {
        return false;
    }
    let Some(close) = matching_close(syntax, raw, open) else {
        return false;
    };
    let rest = &raw[close + 1..];
    rest.is_empty()
        || (rest.as_bytes().first() == Some(&syntax.directives_open)
            && matching_close(syntax, rest, 0) == Some(rest.len() - 1))
}
