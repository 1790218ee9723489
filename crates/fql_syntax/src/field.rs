//! Decomposition and composition of field and directive strings.
//!
//! A field is `name(args)@alias[bookmark]<directives>`; a directive is a
//! field-shaped `name(args)` inside the `<...>` suffix. The lenient
//! accessors here never fail on trailing text, so they can be applied to
//! whole relational paths; [`QuerySyntax::parse_field`] is the strict form
//! used when building a query tree.

use crate::error::{QueryError, QueryResult};
use crate::lexer::{
    check_balanced, find_boundary, find_outside, matching_close, split_once_outside,
    split_outside, Boundary, Scanner,
};
use crate::symbols::QuerySyntax;
use fql_core::Span;
use indexmap::IndexMap;

/// A field string split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldParts<'a> {
    /// The name as written (not lower-cased).
    pub name: &'a str,
    /// Text between the argument parentheses.
    pub args: Option<&'a str>,
    pub alias: Option<&'a str>,
    pub bookmark: Option<&'a str>,
    /// Text between the directive angle brackets.
    pub directives: Option<&'a str>,
}

struct Decomposed<'a> {
    parts: FieldParts<'a>,
    /// End of `name(args)`.
    args_end: usize,
    /// Start of the `<...>` suffix, if any.
    directives_start: Option<usize>,
    /// The `[...]` suffix, brackets included.
    bookmark_range: Option<std::ops::Range<usize>>,
    /// Bytes consumed in canonical order.
    consumed: usize,
    alias_conflict: bool,
}

impl QuerySyntax {
    fn decompose<'a>(&self, field: &'a str) -> Decomposed<'a> {
        let bytes = field.as_bytes();
        let len = field.len();

        let name_end = match find_boundary(self, field, &self.name_boundaries()) {
            Boundary::Absent => len,
            Boundary::AtStart => 0,
            Boundary::Inner(pos) | Boundary::AtEnd(pos) => pos,
        };
        let mut parts = FieldParts {
            name: &field[..name_end],
            ..FieldParts::default()
        };
        let mut pos = name_end;

        if bytes.get(pos) == Some(&self.args_open) {
            if let Some(close) = matching_close(self, field, pos) {
                parts.args = Some(&field[pos + 1..close]);
                pos = close + 1;
            }
        }
        let args_end = pos;

        if bytes.get(pos) == Some(&self.alias_prefix) {
            let rest = &field[pos + 1..];
            let end = find_outside(self, rest, &[self.bookmark_open, self.directives_open])
                .unwrap_or(rest.len());
            parts.alias = Some(&rest[..end]);
            pos += 1 + end;
        }

        let mut alias_conflict = false;
        let mut bookmark_range = None;
        if bytes.get(pos) == Some(&self.bookmark_open) {
            if let Some(close) = matching_close(self, field, pos) {
                let inner = &field[pos + 1..close];
                match inner.strip_prefix(char::from(self.alias_prefix)) {
                    Some(name) => {
                        alias_conflict = parts.alias.is_some();
                        parts.alias = parts.alias.or(Some(name));
                        parts.bookmark = Some(name);
                    }
                    None => parts.bookmark = Some(inner),
                }
                bookmark_range = Some(pos..close + 1);
                pos = close + 1;
            }
        }

        let mut directives_start = None;
        if bytes.get(pos) == Some(&self.directives_open)
            && matching_close(self, field, pos) == Some(len - 1)
        {
            parts.directives = Some(&field[pos + 1..len - 1]);
            directives_start = Some(pos);
            pos = len;
        }
        let consumed = pos;

        if parts.directives.is_none() && bytes.last() == Some(&self.directives_close) {
            let trailing = Scanner::new(self, field)
                .filter(|s| s.top_level && s.byte == self.directives_open)
                .map(|s| s.index)
                .find(|&open| matching_close(self, field, open) == Some(len - 1));
            if let Some(open) = trailing {
                parts.directives = Some(&field[open + 1..len - 1]);
                directives_start = Some(open);
            }
        }

        Decomposed {
            parts,
            args_end,
            directives_start,
            bookmark_range,
            consumed,
            alias_conflict,
        }
    }

    fn raw_field_name<'a>(&self, field: &'a str) -> QueryResult<&'a str> {
        let name = self.decompose(field).parts.name;
        if name.is_empty() {
            return Err(QueryError::covering(
                format!("Name in '{field}' is missing"),
                field,
            ));
        }
        Ok(name)
    }

    /// Returns the lower-cased field name.
    ///
    /// Fails when the field starts with `(`, `@`, `<` or `[`.
    pub fn field_name(&self, field: &str) -> QueryResult<String> {
        self.raw_field_name(field).map(str::to_ascii_lowercase)
    }

    /// Returns the raw text between the argument parentheses.
    pub fn field_args<'a>(&self, field: &'a str) -> Option<&'a str> {
        self.decompose(field).parts.args
    }

    /// Returns the alias, from either `@alias` or `[@alias]`.
    pub fn field_alias<'a>(&self, field: &'a str) -> Option<&'a str> {
        self.decompose(field).parts.alias
    }

    /// Returns the bookmark name, from either `[name]` or `[@name]`.
    pub fn field_bookmark<'a>(&self, field: &'a str) -> Option<&'a str> {
        self.decompose(field).parts.bookmark
    }

    /// Returns the raw text between the directive angle brackets.
    pub fn field_directives<'a>(&self, field: &'a str) -> Option<&'a str> {
        self.decompose(field).parts.directives
    }

    /// Splits the argument list into ordered key → raw value pairs.
    ///
    /// Values are never interpreted here. An argument without a key is
    /// positional and keyed by its index.
    pub fn static_field_arguments(&self, field: &str) -> IndexMap<String, String> {
        let mut args = IndexMap::new();
        let Some(raw) = self.field_args(field) else {
            return args;
        };
        for (index, piece) in split_outside(self, raw, self.arg_separator)
            .into_iter()
            .enumerate()
        {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            match split_once_outside(self, piece, self.arg_key_value_separator) {
                Some((key, value)) => args.insert(key.trim().to_string(), value.trim().to_string()),
                None => args.insert(index.to_string(), piece.to_string()),
            };
        }
        args
    }

    /// Lists the directives of a field, in order.
    ///
    /// Directives with a missing or illegal name, or with text after
    /// `name(args)`, are dropped and reported. The repetition separator is
    /// reserved, so it can appear in neither the name nor the tail.
    pub fn list_field_directives(&self, field: &str) -> (Vec<String>, Vec<QueryError>) {
        let mut directives = Vec::new();
        let mut errors = Vec::new();
        let Some(raw) = self.field_directives(field) else {
            return (directives, errors);
        };
        for piece in split_outside(self, raw, self.directive_separator) {
            let directive = piece.trim();
            if directive.is_empty() {
                continue;
            }
            match self.check_directive(directive, field) {
                Ok(()) => directives.push(directive.to_string()),
                Err(error) => errors.push(error),
            }
        }
        (directives, errors)
    }

    fn check_directive(&self, directive: &str, field: &str) -> QueryResult<()> {
        let decomposed = self.decompose(directive);
        let name = decomposed.parts.name;
        let reserved = char::from(self.repetition_separator);
        if name.is_empty() {
            return Err(QueryError::covering(
                format!("Directive '{directive}' in field '{field}' has no name"),
                field,
            ));
        }
        if name.contains(reserved) {
            return Err(QueryError::covering(
                format!("Directive name '{name}' must not contain the reserved symbol '{reserved}'"),
                field,
            ));
        }
        if !self.is_valid_name(name) {
            return Err(QueryError::covering(
                format!("Directive name '{name}' in field '{field}' is not valid"),
                field,
            ));
        }
        let trailing = &directive[decomposed.args_end..];
        if trailing.contains(reserved) {
            return Err(QueryError::covering(
                format!(
                    "Directive '{directive}' in field '{field}' must not use the reserved symbol '{reserved}'"
                ),
                field,
            ));
        }
        if !trailing.is_empty() {
            return Err(QueryError::covering(
                format!("Directive '{directive}' in field '{field}' has unexpected text '{trailing}'"),
                field,
            ));
        }
        Ok(())
    }

    /// Returns the lower-cased name of a directive token, ignoring any
    /// repetition tag.
    pub fn directive_name(&self, directive: &str) -> QueryResult<String> {
        let (directive, _) = self.strip_repetition_tag(directive);
        self.field_name(directive)
    }

    /// Parses a field strictly, in canonical suffix order.
    pub fn parse_field<'a>(&self, field: &'a str) -> QueryResult<FieldParts<'a>> {
        check_balanced(self, field).map_err(|e| QueryError::unbalanced(field, &e))?;
        let decomposed = self.decompose(field);
        let parts = decomposed.parts;

        if parts.name.is_empty() {
            return Err(QueryError::covering(
                format!("Name in '{field}' is missing"),
                field,
            ));
        }
        if !self.is_valid_name(parts.name) {
            return Err(QueryError::covering(
                format!("Field name '{}' in '{field}' is not valid", parts.name),
                field,
            ));
        }
        if let Some(alias) = parts.alias.filter(|a| !self.is_valid_name(a)) {
            return Err(QueryError::covering(
                format!("Alias '{alias}' in field '{field}' is not valid"),
                field,
            ));
        }
        if let Some(bookmark) = parts.bookmark.filter(|b| !self.is_valid_name(b)) {
            return Err(QueryError::covering(
                format!("Bookmark '{bookmark}' in field '{field}' is not valid"),
                field,
            ));
        }
        if decomposed.alias_conflict {
            return Err(QueryError::covering(
                format!("Field '{field}' declares an alias twice"),
                field,
            ));
        }
        if decomposed.consumed != field.len() {
            return Err(QueryError::new(
                format!(
                    "Field '{field}' has unexpected text '{}'; expected name(args)@alias[bookmark]<directives>",
                    &field[decomposed.consumed..]
                ),
                Span::from(decomposed.consumed..field.len()),
            ));
        }
        Ok(parts)
    }

    /// Builds `name(k:v;...)@alias<d1,d2>`.
    pub fn compose_field(
        &self,
        name: &str,
        args: &IndexMap<String, String>,
        alias: Option<&str>,
        directives: &[String],
    ) -> String {
        let mut field = self.compose_directive(name, args);
        if let Some(alias) = alias {
            field.push(char::from(self.alias_prefix));
            field.push_str(alias);
        }
        if !directives.is_empty() {
            field.push(char::from(self.directives_open));
            field.push_str(&directives.join(&char::from(self.directive_separator).to_string()));
            field.push(char::from(self.directives_close));
        }
        field
    }

    /// Builds `name(k:v;...)`, or just `name` without arguments.
    pub fn compose_directive(&self, name: &str, args: &IndexMap<String, String>) -> String {
        if args.is_empty() {
            return name.to_string();
        }
        let separator = char::from(self.arg_separator).to_string();
        let kv = char::from(self.arg_key_value_separator);
        let args = args
            .iter()
            .map(|(key, value)| format!("{key}{kv}{value}"))
            .collect::<Vec<_>>()
            .join(&separator);
        format!(
            "{name}{}{args}{}",
            char::from(self.args_open),
            char::from(self.args_close)
        )
    }

    /// The key a field's value is stored under: the alias, or `name(args)`.
    pub fn field_output_key(&self, field: &str) -> String {
        let decomposed = self.decompose(field);
        match decomposed.parts.alias {
            Some(alias) => alias.to_string(),
            None => field[..decomposed.args_end].to_string(),
        }
    }

    /// Returns `name(args)`, the part of a field that determines its value.
    pub fn field_signature<'a>(&self, field: &'a str) -> &'a str {
        &field[..self.decompose(field).args_end]
    }

    /// Returns the field without its `<...>` suffix.
    pub fn field_without_directives<'a>(&self, field: &'a str) -> &'a str {
        match self.decompose(field).directives_start {
            Some(start) => &field[..start],
            None => field,
        }
    }

    /// Returns the field without its `[bookmark]` suffix. An alias given as
    /// `[@alias]` is kept as `@alias`.
    pub fn field_without_bookmark(&self, field: &str) -> String {
        let decomposed = self.decompose(field);
        let Some(range) = decomposed.bookmark_range else {
            return field.to_string();
        };
        let mut stripped = field[..range.start].to_string();
        let alias_in_brackets = field[range.start + 1..]
            .as_bytes()
            .first()
            .is_some_and(|&b| b == self.alias_prefix);
        if alias_in_brackets && !decomposed.alias_conflict {
            if let Some(alias) = decomposed.parts.alias {
                stripped.push(char::from(self.alias_prefix));
                stripped.push_str(alias);
            }
        }
        stripped.push_str(&field[range.end..]);
        stripped
    }

    /// Returns the field with its directive chain replaced.
    pub fn replace_field_directives(&self, field: &str, directives: &[String]) -> String {
        let mut replaced = self.field_without_directives(field).to_string();
        if !directives.is_empty() {
            replaced.push(char::from(self.directives_open));
            replaced.push_str(&directives.join(&char::from(self.directive_separator).to_string()));
            replaced.push(char::from(self.directives_close));
        }
        replaced
    }

    /// Gives every repeated occurrence of a directive name its own token.
    ///
    /// The first occurrence keeps its text; the n-th repeat gets `|n`
    /// appended.
    pub fn tag_repeated_directives(&self, chain: &[String]) -> Vec<String> {
        let mut seen: IndexMap<String, u32> = IndexMap::new();
        chain
            .iter()
            .map(|directive| {
                let name = self
                    .directive_name(directive)
                    .unwrap_or_else(|_| directive.clone());
                let count = seen.entry(name).or_insert(0);
                let token = if *count == 0 {
                    directive.clone()
                } else {
                    format!(
                        "{directive}{}{count}",
                        char::from(self.repetition_separator)
                    )
                };
                *count += 1;
                token
            })
            .collect()
    }

    /// Splits a directive token into the directive and its repetition
    /// counter.
    pub fn strip_repetition_tag<'a>(&self, token: &'a str) -> (&'a str, Option<u32>) {
        let Some(pos) = memchr::memrchr(self.repetition_separator, token.as_bytes()) else {
            return (token, None);
        };
        let (head, tail) = (&token[..pos], &token[pos + 1..]);
        if head.is_empty() || tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
            return (token, None);
        }
        match tail.parse() {
            Ok(counter) => (head, Some(counter)),
            Err(_) => (token, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syntax() -> QuerySyntax {
        QuerySyntax::default()
    }

    #[test]
    fn test_field_name() {
        let syntax = syntax();
        assert_eq!(syntax.field_name("title").unwrap(), "title");
        assert_eq!(syntax.field_name("isPublished()").unwrap(), "ispublished");
        assert_eq!(syntax.field_name("title@t").unwrap(), "title");
        assert_eq!(syntax.field_name("title<upperCase>").unwrap(), "title");
    }

    #[test]
    fn test_field_name_missing() {
        let syntax = syntax();
        for field in ["(limit:3)", "@alias", "<upperCase>", "[bookmark]"] {
            let err = syntax.field_name(field).unwrap_err();
            assert!(err.message.contains("is missing"), "{field}");
        }
    }

    #[test]
    fn test_relational_path_scenario() {
        let syntax = syntax();
        let field = "posts(limit:3;orderby:title).id|title@myAlias<cache(ttl:60)>";

        assert_eq!(syntax.field_name(field).unwrap(), "posts");
        let args = syntax.static_field_arguments(field);
        assert_eq!(args.len(), 2);
        assert_eq!(args["limit"], "3");
        assert_eq!(args["orderby"], "title");
        assert_eq!(syntax.field_alias(field), None);
        let (directives, errors) = syntax.list_field_directives(field);
        assert_eq!(directives, vec!["cache(ttl:60)"]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_static_arguments_are_not_interpreted() {
        let syntax = syntax();
        let args = syntax.static_field_arguments(
            "posts(filter:\"a;b\";ids:[1;2];since:$date;by:author(id:1);draft)",
        );
        assert_eq!(args["filter"], "\"a;b\"");
        assert_eq!(args["ids"], "[1;2]");
        assert_eq!(args["since"], "$date");
        assert_eq!(args["by"], "author(id:1)");
        assert_eq!(args["4"], "draft");
    }

    #[test]
    fn test_alias_and_bookmark() {
        let syntax = syntax();
        assert_eq!(syntax.field_alias("title@t<upperCase>"), Some("t"));
        assert_eq!(syntax.field_bookmark("author[auth]"), Some("auth"));
        assert_eq!(syntax.field_alias("author[auth]"), None);
        assert_eq!(syntax.field_alias("author[@auth]"), Some("auth"));
        assert_eq!(syntax.field_bookmark("author(id:1)@a[b]"), Some("b"));
        assert_eq!(syntax.field_without_bookmark("author[auth].x"), "author.x");
        assert_eq!(
            syntax.field_without_bookmark("author(id:1)[@a]<upperCase>"),
            "author(id:1)@a<upperCase>"
        );
        assert_eq!(syntax.field_without_bookmark("author@b[c]"), "author@b");
    }

    #[test]
    fn test_parse_field_strict() {
        let syntax = syntax();
        let parts = syntax
            .parse_field("posts(limit:3)@p[ps]<upperCase,default(value:x)>")
            .unwrap();
        assert_eq!(parts.name, "posts");
        assert_eq!(parts.args, Some("limit:3"));
        assert_eq!(parts.alias, Some("p"));
        assert_eq!(parts.bookmark, Some("ps"));
        assert_eq!(parts.directives, Some("upperCase,default(value:x)"));

        let err = syntax.parse_field("title<upperCase>@alias").unwrap_err();
        assert!(err.message.contains("unexpected text '<upperCase>@alias'"));
        assert!(syntax.parse_field("title(limit:3").is_err());
        assert!(syntax.parse_field("title@a[@b]").is_err());
    }

    #[test]
    fn test_compose_round_trip() {
        let syntax = syntax();
        let mut args = IndexMap::new();
        args.insert("limit".to_string(), "3".to_string());
        args.insert("order".to_string(), "title".to_string());

        let field = syntax.compose_field("posts", &args, None, &[]);
        assert_eq!(field, "posts(limit:3;order:title)");
        assert_eq!(syntax.field_name(&field).unwrap(), "posts");
        assert_eq!(syntax.static_field_arguments(&field), args);

        let field = syntax.compose_field("title", &IndexMap::new(), Some("t"), &["upperCase".to_string()]);
        assert_eq!(field, "title@t<upperCase>");
    }

    #[test]
    fn test_output_key_and_directive_removal() {
        let syntax = syntax();
        assert_eq!(syntax.field_output_key("title<upperCase>"), "title");
        assert_eq!(syntax.field_output_key("date(format:Y)@d<x>"), "d");
        assert_eq!(syntax.field_output_key("date(format:Y)"), "date(format:Y)");
        assert_eq!(syntax.field_without_directives("title@t<upperCase>"), "title@t");
        assert_eq!(syntax.field_signature("date(format:Y)@d[b]<x>"), "date(format:Y)");
        assert_eq!(
            syntax.replace_field_directives("title<upperCase>", &["lowerCase".to_string()]),
            "title<lowerCase>"
        );
    }

    #[test]
    fn test_directive_listing_rejects_reserved_symbol() {
        let syntax = syntax();
        let (directives, errors) = syntax.list_field_directives("title<upper|case,lowerCase,(x:1)>");
        assert_eq!(directives, vec!["lowerCase"]);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("reserved symbol '|'"));
    }

    /// Test that a written repetition tag is not taken as a second occurrence
    #[test]
    fn test_directive_listing_rejects_trailing_text() {
        let syntax = syntax();
        let (directives, errors) =
            syntax.list_field_directives("motd<skip(if:false)|1,upperCase@loud,lowerCase>");
        assert_eq!(directives, vec!["lowerCase"]);
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[0].message,
            "Directive 'skip(if:false)|1' in field 'motd<skip(if:false)|1,upperCase@loud,lowerCase>' must not use the reserved symbol '|'"
        );
        assert!(errors[1].message.contains("unexpected text '@loud'"));

        let (directives, errors) = syntax.list_field_directives("motd<default(value:\"a|b\")>");
        assert_eq!(directives, vec!["default(value:\"a|b\")"]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_repetition_tags() {
        let syntax = syntax();
        let chain: Vec<String> = ["upperCase", "lowerCase", "upperCase", "upperCase"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let tagged = syntax.tag_repeated_directives(&chain);
        assert_eq!(tagged, vec!["upperCase", "lowerCase", "upperCase|1", "upperCase|2"]);

        assert_eq!(syntax.strip_repetition_tag("upperCase|2"), ("upperCase", Some(2)));
        assert_eq!(syntax.strip_repetition_tag("upperCase"), ("upperCase", None));
        assert_eq!(
            syntax.strip_repetition_tag("default(value:\"a|1\")"),
            ("default(value:\"a|1\")", None)
        );
        assert_eq!(syntax.directive_name("default(value:x)|3").unwrap(), "default");
    }
}
