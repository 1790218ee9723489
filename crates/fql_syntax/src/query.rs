//! Conversion of a query string into a tree of fields.
//!
//! ```text
//! posts(limit:3).id|title|author[auth].name,[auth].id,--counts
//! ```
//!
//! Sections are separated by `,`, relational levels by `.`, and sibling
//! fields by `|`. Every sibling except the last on a level is a leaf; the
//! last one continues to the next level. Fragments (`--name`) are replaced
//! by their definitions before anything else, and bookmarks (`[name]`)
//! let a later section re-enter a path. A malformed section is dropped on
//! its own; the rest of the query still converts.

use crate::error::{QueryError, QueryResult};
use crate::lexer::{check_balanced, matching_close, split_outside, split_ranges};
use crate::symbols::QuerySyntax;
use fql_core::Span;
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::fmt::Write as _;

/// A query as a tree: each field string maps to its subfields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTree {
    children: IndexMap<String, QueryTree>,
}

impl QueryTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a path of field strings, merging with existing nodes.
    pub fn insert_path(&mut self, path: &[String]) {
        let mut node = self;
        for field in path {
            node = node.children.entry(field.clone()).or_default();
        }
    }

    /// Returns the subtree of `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&QueryTree> {
        self.children.get(field)
    }

    /// Iterates over `(field, subtree)` in query order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &QueryTree)> {
        self.children.iter()
    }

    /// Returns the fields at this level.
    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.children.keys()
    }

    /// Returns true if there are no fields at this level.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns the number of fields at this level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Renders the tree, one field per line, indented by depth.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        for (field, subtree) in &self.children {
            let _ = writeln!(out, "{:indent$}{field}", "", indent = depth * 2);
            subtree.render_into(out, depth + 1);
        }
    }
}

/// A section waiting for fragment expansion.
#[derive(Debug, Clone)]
struct Section {
    text: String,
    span: Span,
    /// Fragments already expanded into this section.
    expanded: Vec<String>,
}

/// Where a fragment reference sits inside a section.
struct FragmentReference {
    level_start: usize,
    range: std::ops::Range<usize>,
    name: String,
}

/// Converts query strings into [`QueryTree`]s.
#[derive(Debug, Clone, Copy)]
pub struct QueryConverter<'s> {
    syntax: &'s QuerySyntax,
}

impl<'s> QueryConverter<'s> {
    /// Creates a converter for a grammar.
    pub fn new(syntax: &'s QuerySyntax) -> Self {
        Self { syntax }
    }

    /// Converts a query into a tree, reporting the sections it dropped.
    pub fn convert(
        &self,
        query: &str,
        fragments: &IndexMap<String, String>,
    ) -> (QueryTree, Vec<QueryError>) {
        let mut tree = QueryTree::new();
        let (sections, mut errors) = self.expand_fragments(query, fragments);

        let mut bookmarks: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut previous_path: Option<Vec<String>> = None;

        for (section, span) in sections {
            match self.resolve_section(&section, &bookmarks, previous_path.as_deref()) {
                Ok(resolved) => {
                    errors.extend(
                        resolved
                            .directive_errors
                            .into_iter()
                            .map(|error| QueryError::new(error.message, span)),
                    );
                    for path in &resolved.paths {
                        tree.insert_path(path);
                    }
                    bookmarks.extend(resolved.bookmarks);
                    previous_path = Some(resolved.deepest_prefix);
                }
                Err(error) => errors.push(QueryError::new(
                    format!("{}; section '{section}' has been ignored", error.message),
                    span,
                )),
            }
        }

        (tree, errors)
    }

    /// Splits a query into sections and replaces every fragment reference
    /// with its definition, recursively.
    ///
    /// When a definition holds several sections, the first replaces the
    /// reference in place and the others are prefixed with the path that
    /// led to the reference.
    pub fn expand_fragments(
        &self,
        query: &str,
        fragments: &IndexMap<String, String>,
    ) -> (Vec<(String, Span)>, Vec<QueryError>) {
        let mut queue: VecDeque<Section> = self
            .trimmed_sections(query)
            .map(|(text, span)| Section {
                text: text.to_string(),
                span,
                expanded: Vec::new(),
            })
            .collect();
        let mut sections = Vec::new();
        let mut errors = Vec::new();

        while let Some(section) = queue.pop_front() {
            let Some(reference) = self.find_fragment_reference(&section.text) else {
                sections.push((section.text, section.span));
                continue;
            };
            let name = &reference.name;
            let definition = if section.expanded.contains(name) {
                Err(format!("Fragment '{name}' references itself"))
            } else {
                fragments
                    .get(name)
                    .ok_or_else(|| format!("Fragment '{name}' is undefined"))
            };
            let definition = match definition {
                Ok(definition) => definition,
                Err(message) => {
                    errors.push(QueryError::new(
                        format!("{message}; section '{}' has been ignored", section.text),
                        section.span,
                    ));
                    continue;
                }
            };

            let parts: Vec<&str> = self
                .trimmed_sections(definition)
                .map(|(text, _)| text)
                .collect();
            let Some((first, rest)) = parts.split_first() else {
                errors.push(QueryError::new(
                    format!("Fragment '{name}' is empty; section '{}' has been ignored", section.text),
                    section.span,
                ));
                continue;
            };

            let mut expanded = section.expanded.clone();
            expanded.push(name.clone());
            let prefix = &section.text[..reference.level_start];

            let mut replacements = vec![format!(
                "{}{first}{}",
                &section.text[..reference.range.start],
                &section.text[reference.range.end..]
            )];
            replacements.extend(rest.iter().map(|part| format!("{prefix}{part}")));

            for text in replacements.into_iter().rev() {
                queue.push_front(Section {
                    text,
                    span: section.span,
                    expanded: expanded.clone(),
                });
            }
        }

        (sections, errors)
    }

    /// `posts.id|author.name` becomes `posts.id` and `posts.author.name`.
    #[cfg(test)]
    fn expand_dot_notation(&self, section: &str) -> QueryResult<Vec<String>> {
        let separator = char::from(self.syntax.relational_separator).to_string();
        Ok(self
            .expand_paths(section)?
            .into_iter()
            .map(|path| path.join(&separator))
            .collect())
    }

    fn trimmed_sections<'q>(&self, query: &'q str) -> impl Iterator<Item = (&'q str, Span)> {
        split_ranges(self.syntax, query, self.syntax.section_separator)
            .into_iter()
            .filter_map(move |range| {
                let raw = &query[range.clone()];
                let text = raw.trim();
                if text.is_empty() {
                    return None;
                }
                let offset = range.start + (raw.len() - raw.trim_start().len());
                Some((text, Span::from(offset..offset + text.len())))
            })
    }

    fn find_fragment_reference(&self, section: &str) -> Option<FragmentReference> {
        let prefix = self.syntax.fragment_prefix.as_str();
        for level in split_ranges(self.syntax, section, self.syntax.relational_separator) {
            let level_text = &section[level.clone()];
            for sibling in split_ranges(self.syntax, level_text, self.syntax.sibling_separator) {
                let raw = &level_text[sibling.clone()];
                let trimmed = raw.trim();
                if let Some(name) = trimmed.strip_prefix(prefix) {
                    let start = level.start + sibling.start + (raw.len() - raw.trim_start().len());
                    return Some(FragmentReference {
                        level_start: level.start,
                        range: start..start + trimmed.len(),
                        name: name.to_string(),
                    });
                }
            }
        }
        None
    }

    fn expand_paths(&self, section: &str) -> QueryResult<Vec<Vec<String>>> {
        check_balanced(self.syntax, section)
            .map_err(|e| QueryError::covering(format!("Section '{section}' is malformed: {e}"), section))?;

        let levels = split_outside(self.syntax, section, self.syntax.relational_separator);
        let mut paths = Vec::new();
        let mut prefix: Vec<String> = Vec::new();

        for (index, level) in levels.iter().enumerate() {
            let siblings: Vec<&str> = split_outside(self.syntax, level, self.syntax.sibling_separator)
                .into_iter()
                .map(str::trim)
                .collect();
            if siblings.iter().any(|s| s.is_empty()) {
                return Err(QueryError::covering(
                    format!("Section '{section}' has an empty field"),
                    section,
                ));
            }
            let is_last_level = index + 1 == levels.len();
            let (leaves, continuing) = match siblings.split_last() {
                Some((last, leaves)) if !is_last_level => (leaves, Some(*last)),
                _ => (&siblings[..], None),
            };
            for leaf in leaves {
                let mut path = prefix.clone();
                path.push((*leaf).to_string());
                paths.push(path);
            }
            if let Some(field) = continuing {
                prefix.push(field.to_string());
            }
        }
        Ok(paths)
    }

    fn resolve_section(
        &self,
        section: &str,
        bookmarks: &IndexMap<String, Vec<String>>,
        previous_path: Option<&[String]>,
    ) -> QueryResult<ResolvedSection> {
        let mut resolved = ResolvedSection::default();

        for raw_path in self.expand_paths(section)? {
            let mut segments = raw_path.iter().peekable();
            let mut path: Vec<String> = Vec::new();

            if let Some(name) = segments.peek().and_then(|s| self.bookmark_reference(s)) {
                segments.next();
                let base = if name == self.syntax.previous_path_bookmark {
                    previous_path.map(<[String]>::to_vec).ok_or_else(|| {
                        QueryError::covering(
                            format!("There is no previous path to resolve '{name}'"),
                            section,
                        )
                    })?
                } else {
                    resolved
                        .bookmarks
                        .get(name)
                        .or_else(|| bookmarks.get(name))
                        .cloned()
                        .ok_or_else(|| {
                            QueryError::covering(format!("Bookmark '{name}' is undefined"), section)
                        })?
                };
                if segments.peek().is_none() {
                    return Err(QueryError::covering(
                        format!("Bookmark '{name}' must be followed by a field"),
                        section,
                    ));
                }
                path = base;
            }

            for segment in segments {
                let parts = self.syntax.parse_field(segment)?;
                let mut field = self.syntax.field_without_bookmark(segment);
                let (directives, errors) = self.syntax.list_field_directives(&field);
                if !errors.is_empty() {
                    field = self.syntax.replace_field_directives(&field, &directives);
                    for error in errors {
                        // Shared path prefixes are listed once per path.
                        if !resolved.directive_errors.contains(&error) {
                            resolved.directive_errors.push(error);
                        }
                    }
                }
                path.push(field);
                if let Some(bookmark) = parts.bookmark {
                    resolved.bookmarks.insert(bookmark.to_string(), path.clone());
                }
            }

            resolved.deepest_prefix = path[..path.len().saturating_sub(1)].to_vec();
            resolved.paths.push(path);
        }
        Ok(resolved)
    }

    /// Returns the name when `segment` is exactly `[name]` or `[@name]`.
    fn bookmark_reference<'a>(&self, segment: &'a str) -> Option<&'a str> {
        let bytes = segment.as_bytes();
        if bytes.first() != Some(&self.syntax.bookmark_open)
            || matching_close(self.syntax, segment, 0) != Some(segment.len() - 1)
        {
            return None;
        }
        let inner = &segment[1..segment.len() - 1];
        Some(
            inner
                .strip_prefix(char::from(self.syntax.alias_prefix))
                .unwrap_or(inner),
        )
    }
}

#[derive(Debug, Default)]
struct ResolvedSection {
    paths: Vec<Vec<String>>,
    bookmarks: IndexMap<String, Vec<String>>,
    deepest_prefix: Vec<String>,
    /// Directives dropped from otherwise valid fields.
    directive_errors: Vec<QueryError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(query: &str) -> (QueryTree, Vec<QueryError>) {
        convert_with(query, &IndexMap::new())
    }

    fn convert_with(
        query: &str,
        fragments: &IndexMap<String, String>,
    ) -> (QueryTree, Vec<QueryError>) {
        let syntax = QuerySyntax::default();
        QueryConverter::new(&syntax).convert(query, fragments)
    }

    #[test]
    fn test_dot_notation_expansion() {
        let syntax = QuerySyntax::default();
        let converter = QueryConverter::new(&syntax);
        assert_eq!(
            converter
                .expand_dot_notation("posts.id|title|author.id|name")
                .unwrap(),
            vec!["posts.id", "posts.title", "posts.author.id", "posts.author.name"]
        );
        assert_eq!(
            converter.expand_dot_notation("posts(limit:3;order:a.b)").unwrap(),
            vec!["posts(limit:3;order:a.b)"]
        );
    }

    #[test]
    fn test_simple_tree() {
        let (tree, errors) = convert("posts(limit:3).id|title|author.name,users.id");
        assert!(errors.is_empty());
        assert_eq!(tree.len(), 2);
        let posts = tree.get("posts(limit:3)").unwrap();
        assert_eq!(posts.fields().collect::<Vec<_>>(), vec!["id", "title", "author"]);
        assert!(posts.get("author").unwrap().get("name").is_some());
    }

    #[test]
    fn test_bookmarks() {
        let (tree, errors) =
            convert("posts.author[auth].name,[auth].id,comments.author[@ca].id,[ca].email");
        assert!(errors.is_empty(), "{errors:?}");
        let author = tree.get("posts").unwrap().get("author").unwrap();
        assert_eq!(author.fields().collect::<Vec<_>>(), vec!["name", "id"]);
        let aliased = tree.get("comments").unwrap().get("author@ca").unwrap();
        assert_eq!(aliased.fields().collect::<Vec<_>>(), vec!["id", "email"]);
    }

    #[test]
    fn test_previous_path_bookmark() {
        let (tree, errors) = convert("posts.author.name,[^].id");
        assert!(errors.is_empty());
        let author = tree.get("posts").unwrap().get("author").unwrap();
        assert_eq!(author.fields().collect::<Vec<_>>(), vec!["name", "id"]);
    }

    #[test]
    fn test_fragments() {
        let mut fragments = IndexMap::new();
        fragments.insert("props".to_string(), "id|--more".to_string());
        fragments.insert("more".to_string(), "title,comments.id".to_string());

        let (tree, errors) = convert_with("posts.--props", &fragments);
        assert!(errors.is_empty(), "{errors:?}");
        let posts = tree.get("posts").unwrap();
        assert_eq!(
            posts.fields().collect::<Vec<_>>(),
            vec!["id", "title", "comments"]
        );
    }

    #[test]
    fn test_recursive_fragment_is_dropped() {
        let mut fragments = IndexMap::new();
        fragments.insert("a".to_string(), "id|--b".to_string());
        fragments.insert("b".to_string(), "--a".to_string());

        let (tree, errors) = convert_with("posts.--a,users.id", &fragments);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("references itself"));
        assert!(tree.get("posts").is_none());
        assert!(tree.get("users").is_some());
    }

    #[test]
    fn test_malformed_sections_are_dropped_individually() {
        let query = "posts(limit:3)).id,users.id,title<upperCase>@t,[nope].id";
        let (tree, errors) = convert(query);
        assert_eq!(errors.len(), 3);
        assert_eq!(tree.len(), 1);
        assert!(tree.get("users").is_some());
        assert_eq!(errors[1].span.slice(query), Some("title<upperCase>@t"));
        assert!(errors[2].message.contains("Bookmark 'nope' is undefined"));
    }

    #[test]
    fn test_invalid_directives_are_dropped_from_their_field() {
        let query = "posts.id,motd<skip(if:false)|1,upperCase>";
        let (tree, errors) = convert(query);
        assert_eq!(tree.fields().collect::<Vec<_>>(), vec!["posts", "motd<upperCase>"]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("must not use the reserved symbol '|'"));
        assert_eq!(
            errors[0].span.slice(query),
            Some("motd<skip(if:false)|1,upperCase>")
        );

        let (tree, errors) = convert("motd<skip(if:false)|1>");
        assert_eq!(tree.fields().collect::<Vec<_>>(), vec!["motd"]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_render() {
        let (tree, _) = convert("posts.id|author.name,users.id");
        insta::assert_snapshot!(tree.render(), @r"
        posts
          id
          author
            name
        users
          id
        ");
    }
}
