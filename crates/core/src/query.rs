//! Typed builder for remote search filters
//!
//! The Drive search grammar quotes string literals with `'`. Inside a
//! literal only `\` and `'` are special, and both are escaped with a
//! leading backslash. Every value spliced into a filter goes through
//! [`escape_literal`].

use std::fmt;

use crate::traits::ContainerId;

/// MIME type the provider uses to mark folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Escape a value for use inside a single-quoted query literal
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// Object is a direct child of the container
    InParents(ContainerId),
    /// Object title equals the literal
    TitleEq(String),
    /// Object MIME type equals the literal
    MimeTypeEq(String),
    /// Object trash state
    Trashed(bool),
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::InParents(id) => write!(f, "'{}' in parents", escape_literal(id.as_str())),
            Clause::TitleEq(title) => write!(f, "title = '{}'", escape_literal(title)),
            Clause::MimeTypeEq(mime) => write!(f, "mimeType = '{}'", escape_literal(mime)),
            Clause::Trashed(trashed) => write!(f, "trashed = {trashed}"),
        }
    }
}

/// Conjunction of clauses, rendered with `and`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    /// Live (non-trashed) direct children of `parent`
    pub fn children_of(parent: &ContainerId) -> Self {
        Self {
            clauses: vec![Clause::InParents(parent.clone()), Clause::Trashed(false)],
        }
    }

    pub fn with(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn title(self, title: &str) -> Self {
        self.with(Clause::TitleEq(title.to_string()))
    }

    pub fn folders_only(self) -> Self {
        self.with(Clause::MimeTypeEq(FOLDER_MIME_TYPE.to_string()))
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Render to the provider's filter syntax
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}
