//! Error types with diagnostic reporting using miette.

use miette::{Diagnostic, SourceSpan};
use owo_colors::OwoColorize;
use thiserror::Error;

/// Errors raised by the loader, resolver, and instantiation engine.
///
/// Nothing is recovered locally; every error surfaces to the caller. A node
/// left in the `Instantiating` state after a failure is not reused.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Ill-formed source, propagated from the parser.
    #[error("Syntax error")]
    #[diagnostic(
        code(ruminate::parse_error),
        help("Check the {syntax} near the highlighted location", syntax = "Modelica syntax".cyan())
    )]
    Parse {
        /// The source being parsed.
        #[source_code]
        src: String,
        /// Location of the offending token.
        #[label("{message}")]
        span: SourceSpan,
        /// Message from the parser.
        message: String,
    },

    /// Unreadable path or unknown directory entry.
    #[error("File system error on {path}: {message}")]
    #[diagnostic(code(ruminate::file_system_error))]
    FileSystem { path: String, message: String },

    /// A type specifier or component reference resolved to nothing.
    #[error("Name {name} not found in scope {scope}", name = .name.cyan().bold(), scope = .scope.yellow())]
    #[diagnostic(
        code(ruminate::name_not_found),
        help("Check for typos or a missing import")
    )]
    NameNotFound { name: String, scope: String },

    /// A resolved element was not the expected instance variant.
    #[error("Type mismatch for {name}: expected {expected}, found {found}", name = .name.cyan().bold())]
    #[diagnostic(code(ruminate::type_mismatch))]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: String,
    },

    /// `instantiate()` re-entered on a node that is still instantiating.
    #[error("Cyclic instantiation of {name}", name = .name.cyan().bold())]
    #[diagnostic(
        code(ruminate::cyclic_instantiation),
        help("Modelica classes must be acyclic through extends clauses and component types")
    )]
    CyclicInstantiation { name: String },

    /// A node factory received a record whose `@type` tag does not match.
    #[error("Invalid node with tag {tag}: {message}", tag = .tag.cyan())]
    #[diagnostic(code(ruminate::invalid_node))]
    InvalidNode { tag: String, message: String },
}

impl Error {
    /// Wraps an I/O failure with the path it occurred on.
    pub fn file_system(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::FileSystem {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NameNotFound {
            name: "Q".to_string(),
            scope: "M".to_string(),
        };
        let text = format!("{}", err);
        assert!(text.contains("Q"), "message should name the symbol: {text}");
        assert!(text.contains("not found"));
    }

    #[test]
    fn test_cyclic_display() {
        let err = Error::CyclicInstantiation {
            name: "A".to_string(),
        };
        assert!(format!("{}", err).contains("A"));
    }
}
