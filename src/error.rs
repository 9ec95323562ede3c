//! Typed failures that callers need to tell apart.
//!
//! These travel inside `anyhow::Error` like every other failure in the
//! crate and can be recovered with `err.downcast_ref::<NormalizeError>()`.

use std::path::PathBuf;
use thiserror::Error;

/// The input document could not be read or has the wrong overall shape.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("input metadata JSON not found at: {0}")]
    Missing(PathBuf),
    #[error("failed to read input file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("input is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid input shape: {0}")]
    Shape(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
    #[error("identifier collision: records #{first} and #{second} both normalize to '{id}'")]
    IdCollision {
        id: String,
        first: usize,
        second: usize,
    },
    #[error("no valid records remain ({dropped} dropped)")]
    NoValidRecords { dropped: usize },
}

/// A normalized record violates the tagged-block invariants.
#[derive(Error, Debug, PartialEq)]
pub enum BuildError {
    #[error("record '{id}': {field} is empty")]
    EmptyField { id: String, field: &'static str },
    #[error("record '{id}': {field} contains tag syntax ({found:?})")]
    TagSyntax {
        id: String,
        field: &'static str,
        found: char,
    },
    #[error("record '{id}': text contains a delimiter line")]
    DelimiterInText { id: String },
    #[error("record '{id}': main concept '{main_concept}' missing from concepts")]
    MainConceptMissing { id: String, main_concept: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum BlockParseError {
    #[error("block is empty")]
    Empty,
    #[error("missing [{0}: ...] tag")]
    MissingTag(&'static str),
    #[error("block '{id}' has no question text")]
    EmptyText { id: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum RetrievalError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
