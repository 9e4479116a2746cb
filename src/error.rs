use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid search topic: {0:?}")]
    #[diagnostic(help("enter a non-empty topic, e.g. `kira-papers search CRISPR gene editing`"))]
    InvalidQuery(String),

    #[error("invalid PubMed identifier: {0:?}")]
    InvalidPmid(String),

    #[error("PubMed search request failed: {0}")]
    SearchHttp(String),

    #[error("PubMed search returned status {status}: {message}")]
    SearchStatus { status: u16, message: String },

    #[error("failed to parse PubMed search response: {0}")]
    SearchParse(String),

    #[error("PubMed summary request failed: {0}")]
    SummaryHttp(String),

    #[error("PubMed summary returned status {status}: {message}")]
    SummaryStatus { status: u16, message: String },

    #[error("failed to parse PubMed summary response: {0}")]
    SummaryParse(String),

    #[error("PubMed abstract request failed: {0}")]
    DetailHttp(String),

    #[error("PubMed abstract returned status {status}: {message}")]
    DetailStatus { status: u16, message: String },

    #[error("failed to parse PubMed abstract XML: {0}")]
    DetailParse(String),

    #[error("completion request failed: {0}")]
    CompletionTransport(String),

    #[error("completion service returned status {status}: {message}")]
    CompletionStatus { status: u16, message: String },

    #[error("completion service returned no summary")]
    EmptyCompletion,

    #[error("failed to read settings file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse settings: {0}")]
    ConfigParse(String),

    #[error("invalid setting {name}: {message}")]
    InvalidSetting { name: &'static str, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
