use std::fmt::Write as _;
use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, SearchOutcome};
use crate::domain::PaperRecord;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_search(outcome: &SearchOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub fn render_digest(papers: &[PaperRecord]) -> String {
    let mut out = String::new();
    for paper in papers {
        let authors = if paper.authors.is_empty() {
            "No authors listed".to_string()
        } else {
            paper.authors_line()
        };
        let abstract_text = if paper.abstract_text.is_empty() {
            "No abstract available."
        } else {
            paper.abstract_text.as_str()
        };
        let _ = writeln!(out, "# {}", paper.title);
        let _ = writeln!(out, "## {authors}");
        let _ = writeln!(out, "### {}\n", paper.url);
        let _ = writeln!(out, "{abstract_text}\n---");
    }
    out
}
