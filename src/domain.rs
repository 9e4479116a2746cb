use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

const PUBMED_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";

static SORT_DATE_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{4}/\d{2}/\d{2}").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Query {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(KiraError::InvalidQuery(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pmid(String);

impl Pmid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn url(&self) -> String {
        format!("{PUBMED_URL}/{}/", self.0)
    }
}

impl fmt::Display for Pmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Pmid {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| !ch.is_whitespace() && ch != ',');
        if !is_valid {
            return Err(KiraError::InvalidPmid(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub title: String,
    pub authors: String,
    pub sort_date: Option<String>,
    pub pub_date: Option<String>,
    pub epub_date: Option<String>,
}

impl SummaryRecord {
    pub fn best_date(&self) -> Option<String> {
        let sort_date = self.sort_date.as_deref().map(normalize_sort_date);
        [sort_date, self.pub_date.clone(), self.epub_date.clone()]
            .into_iter()
            .flatten()
            .map(|date| date.trim().to_string())
            .find(|date| !date.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailRecord {
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub pub_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub id: Pmid,
    pub title: String,
    pub authors: Vec<String>,
    pub url: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub pub_date: String,
    #[serde(default)]
    pub retrieved_at: String,
}

impl PaperRecord {
    pub fn merge(id: &Pmid, summary: &SummaryRecord, detail: Option<&DetailRecord>) -> Self {
        let pub_date = summary
            .best_date()
            .or_else(|| detail.and_then(|detail| detail.pub_date.clone()))
            .unwrap_or_default();
        let (abstract_text, authors) = match detail {
            Some(detail) => (detail.abstract_text.clone(), detail.authors.clone()),
            None => (String::new(), Vec::new()),
        };
        Self {
            id: id.clone(),
            title: summary.title.clone(),
            authors,
            url: id.url(),
            abstract_text,
            pub_date,
            retrieved_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn authors_line(&self) -> String {
        self.authors.join(", ")
    }
}

fn normalize_sort_date(value: &str) -> String {
    SORT_DATE_PREFIX
        .as_ref()
        .and_then(|re| re.find(value.trim()).map(|m| m.as_str().to_string()))
        .unwrap_or_else(|| value.trim().to_string())
}
