use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::domain::{DetailRecord, Pmid, Query, SummaryRecord};
use crate::error::KiraError;

pub const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

#[async_trait]
pub trait PubmedClient: Send + Sync {
    async fn search(&self, query: &Query, limit: u32) -> Result<Vec<Pmid>, KiraError>;

    async fn fetch_summaries(
        &self,
        ids: &[Pmid],
    ) -> Result<HashMap<Pmid, SummaryRecord>, KiraError>;

    async fn fetch_detail(&self, id: &Pmid) -> Result<DetailRecord, KiraError>;
}

#[derive(Clone)]
pub struct EutilsHttpClient {
    client: Client,
    base_url: String,
    detail_proxy: Option<String>,
    api_key: Option<String>,
}

impl EutilsHttpClient {
    pub fn new(detail_proxy: Option<String>) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-papers/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::SearchHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| KiraError::SearchHttp(err.to_string()))?;

        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            client,
            base_url: EUTILS_BASE_URL.to_string(),
            detail_proxy,
            api_key,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, tool: &str) -> String {
        format!("{}/{tool}.fcgi", self.base_url.trim_end_matches('/'))
    }

    fn with_api_key<'a>(&'a self, mut params: Vec<(&'a str, String)>) -> Vec<(&'a str, String)> {
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// efetch URL, prefixed verbatim by the proxy when one is configured.
    pub fn detail_url(&self, id: &Pmid) -> Result<String, KiraError> {
        let params = self.with_api_key(vec![
            ("db", "pubmed".to_string()),
            ("id", id.as_str().to_string()),
            ("retmode", "xml".to_string()),
        ]);
        let url = Url::parse_with_params(&self.endpoint("efetch"), &params)
            .map_err(|err| KiraError::DetailHttp(err.to_string()))?;
        Ok(match &self.detail_proxy {
            Some(proxy) => format!("{proxy}{url}"),
            None => url.to_string(),
        })
    }
}

#[async_trait]
impl PubmedClient for EutilsHttpClient {
    #[instrument(skip(self), fields(query = %query))]
    async fn search(&self, query: &Query, limit: u32) -> Result<Vec<Pmid>, KiraError> {
        let params = self.with_api_key(vec![
            ("db", "pubmed".to_string()),
            ("term", query.as_str().to_string()),
            ("retmax", limit.to_string()),
            ("sort", "pub date".to_string()),
            ("retmode", "json".to_string()),
        ]);
        let response = self
            .client
            .get(self.endpoint("esearch"))
            .query(&params)
            .send()
            .await
            .map_err(|err| KiraError::SearchHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "PubMed search failed".to_string());
            return Err(KiraError::SearchStatus { status, message });
        }
        let body = response
            .text()
            .await
            .map_err(|err| KiraError::SearchHttp(err.to_string()))?;
        let ids = parse_search_response(&body)?;
        debug!(count = ids.len(), "esearch returned identifiers");
        Ok(ids)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn fetch_summaries(
        &self,
        ids: &[Pmid],
    ) -> Result<HashMap<Pmid, SummaryRecord>, KiraError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = ids
            .iter()
            .map(Pmid::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let params = self.with_api_key(vec![
            ("db", "pubmed".to_string()),
            ("id", joined),
            ("retmode", "json".to_string()),
        ]);
        let response = self
            .client
            .get(self.endpoint("esummary"))
            .query(&params)
            .send()
            .await
            .map_err(|err| KiraError::SummaryHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "PubMed summary failed".to_string());
            return Err(KiraError::SummaryStatus { status, message });
        }
        let body = response
            .text()
            .await
            .map_err(|err| KiraError::SummaryHttp(err.to_string()))?;
        parse_summary_response(&body)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn fetch_detail(&self, id: &Pmid) -> Result<DetailRecord, KiraError> {
        let url = self.detail_url(id)?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| KiraError::DetailHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "PubMed efetch failed".to_string());
            return Err(KiraError::DetailStatus { status, message });
        }
        let body = response
            .text()
            .await
            .map_err(|err| KiraError::DetailHttp(err.to_string()))?;
        parse_detail_xml(&body)
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    esearchresult: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(default, rename = "ERROR")]
    error: Option<String>,
}

pub fn parse_search_response(body: &str) -> Result<Vec<Pmid>, KiraError> {
    let envelope: SearchEnvelope =
        serde_json::from_str(body).map_err(|err| KiraError::SearchParse(err.to_string()))?;
    let Some(result) = envelope.esearchresult else {
        return Ok(Vec::new());
    };
    if let Some(error) = result.error.filter(|_| result.idlist.is_empty()) {
        return Err(KiraError::SearchParse(error));
    }
    result
        .idlist
        .iter()
        .map(|id| id.parse::<Pmid>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| KiraError::SearchParse(err.to_string()))
}

pub fn parse_summary_response(body: &str) -> Result<HashMap<Pmid, SummaryRecord>, KiraError> {
    let value: Value =
        serde_json::from_str(body).map_err(|err| KiraError::SummaryParse(err.to_string()))?;
    let result = value
        .get("result")
        .and_then(Value::as_object)
        .ok_or_else(|| KiraError::SummaryParse("missing result object".to_string()))?;

    let mut summaries = HashMap::new();
    for (key, entry) in result {
        if key == "uids" || entry.get("error").is_some() {
            continue;
        }
        let Some(entry) = entry.as_object() else {
            continue;
        };
        let Ok(id) = key.parse::<Pmid>() else {
            continue;
        };
        let text = |field: &str| {
            entry
                .get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .filter(|value| !value.trim().is_empty())
        };
        let authors = entry
            .get("authors")
            .and_then(Value::as_array)
            .map(|authors| {
                authors
                    .iter()
                    .filter_map(|author| author.get("name").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        summaries.insert(
            id,
            SummaryRecord {
                title: text("title").unwrap_or_default(),
                authors,
                sort_date: text("sortpubdate"),
                pub_date: text("pubdate"),
                epub_date: text("epubdate"),
            },
        );
    }
    Ok(summaries)
}

pub fn parse_detail_xml(xml: &str) -> Result<DetailRecord, KiraError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut detail = DetailRecord::default();

    let mut abstract_depth: Option<usize> = None;
    let mut abstract_done = false;
    let mut abstract_text = String::new();
    let mut fore_name = String::new();
    let mut last_name = String::new();
    let mut date = PubDateParts::default();
    let mut date_done = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| KiraError::DetailParse(err.to_string()))?;
        match event {
            Event::Start(start) => {
                let name = start.name().as_ref().to_vec();
                let parent = stack.last().map(Vec::as_slice);
                match (name.as_slice(), parent) {
                    (b"AbstractText", Some(b"Abstract"))
                        if !abstract_done && abstract_depth.is_none() =>
                    {
                        abstract_depth = Some(stack.len() + 1);
                    }
                    (b"Author", Some(b"AuthorList")) => {
                        fore_name.clear();
                        last_name.clear();
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Event::End(_) => {
                let Some(name) = stack.pop() else {
                    continue;
                };
                let parent = stack.last().map(Vec::as_slice);
                if abstract_depth == Some(stack.len() + 1) {
                    abstract_depth = None;
                    abstract_done = true;
                }
                match (name.as_slice(), parent) {
                    (b"Author", Some(b"AuthorList")) => {
                        let full = format!("{} {}", fore_name.trim(), last_name.trim());
                        let full = full.trim();
                        if !full.is_empty() {
                            detail.authors.push(full.to_string());
                        }
                    }
                    (b"PubDate", _) => date_done = true,
                    _ => {}
                }
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|err| KiraError::DetailParse(err.to_string()))?;
                collect_text(
                    &stack,
                    &value,
                    abstract_depth.is_some(),
                    &mut abstract_text,
                    &mut fore_name,
                    &mut last_name,
                    if date_done { None } else { Some(&mut date) },
                );
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                collect_text(
                    &stack,
                    &value,
                    abstract_depth.is_some(),
                    &mut abstract_text,
                    &mut fore_name,
                    &mut last_name,
                    if date_done { None } else { Some(&mut date) },
                );
            }
            Event::Eof => break,
            _ => {}
        }
    }

    detail.abstract_text = abstract_text.trim().to_string();
    detail.pub_date = date.render();
    Ok(detail)
}

fn collect_text(
    stack: &[Vec<u8>],
    value: &str,
    in_abstract: bool,
    abstract_text: &mut String,
    fore_name: &mut String,
    last_name: &mut String,
    date: Option<&mut PubDateParts>,
) {
    if in_abstract {
        abstract_text.push_str(value);
        return;
    }
    let (Some(current), Some(parent)) = (
        stack.last().map(Vec::as_slice),
        stack.len().checked_sub(2).map(|idx| stack[idx].as_slice()),
    ) else {
        return;
    };
    match (parent, current) {
        (b"Author", b"ForeName") => fore_name.push_str(value),
        (b"Author", b"LastName") => last_name.push_str(value),
        (b"PubDate", field) => {
            if let Some(date) = date {
                date.set(field, value.trim());
            }
        }
        _ => {}
    }
}

#[derive(Debug, Default)]
struct PubDateParts {
    year: Option<String>,
    month: Option<String>,
    day: Option<String>,
    medline: Option<String>,
}

impl PubDateParts {
    fn set(&mut self, field: &[u8], value: &str) {
        if value.is_empty() {
            return;
        }
        match field {
            b"Year" => self.year = Some(value.to_string()),
            b"Month" => self.month = Some(month_number(value)),
            b"Day" => self.day = Some(format!("{value:0>2}")),
            b"MedlineDate" => self.medline = Some(value.to_string()),
            _ => {}
        }
    }

    fn render(self) -> Option<String> {
        let Some(year) = self.year else {
            return self.medline;
        };
        let mut parts = vec![year];
        if let Some(month) = self.month {
            parts.push(month);
            if let Some(day) = self.day {
                parts.push(day);
            }
        }
        Some(parts.join("/"))
    }
}

fn month_number(value: &str) -> String {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = value.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|month| lower.starts_with(month))
        .map(|idx| format!("{:02}", idx + 1))
        .unwrap_or_else(|| format!("{value:0>2}"))
}
