use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::RecordCache;
use crate::config::Settings;
use crate::domain::{PaperRecord, Query};
use crate::error::KiraError;
use crate::eutils::PubmedClient;
use crate::resolver::{AbstractResolver, CACHE_HIT_DELAY, NETWORK_DELAY};
use crate::summarize::{CompletionClient, SummaryDispatcher, Synthesis, has_valid_credential};

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: u32,
    pub prompt: String,
    pub model: String,
    pub api_key: Option<String>,
    pub summarize: bool,
}

impl SearchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            limit: settings.retmax,
            prompt: settings.prompt.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key(),
            summarize: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    NoResults { query: String },
    Found(SearchResult),
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub papers: Vec<PaperRecord>,
    pub cache_hits: usize,
    pub synthesis: SynthesisReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SynthesisReport {
    Skipped,
    NoCredential,
    Completed { text: String },
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Search,
    Summaries,
    Abstracts,
    Synthesis,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Search => "search",
            Phase::Summaries => "summaries",
            Phase::Abstracts => "abstracts",
            Phase::Synthesis => "synthesis",
            Phase::Done => "done",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub done: usize,
    pub total: usize,
    pub message: String,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: PubmedClient, L: CompletionClient> {
    pubmed: C,
    completion: L,
    network_delay: Duration,
    cache_hit_delay: Duration,
}

impl<C: PubmedClient, L: CompletionClient> App<C, L> {
    pub fn new(pubmed: C, completion: L) -> Self {
        Self {
            pubmed,
            completion,
            network_delay: NETWORK_DELAY,
            cache_hit_delay: CACHE_HIT_DELAY,
        }
    }

    pub fn with_pacing(mut self, network_delay: Duration, cache_hit_delay: Duration) -> Self {
        self.network_delay = network_delay;
        self.cache_hit_delay = cache_hit_delay;
        self
    }

    pub fn pubmed(&self) -> &C {
        &self.pubmed
    }

    pub fn completion(&self) -> &L {
        &self.completion
    }

    pub async fn search(
        &self,
        query: &Query,
        options: &SearchOptions,
        cache: &mut RecordCache,
        sink: &dyn ProgressSink,
    ) -> Result<SearchOutcome, KiraError> {
        sink.event(ProgressEvent {
            phase: Phase::Search,
            done: 0,
            total: 0,
            message: format!("Searching for \"{query}\"..."),
        });
        let ids = self.pubmed.search(query, options.limit).await?;
        if ids.is_empty() {
            info!(%query, "no papers found");
            return Ok(SearchOutcome::NoResults {
                query: query.to_string(),
            });
        }

        sink.event(ProgressEvent {
            phase: Phase::Summaries,
            done: 0,
            total: ids.len(),
            message: format!("Fetching summaries for {} papers", ids.len()),
        });
        let summaries = self.pubmed.fetch_summaries(&ids).await?;

        let cache_hits = ids.iter().filter(|id| cache.get(id).is_some()).count();
        let papers = AbstractResolver::new(&self.pubmed)
            .with_delays(self.network_delay, self.cache_hit_delay)
            .resolve(&ids, &summaries, cache, sink)
            .await;

        let synthesis = if !options.summarize {
            SynthesisReport::Skipped
        } else {
            if has_valid_credential(options.api_key.as_deref()) {
                sink.event(ProgressEvent {
                    phase: Phase::Synthesis,
                    done: papers.len(),
                    total: papers.len(),
                    message: "Sending to OpenAI for summarization...".to_string(),
                });
            }
            let dispatcher = SummaryDispatcher::new(&self.completion, options.model.clone());
            match dispatcher
                .summarize(query, &papers, &options.prompt, options.api_key.as_deref())
                .await
            {
                Ok(Synthesis::Completed(text)) => SynthesisReport::Completed { text },
                Ok(Synthesis::NoCredential) => SynthesisReport::NoCredential,
                Err(err) => {
                    warn!(%err, "synthesis failed");
                    SynthesisReport::Failed {
                        message: err.to_string(),
                    }
                }
            }
        };

        sink.event(ProgressEvent {
            phase: Phase::Done,
            done: papers.len(),
            total: papers.len(),
            message: "done".to_string(),
        });

        Ok(SearchOutcome::Found(SearchResult {
            query: query.to_string(),
            papers,
            cache_hits,
            synthesis,
        }))
    }
}
