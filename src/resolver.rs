use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::{Phase, ProgressEvent, ProgressSink};
use crate::cache::RecordCache;
use crate::domain::{PaperRecord, Pmid, SummaryRecord};
use crate::eutils::PubmedClient;

pub const NETWORK_DELAY: Duration = Duration::from_millis(500);
pub const CACHE_HIT_DELAY: Duration = Duration::from_millis(10);

/// Resolves abstracts one identifier at a time. Detail fetches are never
/// issued concurrently.
pub struct AbstractResolver<'a, C: PubmedClient + ?Sized> {
    client: &'a C,
    network_delay: Duration,
    cache_hit_delay: Duration,
}

impl<'a, C: PubmedClient + ?Sized> AbstractResolver<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            network_delay: NETWORK_DELAY,
            cache_hit_delay: CACHE_HIT_DELAY,
        }
    }

    pub fn with_delays(mut self, network_delay: Duration, cache_hit_delay: Duration) -> Self {
        self.network_delay = network_delay;
        self.cache_hit_delay = cache_hit_delay;
        self
    }

    pub async fn resolve(
        &self,
        ids: &[Pmid],
        summaries: &HashMap<Pmid, SummaryRecord>,
        cache: &mut RecordCache,
        sink: &dyn ProgressSink,
    ) -> Vec<PaperRecord> {
        let total = ids.len();
        let mut papers = Vec::with_capacity(total);
        let missing = SummaryRecord::default();

        for (i, id) in ids.iter().enumerate() {
            sink.event(ProgressEvent {
                phase: Phase::Abstracts,
                done: i,
                total,
                message: format!("Fetching abstracts: {} / {total}", i + 1),
            });

            if let Some(cached) = cache.get(id) {
                debug!(%id, "abstract served from cache");
                papers.push(cached.clone());
                tokio::time::sleep(self.cache_hit_delay).await;
                continue;
            }

            let summary = summaries.get(id).unwrap_or_else(|| {
                warn!(%id, "no summary metadata for identifier");
                &missing
            });
            let paper = match self.client.fetch_detail(id).await {
                Ok(detail) => PaperRecord::merge(id, summary, Some(&detail)),
                Err(err) => {
                    warn!(%id, %err, "abstract fetch failed, keeping summary metadata only");
                    PaperRecord::merge(id, summary, None)
                }
            };
            papers.push(paper);
            tokio::time::sleep(self.network_delay).await;
        }

        sort_by_date_desc(&mut papers);
        sink.event(ProgressEvent {
            phase: Phase::Abstracts,
            done: total,
            total,
            message: format!("Fetched abstracts: {total} / {total}"),
        });
        cache.put_all(&papers);
        info!(count = papers.len(), cached = cache.len(), "resolved abstracts");
        papers
    }
}

pub fn sort_by_date_desc(papers: &mut [PaperRecord]) {
    papers.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
}
