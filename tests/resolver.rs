use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use kira_papers::app::{ProgressEvent, ProgressSink};
use kira_papers::cache::{DEFAULT_CAPACITY, RecordCache};
use kira_papers::domain::{DetailRecord, PaperRecord, Pmid, Query, SummaryRecord};
use kira_papers::error::KiraError;
use kira_papers::eutils::PubmedClient;
use kira_papers::resolver::{AbstractResolver, NETWORK_DELAY};

#[derive(Default)]
struct MockPubmed {
    details: HashMap<Pmid, DetailRecord>,
    calls: Mutex<Vec<(Pmid, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockPubmed {
    fn with_details(entries: &[(&str, &str)]) -> Self {
        let details = entries
            .iter()
            .map(|(id, text)| {
                (
                    pmid(id),
                    DetailRecord {
                        abstract_text: text.to_string(),
                        authors: vec![format!("Author {id}")],
                        pub_date: None,
                    },
                )
            })
            .collect();
        Self {
            details,
            ..Self::default()
        }
    }

    fn called_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.to_string())
            .collect()
    }
}

#[async_trait]
impl PubmedClient for MockPubmed {
    async fn search(&self, _query: &Query, _limit: u32) -> Result<Vec<Pmid>, KiraError> {
        Err(KiraError::SearchHttp("not used".to_string()))
    }

    async fn fetch_summaries(
        &self,
        _ids: &[Pmid],
    ) -> Result<HashMap<Pmid, SummaryRecord>, KiraError> {
        Err(KiraError::SummaryHttp("not used".to_string()))
    }

    async fn fetch_detail(&self, id: &Pmid) -> Result<DetailRecord, KiraError> {
        self.calls.lock().unwrap().push((id.clone(), Instant::now()));
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(120)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.details
            .get(id)
            .cloned()
            .ok_or_else(|| KiraError::DetailHttp("connection reset".to_string()))
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(usize, usize)>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push((event.done, event.total));
    }
}

fn pmid(id: &str) -> Pmid {
    id.parse().unwrap()
}

fn summaries(entries: &[(&str, &str, &str)]) -> HashMap<Pmid, SummaryRecord> {
    entries
        .iter()
        .map(|(id, title, date)| {
            (
                pmid(id),
                SummaryRecord {
                    title: title.to_string(),
                    authors: String::new(),
                    sort_date: Some(date.to_string()).filter(|date| !date.is_empty()),
                    pub_date: None,
                    epub_date: None,
                },
            )
        })
        .collect()
}

fn ids(values: &[&str]) -> Vec<Pmid> {
    values.iter().map(|id| pmid(id)).collect()
}

fn order(papers: &[PaperRecord]) -> Vec<String> {
    papers.iter().map(|paper| paper.id.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn resolves_every_identifier_sorted_by_date() {
    let client = MockPubmed::with_details(&[("111", "a"), ("222", "b"), ("333", "c")]);
    let metadata = summaries(&[
        ("111", "Oldest", "2022/01/01 00:00"),
        ("222", "Newest", "2024/06/01 00:00"),
        ("333", "Middle", "2023/03/15 00:00"),
    ]);
    let mut cache = RecordCache::new(DEFAULT_CAPACITY);
    let sink = RecordingSink::default();

    let papers = AbstractResolver::new(&client)
        .resolve(&ids(&["111", "222", "333"]), &metadata, &mut cache, &sink)
        .await;

    assert_eq!(order(&papers), vec!["222", "333", "111"]);
    assert_eq!(papers[0].title, "Newest");
    assert_eq!(papers[0].abstract_text, "b");
    assert_eq!(papers[0].authors, vec!["Author 222"]);
    assert_eq!(client.called_ids(), vec!["111", "222", "333"]);
    assert_eq!(cache.len(), 3);
    assert_eq!(
        *sink.events.lock().unwrap(),
        vec![(0, 3), (1, 3), (2, 3), (3, 3)]
    );
}

#[tokio::test(start_paused = true)]
async fn detail_fetches_are_paced_and_never_overlap() {
    let client = MockPubmed::with_details(&[("1", "a"), ("2", "b"), ("3", "c")]);
    let metadata = summaries(&[("1", "a", ""), ("2", "b", ""), ("3", "c", "")]);
    let mut cache = RecordCache::new(DEFAULT_CAPACITY);

    AbstractResolver::new(&client)
        .resolve(&ids(&["1", "2", "3"]), &metadata, &mut cache, &RecordingSink::default())
        .await;

    let calls = client.calls.lock().unwrap();
    for pair in calls.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= NETWORK_DELAY);
    }
    assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn pacing_applies_after_failures() {
    let client = MockPubmed::with_details(&[("2", "b")]);
    let metadata = summaries(&[("1", "a", ""), ("2", "b", "")]);
    let mut cache = RecordCache::new(DEFAULT_CAPACITY);

    AbstractResolver::new(&client)
        .resolve(&ids(&["1", "2"]), &metadata, &mut cache, &RecordingSink::default())
        .await;

    let calls = client.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].1 - calls[0].1 >= NETWORK_DELAY);
}

#[tokio::test(start_paused = true)]
async fn cached_identifier_skips_network() {
    let client = MockPubmed::with_details(&[("111", "fresh"), ("444", "d")]);
    let metadata = summaries(&[
        ("111", "Cached title", "2024/01/01 00:00"),
        ("444", "New", "2024/02/01 00:00"),
    ]);
    let mut cache = RecordCache::new(DEFAULT_CAPACITY);
    let cached = PaperRecord {
        id: pmid("111"),
        title: "Cached title".to_string(),
        authors: vec!["Old Author".to_string()],
        url: pmid("111").url(),
        abstract_text: "from cache".to_string(),
        pub_date: "2024/01/01".to_string(),
        retrieved_at: "2026-01-01T00:00:00Z".to_string(),
    };
    cache.put_all(std::slice::from_ref(&cached));

    let papers = AbstractResolver::new(&client)
        .resolve(&ids(&["111", "444"]), &metadata, &mut cache, &RecordingSink::default())
        .await;

    assert_eq!(client.called_ids(), vec!["444"]);
    let reused = papers.iter().find(|paper| paper.id == pmid("111")).unwrap();
    assert_eq!(reused, &cached);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_degrades_single_record() {
    let client = MockPubmed::with_details(&[("1", "first"), ("3", "third")]);
    let metadata = summaries(&[
        ("1", "One", "2024/03/01 00:00"),
        ("2", "Two", "2024/02/01 00:00"),
        ("3", "Three", "2024/01/01 00:00"),
    ]);
    let mut cache = RecordCache::new(DEFAULT_CAPACITY);

    let papers = AbstractResolver::new(&client)
        .resolve(&ids(&["1", "2", "3"]), &metadata, &mut cache, &RecordingSink::default())
        .await;

    assert_eq!(papers.len(), 3);
    assert_eq!(client.called_ids(), vec!["1", "2", "3"]);
    let degraded = &papers[1];
    assert_eq!(degraded.id, pmid("2"));
    assert_eq!(degraded.title, "Two");
    assert_eq!(degraded.pub_date, "2024/02/01");
    assert!(degraded.abstract_text.is_empty());
    assert!(degraded.authors.is_empty());
    assert_eq!(papers[2].abstract_text, "third");
}

#[tokio::test(start_paused = true)]
async fn empty_dates_sort_last_and_ties_keep_resolution_order() {
    let client = MockPubmed::with_details(&[("a", "."), ("b", "."), ("c", "."), ("d", ".")]);
    let metadata = summaries(&[
        ("a", "undated", ""),
        ("b", "tie-1", "2024/05/05 00:00"),
        ("c", "tie-2", "2024/05/05 00:00"),
        ("d", "older", "2020/01/01 00:00"),
    ]);
    let mut cache = RecordCache::new(DEFAULT_CAPACITY);

    let papers = AbstractResolver::new(&client)
        .resolve(&ids(&["a", "b", "c", "d"]), &metadata, &mut cache, &RecordingSink::default())
        .await;

    assert_eq!(order(&papers), vec!["b", "c", "d", "a"]);
}

#[tokio::test(start_paused = true)]
async fn missing_summary_still_yields_a_record() {
    let client = MockPubmed::with_details(&[("7", "text")]);
    let mut cache = RecordCache::new(DEFAULT_CAPACITY);

    let papers = AbstractResolver::new(&client)
        .resolve(&ids(&["7"]), &HashMap::new(), &mut cache, &RecordingSink::default())
        .await;

    assert_eq!(papers.len(), 1);
    assert_eq!(papers[0].title, "");
    assert_eq!(papers[0].abstract_text, "text");
}
