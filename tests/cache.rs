use camino::Utf8PathBuf;

use kira_papers::cache::{DEFAULT_CAPACITY, RecordCache};
use kira_papers::domain::{PaperRecord, Pmid};

fn paper(id: &str, title: &str) -> PaperRecord {
    let pmid: Pmid = id.parse().unwrap();
    PaperRecord {
        url: pmid.url(),
        id: pmid,
        title: title.to_string(),
        authors: vec!["Jane Doe".to_string()],
        abstract_text: format!("abstract of {id}"),
        pub_date: "2024/01/01".to_string(),
        retrieved_at: String::new(),
    }
}

fn ids(cache: &RecordCache) -> Vec<String> {
    cache.iter().map(|paper| paper.id.to_string()).collect()
}

#[test]
fn put_all_then_get() {
    let mut cache = RecordCache::new(DEFAULT_CAPACITY);
    cache.put_all(&[paper("111", "a"), paper("222", "b")]);

    let id: Pmid = "222".parse().unwrap();
    assert_eq!(cache.get(&id).unwrap().title, "b");
    assert!(cache.get(&"333".parse().unwrap()).is_none());
    assert_eq!(cache.len(), 2);
}

#[test]
fn evicts_oldest_beyond_capacity() {
    let mut cache = RecordCache::new(DEFAULT_CAPACITY);
    let first: Vec<_> = (0..40).map(|i| paper(&format!("{i}"), "first")).collect();
    let second: Vec<_> = (40..60).map(|i| paper(&format!("{i}"), "second")).collect();
    cache.put_all(&first);
    cache.put_all(&second);

    assert_eq!(cache.len(), 50);
    for i in 0..10 {
        assert!(cache.get(&format!("{i}").parse().unwrap()).is_none());
    }
    for i in 10..60 {
        assert!(cache.get(&format!("{i}").parse().unwrap()).is_some());
    }
}

#[test]
fn overwrite_keeps_original_insertion_position() {
    let mut cache = RecordCache::new(3);
    cache.put_all(&[paper("1", "old"), paper("2", "b"), paper("3", "c")]);
    cache.put_all(&[paper("1", "new")]);
    assert_eq!(cache.get(&"1".parse().unwrap()).unwrap().title, "new");
    assert_eq!(ids(&cache), vec!["1", "2", "3"]);

    cache.put_all(&[paper("4", "d")]);
    assert_eq!(ids(&cache), vec!["2", "3", "4"]);
}

#[test]
fn reads_do_not_refresh_position() {
    let mut cache = RecordCache::new(2);
    cache.put_all(&[paper("1", "a"), paper("2", "b")]);
    assert!(cache.get(&"1".parse().unwrap()).is_some());
    cache.put_all(&[paper("3", "c")]);
    assert_eq!(ids(&cache), vec!["2", "3"]);
}

#[test]
fn snapshot_round_trips_in_insertion_order() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("cache.json")).unwrap();

    let mut cache = RecordCache::load(&path, DEFAULT_CAPACITY);
    assert!(cache.is_empty());
    cache.put_all(&[paper("900", "z"), paper("100", "a"), paper("500", "m")]);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path.as_std_path()).unwrap()).unwrap();
    assert_eq!(raw["100"]["title"], "a");
    assert_eq!(raw["100"]["abstract"], "abstract of 100");

    let reloaded = RecordCache::load(&path, DEFAULT_CAPACITY);
    assert_eq!(ids(&reloaded), vec!["900", "100", "500"]);
    assert_eq!(reloaded.get(&"500".parse().unwrap()), cache.get(&"500".parse().unwrap()));
}

#[test]
fn oversized_snapshot_is_trimmed_on_load() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("cache.json")).unwrap();
    let mut cache = RecordCache::load(&path, 5);
    cache.put_all(&(0..5).map(|i| paper(&format!("{i}"), "t")).collect::<Vec<_>>());

    let reloaded = RecordCache::load(&path, 3);
    assert_eq!(ids(&reloaded), vec!["2", "3", "4"]);
}

#[test]
fn unreadable_snapshot_starts_empty() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("cache.json")).unwrap();
    std::fs::write(path.as_std_path(), b"not json").unwrap();

    let cache = RecordCache::load(&path, DEFAULT_CAPACITY);
    assert!(cache.is_empty());
}

#[test]
fn clear_persists_empty_snapshot() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("cache.json")).unwrap();
    let mut cache = RecordCache::load(&path, DEFAULT_CAPACITY);
    cache.put_all(&[paper("1", "a")]);
    cache.clear();

    let reloaded = RecordCache::load(&path, DEFAULT_CAPACITY);
    assert!(reloaded.is_empty());
}
