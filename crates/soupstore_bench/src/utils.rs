//! Benchmark utilities.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use soupstore_core::{IndexSpec, IndexType, SmartStore};
use std::path::Path;

/// Soup every benchmark store registers.
pub const BENCH_SOUP: &str = "bench";

/// Index specs of the benchmark soup.
pub fn bench_specs() -> Vec<IndexSpec> {
    vec![
        IndexSpec::new("key", IndexType::String),
        IndexSpec::new("rank", IndexType::Integer),
        IndexSpec::new("body", IndexType::FullText),
        IndexSpec::new("meta.group", IndexType::Json),
    ]
}

/// Generate a random alphanumeric word.
pub fn random_word(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a document whose body holds roughly `body_len` characters.
pub fn random_document(rank: i64, body_len: usize) -> Value {
    let mut rng = rand::thread_rng();
    let words: Vec<String> = (0..body_len / 8).map(|_| random_word(7)).collect();
    json!({
        "key": random_word(12),
        "rank": rank,
        "body": words.join(" "),
        "meta": {"group": rng.gen_range(0..16)},
    })
}

/// Open an in-memory store with the benchmark soup holding `count`
/// documents.
pub fn populated_store(count: usize) -> SmartStore {
    let store = SmartStore::open_in_memory().expect("Failed to open store");
    store
        .register_soup(BENCH_SOUP, &bench_specs())
        .expect("Failed to register soup");
    for rank in 0..count {
        store
            .create(BENCH_SOUP, random_document(rank as i64, 128))
            .expect("Failed to create entry");
    }
    store
}

/// Open a file-backed store at `path` with the benchmark soup registered.
pub fn file_store(path: &Path) -> SmartStore {
    let store = SmartStore::open(path).expect("Failed to open store");
    store
        .register_soup(BENCH_SOUP, &bench_specs())
        .expect("Failed to register soup");
    store
}
