use crate::error::Result;
use crate::storage::ObjectSink;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Keeps artifacts in memory. Backs `--dry-run`.
#[derive(Default)]
pub struct MemorySink {
    objects: DashMap<String, String>,
    puts: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.objects.get(key).map(|body| body.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn total_bytes(&self) -> usize {
        self.objects.iter().map(|e| e.value().len()).sum()
    }

    /// Number of `put` calls, overwrites included
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl ObjectSink for MemorySink {
    async fn put(&self, key: &str, body: String) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.insert(key.to_string(), body);
        Ok(())
    }

    fn location(&self) -> String {
        "memory (dry run)".to_string()
    }
}
