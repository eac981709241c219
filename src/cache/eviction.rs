//! Eviction policies applied when the storage medium reports its quota is full

/// What a policy knows about one stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub key: String,
    /// Milliseconds since the epoch; corrupted entries report 0.
    pub stored_at: i64,
}

/// Chooses which entries to drop to make room.
pub trait EvictionStrategy: Send + Sync {
    /// Keys to remove, given every entry under the cache namespace.
    fn select(&self, entries: &[EntryMeta]) -> Vec<String>;

    fn name(&self) -> &str;
}

/// Drop the oldest `percent` of entries, never fewer than `min`.
#[derive(Debug, Clone, Copy)]
pub struct OldestPercent {
    pub percent: u32,
    pub min: usize,
}

impl Default for OldestPercent {
    fn default() -> Self {
        Self { percent: 20, min: 1 }
    }
}

impl OldestPercent {
    pub fn new(percent: u32) -> Self {
        Self {
            percent: percent.min(100),
            ..Self::default()
        }
    }

    /// How many of `total` entries this policy removes.
    pub fn count_for(&self, total: usize) -> usize {
        let scaled = total.saturating_mul(self.percent as usize);
        let count = scaled.div_ceil(100);
        count.max(self.min).min(total)
    }
}

impl EvictionStrategy for OldestPercent {
    fn select(&self, entries: &[EntryMeta]) -> Vec<String> {
        oldest_keys(entries, self.count_for(entries.len()))
    }

    fn name(&self) -> &str {
        "oldest-percent"
    }
}

/// Drop a fixed number of the oldest entries.
#[derive(Debug, Clone, Copy)]
pub struct OldestCount(pub usize);

impl EvictionStrategy for OldestCount {
    fn select(&self, entries: &[EntryMeta]) -> Vec<String> {
        oldest_keys(entries, self.0.min(entries.len()))
    }

    fn name(&self) -> &str {
        "oldest-count"
    }
}

fn oldest_keys(entries: &[EntryMeta], count: usize) -> Vec<String> {
    let mut sorted: Vec<&EntryMeta> = entries.iter().collect();
    // Ties broken by key so selection is deterministic
    sorted.sort_by(|a, b| a.stored_at.cmp(&b.stored_at).then_with(|| a.key.cmp(&b.key)));
    sorted
        .into_iter()
        .take(count)
        .map(|e| e.key.clone())
        .collect()
}
