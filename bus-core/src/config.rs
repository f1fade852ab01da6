//! Construction-time tuning knobs for a [`crate::Bus`] (see `SPEC_FULL.md`
//! §10). Builder pattern, matching the teacher's loader-config style in
//! `asset-manager`.

/// Defaults chosen for a small-to-medium embedded bus: a handful of
/// workers, a queue deep enough to absorb a burst without the free-list
/// ever needing to grow, and a symmetric free-list.
const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 4096;
const DEFAULT_FREE_LIST_SIZE: usize = 4096;

/// Configuration for the asynchronous dispatch path (spec §4.5).
#[derive(Debug, Clone)]
pub struct BusConfig {
    worker_count: usize,
    queue_capacity: usize,
    free_list_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            free_list_size: DEFAULT_FREE_LIST_SIZE,
        }
    }
}

impl BusConfig {
    pub fn builder() -> BusConfigBuilder {
        BusConfigBuilder::default()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn free_list_size(&self) -> usize {
        self.free_list_size
    }
}

#[derive(Debug, Default)]
pub struct BusConfigBuilder {
    worker_count: Option<usize>,
    queue_capacity: Option<usize>,
    free_list_size: Option<usize>,
}

impl BusConfigBuilder {
    /// Number of worker threads draining the asynchronous dispatch queue.
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Capacity of the bounded asynchronous dispatch queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Size of the pooled `MessageHolder` free-list.
    pub fn free_list_size(mut self, size: usize) -> Self {
        self.free_list_size = Some(size);
        self
    }

    pub fn build(self) -> BusConfig {
        let defaults = BusConfig::default();
        BusConfig {
            worker_count: self.worker_count.unwrap_or(defaults.worker_count).max(1),
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity).max(1),
            free_list_size: self.free_list_size.unwrap_or(defaults.free_list_size).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_configuration() {
        let cfg = BusConfig::default();
        assert_eq!(cfg.worker_count(), DEFAULT_WORKER_COUNT);
        assert_eq!(cfg.queue_capacity(), DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn builder_overrides_are_floored_at_one() {
        let cfg = BusConfig::builder().worker_count(0).queue_capacity(0).build();
        assert_eq!(cfg.worker_count(), 1);
        assert_eq!(cfg.queue_capacity(), 1);
    }

    #[test]
    fn builder_applies_overrides() {
        let cfg = BusConfig::builder().worker_count(8).queue_capacity(128).free_list_size(64).build();
        assert_eq!(cfg.worker_count(), 8);
        assert_eq!(cfg.queue_capacity(), 128);
        assert_eq!(cfg.free_list_size(), 64);
    }
}
