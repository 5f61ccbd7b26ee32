//! Write-once cache of image descriptors keyed by reference.
//!
//! Entries are never invalidated. Concurrent misses for the same reference
//! may both fetch; the first insert wins and every caller gets that entry.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::descriptor::ImageDescriptor;

/// Concurrent descriptor cache.
#[derive(Debug, Default)]
pub struct ImageConfigCache {
    entries: DashMap<String, Arc<ImageDescriptor>>,
}

impl ImageConfigCache {
    /// Create an empty, independent cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<ImageConfigCache>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::new())))
    }

    pub fn get(&self, reference: &str) -> Option<Arc<ImageDescriptor>> {
        self.entries.get(reference).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert `descriptor` unless an entry already exists, and return the
    /// entry that ends up cached.
    pub fn insert_if_absent(
        &self,
        reference: &str,
        descriptor: ImageDescriptor,
    ) -> Arc<ImageDescriptor> {
        let entry = self
            .entries
            .entry(reference.to_string())
            .or_insert_with(|| Arc::new(descriptor));
        Arc::clone(entry.value())
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.entries.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
