//! Handle registry for open documents.
//!
//! Hosts only ever see a [`DocumentHandle`]; the document resource itself is
//! owned here and dropped (closed) when its handle is removed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{BridgeError, Result};

/// Opaque integer identifying an open document to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentHandle(i32);

impl DocumentHandle {
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Statistics for registry tracking
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Total handles ever issued
    pub total_created: u64,
    /// Total handles removed
    pub total_destroyed: u64,
    /// Peak concurrent documents
    pub peak_count: usize,
}

/// Maps handles to open documents.
///
/// Handles are issued from a monotonically increasing counter starting at 1
/// and are never recycled.
pub struct ResourceRegistry<D> {
    documents: HashMap<DocumentHandle, D>,
    next_handle: i32,
    stats: RegistryStats,
}

impl<D> ResourceRegistry<D> {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            next_handle: 1,
            stats: RegistryStats::default(),
        }
    }

    /// Take ownership of `document` and return its new handle.
    #[must_use = "handle must be stored and later passed to remove() to avoid resource leaks"]
    pub fn insert(&mut self, document: D) -> Result<DocumentHandle> {
        let handle = DocumentHandle(self.next_handle);
        self.next_handle = self
            .next_handle
            .checked_add(1)
            .ok_or_else(|| BridgeError::state("document handle space exhausted"))?;
        self.documents.insert(handle, document);

        self.stats.total_created += 1;
        self.stats.peak_count = self.stats.peak_count.max(self.documents.len());

        Ok(handle)
    }

    pub fn get(&self, handle: DocumentHandle) -> Result<&D> {
        self.documents
            .get(&handle)
            .ok_or(BridgeError::NotFound(handle))
    }

    pub fn contains(&self, handle: DocumentHandle) -> bool {
        self.documents.contains_key(&handle)
    }

    /// Remove a handle and hand back its document. Dropping the returned value
    /// closes the document.
    pub fn remove(&mut self, handle: DocumentHandle) -> Result<D> {
        let document = self
            .documents
            .remove(&handle)
            .ok_or(BridgeError::NotFound(handle))?;
        self.stats.total_destroyed += 1;
        Ok(document)
    }

    /// Remove every document, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.documents.len();
        self.documents.clear();
        self.stats.total_destroyed += count as u64;
        count
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Live handles in ascending order.
    pub fn handles(&self) -> Vec<DocumentHandle> {
        let mut handles: Vec<_> = self.documents.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    pub const fn stats(&self) -> RegistryStats {
        self.stats
    }
}

impl<D> Default for ResourceRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}
