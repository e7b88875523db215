//! Per-document page cache with dirty tracking.
//!
//! Edited pages stay open here until the document is saved or closed, so
//! content regeneration runs once per page right before serialization rather
//! than after every edit. Regenerating early corrupts pages that use subset
//! fonts or spacing-sensitive text runs.
//!
//! Every page access goes through a [`PageLease`]. A lease on a page that was
//! not cached owns the page and closes it when dropped, unless it is handed
//! back with [`PageLease::mark_dirty`].

use std::collections::{BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};
use tracing::{debug, trace, warn};

use crate::backend::{DocumentResource, PageResource};
use crate::error::{BridgeError, Result};
use crate::registry::DocumentHandle;

/// A page owned by the cache.
pub struct CachedPage<P> {
    page: P,
    dirty: bool,
}

impl<P> CachedPage<P> {
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Outcome of [`PageCache::flush_and_close`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Dirty pages whose content was regenerated.
    pub regenerated: usize,
    /// Pages whose regeneration failed. Their edits are gone.
    pub failed: Vec<usize>,
    /// Pages closed, dirty or not.
    pub closed: usize,
}

impl FlushReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Slot<'c, P> {
    Cached(&'c mut CachedPage<P>),
    Transient { page: P, cache: &'c mut PageCache<P> },
}

/// Scoped access to one page.
pub struct PageLease<'c, P> {
    handle: DocumentHandle,
    index: usize,
    slot: Slot<'c, P>,
}

impl<P> PageLease<'_, P> {
    /// Whether the page came from the cache rather than a fresh load.
    pub const fn was_cached(&self) -> bool {
        matches!(self.slot, Slot::Cached(_))
    }

    /// Record a successful edit. A transient page moves into the cache.
    pub fn mark_dirty(self) {
        match self.slot {
            Slot::Cached(entry) => entry.dirty = true,
            Slot::Transient { page, cache } => cache.mark_dirty(self.handle, self.index, page),
        }
    }

    /// End the lease without recording an edit. Transient pages close now;
    /// cached pages stay open and untouched.
    pub fn release(self) {
        if !self.was_cached() {
            trace!(handle = %self.handle, page = self.index, "closing transient page");
        }
    }
}

impl<P> Deref for PageLease<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        match &self.slot {
            Slot::Cached(entry) => &entry.page,
            Slot::Transient { page, .. } => page,
        }
    }
}

impl<P> DerefMut for PageLease<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        match &mut self.slot {
            Slot::Cached(entry) => &mut entry.page,
            Slot::Transient { page, .. } => page,
        }
    }
}

/// Document handle → page index → cached page.
///
/// Nothing is ever evicted: an entry leaves only through
/// [`flush_and_close`](Self::flush_and_close), [`discard_all`](Self::discard_all)
/// or [`clear`](Self::clear).
pub struct PageCache<P> {
    documents: HashMap<DocumentHandle, BTreeMap<usize, CachedPage<P>>>,
}

impl<P> PageCache<P> {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
        }
    }

    pub fn contains(&self, handle: DocumentHandle, index: usize) -> bool {
        self.documents
            .get(&handle)
            .is_some_and(|pages| pages.contains_key(&index))
    }

    /// `Some(dirty)` for a cached page, `None` when not cached.
    pub fn is_dirty(&self, handle: DocumentHandle, index: usize) -> Option<bool> {
        self.documents
            .get(&handle)
            .and_then(|pages| pages.get(&index))
            .map(CachedPage::is_dirty)
    }

    /// Cached page indices of `handle` in ascending order.
    pub fn cached_indices(&self, handle: DocumentHandle) -> Vec<usize> {
        self.documents
            .get(&handle)
            .map(|pages| pages.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Total cached pages across all documents.
    pub fn len(&self) -> usize {
        self.documents.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow page `index` of `handle`, loading it from `document` on a miss.
    /// Load errors propagate and leave the cache untouched.
    pub fn acquire<D>(
        &mut self,
        handle: DocumentHandle,
        index: usize,
        document: &D,
    ) -> Result<PageLease<'_, P>>
    where
        D: DocumentResource<Page = P>,
    {
        if !self.contains(handle, index) {
            let page = document.load_page(index)?;
            trace!(%handle, page = index, "page cache miss");
            return Ok(PageLease {
                handle,
                index,
                slot: Slot::Transient { page, cache: self },
            });
        }

        let entry = self
            .documents
            .get_mut(&handle)
            .and_then(|pages| pages.get_mut(&index))
            .ok_or_else(|| BridgeError::state(format!("page {index} missing from cache")))?;
        trace!(%handle, page = index, "page cache hit");
        Ok(PageLease {
            handle,
            index,
            slot: Slot::Cached(entry),
        })
    }

    /// Store `page` as dirty, taking ownership. A different page already cached
    /// at the same position is closed.
    pub fn mark_dirty(&mut self, handle: DocumentHandle, index: usize, page: P) {
        let previous = self
            .documents
            .entry(handle)
            .or_default()
            .insert(index, CachedPage { page, dirty: true });
        if previous.is_some() {
            warn!(%handle, page = index, "overwrote cached page, closing the previous one");
        }
    }

    /// Close every cached page of `handle` without regenerating. Returns the
    /// number of pages closed.
    pub fn discard_all(&mut self, handle: DocumentHandle) -> usize {
        let closed = self.documents.remove(&handle).map_or(0, |pages| pages.len());
        if closed > 0 {
            debug!(%handle, closed, "discarded cached pages");
        }
        closed
    }

    /// Drop every cached page of every document.
    pub fn clear(&mut self) -> usize {
        let closed = self.len();
        self.documents.clear();
        closed
    }
}

impl<P: PageResource> PageCache<P> {
    /// Regenerate every dirty page of `handle`, then close and uncache all of
    /// its pages. A failed regeneration is recorded and the flush continues.
    pub fn flush_and_close(&mut self, handle: DocumentHandle) -> FlushReport {
        let mut report = FlushReport::default();
        let Some(pages) = self.documents.remove(&handle) else {
            return report;
        };

        for (index, mut entry) in pages {
            if entry.dirty {
                match entry.page.regenerate_content() {
                    Ok(()) => {
                        entry.dirty = false;
                        report.regenerated += 1;
                    }
                    Err(e) => {
                        warn!(%handle, page = index, "content regeneration failed: {e}");
                        report.failed.push(index);
                    }
                }
            }
            drop(entry);
            report.closed += 1;
        }

        if !report.all_succeeded() {
            warn!(
                %handle,
                pages = ?report.failed,
                "edits on these pages were closed without regeneration and are lost"
            );
        }
        debug!(
            %handle,
            regenerated = report.regenerated,
            closed = report.closed,
            "flushed page cache"
        );
        report
    }
}

impl<P> Default for PageCache<P> {
    fn default() -> Self {
        Self::new()
    }
}
