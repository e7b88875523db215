//! The resource manager hosts talk to.
//!
//! [`PdfBridge`] owns the library, the handle registry and the page cache as
//! one unit. Every operation takes `&mut self`; a host that shares the bridge
//! across threads wraps the whole value in a single mutex.

use bytes::Bytes;
use tracing::debug;

use crate::backend::{DocumentResource, PageOf, PdfLibrary};
use crate::cache::{PageCache, PageLease};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, ErrorKind, Result};
use crate::registry::{DocumentHandle, RegistryStats, ResourceRegistry};
use crate::sink::BufferWriter;

pub struct PdfBridge<L: PdfLibrary> {
    library: L,
    config: BridgeConfig,
    // Declared before `documents` so pages close first on drop.
    pub(crate) pages: PageCache<PageOf<L>>,
    pub(crate) documents: ResourceRegistry<L::Document>,
}

impl<L: PdfLibrary> PdfBridge<L> {
    pub fn new(library: L, config: BridgeConfig) -> Self {
        Self {
            library,
            config,
            pages: PageCache::new(),
            documents: ResourceRegistry::new(),
        }
    }

    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Load a document from memory and register it under a fresh handle.
    pub fn open_document(
        &mut self,
        bytes: Vec<u8>,
        password: Option<&str>,
    ) -> Result<DocumentHandle> {
        let len = bytes.len();
        let document = self
            .library
            .load_document(bytes, password)
            .map_err(|e| e.context("openDocument"))?;
        let pages = document.page_count();
        let handle = self
            .documents
            .insert(document)
            .map_err(|e| e.context("openDocument"))?;
        debug!(%handle, bytes = len, pages, "opened document");
        Ok(handle)
    }

    /// Discard the document's cached pages without regenerating them, then
    /// close the document.
    pub fn close_document(&mut self, handle: DocumentHandle) -> Result<()> {
        if !self.documents.contains(handle) {
            return Err(BridgeError::NotFound(handle));
        }
        let discarded = self.pages.discard_all(handle);
        drop(self.documents.remove(handle)?);
        debug!(%handle, discarded, "closed document");
        Ok(())
    }

    pub fn page_count(&self, handle: DocumentHandle) -> Result<usize> {
        Ok(self.documents.get(handle)?.page_count())
    }

    /// Regenerate and close every cached page of `handle`, then serialize the
    /// whole document.
    ///
    /// When any regeneration fails nothing is serialized. The pages are
    /// closed regardless, so their edits do not survive into a later save.
    pub fn save_document(&mut self, handle: DocumentHandle) -> Result<Bytes> {
        self.try_save(handle).map_err(|e| e.context("saveDocument"))
    }

    fn try_save(&mut self, handle: DocumentHandle) -> Result<Bytes> {
        if !self.documents.contains(handle) {
            return Err(BridgeError::NotFound(handle));
        }

        let report = self.pages.flush_and_close(handle);
        if !report.all_succeeded() {
            return Err(BridgeError::library(format!(
                "content regeneration failed for dirty pages {:?}",
                report.failed
            )));
        }

        let document = self.documents.get(handle)?;
        let mut sink = BufferWriter::new();
        document.save_to(&mut sink)?;
        debug!(
            %handle,
            bytes = sink.len(),
            blocks = sink.blocks(),
            regenerated = report.regenerated,
            "saved document"
        );
        Ok(sink.into_bytes())
    }

    /// Close every cached page, then every document.
    pub fn teardown(&mut self) {
        let pages = self.pages.clear();
        let documents = self.documents.clear();
        if pages > 0 || documents > 0 {
            debug!(pages, documents, "bridge teardown");
        }
    }

    pub fn open_handles(&self) -> Vec<DocumentHandle> {
        self.documents.handles()
    }

    /// Indices of the cached (edited, unsaved) pages of `handle`.
    pub fn cached_pages(&self, handle: DocumentHandle) -> Vec<usize> {
        self.pages.cached_indices(handle)
    }

    pub fn is_page_dirty(&self, handle: DocumentHandle, page_index: usize) -> Option<bool> {
        self.pages.is_dirty(handle, page_index)
    }

    pub const fn registry_stats(&self) -> RegistryStats {
        self.documents.stats()
    }

    /// Check `page_index` against the page count of `handle`.
    pub(crate) fn resolve_page(&self, handle: DocumentHandle, page_index: i32) -> Result<usize> {
        let document = self.documents.get(handle)?;
        checked_index("pageIndex", page_index, document.page_count())
    }

    /// Resolve `handle`, check `page_index` against its page count and lease
    /// the page through the cache.
    pub(crate) fn lease_page(
        &mut self,
        handle: DocumentHandle,
        page_index: i32,
    ) -> Result<PageLease<'_, PageOf<L>>> {
        let index = self.resolve_page(handle, page_index)?;
        let document = self.documents.get(handle)?;
        self.pages
            .acquire(handle, index, document)
            .map_err(|e| match e.kind() {
                ErrorKind::Library => BridgeError::Library {
                    code: e.library_error_code(),
                    message: format!("failed to load page {index}: {e}"),
                },
                _ => e,
            })
    }
}

impl<L: PdfLibrary> Drop for PdfBridge<L> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Convert a host integer into an index below `len`.
pub(crate) fn checked_index(what: &str, value: i32, len: usize) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|&index| index < len)
        .ok_or_else(|| BridgeError::out_of_range(what, value.into(), len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Bounds;
    use crate::backend::memory::{MemoryDocumentSpec, MemoryLibrary, MemoryObject, MemoryPageSpec};

    fn bridge() -> (MemoryLibrary, PdfBridge<MemoryLibrary>) {
        let library = MemoryLibrary::new();
        (library.clone(), PdfBridge::new(library, BridgeConfig::default()))
    }

    fn two_pages() -> Vec<u8> {
        let page = MemoryPageSpec::new(612.0, 792.0)
            .with_object(MemoryObject::text(Bounds::new(72.0, 700.0, 300.0, 720.0), "Title"));
        MemoryDocumentSpec::new()
            .with_page(page.clone())
            .with_page(page)
            .to_bytes()
    }

    #[test]
    fn test_open_and_count() {
        let (_, mut bridge) = bridge();
        let handle = bridge.open_document(two_pages(), None).unwrap();
        assert_eq!(handle.get(), 1);
        assert_eq!(bridge.page_count(handle).unwrap(), 2);
        assert_eq!(bridge.open_handles(), vec![handle]);
    }

    #[test]
    fn test_open_failure_carries_code() {
        let (_, mut bridge) = bridge();
        let err = bridge.open_document(b"garbage".to_vec(), None).unwrap_err();
        assert_eq!(
            err.library_error_code(),
            Some(crate::error::LibraryErrorCode::Format)
        );
        insta::assert_snapshot!(err.to_string(), @"openDocument: Invalid or corrupted PDF format");
        assert!(bridge.open_handles().is_empty());
    }

    #[test]
    fn test_close_then_use_is_not_found() {
        let (library, mut bridge) = bridge();
        let handle = bridge.open_document(two_pages(), None).unwrap();
        bridge.close_document(handle).unwrap();

        assert_eq!(bridge.page_count(handle).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(bridge.save_document(handle).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(bridge.close_document(handle).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(library.stats().open_documents(), 0);
    }

    #[test]
    fn test_lease_page_checks_range() {
        let (_, mut bridge) = bridge();
        let handle = bridge.open_document(two_pages(), None).unwrap();
        let err = bridge.lease_page(handle, 2).err().unwrap();
        assert_eq!(err.to_string(), "pageIndex 2 out of range [0, 1]");
        let err = bridge.lease_page(handle, -1).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Range);
    }

    #[test]
    fn test_drop_closes_pages_then_documents() {
        let (library, mut bridge) = bridge();
        let handle = bridge.open_document(two_pages(), None).unwrap();
        bridge.lease_page(handle, 0).unwrap().mark_dirty();
        assert_eq!(library.stats().open_pages(), 1);

        drop(bridge);
        let stats = library.stats();
        assert_eq!(stats.open_pages(), 0);
        assert_eq!(stats.open_documents(), 0);
        assert_eq!(stats.regenerations, 0);
    }

    #[test]
    fn test_checked_index() {
        assert_eq!(checked_index("objectId", 0, 1).unwrap(), 0);
        assert!(checked_index("objectId", 1, 1).is_err());
        assert!(checked_index("objectId", i32::MIN, 1).is_err());
    }
}
