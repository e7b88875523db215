//! Page object listing.

use serde::Serialize;
use tracing::warn;

use crate::backend::{ObjectKind, PageResource, PdfLibrary};
use crate::bridge::PdfBridge;
use crate::error::Result;
use crate::registry::DocumentHandle;

/// One graphical object of a page, bounds in page points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageObjectInfo {
    pub id: usize,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    /// Present for text objects only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl<L: PdfLibrary> PdfBridge<L> {
    /// List the objects of a page in content order. Reads the cached page
    /// when there is one, so pending edits show up.
    pub fn list_page_objects(
        &mut self,
        handle: DocumentHandle,
        page_index: i32,
    ) -> Result<Vec<PageObjectInfo>> {
        let lease = self
            .lease_page(handle, page_index)
            .map_err(|e| e.context("listPageObjects"))?;

        let objects = (0..lease.object_count())
            .map(|id| {
                let kind = lease.object_kind(id)?;
                let bounds = lease.object_bounds(id)?;
                let text = (kind == ObjectKind::Text).then(|| {
                    lease.object_text(id).unwrap_or_else(|e| {
                        warn!(%handle, page = page_index, object = id, "text unavailable: {e}");
                        String::new()
                    })
                });
                Ok(PageObjectInfo {
                    id,
                    kind,
                    left: bounds.left,
                    top: bounds.top,
                    right: bounds.right,
                    bottom: bounds.bottom,
                    text,
                })
            })
            .collect::<Result<Vec<_>>>()
            .map_err(|e| e.context("listPageObjects"));

        lease.release();
        objects
    }
}
