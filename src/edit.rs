//! Page object edits.
//!
//! An edit changes the page's in-memory object graph and leaves the page in
//! the cache marked dirty. Content is regenerated later, once, when the
//! document is saved. A failed edit hands the page back untouched: a page
//! loaded for the edit is closed, a cached page stays as it was.

use crate::backend::{BYTES_PER_PIXEL, BgraPixels, ObjectKind, PageOf, PageResource, PdfLibrary};
use crate::bridge::{PdfBridge, checked_index};
use crate::error::{BridgeError, Result};
use crate::registry::DocumentHandle;

/// The only encoding accepted by [`PdfBridge::replace_image_object`].
pub const JPEG_FORMAT: &str = "jpeg";

impl<L: PdfLibrary> PdfBridge<L> {
    /// Replace the text of a text object.
    pub fn edit_text_object(
        &mut self,
        handle: DocumentHandle,
        page_index: i32,
        object_id: i32,
        text: &str,
    ) -> Result<()> {
        self.edit_object(handle, page_index, object_id, ObjectKind::Text, |page, id| {
            page.set_object_text(id, text)
        })
        .map_err(|e| e.context("editTextObject"))
    }

    /// Replace the pixels of an image object with an encoded image.
    /// Only `"jpeg"` is accepted.
    pub fn replace_image_object(
        &mut self,
        handle: DocumentHandle,
        page_index: i32,
        object_id: i32,
        image: &[u8],
        format: &str,
    ) -> Result<()> {
        self.try_replace_image(handle, page_index, object_id, image, format)
            .map_err(|e| e.context("replaceImageObject"))
    }

    fn try_replace_image(
        &mut self,
        handle: DocumentHandle,
        page_index: i32,
        object_id: i32,
        image: &[u8],
        format: &str,
    ) -> Result<()> {
        self.resolve_page(handle, page_index)?;
        if format != JPEG_FORMAT {
            return Err(BridgeError::state(format!(
                "only '{JPEG_FORMAT}' format is currently supported, got '{format}'. \
                 Convert other formats to JPEG before calling this function."
            )));
        }
        self.edit_object(handle, page_index, object_id, ObjectKind::Image, |page, id| {
            page.set_object_jpeg(id, image)
        })
    }

    /// Replace the pixels of an image object with raw native-order (BGRA)
    /// pixels. `bgra` must hold at least `width * height * 4` bytes.
    pub fn replace_image_object_bitmap(
        &mut self,
        handle: DocumentHandle,
        page_index: i32,
        object_id: i32,
        bgra: &[u8],
        width: i32,
        height: i32,
    ) -> Result<()> {
        self.try_replace_bitmap(handle, page_index, object_id, bgra, width, height)
            .map_err(|e| e.context("replaceImageObjectBitmap"))
    }

    fn try_replace_bitmap(
        &mut self,
        handle: DocumentHandle,
        page_index: i32,
        object_id: i32,
        bgra: &[u8],
        width: i32,
        height: i32,
    ) -> Result<()> {
        let pixels = bitmap_pixels(bgra, width, height)?;
        self.edit_object(handle, page_index, object_id, ObjectKind::Image, |page, id| {
            page.set_object_bitmap(id, pixels)
        })
    }

    /// Lease the page, check the object id and kind, apply `edit`, and mark
    /// the page dirty only if every step succeeded.
    fn edit_object<F>(
        &mut self,
        handle: DocumentHandle,
        page_index: i32,
        object_id: i32,
        kind: ObjectKind,
        edit: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut PageOf<L>, usize) -> Result<()>,
    {
        let mut lease = self.lease_page(handle, page_index)?;
        let id = checked_index("objectId", object_id, lease.object_count())?;
        if lease.object_kind(id)? != kind {
            let article = if kind == ObjectKind::Image { "an" } else { "a" };
            return Err(BridgeError::state(format!(
                "object {id} is not {article} {} object",
                kind.as_str()
            )));
        }
        edit(&mut *lease, id)?;
        lease.mark_dirty();
        Ok(())
    }
}

/// Validate a raw BGRA buffer against its claimed dimensions.
fn bitmap_pixels(data: &[u8], width: i32, height: i32) -> Result<BgraPixels<'_>> {
    let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
        return Err(BridgeError::range(format!(
            "bitmap size {width}x{height} must be positive"
        )));
    };
    if w == 0 || h == 0 {
        return Err(BridgeError::range(format!(
            "bitmap size {width}x{height} must be positive"
        )));
    }
    let expected = (w as usize)
        .checked_mul(h as usize)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(|| BridgeError::range(format!("bitmap size {width}x{height} is too large")))?;
    if data.len() < expected {
        return Err(BridgeError::range(format!(
            "bgraData buffer too small. Expected {expected} bytes for {width}x{height} BGRA, got {}",
            data.len()
        )));
    }
    Ok(BgraPixels {
        width: w,
        height: h,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Bounds;
    use crate::backend::memory::{MemoryDocumentSpec, MemoryLibrary, MemoryObject, MemoryPageSpec};
    use crate::config::BridgeConfig;
    use crate::error::ErrorKind;

    fn open() -> (MemoryLibrary, PdfBridge<MemoryLibrary>, DocumentHandle) {
        let library = MemoryLibrary::new();
        let mut bridge = PdfBridge::new(library.clone(), BridgeConfig::default());
        let bytes = MemoryDocumentSpec::new()
            .with_page(
                MemoryPageSpec::new(200.0, 200.0)
                    .with_object(MemoryObject::text(Bounds::new(10.0, 10.0, 90.0, 30.0), "Old"))
                    .with_object(MemoryObject::image(Bounds::new(100.0, 100.0, 150.0, 150.0), 2, 2)),
            )
            .to_bytes();
        let handle = bridge.open_document(bytes, None).unwrap();
        (library, bridge, handle)
    }

    #[test]
    fn test_edit_marks_page_dirty_without_regenerating() {
        let (library, mut bridge, handle) = open();
        bridge.edit_text_object(handle, 0, 0, "New").unwrap();
        assert_eq!(bridge.is_page_dirty(handle, 0), Some(true));
        assert_eq!(library.stats().regenerations, 0);
        assert_eq!(library.stats().open_pages(), 1);
    }

    #[test]
    fn test_object_id_out_of_range() {
        let (library, mut bridge, handle) = open();
        let err = bridge.edit_text_object(handle, 0, 2, "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        insta::assert_snapshot!(err.to_string(), @"editTextObject: objectId 2 out of range [0, 1]");
        assert!(bridge.cached_pages(handle).is_empty());
        assert_eq!(library.stats().open_pages(), 0);
    }

    #[test]
    fn test_wrong_kind_is_state_error() {
        let (_, mut bridge, handle) = open();
        let err = bridge.edit_text_object(handle, 0, 1, "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(err.to_string(), "editTextObject: object 1 is not a text object");

        let err = bridge
            .replace_image_object_bitmap(handle, 0, 0, &[0; 4], 1, 1)
            .unwrap_err();
        assert_eq!(err.to_string(), "replaceImageObjectBitmap: object 0 is not an image object");
    }

    #[test]
    fn test_failed_edit_keeps_cached_page_dirty() {
        let (_, mut bridge, handle) = open();
        bridge.edit_text_object(handle, 0, 0, "New").unwrap();
        assert!(bridge.edit_text_object(handle, 0, 5, "x").is_err());
        assert_eq!(bridge.cached_pages(handle), vec![0]);
        assert_eq!(bridge.is_page_dirty(handle, 0), Some(true));
    }

    #[test]
    fn test_unsupported_format_leaves_cache_alone() {
        let (library, mut bridge, handle) = open();
        let err = bridge.replace_image_object(handle, 0, 1, b"\x89PNG", "png").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert!(err.to_string().starts_with("replaceImageObject: only 'jpeg' format"));
        assert!(bridge.cached_pages(handle).is_empty());
        assert_eq!(library.stats().pages_loaded, 0);
    }

    #[test]
    fn test_invalid_jpeg_is_library_error() {
        let (library, mut bridge, handle) = open();
        let err = bridge.replace_image_object(handle, 0, 1, b"not a jpeg", "jpeg").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Library);
        assert!(bridge.cached_pages(handle).is_empty());
        assert_eq!(library.stats().open_pages(), 0);
    }

    #[test]
    fn test_bitmap_replacement() {
        let (_, mut bridge, handle) = open();
        bridge
            .replace_image_object_bitmap(handle, 0, 1, &[0x10; 16], 2, 2)
            .unwrap();
        assert_eq!(bridge.cached_pages(handle), vec![0]);
    }

    #[test]
    fn test_bitmap_buffer_too_small() {
        let (_, mut bridge, handle) = open();
        let err = bridge
            .replace_image_object_bitmap(handle, 0, 1, &[0; 15], 2, 2)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        insta::assert_snapshot!(
            err.to_string(),
            @"replaceImageObjectBitmap: bgraData buffer too small. Expected 16 bytes for 2x2 BGRA, got 15"
        );
    }

    #[test]
    fn test_bitmap_dimensions_must_be_positive() {
        assert!(bitmap_pixels(&[], 0, 4).is_err());
        assert!(bitmap_pixels(&[], -1, 4).is_err());
        assert!(bitmap_pixels(&[], i32::MAX, i32::MAX).is_err());
        assert!(bitmap_pixels(&[0; 4], 1, 1).is_ok());
    }
}
