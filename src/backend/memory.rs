//! In-memory reference library.
//!
//! Documents are a small serde model stored behind a `%MEMPDF-1` header.
//! Each open page works on its own copy of the object graph; only
//! [`PageResource::regenerate_content`] writes that copy back into the
//! document, so unsaved edits are visible to renders of the open page but not
//! to serialization until the page is regenerated. Counters record every
//! open, close, regeneration and save.

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    BYTES_PER_PIXEL, BgraPixels, Bounds, DocumentResource, NativeBitmap, ObjectKind, PageResource,
    PageSize, PdfLibrary,
};
use crate::config::RenderOptions;
use crate::error::{BridgeError, LibraryErrorCode, Result};
use crate::sink::BufferWriter;

/// Header every serialized memory document starts with.
pub const MAGIC: &[u8] = b"%MEMPDF-1\n";

/// Serialized documents are streamed to the sink in blocks of this size.
const WRITE_BLOCK: usize = 4096;

/// Rendered rows are padded to a multiple of this many bytes.
const ROW_ALIGN: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "lowercase")]
pub enum MemoryImage {
    Jpeg {
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
    Raw {
        width: u32,
        height: u32,
        bgra: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryObject {
    pub kind: ObjectKind,
    pub bounds: Bounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<MemoryImage>,
}

impl MemoryObject {
    pub const fn new(kind: ObjectKind, bounds: Bounds) -> Self {
        Self {
            kind,
            bounds,
            text: None,
            image: None,
        }
    }

    pub fn text(bounds: Bounds, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(ObjectKind::Text, bounds)
        }
    }

    /// An image object filled with a single opaque grey.
    pub fn image(bounds: Bounds, width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        Self {
            image: Some(MemoryImage::Raw {
                width,
                height,
                bgra: [0x80, 0x80, 0x80, 0xFF].repeat(len / BYTES_PER_PIXEL),
            }),
            ..Self::new(ObjectKind::Image, bounds)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPageSpec {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub objects: Vec<MemoryObject>,
    /// Make `regenerate_content` fail for this page.
    #[serde(default)]
    pub fail_regeneration: bool,
    /// Make `load_page` fail for this page.
    #[serde(default)]
    pub fail_load: bool,
}

impl MemoryPageSpec {
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            objects: Vec::new(),
            fail_regeneration: false,
            fail_load: false,
        }
    }

    #[must_use]
    pub fn with_object(mut self, object: MemoryObject) -> Self {
        self.objects.push(object);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocumentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub pages: Vec<MemoryPageSpec>,
}

impl MemoryDocumentSpec {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: MemoryPageSpec) -> Self {
        self.pages.push(page);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        // Serializing plain data into a Vec cannot fail.
        if let Err(e) = serde_json::to_writer(&mut bytes, self) {
            tracing::error!("memory document serialization failed: {e}");
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let body = bytes
            .strip_prefix(MAGIC)
            .ok_or_else(|| BridgeError::library_code(LibraryErrorCode::Format))?;
        serde_json::from_slice(body).map_err(|_| BridgeError::library_code(LibraryErrorCode::Format))
    }
}

#[derive(Debug, Default)]
struct Counters {
    documents_opened: AtomicUsize,
    documents_closed: AtomicUsize,
    pages_loaded: AtomicUsize,
    pages_closed: AtomicUsize,
    regenerations: AtomicUsize,
    saves: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// Snapshot of the library's resource counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub documents_opened: usize,
    pub documents_closed: usize,
    pub pages_loaded: usize,
    pub pages_closed: usize,
    pub regenerations: usize,
    pub saves: usize,
}

impl MemoryStats {
    pub const fn open_pages(&self) -> usize {
        self.pages_loaded - self.pages_closed
    }

    pub const fn open_documents(&self) -> usize {
        self.documents_opened - self.documents_closed
    }
}

/// Cloning shares the counters, so a clone kept by a test observes the
/// resources of the instance handed to a bridge.
#[derive(Debug, Clone, Default)]
pub struct MemoryLibrary {
    counters: Arc<Counters>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MemoryStats {
        let c = &self.counters;
        MemoryStats {
            documents_opened: c.documents_opened.load(Ordering::SeqCst),
            documents_closed: c.documents_closed.load(Ordering::SeqCst),
            pages_loaded: c.pages_loaded.load(Ordering::SeqCst),
            pages_closed: c.pages_closed.load(Ordering::SeqCst),
            regenerations: c.regenerations.load(Ordering::SeqCst),
            saves: c.saves.load(Ordering::SeqCst),
        }
    }
}

impl PdfLibrary for MemoryLibrary {
    type Document = MemoryDocument;

    fn load_document(&self, bytes: Vec<u8>, password: Option<&str>) -> Result<MemoryDocument> {
        let spec = MemoryDocumentSpec::from_bytes(&bytes)?;
        if let Some(expected) = &spec.password {
            if password != Some(expected.as_str()) {
                return Err(BridgeError::library_code(LibraryErrorCode::Password));
            }
        }
        bump(&self.counters.documents_opened);
        Ok(MemoryDocument {
            state: Arc::new(Mutex::new(spec)),
            counters: Arc::clone(&self.counters),
        })
    }
}

pub struct MemoryDocument {
    state: Arc<Mutex<MemoryDocumentSpec>>,
    counters: Arc<Counters>,
}

fn lock(state: &Mutex<MemoryDocumentSpec>) -> MutexGuard<'_, MemoryDocumentSpec> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DocumentResource for MemoryDocument {
    type Page = MemoryPage;

    fn page_count(&self) -> usize {
        lock(&self.state).pages.len()
    }

    fn load_page(&self, index: usize) -> Result<MemoryPage> {
        let spec = lock(&self.state);
        let page = spec
            .pages
            .get(index)
            .filter(|page| !page.fail_load)
            .ok_or_else(|| BridgeError::library_code(LibraryErrorCode::Page))?;
        bump(&self.counters.pages_loaded);
        Ok(MemoryPage {
            document: Arc::clone(&self.state),
            index,
            size: PageSize {
                width: page.width,
                height: page.height,
            },
            objects: page.objects.clone(),
            fail_regeneration: page.fail_regeneration,
            counters: Arc::clone(&self.counters),
        })
    }

    fn save_to(&self, sink: &mut BufferWriter) -> Result<()> {
        let bytes = lock(&self.state).to_bytes();
        for block in bytes.chunks(WRITE_BLOCK) {
            sink.write_all(block)
                .map_err(|e| BridgeError::library(format!("write failed: {e}")))?;
        }
        bump(&self.counters.saves);
        Ok(())
    }
}

impl Drop for MemoryDocument {
    fn drop(&mut self) {
        bump(&self.counters.documents_closed);
    }
}

fn out_of_range(id: usize, len: usize) -> BridgeError {
    BridgeError::out_of_range("objectId", i64::try_from(id).unwrap_or(i64::MAX), len)
}

pub struct MemoryPage {
    document: Arc<Mutex<MemoryDocumentSpec>>,
    index: usize,
    size: PageSize,
    objects: Vec<MemoryObject>,
    fail_regeneration: bool,
    counters: Arc<Counters>,
}

impl MemoryPage {
    fn object(&self, id: usize) -> Result<&MemoryObject> {
        self.objects.get(id).ok_or_else(|| out_of_range(id, self.objects.len()))
    }

    fn object_of_kind(&mut self, id: usize, kind: ObjectKind) -> Result<&mut MemoryObject> {
        let len = self.objects.len();
        let object = self
            .objects
            .get_mut(id)
            .ok_or_else(|| out_of_range(id, len))?;
        if object.kind != kind {
            let article = if kind == ObjectKind::Image { "an" } else { "a" };
            return Err(BridgeError::state(format!(
                "object {id} is not {article} {} object",
                kind.as_str()
            )));
        }
        Ok(object)
    }
}

impl PageResource for MemoryPage {
    fn size(&self) -> PageSize {
        self.size
    }

    fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn object_kind(&self, id: usize) -> Result<ObjectKind> {
        Ok(self.object(id)?.kind)
    }

    fn object_bounds(&self, id: usize) -> Result<Bounds> {
        Ok(self.object(id)?.bounds)
    }

    fn object_text(&self, id: usize) -> Result<String> {
        let object = self.object(id)?;
        if object.kind != ObjectKind::Text {
            return Err(BridgeError::state(format!("object {id} is not a text object")));
        }
        Ok(object.text.clone().unwrap_or_default())
    }

    fn set_object_text(&mut self, id: usize, text: &str) -> Result<()> {
        self.object_of_kind(id, ObjectKind::Text)?.text = Some(text.to_string());
        Ok(())
    }

    fn set_object_jpeg(&mut self, id: usize, jpeg: &[u8]) -> Result<()> {
        let object = self.object_of_kind(id, ObjectKind::Image)?;
        let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
            .map_err(|e| BridgeError::library(format!("failed to load replacement image: {e}")))?;
        object.image = Some(MemoryImage::Jpeg {
            width: decoded.width(),
            height: decoded.height(),
            data: jpeg.to_vec(),
        });
        Ok(())
    }

    fn set_object_bitmap(&mut self, id: usize, pixels: BgraPixels<'_>) -> Result<()> {
        let needed = pixels.width as usize * pixels.height as usize * BYTES_PER_PIXEL;
        let data = pixels
            .data
            .get(..needed)
            .ok_or_else(|| BridgeError::range(format!("bitmap needs {needed} bytes")))?;
        self.object_of_kind(id, ObjectKind::Image)?.image = Some(MemoryImage::Raw {
            width: pixels.width,
            height: pixels.height,
            bgra: data.to_vec(),
        });
        Ok(())
    }

    fn regenerate_content(&mut self) -> Result<()> {
        if self.fail_regeneration {
            return Err(BridgeError::library("content regeneration failed"));
        }
        let mut spec = lock(&self.document);
        let page = spec
            .pages
            .get_mut(self.index)
            .ok_or_else(|| BridgeError::library_code(LibraryErrorCode::Page))?;
        page.objects.clone_from(&self.objects);
        bump(&self.counters.regenerations);
        Ok(())
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn render(&self, width: u32, height: u32, options: &RenderOptions) -> Result<NativeBitmap> {
        let (w, h) = (width as usize, height as usize);
        let stride = (w * BYTES_PER_PIXEL).div_ceil(ROW_ALIGN) * ROW_ALIGN;
        let mut data = vec![0u8; stride * h];

        let [r, g, b, a] = options.background;
        fill_rect(&mut data, stride, (0, 0, w, h), [b, g, r, a]);

        let scale_x = f64::from(width) / f64::from(self.size.width);
        let scale_y = f64::from(height) / f64::from(self.size.height);
        for object in &self.objects {
            let bounds = object.bounds;
            let to_px = |value: f64, limit: usize| value.clamp(0.0, limit as f64) as usize;
            let x0 = to_px((f64::from(bounds.left) * scale_x).floor(), w);
            let x1 = to_px((f64::from(bounds.right) * scale_x).ceil(), w);
            let y0 = to_px((f64::from(self.size.height - bounds.top) * scale_y).floor(), h);
            let y1 = to_px((f64::from(self.size.height - bounds.bottom) * scale_y).ceil(), h);
            fill_rect(&mut data, stride, (x0, y0, x1, y1), object_color(object));
        }

        Ok(NativeBitmap {
            width,
            height,
            stride,
            data,
        })
    }
}

impl Drop for MemoryPage {
    fn drop(&mut self) {
        bump(&self.counters.pages_closed);
    }
}

fn fill_rect(data: &mut [u8], stride: usize, rect: (usize, usize, usize, usize), bgra: [u8; 4]) {
    let (x0, y0, x1, y1) = rect;
    if x0 >= x1 || y0 >= y1 {
        return;
    }
    for row in data.chunks_exact_mut(stride).take(y1).skip(y0) {
        for pixel in row[x0 * BYTES_PER_PIXEL..x1 * BYTES_PER_PIXEL].chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&bgra);
        }
    }
}

/// Opaque BGRA color hashed from an object's kind and content.
fn object_color(object: &MemoryObject) -> [u8; 4] {
    let mut hash = Fnv1a::new();
    hash.write(object.kind.as_str().as_bytes());
    if let Some(text) = &object.text {
        hash.write(text.as_bytes());
    }
    match &object.image {
        Some(MemoryImage::Jpeg { data, .. }) => hash.write(data),
        Some(MemoryImage::Raw { bgra, .. }) => hash.write(bgra),
        None => {}
    }
    let [b, g, r, ..] = hash.finish().to_le_bytes();
    [b, g, r, 0xFF]
}

struct Fnv1a(u64);

impl Fnv1a {
    const fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 ^= u64::from(byte);
            self.0 = self.0.wrapping_mul(0x0100_0000_01b3);
        }
    }

    const fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryDocumentSpec {
        MemoryDocumentSpec::new().with_page(
            MemoryPageSpec::new(200.0, 100.0)
                .with_object(MemoryObject::text(Bounds::new(10.0, 10.0, 90.0, 30.0), "Hello"))
                .with_object(MemoryObject::image(Bounds::new(100.0, 10.0, 190.0, 90.0), 2, 2)),
        )
    }

    #[test]
    fn test_round_trip_through_bytes() {
        let spec = sample();
        let parsed = MemoryDocumentSpec::from_bytes(&spec.to_bytes()).unwrap();
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        let library = MemoryLibrary::new();
        let err = library.load_document(b"%PDF-1.7\n".to_vec(), None).err().unwrap();
        assert_eq!(err.library_error_code(), Some(LibraryErrorCode::Format));
    }

    #[test]
    fn test_password_is_checked() {
        let library = MemoryLibrary::new();
        let bytes = sample().with_password("s3cret").to_bytes();
        let err = library.load_document(bytes.clone(), None).err().unwrap();
        assert_eq!(err.library_error_code(), Some(LibraryErrorCode::Password));
        let err = library.load_document(bytes.clone(), Some("nope")).err().unwrap();
        assert_eq!(err.library_error_code(), Some(LibraryErrorCode::Password));
        assert!(library.load_document(bytes, Some("s3cret")).is_ok());
    }

    #[test]
    fn test_edits_stay_on_the_page_until_regenerated() {
        let library = MemoryLibrary::new();
        let doc = library.load_document(sample().to_bytes(), None).unwrap();

        let mut page = doc.load_page(0).unwrap();
        page.set_object_text(0, "Edited").unwrap();

        let mut sink = BufferWriter::new();
        doc.save_to(&mut sink).unwrap();
        let saved = MemoryDocumentSpec::from_bytes(sink.as_slice()).unwrap();
        assert_eq!(saved.pages[0].objects[0].text.as_deref(), Some("Hello"));

        page.regenerate_content().unwrap();
        let mut sink = BufferWriter::new();
        doc.save_to(&mut sink).unwrap();
        let saved = MemoryDocumentSpec::from_bytes(sink.as_slice()).unwrap();
        assert_eq!(saved.pages[0].objects[0].text.as_deref(), Some("Edited"));
        assert_eq!(library.stats().regenerations, 1);
    }

    #[test]
    fn test_counters_track_drops() {
        let library = MemoryLibrary::new();
        let doc = library.load_document(sample().to_bytes(), None).unwrap();
        let page = doc.load_page(0).unwrap();
        assert_eq!(library.stats().open_pages(), 1);
        drop(page);
        drop(doc);
        let stats = library.stats();
        assert_eq!(stats.open_pages(), 0);
        assert_eq!(stats.open_documents(), 0);
    }

    #[test]
    fn test_wrong_kind_is_state_error() {
        let library = MemoryLibrary::new();
        let doc = library.load_document(sample().to_bytes(), None).unwrap();
        let mut page = doc.load_page(0).unwrap();
        let err = page.set_object_text(1, "x").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::State);
    }

    #[test]
    fn test_render_rows_are_padded() {
        let library = MemoryLibrary::new();
        let doc = library.load_document(sample().to_bytes(), None).unwrap();
        let page = doc.load_page(0).unwrap();
        let bitmap = page.render(3, 2, &RenderOptions::default()).unwrap();
        assert_eq!(bitmap.stride, 64);
        assert_eq!(bitmap.data.len(), 128);
    }
}
