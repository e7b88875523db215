//! The seam between the bridge and a PDF library.
//!
//! Resources are plain owned values: dropping a document or page closes it in
//! the library. The bridge decides *when* that happens; backends only decide
//! *how*.

pub mod memory;
#[cfg(feature = "pdfium")]
pub mod pdfium;

use serde::{Deserialize, Serialize};

use crate::config::RenderOptions;
use crate::error::Result;
use crate::sink::BufferWriter;

/// Bytes per pixel of every four-channel buffer the bridge handles.
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Text,
    Path,
    Image,
    Shading,
    Form,
    Unknown,
}

impl ObjectKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Path => "path",
            Self::Image => "image",
            Self::Shading => "shading",
            Self::Form => "form",
            Self::Unknown => "unknown",
        }
    }
}

/// Object bounds in page space (points, origin bottom-left).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Bounds {
    pub const fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }
}

/// Page dimensions in points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// A rendered bitmap in the library's native BGRA order. Rows may be padded,
/// so `stride >= width * 4`.
#[derive(Debug, Clone)]
pub struct NativeBitmap {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: Vec<u8>,
}

/// Raw pixels handed to an image object, in native BGRA order.
#[derive(Debug, Clone, Copy)]
pub struct BgraPixels<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

pub trait PdfLibrary {
    type Document: DocumentResource;

    /// Load a document from memory. `password` is UTF-8 text.
    fn load_document(&self, bytes: Vec<u8>, password: Option<&str>) -> Result<Self::Document>;
}

pub trait DocumentResource {
    type Page: PageResource;

    fn page_count(&self) -> usize;

    /// Open the page at `index`. The returned page stays open until dropped.
    fn load_page(&self, index: usize) -> Result<Self::Page>;

    /// Serialize the whole document, streaming blocks into `sink`.
    fn save_to(&self, sink: &mut BufferWriter) -> Result<()>;
}

pub trait PageResource {
    fn size(&self) -> PageSize;

    fn object_count(&self) -> usize;

    fn object_kind(&self, id: usize) -> Result<ObjectKind>;

    fn object_bounds(&self, id: usize) -> Result<Bounds>;

    /// Unicode text of a text object, read through the page text layer.
    fn object_text(&self, id: usize) -> Result<String>;

    fn set_object_text(&mut self, id: usize, text: &str) -> Result<()>;

    /// Decode a JPEG stream and make its pixels the content of an image
    /// object. Backends may store the decoded bitmap rather than the DCT
    /// stream, so the saved image is not guaranteed to stay JPEG-encoded.
    fn set_object_jpeg(&mut self, id: usize, jpeg: &[u8]) -> Result<()>;

    fn set_object_bitmap(&mut self, id: usize, pixels: BgraPixels<'_>) -> Result<()>;

    /// Rebuild the page content stream from its in-memory object graph.
    fn regenerate_content(&mut self) -> Result<()>;

    fn render(&self, width: u32, height: u32, options: &RenderOptions) -> Result<NativeBitmap>;
}

/// Page type of a library's documents.
pub type PageOf<L> = <<L as PdfLibrary>::Document as DocumentResource>::Page;
