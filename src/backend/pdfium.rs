//! PDFium backend built on `pdfium-render`.
//!
//! The shared library is bound once per process. Documents and pages borrow
//! the process-wide binding, so they carry a `'static` lifetime and can live
//! in the bridge's maps.

use image::{DynamicImage, ImageFormat, RgbaImage};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use super::{
    BYTES_PER_PIXEL, BgraPixels, Bounds, DocumentResource, NativeBitmap, ObjectKind, PageResource,
    PageSize, PdfLibrary,
};
use crate::bridge::PdfBridge;
use crate::config::{BridgeConfig, RenderOptions};
use crate::error::{BridgeError, LibraryErrorCode, Result};
use crate::sink::BufferWriter;

struct PdfiumWrapper(Pdfium);
unsafe impl Sync for PdfiumWrapper {}
unsafe impl Send for PdfiumWrapper {}

static PDFIUM: OnceLock<std::result::Result<PdfiumWrapper, String>> = OnceLock::new();

/// Bind PDFium on first use: `library_dir` if given, then the working
/// directory, then the system library. Later calls return the first
/// outcome whatever directory they pass.
fn bind_pdfium(library_dir: Option<&Path>) -> Result<&'static Pdfium> {
    let result = PDFIUM.get_or_init(|| {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = library_dir {
            candidates.push(Pdfium::pdfium_platform_library_name_at_path(dir));
        }
        candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));

        for path in &candidates {
            match Pdfium::bind_to_library(path) {
                Ok(bindings) => {
                    debug!(path = %path.display(), "bound PDFium");
                    return Ok(PdfiumWrapper(Pdfium::new(bindings)));
                }
                Err(e) => debug!(path = %path.display(), "PDFium bind failed: {e:?}"),
            }
        }

        Pdfium::bind_to_system_library()
            .map(|bindings| {
                debug!("bound system PDFium");
                PdfiumWrapper(Pdfium::new(bindings))
            })
            .map_err(|e| format!("PDFium library load failed: {e:?}"))
    });

    match result {
        Ok(wrapper) => Ok(&wrapper.0),
        Err(e) => Err(BridgeError::library(e.clone())),
    }
}

impl From<PdfiumError> for BridgeError {
    fn from(error: PdfiumError) -> Self {
        match error {
            PdfiumError::PdfiumLibraryInternalError(internal) => {
                let code = match internal {
                    PdfiumInternalError::FileError => LibraryErrorCode::File,
                    PdfiumInternalError::FormatError => LibraryErrorCode::Format,
                    PdfiumInternalError::PasswordError => LibraryErrorCode::Password,
                    PdfiumInternalError::SecurityError => LibraryErrorCode::Security,
                    PdfiumInternalError::PageError => LibraryErrorCode::Page,
                    _ => LibraryErrorCode::Unknown,
                };
                Self::library_code(code)
            }
            other => Self::library(format!("{other:?}")),
        }
    }
}

#[derive(Clone, Copy)]
pub struct PdfiumLibrary {
    pdfium: &'static Pdfium,
}

impl PdfiumLibrary {
    pub fn bind(config: &BridgeConfig) -> Result<Self> {
        Ok(Self {
            pdfium: bind_pdfium(config.library_path.as_deref())?,
        })
    }
}

impl PdfBridge<PdfiumLibrary> {
    /// Bridge backed by the PDFium shared library.
    pub fn with_pdfium(config: BridgeConfig) -> Result<Self> {
        let library = PdfiumLibrary::bind(&config)?;
        Ok(Self::new(library, config))
    }
}

impl PdfLibrary for PdfiumLibrary {
    type Document = PdfiumDocument;

    fn load_document(&self, bytes: Vec<u8>, password: Option<&str>) -> Result<PdfiumDocument> {
        let document = self.pdfium.load_pdf_from_byte_vec(bytes, password)?;
        Ok(PdfiumDocument { inner: document })
    }
}

pub struct PdfiumDocument {
    inner: PdfDocument<'static>,
}

impl DocumentResource for PdfiumDocument {
    type Page = PdfiumPage;

    fn page_count(&self) -> usize {
        usize::try_from(self.inner.pages().len()).unwrap_or(0)
    }

    fn load_page(&self, index: usize) -> Result<PdfiumPage> {
        let index = PdfPageIndex::try_from(index)
            .map_err(|_| BridgeError::library_code(LibraryErrorCode::Page))?;
        let mut page = self.inner.pages().get(index)?;
        // Content is regenerated only when the bridge asks for it.
        page.set_content_regeneration_strategy(PdfPageContentRegenerationStrategy::Manual);
        Ok(PdfiumPage { inner: page })
    }

    fn save_to(&self, sink: &mut BufferWriter) -> Result<()> {
        self.inner.save_to_writer(sink)?;
        Ok(())
    }
}

pub struct PdfiumPage {
    inner: PdfPage<'static>,
}

impl PdfiumPage {
    fn object(&self, id: usize) -> Result<PdfPageObject<'static>> {
        Ok(self.inner.objects().get(id)?)
    }
}

fn not_text(id: usize) -> BridgeError {
    BridgeError::state(format!("object {id} is not a text object"))
}

fn not_image(id: usize) -> BridgeError {
    BridgeError::state(format!("object {id} is not an image object"))
}

impl PageResource for PdfiumPage {
    fn size(&self) -> PageSize {
        PageSize {
            width: self.inner.width().value,
            height: self.inner.height().value,
        }
    }

    fn object_count(&self) -> usize {
        self.inner.objects().len()
    }

    fn object_kind(&self, id: usize) -> Result<ObjectKind> {
        Ok(match self.object(id)?.object_type() {
            PdfPageObjectType::Text => ObjectKind::Text,
            PdfPageObjectType::Path => ObjectKind::Path,
            PdfPageObjectType::Image => ObjectKind::Image,
            PdfPageObjectType::Shading => ObjectKind::Shading,
            PdfPageObjectType::XObjectForm => ObjectKind::Form,
            PdfPageObjectType::Unsupported => ObjectKind::Unknown,
        })
    }

    fn object_bounds(&self, id: usize) -> Result<Bounds> {
        let bounds = self.object(id)?.bounds()?;
        Ok(Bounds::new(
            bounds.left().value,
            bounds.bottom().value,
            bounds.right().value,
            bounds.top().value,
        ))
    }

    fn object_text(&self, id: usize) -> Result<String> {
        let object = self.object(id)?;
        object
            .as_text_object()
            .map(PdfPageTextObject::text)
            .ok_or_else(|| not_text(id))
    }

    fn set_object_text(&mut self, id: usize, text: &str) -> Result<()> {
        let mut object = self.object(id)?;
        object
            .as_text_object_mut()
            .ok_or_else(|| not_text(id))?
            .set_text(text)?;
        Ok(())
    }

    fn set_object_jpeg(&mut self, id: usize, jpeg: &[u8]) -> Result<()> {
        // pdfium-render only embeds decoded images, so the DCT stream is not kept.
        let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
            .map_err(|e| BridgeError::library(format!("failed to load replacement image: {e}")))?;
        let mut object = self.object(id)?;
        object
            .as_image_object_mut()
            .ok_or_else(|| not_image(id))?
            .set_image(&decoded)?;
        Ok(())
    }

    fn set_object_bitmap(&mut self, id: usize, pixels: BgraPixels<'_>) -> Result<()> {
        let needed = pixels.width as usize * pixels.height as usize * BYTES_PER_PIXEL;
        let mut rgba = pixels
            .data
            .get(..needed)
            .ok_or_else(|| BridgeError::range(format!("bitmap needs {needed} bytes")))?
            .to_vec();
        for pixel in rgba.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.swap(0, 2);
        }
        let image = RgbaImage::from_raw(pixels.width, pixels.height, rgba)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| BridgeError::range("bitmap dimensions do not match its buffer"))?;

        let mut object = self.object(id)?;
        object
            .as_image_object_mut()
            .ok_or_else(|| not_image(id))?
            .set_image(&image)?;
        Ok(())
    }

    fn regenerate_content(&mut self) -> Result<()> {
        self.inner.regenerate_content()?;
        Ok(())
    }

    fn render(&self, width: u32, height: u32, options: &RenderOptions) -> Result<NativeBitmap> {
        let target_w = i32::try_from(width).map_err(|_| BridgeError::range("bitmap too wide"))?;
        let target_h = i32::try_from(height).map_err(|_| BridgeError::range("bitmap too tall"))?;
        let [r, g, b, a] = options.background;

        let config = PdfRenderConfig::new()
            .set_target_size(target_w, target_h)
            .set_format(PdfBitmapFormat::BGRA)
            .render_annotations(options.annotations)
            .use_print_quality(options.print_quality)
            .use_lcd_text_rendering(options.lcd_text)
            .set_clear_color(PdfColor::new(r, g, b, a));

        let bitmap = self.inner.render_with_config(&config)?;
        let data = bitmap.as_raw_bytes().to_vec();
        let stride = data.len() / height.max(1) as usize;
        Ok(NativeBitmap {
            width,
            height,
            stride,
            data,
        })
    }
}
