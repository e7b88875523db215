//! Page rendering through the page cache.
//!
//! Edited pages are rendered from the open page in the cache, so unsaved
//! edits are visible. Rendering never regenerates content.

use rayon::prelude::*;
use tracing::trace;

use crate::backend::{BYTES_PER_PIXEL, NativeBitmap, PageResource, PdfLibrary};
use crate::bridge::PdfBridge;
use crate::error::{BridgeError, Result};
use crate::registry::DocumentHandle;

/// Tightly packed RGBA pixels, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl<L: PdfLibrary> PdfBridge<L> {
    /// Render page `page_index` at `scale` pixels per point.
    pub fn render_page(
        &mut self,
        handle: DocumentHandle,
        page_index: i32,
        scale: f64,
    ) -> Result<RenderedPage> {
        self.try_render(handle, page_index, scale)
            .map_err(|e| e.context("renderPage"))
    }

    fn try_render(
        &mut self,
        handle: DocumentHandle,
        page_index: i32,
        scale: f64,
    ) -> Result<RenderedPage> {
        self.resolve_page(handle, page_index)?;
        // NaN fails this too.
        if !(scale > 0.0) {
            return Err(BridgeError::range("scale must be > 0"));
        }

        let limit = self.config().max_render_dimension;
        let options = self.config().render.clone();

        let lease = self.lease_page(handle, page_index)?;
        let size = lease.size();
        let width = pixel_dimension(size.width, scale);
        let height = pixel_dimension(size.height, scale);
        if width < 1.0 || height < 1.0 {
            return Err(BridgeError::state("resulting bitmap size is zero"));
        }
        if width > f64::from(limit) || height > f64::from(limit) {
            return Err(BridgeError::range(format!(
                "bitmap {width}x{height} exceeds the {limit} pixel limit"
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (width, height) = (width as u32, height as u32);

        let bitmap = lease.render(width, height, &options)?;
        trace!(%handle, page = page_index, was_cached = lease.was_cached(), "rendered page");
        lease.release();

        Ok(RenderedPage {
            pixels: bgra_to_rgba(&bitmap)?,
            width,
            height,
        })
    }
}

/// Pixel size of `points` at `scale`, rounded half away from zero.
/// NaN maps to zero.
pub fn pixel_dimension(points: f32, scale: f64) -> f64 {
    let pixels = (f64::from(points) * scale).round();
    if pixels.is_nan() { 0.0 } else { pixels }
}

/// Copy a native BGRA bitmap into tightly packed RGBA, dropping row padding.
pub fn bgra_to_rgba(bitmap: &NativeBitmap) -> Result<Vec<u8>> {
    let row_len = bitmap.width as usize * BYTES_PER_PIXEL;
    let rows = bitmap.height as usize;
    if row_len == 0 || rows == 0 {
        return Ok(Vec::new());
    }
    let needed = bitmap.stride * (rows - 1) + row_len;
    if bitmap.stride < row_len || bitmap.data.len() < needed {
        return Err(BridgeError::library(format!(
            "bitmap buffer holds {} bytes, expected at least {needed}",
            bitmap.data.len()
        )));
    }

    let mut rgba = vec![0u8; row_len * rows];
    rgba.par_chunks_exact_mut(row_len)
        .zip(bitmap.data.par_chunks(bitmap.stride))
        .for_each(|(dst, src)| {
            for (out, pixel) in dst
                .chunks_exact_mut(BYTES_PER_PIXEL)
                .zip(src[..row_len].chunks_exact(BYTES_PER_PIXEL))
            {
                out[0] = pixel[2];
                out[1] = pixel[1];
                out[2] = pixel[0];
                out[3] = pixel[3];
            }
        });
    Ok(rgba)
}
