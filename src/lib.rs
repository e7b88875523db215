//! Handle-based bridge between a synchronous host and a PDF library.
//!
//! [`PdfBridge`] maps integer document handles to open documents and keeps
//! edited pages open in a per-document cache until the document is saved.
//! Content regeneration is deferred to save time and runs once per edited
//! page.
//!
//! ```no_run
//! # #[cfg(feature = "pdfium")]
//! # fn main() -> pdfbull_bridge::Result<()> {
//! use pdfbull_bridge::{BridgeConfig, PdfBridge};
//!
//! let mut bridge = PdfBridge::with_pdfium(BridgeConfig::from_env())?;
//! let handle = bridge.open_document(std::fs::read("in.pdf").unwrap_or_default(), None)?;
//! bridge.edit_text_object(handle, 0, 3, "Revised title")?;
//! let preview = bridge.render_page(handle, 0, 2.0)?;
//! let bytes = bridge.save_document(handle)?;
//! # let _ = (preview, bytes);
//! bridge.close_document(handle)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "pdfium"))]
//! # fn main() {}
//! ```

pub mod backend;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod edit;
pub mod error;
pub mod host;
pub mod logging;
pub mod objects;
pub mod registry;
pub mod render;
pub mod sink;

pub use backend::memory::{MemoryDocumentSpec, MemoryLibrary, MemoryObject, MemoryPageSpec};
#[cfg(feature = "pdfium")]
pub use backend::pdfium::PdfiumLibrary;
pub use backend::{Bounds, ObjectKind, PdfLibrary};
pub use bridge::PdfBridge;
pub use cache::{FlushReport, PageCache};
pub use config::{BridgeConfig, RenderOptions};
pub use error::{BridgeError, ErrorKind, LibraryErrorCode, Result};
pub use host::{HostValue, invoke};
pub use objects::PageObjectInfo;
pub use registry::DocumentHandle;
pub use render::RenderedPage;
