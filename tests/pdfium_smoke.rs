//! Smoke tests against the real PDFium library.
//!
//! Each test skips itself when the shared library cannot be bound, so the
//! suite still passes on machines without PDFium installed.

#![cfg(feature = "pdfium")]

use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref, Str};
use pdfbull_bridge::{BridgeConfig, ErrorKind, LibraryErrorCode, ObjectKind, PdfBridge, PdfiumLibrary};

const GREETING: &str = "Hello from pdfbull";

/// One A4 page with a single line of Helvetica text.
fn a4_fixture() -> Vec<u8> {
    let catalog_id = Ref::new(1);
    let page_tree_id = Ref::new(2);
    let page_id = Ref::new(3);
    let font_id = Ref::new(4);
    let content_id = Ref::new(5);
    let font_name = Name(b"F1");

    let mut pdf = Pdf::new();
    pdf.catalog(catalog_id).pages(page_tree_id);
    pdf.pages(page_tree_id).kids([page_id]).count(1);

    let mut page = pdf.page(page_id);
    page.media_box(Rect::new(0.0, 0.0, 595.0, 842.0));
    page.parent(page_tree_id);
    page.contents(content_id);
    page.resources().fonts().pair(font_name, font_id);
    page.finish();

    pdf.type1_font(font_id).base_font(Name(b"Helvetica"));

    let mut content = Content::new();
    content.begin_text();
    content.set_font(font_name, 14.0);
    content.next_line(72.0, 760.0);
    content.show(Str(GREETING.as_bytes()));
    content.end_text();
    pdf.stream(content_id, &content.finish());

    pdf.finish()
}

fn pdfium_bridge() -> Option<PdfBridge<PdfiumLibrary>> {
    match PdfBridge::with_pdfium(BridgeConfig::from_env()) {
        Ok(bridge) => Some(bridge),
        Err(e) => {
            eprintln!("skipping PDFium smoke test: {e}");
            None
        }
    }
}

#[test]
fn test_open_count_render() {
    let Some(mut bridge) = pdfium_bridge() else {
        return;
    };
    let handle = bridge.open_document(a4_fixture(), None).unwrap();
    assert_eq!(bridge.page_count(handle).unwrap(), 1);

    let page = bridge.render_page(handle, 0, 1.0).unwrap();
    assert_eq!((page.width, page.height), (595, 842));
    assert_eq!(page.pixels.len(), 595 * 842 * 4);
    // Top-left corner is blank page background.
    assert_eq!(&page.pixels[..4], &[255, 255, 255, 255]);

    let page = bridge.render_page(handle, 0, 2.0).unwrap();
    assert_eq!((page.width, page.height), (1190, 1684));
}

#[test]
fn test_list_objects_reads_text_layer() {
    let Some(mut bridge) = pdfium_bridge() else {
        return;
    };
    let handle = bridge.open_document(a4_fixture(), None).unwrap();
    let objects = bridge.list_page_objects(handle, 0).unwrap();
    let text = objects
        .iter()
        .find(|o| o.kind == ObjectKind::Text)
        .and_then(|o| o.text.as_deref())
        .unwrap();
    assert!(text.contains("Hello"));
}

#[test]
fn test_edit_survives_save_and_reopen() {
    let Some(mut bridge) = pdfium_bridge() else {
        return;
    };
    let handle = bridge.open_document(a4_fixture(), None).unwrap();
    let id = bridge
        .list_page_objects(handle, 0)
        .unwrap()
        .iter()
        .position(|o| o.kind == ObjectKind::Text)
        .unwrap();
    let id = i32::try_from(id).unwrap();

    let before = bridge.render_page(handle, 0, 1.0).unwrap();
    bridge.edit_text_object(handle, 0, id, "Edited in place").unwrap();
    assert_eq!(bridge.cached_pages(handle), vec![0]);
    let edited = bridge.render_page(handle, 0, 1.0).unwrap();
    assert_ne!(before.pixels, edited.pixels);

    let saved = bridge.save_document(handle).unwrap();
    assert!(saved.starts_with(b"%PDF"));
    assert!(bridge.cached_pages(handle).is_empty());
    bridge.close_document(handle).unwrap();

    let reopened = bridge.open_document(saved.to_vec(), None).unwrap();
    let objects = bridge.list_page_objects(reopened, 0).unwrap();
    assert!(
        objects
            .iter()
            .filter_map(|o| o.text.as_deref())
            .any(|t| t.contains("Edited in place"))
    );
}

#[test]
fn test_garbage_is_format_error() {
    let Some(mut bridge) = pdfium_bridge() else {
        return;
    };
    let err = bridge
        .open_document(b"definitely not a pdf".to_vec(), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Library);
    assert_eq!(err.library_error_code(), Some(LibraryErrorCode::Format));
}

#[test]
fn test_unsupported_format_is_state_error() {
    let Some(mut bridge) = pdfium_bridge() else {
        return;
    };
    let handle = bridge.open_document(a4_fixture(), None).unwrap();
    let err = bridge
        .replace_image_object(handle, 0, 0, b"\x89PNG\r\n", "png")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert!(bridge.cached_pages(handle).is_empty());
}
