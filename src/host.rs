//! Dynamic-value entry point for script hosts.
//!
//! Hosts pass a method name and loosely typed arguments. Arity and argument
//! types are checked here, numbers are narrowed to 32-bit integers the way
//! JavaScript engines do, and results come back as [`HostValue`]s.

use bytes::Bytes;
use std::collections::BTreeMap;

use crate::backend::PdfLibrary;
use crate::bridge::PdfBridge;
use crate::error::{BridgeError, Result};
use crate::objects::PageObjectInfo;
use crate::registry::DocumentHandle;
use crate::render::RenderedPage;

/// Every method [`invoke`] understands.
pub const METHODS: [&str; 9] = [
    "openDocument",
    "closeDocument",
    "getPageCount",
    "saveDocument",
    "renderPage",
    "listPageObjects",
    "editTextObject",
    "replaceImageObject",
    "replaceImageObjectBitmap",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub enum HostValue {
    #[default]
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
    Buffer(Bytes),
    Array(Vec<HostValue>),
    Object(BTreeMap<String, HostValue>),
}

impl HostValue {
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_buffer(&self) -> Option<&Bytes> {
        match self {
            Self::Buffer(b) => Some(b),
            _ => None,
        }
    }

    /// Field of an object value.
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    fn object<const N: usize>(entries: [(&str, Self); N]) -> Self {
        Self::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffer(Bytes::from(bytes))
    }
}

impl From<Bytes> for HostValue {
    fn from(bytes: Bytes) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<RenderedPage> for HostValue {
    fn from(page: RenderedPage) -> Self {
        Self::object([
            ("data", Self::Buffer(Bytes::from(page.pixels))),
            ("width", Self::Number(f64::from(page.width))),
            ("height", Self::Number(f64::from(page.height))),
        ])
    }
}

impl From<PageObjectInfo> for HostValue {
    fn from(info: PageObjectInfo) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let id = info.id as f64;
        let mut map = BTreeMap::new();
        map.insert("id".to_string(), Self::Number(id));
        map.insert("type".to_string(), info.kind.as_str().into());
        map.insert("left".to_string(), Self::Number(f64::from(info.left)));
        map.insert("top".to_string(), Self::Number(f64::from(info.top)));
        map.insert("right".to_string(), Self::Number(f64::from(info.right)));
        map.insert("bottom".to_string(), Self::Number(f64::from(info.bottom)));
        if let Some(text) = info.text {
            map.insert("text".to_string(), Self::String(text));
        }
        Self::Object(map)
    }
}

/// Narrow a number to `i32` with ECMAScript `ToInt32` semantics: truncate,
/// wrap modulo 2^32, and map NaN and infinities to zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn to_int32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    let wrapped = value.trunc().rem_euclid(4_294_967_296.0);
    wrapped as u32 as i32
}

/// Positional arguments of one call plus the usage line reported on misuse.
struct Args<'a> {
    values: &'a [HostValue],
    usage: &'static str,
}

impl<'a> Args<'a> {
    const fn new(values: &'a [HostValue], usage: &'static str) -> Self {
        Self { values, usage }
    }

    fn invalid(&self) -> BridgeError {
        BridgeError::validation(self.usage)
    }

    fn int(&self, index: usize) -> Result<i32> {
        self.values
            .get(index)
            .and_then(HostValue::as_number)
            .map(to_int32)
            .ok_or_else(|| self.invalid())
    }

    fn number(&self, index: usize) -> Result<f64> {
        self.values
            .get(index)
            .and_then(HostValue::as_number)
            .ok_or_else(|| self.invalid())
    }

    fn handle(&self, index: usize) -> Result<DocumentHandle> {
        self.int(index).map(DocumentHandle::new)
    }

    fn string(&self, index: usize) -> Result<&'a str> {
        self.values
            .get(index)
            .and_then(HostValue::as_str)
            .ok_or_else(|| self.invalid())
    }

    fn buffer(&self, index: usize) -> Result<&'a Bytes> {
        self.values
            .get(index)
            .and_then(HostValue::as_buffer)
            .ok_or_else(|| self.invalid())
    }
}

/// Call `method` on `bridge` with host arguments.
pub fn invoke<L: PdfLibrary>(
    bridge: &mut PdfBridge<L>,
    method: &str,
    args: &[HostValue],
) -> Result<HostValue> {
    match method {
        "openDocument" => {
            let args = Args::new(args, "openDocument: first argument must be a Buffer");
            let bytes = args.buffer(0)?;
            // A non-string password is ignored.
            let password = args.values.get(1).and_then(HostValue::as_str);
            let handle = bridge.open_document(bytes.to_vec(), password)?;
            Ok(handle.get().into())
        }
        "closeDocument" => {
            let args = Args::new(args, "closeDocument: argument must be a numeric handle");
            bridge.close_document(args.handle(0)?)?;
            Ok(HostValue::Undefined)
        }
        "getPageCount" => {
            let args = Args::new(args, "getPageCount: argument must be a numeric handle");
            #[allow(clippy::cast_precision_loss)]
            let count = bridge.page_count(args.handle(0)?)? as f64;
            Ok(HostValue::Number(count))
        }
        "saveDocument" => {
            let args = Args::new(args, "saveDocument: argument must be a numeric handle");
            Ok(bridge.save_document(args.handle(0)?)?.into())
        }
        "renderPage" => {
            let args = Args::new(
                args,
                "renderPage: requires (handle: number, pageIndex: number, scale: number)",
            );
            let (handle, page, scale) = (args.handle(0)?, args.int(1)?, args.number(2)?);
            Ok(bridge.render_page(handle, page, scale)?.into())
        }
        "listPageObjects" => {
            let args = Args::new(
                args,
                "listPageObjects: requires (handle: number, pageIndex: number)",
            );
            let (handle, page) = (args.handle(0)?, args.int(1)?);
            let objects = bridge.list_page_objects(handle, page)?;
            Ok(HostValue::Array(
                objects.into_iter().map(HostValue::from).collect(),
            ))
        }
        "editTextObject" => {
            let args = Args::new(
                args,
                "editTextObject: requires (handle, pageIndex, objectId, newText)",
            );
            let (handle, page, object) = (args.handle(0)?, args.int(1)?, args.int(2)?);
            bridge.edit_text_object(handle, page, object, args.string(3)?)?;
            Ok(HostValue::Undefined)
        }
        "replaceImageObject" => {
            let args = Args::new(
                args,
                "replaceImageObject: requires \
                 (handle, pageIndex, objectId, imageData: Buffer, format: string)",
            );
            let (handle, page, object) = (args.handle(0)?, args.int(1)?, args.int(2)?);
            let (image, format) = (args.buffer(3)?, args.string(4)?);
            bridge.replace_image_object(handle, page, object, image, format)?;
            Ok(HostValue::Undefined)
        }
        "replaceImageObjectBitmap" => {
            let args = Args::new(
                args,
                "replaceImageObjectBitmap: requires \
                 (handle, pageIndex, objectId, bgraData: Buffer, width, height)",
            );
            let (handle, page, object) = (args.handle(0)?, args.int(1)?, args.int(2)?);
            let (bgra, width, height) = (args.buffer(3)?, args.int(4)?, args.int(5)?);
            bridge.replace_image_object_bitmap(handle, page, object, bgra, width, height)?;
            Ok(HostValue::Undefined)
        }
        _ => Err(BridgeError::validation(format!("unknown method: {method}"))),
    }
}
