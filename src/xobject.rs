use lopdf::{Document, Object, ObjectId, Stream};

use crate::errors::{GrayscaleError, Result};
use crate::filters::{decode_stream_content, encode_flate};
use crate::image::ImageXObject;
use crate::resources::Resources;
use crate::utils::{as_name, dict_get, name};

/* Parent: Resources dictionary of the page or form */
/// External object, invoked from a content stream with the `/Do` operator
#[derive(Debug, Clone)]
pub enum XObject {
    /* /Subtype /Image */
    /// Image XObject, for images
    Image(ImageXObject),
    /* /Subtype /Form */
    /// Form XObject, a reusable content stream with its own resources
    Form(FormXObject),
    /// Any other subtype (`/PS`, or broken files without `/Subtype`).
    /// Passed through untouched.
    Other(Stream),
}

impl XObject {
    /// Reads a resolved `/XObject` entry. `id` is the object id of the
    /// stream, if the entry was an indirect reference.
    pub fn from_object(doc: &Document, id: Option<ObjectId>, obj: Object) -> Result<Self> {
        let stream = match obj {
            Object::Stream(s) => s,
            other => return Err(GrayscaleError::mismatch("XObject stream", other)),
        };
        let subtype = dict_get(doc, &stream.dict, b"Subtype")?.and_then(as_name);
        Ok(match subtype.as_deref() {
            Some("Image") => XObject::Image(ImageXObject::new(stream)),
            Some("Form") => XObject::Form(FormXObject { id, stream }),
            _ => XObject::Other(stream),
        })
    }

    pub fn into_object(self) -> Object {
        match self {
            XObject::Image(i) => Object::Stream(i.stream),
            XObject::Form(f) => Object::Stream(f.stream),
            XObject::Other(s) => Object::Stream(s),
        }
    }
}

/// __THIS IS NOT A PDF FORM!__ A form `XObject` is a content stream that
/// can be painted any number of times, with an optional `/Resources`
/// dictionary of its own. Without one, the form uses the resources of
/// the content stream that paints it.
#[derive(Debug, Clone)]
pub struct FormXObject {
    /// Object id of the form stream, used to detect forms that paint themselves
    pub id: Option<ObjectId>,
    pub stream: Stream,
}

impl FormXObject {
    pub fn new(stream: Stream) -> Self {
        Self { id: None, stream }
    }

    /// Decoded content stream of the form
    pub fn content(&self, doc: &Document) -> Result<Vec<u8>> {
        decode_stream_content(doc, &self.stream)
    }

    /// Replaces the content stream, dropping the old filters
    pub fn set_content(&mut self, content: Vec<u8>, compress: bool) -> Result<()> {
        set_stream_content(&mut self.stream, content, compress)
    }

    /// Own resources of the form, `None` if it inherits the painter's
    pub fn resources(&self, doc: &Document) -> Result<Option<Resources>> {
        match self.stream.dict.get(b"Resources") {
            Ok(entry) => Ok(Some(Resources::from_entry(doc, entry)?)),
            Err(_) => Ok(None),
        }
    }

    pub fn set_resources(&mut self, resources: Resources) {
        self.stream.dict.set("Resources", resources.into_object());
    }
}

/// Stores `content` as the new data of `stream`, flate compressed if
/// `compress` is set.
pub(crate) fn set_stream_content(stream: &mut Stream, content: Vec<u8>, compress: bool) -> Result<()> {
    stream.dict.remove(b"DecodeParms");
    stream.dict.remove(b"Filter");
    if compress {
        let data = encode_flate(&content)?;
        stream.dict.set("Filter", name("FlateDecode"));
        stream.set_content(data);
    } else {
        stream.set_content(content);
    }
    stream.allows_compression = false;
    Ok(())
}
