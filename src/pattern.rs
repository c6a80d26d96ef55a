//! Tiling and shading patterns of the `/Pattern` resource category.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::errors::{GrayscaleError, Result};
use crate::filters::decode_stream_content;
use crate::resources::Resources;
use crate::rewrite::GrayscaleConverter;
use crate::shading::to_gray_shading;
use crate::utils::{dict_get, resolve_with_id, to_i64};
use crate::xobject::set_stream_content;

#[derive(Debug, Clone)]
pub enum Pattern {
    /// `/PatternType 1`
    Tiling(TilingPattern),
    /// `/PatternType 2`
    Shading(ShadingPattern),
}

/// Pattern cell described by a content stream
#[derive(Debug, Clone)]
pub struct TilingPattern {
    pub id: Option<ObjectId>,
    pub stream: Stream,
    /// 1 = colored (the cell sets its own colors), 2 = uncolored (painted
    /// with the color given at `scn`)
    pub paint_type: i64,
}

#[derive(Debug, Clone)]
pub struct ShadingPattern {
    pub dict: Dictionary,
    /// The resolved `/Shading` entry
    pub shading: Object,
    /// Object id of the shading, if `/Shading` is a reference
    pub shading_id: Option<ObjectId>,
}

impl Pattern {
    pub fn from_object(doc: &Document, id: Option<ObjectId>, obj: Object) -> Result<Self> {
        let pattern_type = match &obj {
            Object::Dictionary(d) => dict_get(doc, d, b"PatternType")?.and_then(to_i64),
            Object::Stream(s) => dict_get(doc, &s.dict, b"PatternType")?.and_then(to_i64),
            other => return Err(GrayscaleError::mismatch("pattern", other)),
        };
        match (pattern_type, obj) {
            (Some(1), Object::Stream(stream)) => {
                let paint_type = dict_get(doc, &stream.dict, b"PaintType")?
                    .and_then(to_i64)
                    .unwrap_or(1);
                Ok(Pattern::Tiling(TilingPattern {
                    id,
                    stream,
                    paint_type,
                }))
            }
            (Some(2), Object::Dictionary(dict)) => ShadingPattern::new(doc, dict),
            (Some(2), Object::Stream(stream)) => ShadingPattern::new(doc, stream.dict),
            (t, obj) => Err(GrayscaleError::mismatch(
                "tiling pattern stream or shading pattern dictionary",
                format!("pattern type {t:?}: {obj:?}"),
            )),
        }
    }

    pub fn into_object(self) -> Object {
        match self {
            Pattern::Tiling(t) => Object::Stream(t.stream),
            Pattern::Shading(s) => Object::Dictionary(s.dict),
        }
    }
}

impl ShadingPattern {
    fn new(doc: &Document, dict: Dictionary) -> Result<Pattern> {
        let entry = dict
            .get(b"Shading")
            .map_err(|_| GrayscaleError::mismatch("shading pattern with /Shading", &dict))?;
        let (shading_id, shading) = resolve_with_id(doc, entry)?;
        let shading = shading.clone();
        Ok(Pattern::Shading(ShadingPattern {
            dict,
            shading,
            shading_id,
        }))
    }
}

impl TilingPattern {
    pub fn is_colored(&self) -> bool {
        self.paint_type == 1
    }

    pub fn content(&self, doc: &Document) -> Result<Vec<u8>> {
        decode_stream_content(doc, &self.stream)
    }

    pub fn set_content(&mut self, content: Vec<u8>, compress: bool) -> Result<()> {
        set_stream_content(&mut self.stream, content, compress)
    }

    /// Resources of the pattern cell. A pattern without resources gets an
    /// empty dictionary, it never inherits from the painter.
    pub fn resources(&self, doc: &Document) -> Result<Resources> {
        match self.stream.dict.get(b"Resources") {
            Ok(entry) => Resources::from_entry(doc, entry),
            Err(_) => Ok(Resources::default()),
        }
    }

    pub fn set_resources(&mut self, resources: Resources) {
        self.stream.dict.set("Resources", resources.into_object());
    }
}

/// Converts a pattern to grayscale. Colored tiling patterns have their
/// cell rewritten, uncolored ones get their color from the (already
/// converted) `scn` operands and stay as they are. Shading patterns have
/// their shading converted.
pub fn to_gray_pattern(
    converter: &mut GrayscaleConverter,
    doc: &mut Document,
    pattern: Pattern,
) -> Result<Pattern> {
    match pattern {
        Pattern::Tiling(mut tiling) if tiling.is_colored() => {
            let content = tiling.content(doc)?;
            let mut resources = tiling.resources(doc)?;
            let rewritten = converter.rewrite_nested(doc, tiling.id, &content, &mut resources)?;
            tiling.set_content(rewritten, converter.options().compress_streams)?;
            if let Resources::Direct(_) = resources {
                tiling.set_resources(resources);
            }
            Ok(Pattern::Tiling(tiling))
        }
        Pattern::Tiling(tiling) => Ok(Pattern::Tiling(tiling)),
        Pattern::Shading(mut shading) => {
            let converted = to_gray_shading(doc, shading.shading)?;
            match shading.shading_id {
                Some(id) => {
                    doc.objects.insert(id, converted.clone());
                }
                None => shading.dict.set("Shading", converted.clone()),
            }
            shading.shading = converted;
            Ok(Pattern::Shading(shading))
        }
    }
}
