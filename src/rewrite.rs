//! Content stream rewriter: turns every color operator, image, shading and
//! pattern reachable from a content stream into its grayscale equivalent.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId};
use serde_derive::Serialize;

use crate::color::{cmyk_to_gray, rgb_to_gray, Color};
use crate::colorspace::ColorSpace;
use crate::content::{
    encode_operations, expect_operands, gray_operand, name_operand, number_operands,
    parse_operations, single_name_operand,
};
use crate::errors::{GrayscaleError, Result};
use crate::filters::Filter;
use crate::graphics::GraphicsStateTracker;
use crate::image::{encode_with_fallback, ImageXObject, InlineImage};
use crate::ops::Op;
use crate::options::ConvertOptions;
use crate::pattern::to_gray_pattern;
use crate::resources::{EntryLocation, ResourceKind, Resources};
use crate::shading::to_gray_shading;
use crate::utils::name;
use crate::xobject::{FormXObject, XObject};

/// Counters collected over all content streams a converter rewrote
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStats {
    /// Content streams rewritten, including forms and pattern cells
    pub streams_rewritten: usize,
    /// Color operators replaced by their gray counterpart
    pub operators_rewritten: usize,
    pub patterns_converted: usize,
    pub shadings_converted: usize,
    /// Distinct XObject names handled by `Do`, per content stream
    pub xobjects_processed: usize,
    pub images_converted: usize,
    pub forms_converted: usize,
}

/// Keeps track of the forms and patterns currently being walked, to stop
/// on cycles and on runaway nesting.
#[derive(Debug)]
pub(crate) struct RecursionGuard {
    active: Vec<Option<ObjectId>>,
    max_depth: usize,
}

impl RecursionGuard {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            active: Vec::new(),
            max_depth,
        }
    }

    pub(crate) fn enter(&mut self, id: Option<ObjectId>) -> Result<()> {
        if let Some(id) = id {
            if self.active.contains(&Some(id)) {
                return Err(GrayscaleError::CyclicReference(id.0, id.1));
            }
        }
        if self.active.len() > self.max_depth {
            return Err(GrayscaleError::NestingTooDeep(self.max_depth));
        }
        self.active.push(id);
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.active.pop();
    }
}

/// Rewrites content streams to grayscale, keeping options and statistics
/// across the streams of a document.
#[derive(Debug)]
pub struct GrayscaleConverter {
    options: ConvertOptions,
    stats: ConversionStats,
    guard: RecursionGuard,
    /// Pattern colorspaces already switched to a DeviceGray underlying
    /// space, with the space they had before. Streams read later still
    /// carry components of the original space.
    converted_spaces: BTreeMap<EntryLocation, ColorSpace>,
}

impl GrayscaleConverter {
    pub fn new(options: ConvertOptions) -> Self {
        let guard = RecursionGuard::new(options.max_nesting_depth);
        Self {
            options,
            stats: ConversionStats::default(),
            guard,
            converted_spaces: BTreeMap::new(),
        }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn stats(&self) -> &ConversionStats {
        &self.stats
    }

    /// Rewrites the decoded content stream `content`, converting the
    /// resources it uses along the way. Returns the new content stream.
    pub fn rewrite(
        &mut self,
        doc: &mut Document,
        content: &[u8],
        resources: &mut Resources,
    ) -> Result<Vec<u8>> {
        self.rewrite_nested(doc, None, content, resources)
    }

    /// Rewrites the content of the form or pattern `id`
    pub(crate) fn rewrite_nested(
        &mut self,
        doc: &mut Document,
        id: Option<ObjectId>,
        content: &[u8],
        resources: &mut Resources,
    ) -> Result<Vec<u8>> {
        let (rewritten, pattern_spaces) = self.rewrite_stream(doc, id, content, resources)?;
        self.convert_pattern_spaces(doc, resources, pattern_spaces)?;
        Ok(rewritten)
    }

    /// Rewrites one stream. Returns the new content and the named Pattern
    /// colorspaces it selected, which are left to the owner of `resources`.
    fn rewrite_stream(
        &mut self,
        doc: &mut Document,
        id: Option<ObjectId>,
        content: &[u8],
        resources: &mut Resources,
    ) -> Result<(Vec<u8>, BTreeSet<String>)> {
        self.guard.enter(id)?;
        let result = StreamRewriter::new(self, resources).run(doc, content);
        self.guard.leave();
        if result.is_ok() {
            self.stats.streams_rewritten += 1;
        }
        result
    }

    /// Sets the underlying space of each named Pattern colorspace to
    /// DeviceGray. The `scn` operands were converted to gray already.
    fn convert_pattern_spaces(
        &mut self,
        doc: &mut Document,
        resources: &mut Resources,
        names: BTreeSet<String>,
    ) -> Result<()> {
        for cs_name in names {
            let location = resources.entry_location(doc, ResourceKind::ColorSpace, &cs_name)?;
            if location.as_ref().is_some_and(|l| self.converted_spaces.contains_key(l)) {
                continue;
            }
            let space = resources.color_space(doc, &cs_name)?;
            if let ColorSpace::Pattern { underlying: Some(_) } = space {
                let gray = space.to_grayscale_colorspace()?;
                resources.set_color_space(doc, &cs_name, &gray)?;
                if let Some(location) = location {
                    self.converted_spaces.insert(location, space);
                }
                log::debug!("pattern colorspace /{cs_name} now uses DeviceGray");
            }
        }
        Ok(())
    }

    /// The space a Pattern colorspace had before it was converted
    fn original_pattern_space(
        &self,
        doc: &Document,
        resources: &Resources,
        cs_name: &str,
    ) -> Result<Option<ColorSpace>> {
        if self.converted_spaces.is_empty() {
            return Ok(None);
        }
        Ok(resources
            .entry_location(doc, ResourceKind::ColorSpace, cs_name)?
            .and_then(|l| self.converted_spaces.get(&l).cloned()))
    }
}

/// Converts a decoded content stream and everything it references to
/// grayscale. `resources` is the resource dictionary of the stream.
pub fn rewrite_content_stream_to_grayscale(
    doc: &mut Document,
    content: &[u8],
    resources: &mut Resources,
    options: &ConvertOptions,
) -> Result<Vec<u8>> {
    GrayscaleConverter::new(options.clone()).rewrite(doc, content, resources)
}

/// State of one rewrite invocation. The name sets are per invocation: a
/// nested form gets fresh ones, even if it shares the resource dictionary.
struct StreamRewriter<'a> {
    converter: &'a mut GrayscaleConverter,
    resources: &'a mut Resources,
    state: GraphicsStateTracker,
    patterns: BTreeSet<String>,
    shadings: BTreeSet<String>,
    xobjects: BTreeSet<String>,
    /// Named Pattern colorspaces whose underlying space becomes DeviceGray
    /// once the stream is done
    pattern_spaces: BTreeSet<String>,
}

impl<'a> StreamRewriter<'a> {
    fn new(converter: &'a mut GrayscaleConverter, resources: &'a mut Resources) -> Self {
        Self {
            converter,
            resources,
            state: GraphicsStateTracker::new(),
            patterns: BTreeSet::new(),
            shadings: BTreeSet::new(),
            xobjects: BTreeSet::new(),
            pattern_spaces: BTreeSet::new(),
        }
    }

    fn run(mut self, doc: &mut Document, content: &[u8]) -> Result<(Vec<u8>, BTreeSet<String>)> {
        let operations = parse_operations(content)?;
        let mut out = Vec::with_capacity(operations.len());
        for operation in operations {
            let op = Op::from_operator(&operation.operator);
            self.state.apply(doc, self.resources, op, &operation.operands)?;
            self.handle(doc, op, operation, &mut out)?;
        }
        Ok((encode_operations(&out)?, self.pattern_spaces))
    }

    fn handle(
        &mut self,
        doc: &mut Document,
        op: Op,
        operation: Operation,
        out: &mut Vec<Operation>,
    ) -> Result<()> {
        match op {
            Op::SaveGraphicsState | Op::RestoreGraphicsState | Op::Other => out.push(operation),
            Op::SetGrayStroke | Op::SetGrayFill => out.push(operation),
            Op::SetColorSpaceStroke | Op::SetColorSpaceFill => {
                let (space, _) = self.state.current().slot(op);
                if space.is_pattern() {
                    let cs_name = single_name_operand(&operation.operator, &operation.operands)?;
                    if cs_name != "Pattern" {
                        if let Some(original) =
                            self.converter.original_pattern_space(doc, self.resources, &cs_name)?
                        {
                            self.state.set_color_space(op, original);
                        }
                        self.pattern_spaces.insert(cs_name);
                    }
                    out.push(operation);
                } else {
                    self.emit(out, &operation, Operation::new(&operation.operator, vec![name("DeviceGray")]));
                }
            }
            Op::SetColorStroke | Op::SetColorStrokeN | Op::SetColorFill | Op::SetColorFillN => {
                let (space, color) = self.state.current().slot(op);
                let (space, color) = (space.clone(), color.clone());
                let operands = match color {
                    Color::Pattern { name: pattern, underlying } => {
                        self.convert_pattern(doc, &pattern)?;
                        let mut operands = Vec::with_capacity(2);
                        if let Some(components) = underlying {
                            let base = match &space {
                                ColorSpace::Pattern {
                                    underlying: Some(base),
                                } => base,
                                other => {
                                    return Err(GrayscaleError::mismatch(
                                        "pattern colorspace with underlying space",
                                        other,
                                    ))
                                }
                            };
                            operands.push(gray_operand(base.components_to_rgb(&components)?.to_gray().into()));
                        }
                        operands.push(name(&pattern));
                        operands
                    }
                    color => vec![gray_operand(space.color_to_gray(&color)?.into())],
                };
                self.emit(out, &operation, Operation::new(&operation.operator, operands));
            }
            Op::SetRgbStroke | Op::SetRgbFill => {
                expect_operands(&operation.operator, &operation.operands, 3)?;
                let v = number_operands(&operation.operator, &operation.operands)?;
                let gray = rgb_to_gray(v[0].into(), v[1].into(), v[2].into());
                self.emit(out, &operation, Operation::new(op.gray_operator(), vec![gray_operand(gray)]));
            }
            Op::SetCmykStroke | Op::SetCmykFill => {
                expect_operands(&operation.operator, &operation.operands, 4)?;
                let v = number_operands(&operation.operator, &operation.operands)?;
                let gray = cmyk_to_gray(v[0].into(), v[1].into(), v[2].into(), v[3].into());
                self.emit(out, &operation, Operation::new(op.gray_operator(), vec![gray_operand(gray)]));
            }
            Op::PaintShading => {
                let shading = single_name_operand(&operation.operator, &operation.operands)?;
                self.convert_shading(doc, &shading)?;
                out.push(operation);
            }
            Op::InlineImage => {
                let stream = match operation.operands.as_slice() {
                    [Object::Stream(s)] => s.clone(),
                    _ => return Err(GrayscaleError::operands("BI", "expected one inline image")),
                };
                let image = self.convert_inline_image(doc, InlineImage::new(stream))?;
                out.push(Operation::new("BI", vec![Object::Stream(image.stream)]));
            }
            Op::UseXobject => {
                if operation.operands.is_empty() {
                    return Err(GrayscaleError::operands("Do", "missing XObject name"));
                }
                for operand in &operation.operands {
                    let xobject = name_operand("Do", operand)?;
                    if self.xobjects.insert(xobject.clone()) {
                        self.converter.stats.xobjects_processed += 1;
                        self.convert_xobject(doc, &xobject)?;
                    } else {
                        log::debug!("XObject /{xobject} already processed");
                    }
                }
                out.push(operation);
            }
        }
        Ok(())
    }

    fn emit(&mut self, out: &mut Vec<Operation>, old: &Operation, new: Operation) {
        log::trace!(
            "{:?} {} -> {:?} {}",
            old.operands,
            old.operator,
            new.operands,
            new.operator
        );
        self.converter.stats.operators_rewritten += 1;
        out.push(new);
    }

    fn convert_pattern(&mut self, doc: &mut Document, pattern: &str) -> Result<()> {
        if !self.patterns.insert(pattern.to_string()) {
            log::debug!("pattern /{pattern} already converted");
            return Ok(());
        }
        let original = self.resources.pattern(doc, pattern)?;
        let converted = to_gray_pattern(self.converter, doc, original)?;
        self.resources.set_pattern(doc, pattern, converted)?;
        self.converter.stats.patterns_converted += 1;
        log::debug!("converted pattern /{pattern}");
        Ok(())
    }

    fn convert_shading(&mut self, doc: &mut Document, shading: &str) -> Result<()> {
        if !self.shadings.insert(shading.to_string()) {
            log::debug!("shading /{shading} already converted");
            return Ok(());
        }
        let original = self.resources.shading(doc, shading)?;
        let converted = to_gray_shading(doc, original)?;
        self.resources.set_shading(doc, shading, converted)?;
        self.converter.stats.shadings_converted += 1;
        log::debug!("converted shading /{shading}");
        Ok(())
    }

    fn convert_xobject(&mut self, doc: &mut Document, xobject: &str) -> Result<()> {
        match self.resources.xobject(doc, xobject)? {
            XObject::Image(image) => {
                if let Some(image) = self.convert_image(doc, xobject, image)? {
                    self.resources.set_xobject(doc, xobject, XObject::Image(image))?;
                    self.converter.stats.images_converted += 1;
                }
            }
            XObject::Form(form) => {
                let form = self.convert_form(doc, form)?;
                self.resources.set_xobject(doc, xobject, XObject::Form(form))?;
                self.converter.stats.forms_converted += 1;
            }
            XObject::Other(_) => log::debug!("XObject /{xobject} is neither image nor form, skipped"),
        }
        Ok(())
    }

    fn convert_form(&mut self, doc: &mut Document, mut form: FormXObject) -> Result<FormXObject> {
        let content = form.content(doc)?;
        let rewritten = match form.resources(doc)? {
            Some(mut own) => {
                let rewritten = self.converter.rewrite_nested(doc, form.id, &content, &mut own)?;
                if let Resources::Direct(_) = own {
                    form.set_resources(own);
                }
                rewritten
            }
            None => {
                let (rewritten, pattern_spaces) =
                    self.converter
                        .rewrite_stream(doc, form.id, &content, self.resources)?;
                self.pattern_spaces.extend(pattern_spaces);
                rewritten
            }
        };
        form.set_content(rewritten, self.converter.options.compress_streams)?;
        Ok(form)
    }

    /// Converts an image XObject. `None` if the image stays as it is.
    fn convert_image(
        &mut self,
        doc: &mut Document,
        xobject: &str,
        image: ImageXObject,
    ) -> Result<Option<ImageXObject>> {
        if image.is_image_mask(doc)? {
            log::debug!("image /{xobject} is a stencil mask, skipped");
            return Ok(None);
        }
        let space = image.color_space(doc)?;
        if let ColorSpace::Indexed { .. } = space {
            let gray = space.to_grayscale_colorspace()?.to_object(doc);
            return Ok(Some(image.with_color_space(gray)));
        }
        if space.num_components() == 1 {
            log::debug!("image /{xobject} has one component, skipped");
            return Ok(None);
        }
        let mut encoder = image.encoder(doc, self.converter.options.jpeg_quality)?;
        if self.converter.options.ignore_gray_filters && encoder.is_gray_only() {
            log::debug!("image /{xobject} uses a bilevel codec, skipped");
            return Ok(None);
        }
        if encoder.uses(Filter::RunLength) && image.has_smask() {
            log::debug!("image /{xobject} is RunLength encoded with a soft mask, skipped");
            return Ok(None);
        }
        if encoder.uses(Filter::Jpx) {
            log::warn!("image /{xobject} is JPXDecode encoded, left in color");
            return Ok(None);
        }

        let decoded = image.to_image(doc)?;
        let gray = space.image_to_rgb(&decoded)?.to_gray();
        encoder.set_dct_components(1);
        let (data, encoder) = encode_with_fallback(&gray, encoder)?;
        log::debug!("converted image /{xobject} ({}x{})", gray.width, gray.height);
        Ok(Some(ImageXObject::new(image.from_gray(&gray, &encoder, data))))
    }

    fn convert_inline_image(&mut self, doc: &mut Document, image: InlineImage) -> Result<InlineImage> {
        if image.is_image_mask() {
            return Ok(image);
        }
        let space = image.color_space(doc, self.resources)?;
        if let ColorSpace::Indexed { .. } = space {
            let gray = space.to_grayscale_colorspace()?.to_object(doc);
            return Ok(image.with_color_space(gray));
        }
        if space.num_components() == 1 {
            return Ok(image);
        }
        let mut encoder = image.encoder(doc, self.converter.options.jpeg_quality)?;
        if self.converter.options.ignore_gray_filters && encoder.is_gray_only() {
            log::debug!("inline image uses a bilevel codec, skipped");
            return Ok(image);
        }
        if encoder.uses(Filter::Jpx) {
            log::warn!("inline image is JPXDecode encoded, left in color");
            return Ok(image);
        }

        let decoded = image.to_image(doc, self.resources)?;
        let gray = space.image_to_rgb(&decoded)?.to_gray();
        encoder.set_dct_components(1);
        self.converter.stats.images_converted += 1;
        image.from_gray(&gray, encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Dictionary;
    use pretty_assertions::assert_eq;

    fn rewrite(content: &str, resources: &mut Resources, doc: &mut Document) -> String {
        let out = rewrite_content_stream_to_grayscale(doc, content.as_bytes(), resources, &ConvertOptions::default())
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn device_colors() {
        let mut doc = Document::with_version("1.5");
        let mut res = Resources::default();
        assert_eq!(rewrite("1 0 0 rg", &mut res, &mut doc), "0.3 g\n");
        assert_eq!(rewrite("0 0 0 1 k", &mut res, &mut doc), "0 g\n");
        assert_eq!(rewrite("0 0 0 0 K", &mut res, &mut doc), "1 G\n");
        assert_eq!(rewrite("0.5 G", &mut res, &mut doc), "0.5 G\n");
    }

    #[test]
    fn colorspace_operators() {
        let mut doc = Document::with_version("1.5");
        let mut res = Resources::default();
        assert_eq!(
            rewrite("/DeviceRGB cs 0 1 0 sc", &mut res, &mut doc),
            "/DeviceGray cs\n0.59 sc\n"
        );
        assert_eq!(
            rewrite("/DeviceCMYK CS 0 0 0 1 SC", &mut res, &mut doc),
            "/DeviceGray CS\n0 SC\n"
        );
    }

    #[test]
    fn unbalanced_restore_is_ignored() {
        let mut doc = Document::with_version("1.5");
        let mut res = Resources::default();
        assert_eq!(rewrite("Q 1 0 0 rg", &mut res, &mut doc), "Q\n0.3 g\n");
    }

    #[test]
    fn errors_abort() {
        let mut doc = Document::with_version("1.5");
        let mut res = Resources::default();
        let opts = ConvertOptions::default();
        assert!(matches!(
            rewrite_content_stream_to_grayscale(&mut doc, b"/Missing sh", &mut res, &opts),
            Err(GrayscaleError::UndefinedResource { .. })
        ));
        assert!(matches!(
            rewrite_content_stream_to_grayscale(&mut doc, b"1 0 rg", &mut res, &opts),
            Err(GrayscaleError::MalformedOperands { .. })
        ));
        assert!(matches!(
            rewrite_content_stream_to_grayscale(&mut doc, b"Do", &mut res, &opts),
            Err(GrayscaleError::MalformedOperands { .. })
        ));
    }

    #[test]
    fn recursion_guard() {
        let mut guard = RecursionGuard::new(2);
        guard.enter(None).unwrap();
        guard.enter(Some((4, 0))).unwrap();
        assert!(matches!(guard.enter(Some((4, 0))), Err(GrayscaleError::CyclicReference(4, 0))));
        guard.enter(Some((5, 0))).unwrap();
        assert!(matches!(guard.enter(Some((6, 0))), Err(GrayscaleError::NestingTooDeep(2))));
        guard.leave();
        guard.enter(Some((6, 0))).unwrap();
    }

    #[test]
    fn stats_count_rewritten_operators() {
        let mut doc = Document::with_version("1.5");
        let mut res = Resources::new(Dictionary::new());
        let mut converter = GrayscaleConverter::new(ConvertOptions::default());
        converter.rewrite(&mut doc, b"1 0 0 rg 0 0 1 RG 0 g", &mut res).unwrap();
        assert_eq!(converter.stats().operators_rewritten, 2);
        assert_eq!(converter.stats().streams_rewritten, 1);
    }
}
