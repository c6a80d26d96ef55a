//! Color detection: the same walk as the grayscale rewriter, answering
//! "does anything in this stream print in color?" instead of changing it.

use std::collections::BTreeMap;

use lopdf::{Document, Object, ObjectId};

use crate::color::Color;
use crate::colorspace::ColorSpace;
use crate::content::{name_operand, parse_operations, single_name_operand};
use crate::errors::{GrayscaleError, Result};
use crate::filters::Filter;
use crate::graphics::GraphicsStateTracker;
use crate::image::{ImageXObject, InlineImage};
use crate::ops::Op;
use crate::options::ConvertOptions;
use crate::pattern::Pattern;
use crate::resources::Resources;
use crate::rewrite::RecursionGuard;
use crate::shading::shading_color_space;
use crate::xobject::{FormXObject, XObject};

/// Scans content streams for color, stopping at the first colored element
#[derive(Debug)]
pub struct ColorDetector {
    options: ConvertOptions,
    guard: RecursionGuard,
}

impl ColorDetector {
    pub fn new(options: ConvertOptions) -> Self {
        let guard = RecursionGuard::new(options.max_nesting_depth);
        Self { options, guard }
    }

    /// True if the decoded content stream `content` or anything it paints
    /// (forms, patterns, shadings, images) is colored.
    pub fn contains_color(&mut self, doc: &Document, content: &[u8], resources: &Resources) -> Result<bool> {
        self.scan_nested(doc, None, content, resources)
    }

    fn scan_nested(
        &mut self,
        doc: &Document,
        id: Option<ObjectId>,
        content: &[u8],
        resources: &Resources,
    ) -> Result<bool> {
        self.guard.enter(id)?;
        let result = StreamScanner::new(self, resources).run(doc, content);
        self.guard.leave();
        result
    }
}

/// Color detection variant of [`crate::rewrite_content_stream_to_grayscale`]
pub fn stream_contains_color(
    doc: &Document,
    content: &[u8],
    resources: &Resources,
    options: &ConvertOptions,
) -> Result<bool> {
    ColorDetector::new(options.clone()).contains_color(doc, content, resources)
}

/// One scan invocation, with its own memo tables
struct StreamScanner<'a> {
    detector: &'a mut ColorDetector,
    resources: &'a Resources,
    state: GraphicsStateTracker,
    patterns: BTreeMap<String, bool>,
    shadings: BTreeMap<String, bool>,
    xobjects: BTreeMap<String, bool>,
}

impl<'a> StreamScanner<'a> {
    fn new(detector: &'a mut ColorDetector, resources: &'a Resources) -> Self {
        Self {
            detector,
            resources,
            state: GraphicsStateTracker::new(),
            patterns: BTreeMap::new(),
            shadings: BTreeMap::new(),
            xobjects: BTreeMap::new(),
        }
    }

    fn tolerance(&self) -> f32 {
        self.detector.options.color_tolerance
    }

    fn run(mut self, doc: &Document, content: &[u8]) -> Result<bool> {
        for operation in parse_operations(content)? {
            let op = Op::from_operator(&operation.operator);
            self.state.apply(doc, self.resources, op, &operation.operands)?;
            if self.is_colored(doc, op, &operation.operator, &operation.operands)? {
                log::debug!("color found at `{}` {:?}", operation.operator, operation.operands);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn is_colored(&mut self, doc: &Document, op: Op, operator: &str, operands: &[Object]) -> Result<bool> {
        match op {
            Op::SaveGraphicsState
            | Op::RestoreGraphicsState
            | Op::SetColorSpaceStroke
            | Op::SetColorSpaceFill
            | Op::Other => Ok(false),
            Op::SetColorStroke
            | Op::SetColorStrokeN
            | Op::SetColorFill
            | Op::SetColorFillN
            | Op::SetGrayStroke
            | Op::SetGrayFill
            | Op::SetRgbStroke
            | Op::SetRgbFill
            | Op::SetCmykStroke
            | Op::SetCmykFill => {
                let (space, color) = self.state.current().slot(op);
                let (space, color) = (space.clone(), color.clone());
                match color {
                    Color::Pattern { name, underlying } => {
                        if let (Some(components), ColorSpace::Pattern { underlying: Some(base) }) =
                            (underlying, &space)
                        {
                            if base.components_to_rgb(&components)?.is_colored(self.tolerance()) {
                                return Ok(true);
                            }
                        }
                        self.pattern_colored(doc, &name)
                    }
                    color => Ok(space.color_to_rgb(&color)?.is_colored(self.tolerance())),
                }
            }
            Op::PaintShading => {
                let shading = single_name_operand(operator, operands)?;
                self.shading_colored(doc, &shading)
            }
            Op::InlineImage => match operands {
                [Object::Stream(s)] => self.inline_image_colored(doc, InlineImage::new(s.clone())),
                _ => Err(GrayscaleError::operands("BI", "expected one inline image")),
            },
            Op::UseXobject => {
                if operands.is_empty() {
                    return Err(GrayscaleError::operands("Do", "missing XObject name"));
                }
                for operand in operands {
                    let xobject = name_operand("Do", operand)?;
                    if self.xobject_colored(doc, &xobject)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn pattern_colored(&mut self, doc: &Document, pattern: &str) -> Result<bool> {
        if let Some(colored) = self.patterns.get(pattern) {
            return Ok(*colored);
        }
        let colored = match self.resources.pattern(doc, pattern)? {
            // the cell of an uncolored pattern is painted with the scn color
            Pattern::Tiling(tiling) if !tiling.is_colored() => false,
            Pattern::Tiling(tiling) => {
                let content = tiling.content(doc)?;
                let resources = tiling.resources(doc)?;
                self.detector.scan_nested(doc, tiling.id, &content, &resources)?
            }
            Pattern::Shading(shading) => shading_space_colored(doc, &shading.shading)?,
        };
        self.patterns.insert(pattern.to_string(), colored);
        Ok(colored)
    }

    fn shading_colored(&mut self, doc: &Document, shading: &str) -> Result<bool> {
        if let Some(colored) = self.shadings.get(shading) {
            return Ok(*colored);
        }
        let colored = shading_space_colored(doc, &self.resources.shading(doc, shading)?)?;
        self.shadings.insert(shading.to_string(), colored);
        Ok(colored)
    }

    fn xobject_colored(&mut self, doc: &Document, xobject: &str) -> Result<bool> {
        if let Some(colored) = self.xobjects.get(xobject) {
            return Ok(*colored);
        }
        let colored = match self.resources.xobject(doc, xobject)? {
            XObject::Image(image) => self.image_colored(doc, &image)?,
            XObject::Form(form) => self.form_colored(doc, &form)?,
            XObject::Other(_) => false,
        };
        self.xobjects.insert(xobject.to_string(), colored);
        Ok(colored)
    }

    fn form_colored(&mut self, doc: &Document, form: &FormXObject) -> Result<bool> {
        let content = form.content(doc)?;
        match form.resources(doc)? {
            Some(own) => self.detector.scan_nested(doc, form.id, &content, &own),
            None => self.detector.scan_nested(doc, form.id, &content, self.resources),
        }
    }

    fn image_colored(&mut self, doc: &Document, image: &ImageXObject) -> Result<bool> {
        if image.is_image_mask(doc)? {
            return Ok(false);
        }
        let space = image.color_space(doc)?;
        if space.num_components() == 1 && !matches!(space, ColorSpace::Indexed { .. }) {
            return Ok(false);
        }
        let encoder = image.encoder(doc, self.detector.options.jpeg_quality)?;
        if encoder.uses(Filter::Jpx) {
            return Ok(true);
        }
        if encoder.is_gray_only() || encoder.uses(Filter::RunLength) {
            return Ok(false);
        }
        let decoded = image.to_image(doc)?;
        Ok(space.image_to_rgb(&decoded)?.is_colored(self.tolerance()))
    }

    fn inline_image_colored(&mut self, doc: &Document, image: InlineImage) -> Result<bool> {
        if image.is_image_mask() {
            return Ok(false);
        }
        let space = image.color_space(doc, self.resources)?;
        if space.num_components() == 1 && !matches!(space, ColorSpace::Indexed { .. }) {
            return Ok(false);
        }
        let encoder = image.encoder(doc, self.detector.options.jpeg_quality)?;
        if encoder.uses(Filter::Jpx) {
            return Ok(true);
        }
        if encoder.is_gray_only() {
            return Ok(false);
        }
        let decoded = image.to_image(doc, self.resources)?;
        Ok(space.image_to_rgb(&decoded)?.is_colored(self.tolerance()))
    }
}

/// Shadings are judged by their colorspace alone: one component is gray,
/// three or four components are color. A DeviceN or Separation space that
/// paints through DeviceGray is gray whatever its component count.
fn shading_space_colored(doc: &Document, shading: &Object) -> Result<bool> {
    let space = shading_color_space(doc, shading)?;
    if let ColorSpace::DeviceN { alternate, .. } | ColorSpace::Separation { alternate, .. } = &space {
        if matches!(**alternate, ColorSpace::DeviceGray) {
            return Ok(false);
        }
    }
    match space.num_components() {
        1 => Ok(false),
        3 | 4 => Ok(true),
        n => Err(GrayscaleError::UnsupportedColorspace { components: n }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Dictionary;

    fn detect(content: &str) -> Result<bool> {
        let doc = Document::with_version("1.5");
        stream_contains_color(&doc, content.as_bytes(), &Resources::default(), &ConvertOptions::default())
    }

    #[test]
    fn device_colors() {
        assert!(detect("1 0 0 rg 0 0 1 1 re f").unwrap());
        assert!(!detect("0.5 0.5 0.5 rg 0 0 1 1 re f").unwrap());
        assert!(!detect("0 0 0 1 k 0.2 g").unwrap());
        assert!(detect("0 1 0 0 K").unwrap());
        assert!(!detect("/DeviceRGB cs 0.2 0.2 0.2 sc").unwrap());
    }

    #[test]
    fn tolerance_applies() {
        // 2/255 apart, below the default tolerance
        assert!(!detect("0.5 0.5078 0.5 rg").unwrap());
        assert!(detect("0.5 0.53 0.5 rg").unwrap());
    }

    #[test]
    fn shading_components_decide() {
        let doc = Document::with_version("1.5");
        let shading = |cs: &str| {
            Object::Dictionary(Dictionary::from_iter(vec![
                ("ShadingType", Object::Integer(2)),
                ("ColorSpace", Object::Name(cs.as_bytes().to_vec())),
            ]))
        };
        let res = Resources::new(Dictionary::from_iter(vec![(
            "Shading",
            Object::Dictionary(Dictionary::from_iter(vec![
                ("Gray", shading("DeviceGray")),
                ("Rgb", shading("DeviceRGB")),
            ])),
        )]));
        let opts = ConvertOptions::default();
        assert!(!stream_contains_color(&doc, b"/Gray sh", &res, &opts).unwrap());
        assert!(stream_contains_color(&doc, b"/Gray sh /Rgb sh", &res, &opts).unwrap());
    }
}
