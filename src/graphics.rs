//! Color part of the graphics state, tracked while walking a content stream.

use lopdf::{Document, Object};
use smallvec::SmallVec;

use crate::color::Color;
use crate::colorspace::ColorSpace;
use crate::content::{expect_operands, name_operand, number_operands, single_name_operand};
use crate::errors::{GrayscaleError, Result};
use crate::ops::Op;
use crate::resources::Resources;

/// Current stroking and non-stroking colorspace and color
#[derive(Debug, Clone)]
pub struct GraphicsState {
    pub stroke_space: ColorSpace,
    pub stroke_color: Color,
    pub fill_space: ColorSpace,
    pub fill_color: Color,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            stroke_space: ColorSpace::DeviceGray,
            stroke_color: Color::gray(0.0),
            fill_space: ColorSpace::DeviceGray,
            fill_color: Color::gray(0.0),
        }
    }
}

impl GraphicsState {
    /// Colorspace and color of the slot `op` writes to
    pub fn slot(&self, op: Op) -> (&ColorSpace, &Color) {
        if op.is_stroking() {
            (&self.stroke_space, &self.stroke_color)
        } else {
            (&self.fill_space, &self.fill_color)
        }
    }

    fn set(&mut self, op: Op, space: ColorSpace, color: Color) {
        if op.is_stroking() {
            self.stroke_space = space;
            self.stroke_color = color;
        } else {
            self.fill_space = space;
            self.fill_color = color;
        }
    }

    fn set_color(&mut self, op: Op, color: Color) {
        if op.is_stroking() {
            self.stroke_color = color;
        } else {
            self.fill_color = color;
        }
    }
}

/// Graphics state with the `q` / `Q` stack
#[derive(Debug, Default)]
pub struct GraphicsStateTracker {
    current: GraphicsState,
    stack: Vec<GraphicsState>,
}

impl GraphicsStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &GraphicsState {
        &self.current
    }

    /// Selects `space` for the slot of `op` with its initial color, like
    /// `CS` / `cs` do
    pub fn set_color_space(&mut self, op: Op, space: ColorSpace) {
        let color = space.initial_color();
        self.current.set(op, space, color);
    }

    /// Applies the effect of one operation. Colorspace names are looked up
    /// in `resources`.
    pub fn apply(
        &mut self,
        doc: &Document,
        resources: &Resources,
        op: Op,
        operands: &[Object],
    ) -> Result<()> {
        let operator = op.operator().unwrap_or_default();
        match op {
            Op::SaveGraphicsState => self.stack.push(self.current.clone()),
            Op::RestoreGraphicsState => match self.stack.pop() {
                Some(state) => self.current = state,
                None => log::warn!("`Q` without matching `q`, ignored"),
            },
            Op::SetColorSpaceStroke | Op::SetColorSpaceFill => {
                let name = single_name_operand(operator, operands)?;
                let space = match ColorSpace::from_family_name(&name) {
                    Some(space) => space,
                    None => resources.color_space(doc, &name)?,
                };
                self.set_color_space(op, space);
            }
            Op::SetColorStroke | Op::SetColorFill => {
                let values = number_operands(operator, operands)?;
                let color = self.current.slot(op).0.color_from_components(&values)?;
                self.current.set_color(op, color);
            }
            Op::SetColorStrokeN | Op::SetColorFillN => {
                let color = self.color_n(operator, op, operands)?;
                self.current.set_color(op, color);
            }
            Op::SetGrayStroke | Op::SetGrayFill => {
                self.set_device(op, operator, operands, ColorSpace::DeviceGray)?
            }
            Op::SetRgbStroke | Op::SetRgbFill => {
                self.set_device(op, operator, operands, ColorSpace::DeviceRGB)?
            }
            Op::SetCmykStroke | Op::SetCmykFill => {
                self.set_device(op, operator, operands, ColorSpace::DeviceCMYK)?
            }
            Op::PaintShading | Op::InlineImage | Op::UseXobject | Op::Other => {}
        }
        Ok(())
    }

    /// `SCN` / `scn`: a pattern name, optionally preceded by the color of
    /// the underlying colorspace, or plain components.
    fn color_n(&self, operator: &str, op: Op, operands: &[Object]) -> Result<Color> {
        let space = self.current.slot(op).0;
        if !space.is_pattern() {
            let values = number_operands(operator, operands)?;
            return space.color_from_components(&values);
        }
        let (last, rest) = operands
            .split_last()
            .ok_or_else(|| GrayscaleError::operands(operator, "missing pattern name"))?;
        let name = name_operand(operator, last)?;
        let underlying = if rest.is_empty() {
            None
        } else {
            Some(SmallVec::from_vec(number_operands(operator, rest)?))
        };
        Ok(Color::Pattern { name, underlying })
    }

    fn set_device(&mut self, op: Op, operator: &str, operands: &[Object], space: ColorSpace) -> Result<()> {
        expect_operands(operator, operands, space.num_components())?;
        let values = number_operands(operator, operands)?;
        let color = space.color_from_components(&values)?;
        self.current.set(op, space, color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::name;
    use lopdf::Dictionary;
    use pretty_assertions::assert_eq;

    fn apply(t: &mut GraphicsStateTracker, doc: &Document, res: &Resources, op: &str, operands: Vec<Object>) -> Result<()> {
        t.apply(doc, res, Op::from_operator(op), &operands)
    }

    #[test]
    fn save_and_restore() {
        let doc = Document::with_version("1.5");
        let res = Resources::default();
        let mut t = GraphicsStateTracker::new();
        apply(&mut t, &doc, &res, "q", vec![]).unwrap();
        apply(&mut t, &doc, &res, "rg", vec![Object::Real(1.0), Object::Integer(0), Object::Integer(0)]).unwrap();
        assert!(matches!(t.current().fill_space, ColorSpace::DeviceRGB));
        apply(&mut t, &doc, &res, "Q", vec![]).unwrap();
        assert!(matches!(t.current().fill_space, ColorSpace::DeviceGray));
        // unbalanced Q is ignored
        apply(&mut t, &doc, &res, "Q", vec![]).unwrap();
        assert!(matches!(t.current().fill_space, ColorSpace::DeviceGray));
    }

    #[test]
    fn named_colorspaces_and_patterns() {
        let doc = Document::with_version("1.5");
        let res = Resources::new(Dictionary::from_iter(vec![(
            "ColorSpace",
            Object::Dictionary(Dictionary::from_iter(vec![
                ("Cs1", name("DeviceCMYK")),
                (
                    "P0",
                    Object::Array(vec![name("Pattern"), name("DeviceRGB")]),
                ),
            ])),
        )]));
        let mut t = GraphicsStateTracker::new();
        apply(&mut t, &doc, &res, "CS", vec![name("Cs1")]).unwrap();
        assert!(matches!(t.current().stroke_space, ColorSpace::DeviceCMYK));
        assert_eq!(t.current().stroke_color, Color::Components(SmallVec::from_slice(&[0.0, 0.0, 0.0, 1.0])));

        apply(&mut t, &doc, &res, "cs", vec![name("P0")]).unwrap();
        apply(&mut t, &doc, &res, "scn", vec![Object::Real(0.5), Object::Integer(0), Object::Integer(1), name("Tile")]).unwrap();
        assert_eq!(
            t.current().fill_color,
            Color::Pattern {
                name: "Tile".into(),
                underlying: Some(SmallVec::from_slice(&[0.5, 0.0, 1.0])),
            }
        );
    }

    #[test]
    fn malformed_operands() {
        let doc = Document::with_version("1.5");
        let res = Resources::default();
        let mut t = GraphicsStateTracker::new();
        assert!(matches!(
            apply(&mut t, &doc, &res, "k", vec![Object::Integer(0)]),
            Err(GrayscaleError::MalformedOperands { .. })
        ));
        assert!(matches!(
            apply(&mut t, &doc, &res, "cs", vec![name("Missing")]),
            Err(GrayscaleError::UndefinedResource { .. })
        ));
    }
}
