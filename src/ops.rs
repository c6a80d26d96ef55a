/// Content stream operators the grayscale rewriter and the color detector
/// react to. Everything else is `Other` and passes through untouched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// `q` - Saves the graphics state on the stack
    SaveGraphicsState,
    /// `Q` - Pops the last graphics state off the stack
    RestoreGraphicsState,
    /// `CS` - Sets the color space for stroking operations
    SetColorSpaceStroke,
    /// `cs` - Sets the color space for fill operations
    SetColorSpaceFill,
    /// `SC` - Stroke color, components only
    SetColorStroke,
    /// `SCN` - Stroke color, may name a pattern
    SetColorStrokeN,
    /// `sc` - Fill color, components only
    SetColorFill,
    /// `scn` - Fill color, may name a pattern
    SetColorFillN,
    /// `G`
    SetGrayStroke,
    /// `g`
    SetGrayFill,
    /// `RG`
    SetRgbStroke,
    /// `rg`
    SetRgbFill,
    /// `K`
    SetCmykStroke,
    /// `k`
    SetCmykFill,
    /// `sh` - Paints a shading over the current clip
    PaintShading,
    /// `BI` - Inline image, dictionary and data in one operation
    InlineImage,
    /// `Do` - Paints an XObject
    UseXobject,
    /// Any other operator
    Other,
}

impl Op {
    pub fn from_operator(operator: &str) -> Self {
        match operator {
            "q" => Op::SaveGraphicsState,
            "Q" => Op::RestoreGraphicsState,
            "CS" => Op::SetColorSpaceStroke,
            "cs" => Op::SetColorSpaceFill,
            "SC" => Op::SetColorStroke,
            "SCN" => Op::SetColorStrokeN,
            "sc" => Op::SetColorFill,
            "scn" => Op::SetColorFillN,
            "G" => Op::SetGrayStroke,
            "g" => Op::SetGrayFill,
            "RG" => Op::SetRgbStroke,
            "rg" => Op::SetRgbFill,
            "K" => Op::SetCmykStroke,
            "k" => Op::SetCmykFill,
            "sh" => Op::PaintShading,
            "BI" => Op::InlineImage,
            "Do" => Op::UseXobject,
            _ => Op::Other,
        }
    }

    /// Operator keyword, `None` for `Other`
    pub fn operator(&self) -> Option<&'static str> {
        let s = match self {
            Op::SaveGraphicsState => "q",
            Op::RestoreGraphicsState => "Q",
            Op::SetColorSpaceStroke => "CS",
            Op::SetColorSpaceFill => "cs",
            Op::SetColorStroke => "SC",
            Op::SetColorStrokeN => "SCN",
            Op::SetColorFill => "sc",
            Op::SetColorFillN => "scn",
            Op::SetGrayStroke => "G",
            Op::SetGrayFill => "g",
            Op::SetRgbStroke => "RG",
            Op::SetRgbFill => "rg",
            Op::SetCmykStroke => "K",
            Op::SetCmykFill => "k",
            Op::PaintShading => "sh",
            Op::InlineImage => "BI",
            Op::UseXobject => "Do",
            Op::Other => return None,
        };
        Some(s)
    }

    /// Whether the operator changes the stroking (as opposed to the fill)
    /// color slot. Only meaningful for color operators.
    pub fn is_stroking(&self) -> bool {
        matches!(
            self,
            Op::SetColorSpaceStroke
                | Op::SetColorStroke
                | Op::SetColorStrokeN
                | Op::SetGrayStroke
                | Op::SetRgbStroke
                | Op::SetCmykStroke
        )
    }

    /// The gray operator (`G` or `g`) for the same color slot
    pub fn gray_operator(&self) -> &'static str {
        if self.is_stroking() {
            "G"
        } else {
            "g"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn operator_names_roundtrip() {
        for name in [
            "q", "Q", "CS", "cs", "SC", "SCN", "sc", "scn", "G", "g", "RG", "rg", "K", "k", "sh",
            "BI", "Do",
        ] {
            assert_eq!(Op::from_operator(name).operator(), Some(name));
        }
        assert_eq!(Op::from_operator("re"), Op::Other);
        assert_eq!(Op::Other.operator(), None);
    }

    #[test]
    fn stroking_slot() {
        assert_eq!(Op::SetRgbStroke.gray_operator(), "G");
        assert_eq!(Op::SetCmykFill.gray_operator(), "g");
        assert!(Op::SetColorStrokeN.is_stroking());
        assert!(!Op::SetColorFillN.is_stroking());
    }
}
