//! Color values and the gray conversion math shared by the rewriter and the
//! color detector.

use smallvec::SmallVec;

/// Luma weights. The tint transform programs in `function` use the same numbers.
pub const GRAY_WEIGHT_R: f64 = 0.3;
pub const GRAY_WEIGHT_G: f64 = 0.59;
pub const GRAY_WEIGHT_B: f64 = 0.11;

/// Color components of a non-pattern color, one per colorspace component
pub type Components = SmallVec<[f32; 4]>;

/// Current color of a graphics state slot
#[derive(Debug, Clone, PartialEq)]
pub enum Color {
    /// Plain color, matching the component count of the active colorspace
    Components(Components),
    /// Color selected in a `Pattern` colorspace. Uncolored tiling patterns
    /// carry the color of the underlying colorspace as well.
    Pattern {
        name: String,
        underlying: Option<Components>,
    },
}

impl Color {
    pub fn gray(v: f32) -> Self {
        Color::Components(SmallVec::from_slice(&[v]))
    }
}

/// RGB color, every channel in 0.0 - 1.0
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn to_gray(&self) -> f32 {
        rgb_to_gray(self.r.into(), self.g.into(), self.b.into()) as f32
    }

    /// See [`is_colored`]
    pub fn is_colored(&self, tolerance: f32) -> bool {
        is_colored(*self, tolerance)
    }
}

/// CMYK color, every channel in 0.0 - 1.0
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Cmyk {
    pub c: f32,
    pub m: f32,
    pub y: f32,
    pub k: f32,
}

impl Cmyk {
    pub fn new(c: f32, m: f32, y: f32, k: f32) -> Self {
        Self { c, m, y, k }
    }

    pub fn to_gray(&self) -> f32 {
        cmyk_to_gray(self.c.into(), self.m.into(), self.y.into(), self.k.into()) as f32
    }

    pub fn to_rgb(&self) -> Rgb {
        cmyk_to_rgb(self.c, self.m, self.y, self.k)
    }
}

/// `gray = 0.3 r + 0.59 g + 0.11 b`
pub fn rgb_to_gray(r: f64, g: f64, b: f64) -> f64 {
    GRAY_WEIGHT_R * r + GRAY_WEIGHT_G * g + GRAY_WEIGHT_B * b
}

/// Complement of the weighted ink coverage, saturated at full coverage:
/// `gray = 1 - min(1, 0.3 c + 0.59 m + 0.11 y + k)`
pub fn cmyk_to_gray(c: f64, m: f64, y: f64, k: f64) -> f64 {
    let coverage = GRAY_WEIGHT_R * c + GRAY_WEIGHT_G * m + GRAY_WEIGHT_B * y + k;
    (1.0 - coverage.min(1.0)).clamp(0.0, 1.0)
}

/// Naive device conversion, `r = 1 - min(1, c + k)` etc.
pub fn cmyk_to_rgb(c: f32, m: f32, y: f32, k: f32) -> Rgb {
    Rgb {
        r: 1.0 - (c + k).min(1.0),
        g: 1.0 - (m + k).min(1.0),
        b: 1.0 - (y + k).min(1.0),
    }
}

/// CIE L*a*b* to sRGB (via XYZ), `white` is the colorspace's white point.
pub fn lab_to_rgb(l: f32, a: f32, b: f32, white: [f32; 3]) -> Rgb {
    fn g(x: f32) -> f32 {
        if x >= 6.0 / 29.0 {
            x * x * x
        } else {
            108.0 / 841.0 * (x - 4.0 / 29.0)
        }
    }

    let m = (l + 16.0) / 116.0;
    let x = white[0] * g(m + a / 500.0);
    let y = white[1] * g(m);
    let z = white[2] * g(m - b / 200.0);

    let r = 3.2406 * x - 1.5372 * y - 0.4986 * z;
    let gr = -0.9689 * x + 1.8758 * y + 0.0415 * z;
    let bl = 0.0557 * x - 0.2040 * y + 1.0570 * z;

    Rgb {
        r: gamma_srgb(r),
        g: gamma_srgb(gr),
        b: gamma_srgb(bl),
    }
}

fn gamma_srgb(v: f32) -> f32 {
    let v = v.clamp(0.0, 1.0);
    if v <= 0.0031308 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// Returns true if any pairwise difference between the channels of `rgb`
/// exceeds `tolerance`.
pub fn is_colored(rgb: Rgb, tolerance: f32) -> bool {
    visible(&[rgb.r - rgb.g, rgb.r - rgb.b, rgb.g - rgb.b], tolerance)
}

pub(crate) fn visible(deltas: &[f32], tolerance: f32) -> bool {
    deltas.iter().any(|d| d.abs() > tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [f64; 5] = [0.0, 0.2, 0.5, 0.8, 1.0];

    #[test]
    fn rgb_weights_sum_to_one() {
        assert!((GRAY_WEIGHT_R + GRAY_WEIGHT_G + GRAY_WEIGHT_B - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rgb_to_gray_is_bounded_by_channels() {
        for &r in &SAMPLES {
            for &g in &SAMPLES {
                for &b in &SAMPLES {
                    let gray = rgb_to_gray(r, g, b);
                    let lo = r.min(g).min(b);
                    let hi = r.max(g).max(b);
                    assert!(gray >= lo - 1e-6 && gray <= hi + 1e-6, "{r} {g} {b} -> {gray}");
                }
            }
        }
    }

    #[test]
    fn cmyk_to_gray_saturates() {
        for &c in &SAMPLES {
            for &m in &SAMPLES {
                for &y in &SAMPLES {
                    for &k in &SAMPLES {
                        let gray = cmyk_to_gray(c, m, y, k);
                        assert!((0.0..=1.0).contains(&gray));
                    }
                }
            }
        }
        assert_eq!(cmyk_to_gray(0.0, 0.0, 0.0, 1.0), 0.0);
        assert_eq!(cmyk_to_gray(0.0, 0.0, 0.0, 0.0), 1.0);
        assert_eq!(cmyk_to_gray(1.0, 1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn pure_red_is_thirty_percent_gray() {
        assert_eq!(rgb_to_gray(1.0, 0.0, 0.0), 0.3);
        assert!((Rgb::new(1.0, 0.0, 0.0).to_gray() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn gray_colors_are_not_colored() {
        assert!(!is_colored(Rgb::new(0.5, 0.5, 0.5), 3.1 / 255.0));
        assert!(!is_colored(Rgb::new(0.5, 0.505, 0.5), 3.1 / 255.0));
        assert!(is_colored(Rgb::new(1.0, 0.0, 0.0), 3.1 / 255.0));
    }

    #[test]
    fn lab_white_point_is_white() {
        let rgb = lab_to_rgb(100.0, 0.0, 0.0, [0.9505, 1.0, 1.089]);
        assert!(rgb.r > 0.99 && rgb.g > 0.99 && rgb.b > 0.99, "{rgb:?}");
        assert!(!rgb.is_colored(0.02));
    }
}
