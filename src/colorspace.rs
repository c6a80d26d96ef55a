//! Colorspaces: parsing from / writing to PDF objects, color conversion to
//! RGB, and the rewrite of any colorspace into one that renders gray.

use lopdf::{Document, Object, StringFormat};
use smallvec::SmallVec;

use crate::color::{cmyk_to_rgb, lab_to_rgb, Color, Components, Rgb};
use crate::errors::{GrayscaleError, Result};
use crate::filters::decode_stream_content;
use crate::function::Function;
use crate::image::{DecodedImage, RgbImage};
use crate::utils::{dict_get, name, name_of, number_array, resolve, to_i64};

const D65_WHITE: [f32; 3] = [0.9505, 1.0, 1.089];

#[derive(Debug, Clone)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    /// `[/CalGray << ... >>]`, kept as the original object
    CalGray(Object),
    /// `[/CalRGB << ... >>]`, kept as the original object
    CalRGB(Object),
    Lab {
        white_point: [f32; 3],
        range: [f32; 4],
        source: Object,
    },
    IccBased {
        n: usize,
        alternate: Option<Box<ColorSpace>>,
        source: Object,
    },
    Indexed {
        base: Box<ColorSpace>,
        hival: usize,
        lookup: Vec<u8>,
    },
    Pattern {
        underlying: Option<Box<ColorSpace>>,
    },
    Separation {
        name: String,
        alternate: Box<ColorSpace>,
        tint: Function,
    },
    DeviceN {
        names: Vec<String>,
        alternate: Box<ColorSpace>,
        tint: Function,
        attributes: Option<Object>,
    },
}

impl ColorSpace {
    /// Colorspaces that can be referenced by name without a resource entry.
    /// Accepts the abbreviations used by inline images.
    pub fn from_family_name(name: &str) -> Option<Self> {
        match name {
            "DeviceGray" | "G" => Some(ColorSpace::DeviceGray),
            "DeviceRGB" | "RGB" => Some(ColorSpace::DeviceRGB),
            "DeviceCMYK" | "CMYK" => Some(ColorSpace::DeviceCMYK),
            "Pattern" => Some(ColorSpace::Pattern { underlying: None }),
            _ => None,
        }
    }

    pub fn from_object(doc: &Document, obj: &Object) -> Result<Self> {
        let obj = resolve(doc, obj)?;
        let arr = match obj {
            Object::Name(n) => {
                let n = String::from_utf8_lossy(n);
                return ColorSpace::from_family_name(&n)
                    .ok_or_else(|| GrayscaleError::undefined("colorspace", &n));
            }
            Object::Array(arr) => arr,
            other => return Err(GrayscaleError::mismatch("colorspace", other)),
        };

        let family = match arr.first() {
            Some(f) => name_of(resolve(doc, f)?)?,
            None => return Err(GrayscaleError::mismatch("colorspace", obj)),
        };
        let arg = |i: usize| array_entry(doc, arr, i, &family);

        Ok(match family.as_str() {
            "DeviceGray" | "G" | "DeviceRGB" | "RGB" | "DeviceCMYK" | "CMYK" if arr.len() == 1 => {
                ColorSpace::from_family_name(&family)
                    .ok_or_else(|| GrayscaleError::undefined("colorspace", &family))?
            }
            "Pattern" if arr.len() == 1 => ColorSpace::Pattern { underlying: None },
            "CalGray" => ColorSpace::CalGray(obj.clone()),
            "CalRGB" => ColorSpace::CalRGB(obj.clone()),
            "Lab" => {
                let dict = arg(1)?.as_dict()?;
                let white = match dict.get(b"WhitePoint") {
                    Ok(w) => number_array(doc, w)?,
                    Err(_) => D65_WHITE.to_vec(),
                };
                let range = match dict.get(b"Range") {
                    Ok(r) => number_array(doc, r)?,
                    Err(_) => vec![-100.0, 100.0, -100.0, 100.0],
                };
                ColorSpace::Lab {
                    white_point: [
                        white.first().copied().unwrap_or(D65_WHITE[0]),
                        white.get(1).copied().unwrap_or(D65_WHITE[1]),
                        white.get(2).copied().unwrap_or(D65_WHITE[2]),
                    ],
                    range: [
                        range.first().copied().unwrap_or(-100.0),
                        range.get(1).copied().unwrap_or(100.0),
                        range.get(2).copied().unwrap_or(-100.0),
                        range.get(3).copied().unwrap_or(100.0),
                    ],
                    source: obj.clone(),
                }
            }
            "ICCBased" => {
                let stream = arg(1)?.as_stream()?;
                let n = dict_get(doc, &stream.dict, b"N")?
                    .and_then(to_i64)
                    .ok_or_else(|| GrayscaleError::ColorConversion("ICC profile without /N".to_string()))?;
                let n = usize::try_from(n)
                    .ok()
                    .filter(|n| (1..=32).contains(n))
                    .ok_or_else(|| GrayscaleError::mismatch("ICC component count", n))?;
                let alternate = match stream.dict.get(b"Alternate") {
                    Ok(a) => Some(Box::new(ColorSpace::from_object(doc, a)?)),
                    Err(_) => None,
                };
                ColorSpace::IccBased {
                    n,
                    alternate,
                    source: obj.clone(),
                }
            }
            "Indexed" | "I" => {
                let base = Box::new(ColorSpace::from_object(doc, arg(1)?)?);
                let hival = to_i64(arg(2)?)
                    .ok_or_else(|| GrayscaleError::mismatch("integer hival", arr.get(2)))?
                    .clamp(0, 255) as usize;
                let lookup = match arg(3)? {
                    Object::String(bytes, _) => bytes.clone(),
                    Object::Stream(s) => decode_stream_content(doc, s)?,
                    other => return Err(GrayscaleError::mismatch("indexed lookup table", other)),
                };
                ColorSpace::Indexed {
                    base,
                    hival,
                    lookup,
                }
            }
            "Pattern" => ColorSpace::Pattern {
                underlying: Some(Box::new(ColorSpace::from_object(doc, arg(1)?)?)),
            },
            "Separation" => ColorSpace::Separation {
                name: name_of(arg(1)?)?,
                alternate: Box::new(ColorSpace::from_object(doc, arg(2)?)?),
                tint: Function::from_object(doc, arg(3)?)?,
            },
            "DeviceN" => {
                let names = match arg(1)? {
                    Object::Array(n) => n
                        .iter()
                        .map(|o| name_of(resolve(doc, o)?))
                        .collect::<Result<Vec<_>>>()?,
                    other => return Err(GrayscaleError::mismatch("colorant names", other)),
                };
                ColorSpace::DeviceN {
                    names,
                    alternate: Box::new(ColorSpace::from_object(doc, arg(2)?)?),
                    tint: Function::from_object(doc, arg(3)?)?,
                    attributes: arr.get(4).cloned(),
                }
            }
            other => return Err(GrayscaleError::undefined("colorspace family", other)),
        })
    }

    /// Serializes the colorspace. Tint transforms that are streams get
    /// added to `doc`.
    pub fn to_object(&self, doc: &mut Document) -> Object {
        match self {
            ColorSpace::DeviceGray => name("DeviceGray"),
            ColorSpace::DeviceRGB => name("DeviceRGB"),
            ColorSpace::DeviceCMYK => name("DeviceCMYK"),
            ColorSpace::CalGray(source) | ColorSpace::CalRGB(source) => source.clone(),
            ColorSpace::Lab { source, .. } | ColorSpace::IccBased { source, .. } => source.clone(),
            ColorSpace::Indexed {
                base,
                hival,
                lookup,
            } => Object::Array(vec![
                name("Indexed"),
                base.to_object(doc),
                Object::Integer(*hival as i64),
                Object::String(lookup.clone(), StringFormat::Hexadecimal),
            ]),
            ColorSpace::Pattern { underlying: None } => name("Pattern"),
            ColorSpace::Pattern {
                underlying: Some(base),
            } => Object::Array(vec![name("Pattern"), base.to_object(doc)]),
            ColorSpace::Separation {
                name: colorant,
                alternate,
                tint,
            } => Object::Array(vec![
                name("Separation"),
                name(colorant),
                alternate.to_object(doc),
                tint.to_object(doc),
            ]),
            ColorSpace::DeviceN {
                names,
                alternate,
                tint,
                attributes,
            } => {
                let mut arr = vec![
                    name("DeviceN"),
                    Object::Array(names.iter().map(|n| name(n)).collect()),
                    alternate.to_object(doc),
                    tint.to_object(doc),
                ];
                if let Some(attrs) = attributes {
                    arr.push(attrs.clone());
                }
                Object::Array(arr)
            }
        }
    }

    pub fn num_components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray | ColorSpace::CalGray(_) => 1,
            ColorSpace::DeviceRGB | ColorSpace::CalRGB(_) | ColorSpace::Lab { .. } => 3,
            ColorSpace::DeviceCMYK => 4,
            ColorSpace::IccBased { n, .. } => *n,
            ColorSpace::Indexed { .. } | ColorSpace::Separation { .. } => 1,
            ColorSpace::Pattern { underlying } => {
                underlying.as_ref().map(|u| u.num_components()).unwrap_or(0)
            }
            ColorSpace::DeviceN { names, .. } => names.len(),
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, ColorSpace::Pattern { .. })
    }

    /// Color selected when the colorspace becomes active
    pub fn initial_color(&self) -> Color {
        let n = self.num_components();
        match self {
            ColorSpace::DeviceCMYK => Color::Components(SmallVec::from_slice(&[0.0, 0.0, 0.0, 1.0])),
            ColorSpace::Separation { .. } | ColorSpace::DeviceN { .. } => {
                Color::Components(SmallVec::from_elem(1.0, n))
            }
            ColorSpace::Lab { range, .. } => {
                let a = 0.0f32.clamp(range[0], range[1]);
                let b = 0.0f32.clamp(range[2], range[3]);
                Color::Components(SmallVec::from_slice(&[0.0, a, b]))
            }
            ColorSpace::Pattern { .. } => Color::Components(SmallVec::new()),
            _ => Color::Components(SmallVec::from_elem(0.0, n)),
        }
    }

    /// Builds a color from `sc`/`scn` style operands
    pub fn color_from_components(&self, values: &[f32]) -> Result<Color> {
        if values.len() != self.num_components() {
            return Err(GrayscaleError::ColorConversion(format!(
                "{} components for a colorspace with {}",
                values.len(),
                self.num_components()
            )));
        }
        Ok(Color::Components(SmallVec::from_slice(values)))
    }

    pub fn color_to_rgb(&self, color: &Color) -> Result<Rgb> {
        match color {
            Color::Components(c) => self.components_to_rgb(c),
            Color::Pattern {
                underlying: Some(c),
                ..
            } => match self {
                ColorSpace::Pattern {
                    underlying: Some(base),
                } => base.components_to_rgb(c),
                _ => Err(GrayscaleError::mismatch("pattern colorspace", self)),
            },
            Color::Pattern { .. } => Err(GrayscaleError::mismatch("plain color", color)),
        }
    }

    pub fn components_to_rgb(&self, c: &[f32]) -> Result<Rgb> {
        let n = self.num_components();
        if c.len() != n {
            return Err(GrayscaleError::mismatch(
                "color with one value per colorspace component",
                format!("{} values for a colorspace with {n} components", c.len()),
            ));
        }
        Ok(match self {
            ColorSpace::DeviceGray | ColorSpace::CalGray(_) => Rgb::new(c[0], c[0], c[0]),
            ColorSpace::DeviceRGB | ColorSpace::CalRGB(_) => Rgb::new(c[0], c[1], c[2]),
            ColorSpace::DeviceCMYK => cmyk_to_rgb(c[0], c[1], c[2], c[3]),
            ColorSpace::Lab { white_point, .. } => lab_to_rgb(c[0], c[1], c[2], *white_point),
            ColorSpace::IccBased { n, alternate, .. } => match alternate {
                Some(alt) => alt.components_to_rgb(c)?,
                None => ColorSpace::device_for(*n)?.components_to_rgb(c)?,
            },
            ColorSpace::Indexed {
                base,
                hival,
                lookup,
            } => {
                let index = (c[0].round().max(0.0) as usize).min(*hival);
                let entry = base.decode_lookup_entry(lookup, index)?;
                base.components_to_rgb(&entry)?
            }
            ColorSpace::Separation {
                alternate, tint, ..
            }
            | ColorSpace::DeviceN {
                alternate, tint, ..
            } => {
                let mut alt = tint.apply(c)?;
                alt.truncate(alternate.num_components());
                alternate.components_to_rgb(&alt)?
            }
            ColorSpace::Pattern { .. } => {
                return Err(GrayscaleError::mismatch("plain colorspace", self))
            }
        })
    }

    /// Device space with `n` components, used for ICC profiles without alternate
    fn device_for(n: usize) -> Result<ColorSpace> {
        match n {
            1 => Ok(ColorSpace::DeviceGray),
            3 => Ok(ColorSpace::DeviceRGB),
            4 => Ok(ColorSpace::DeviceCMYK),
            n => Err(GrayscaleError::UnsupportedColorspace { components: n }),
        }
    }

    /// Components of palette entry `index`, scaled to this (base) space
    fn decode_lookup_entry(&self, lookup: &[u8], index: usize) -> Result<Components> {
        let n = self.num_components();
        let bytes = lookup.get(index * n..(index + 1) * n).ok_or_else(|| {
            GrayscaleError::ColorConversion(format!("index {index} outside of the lookup table"))
        })?;
        let decode = self.default_decode(8);
        Ok(bytes
            .iter()
            .enumerate()
            .map(|(i, b)| decode[2 * i] + *b as f32 / 255.0 * (decode[2 * i + 1] - decode[2 * i]))
            .collect())
    }

    /// Default `/Decode` array for images with `bits` bits per component
    pub fn default_decode(&self, bits: u8) -> Vec<f32> {
        match self {
            ColorSpace::Indexed { .. } => vec![0.0, ((1u32 << bits) - 1) as f32],
            ColorSpace::Lab { range, .. } => vec![0.0, 100.0, range[0], range[1], range[2], range[3]],
            _ => (0..self.num_components()).flat_map(|_| [0.0, 1.0]).collect(),
        }
    }

    /// Converts decoded image samples to RGB.
    ///
    /// When the sample layout does not match the colorspace (the DCT
    /// decoder hands out RGB for CMYK JPEGs), the samples are taken as
    /// DeviceRGB / DeviceGray.
    pub fn image_to_rgb(&self, img: &DecodedImage) -> Result<RgbImage> {
        let n = img.color_components;
        let (space, decode) = if n == self.num_components() {
            let decode = img
                .decode
                .clone()
                .filter(|d| d.len() >= 2 * n)
                .unwrap_or_else(|| self.default_decode(img.bits_per_component));
            (self, decode)
        } else {
            let fallback = match n {
                1 => &ColorSpace::DeviceGray,
                3 => &ColorSpace::DeviceRGB,
                other => {
                    return Err(GrayscaleError::ColorConversion(format!(
                        "{other} image components for a colorspace with {}",
                        self.num_components()
                    )))
                }
            };
            (fallback, fallback.default_decode(img.bits_per_component))
        };

        let max = img.max_sample();
        let mut pixels = Vec::with_capacity(img.width * img.height);
        let mut components: Components = SmallVec::with_capacity(n);
        for y in 0..img.height {
            let row = img.row(y)?;
            for x in 0..img.width {
                components.clear();
                for c in 0..n {
                    let raw = img.sample(row, x * n + c) as f32;
                    components.push(decode[2 * c] + raw * (decode[2 * c + 1] - decode[2 * c]) / max);
                }
                pixels.push(space.components_to_rgb(&components)?);
            }
        }
        Ok(RgbImage {
            width: img.width,
            height: img.height,
            pixels,
        })
    }

    /// Gray value of `color`, through RGB
    pub fn color_to_gray(&self, color: &Color) -> Result<f32> {
        Ok(self.color_to_rgb(color)?.to_gray())
    }

    /// Returns a colorspace that renders everything this one renders, in gray.
    pub fn to_grayscale_colorspace(&self) -> Result<ColorSpace> {
        match self {
            ColorSpace::DeviceGray => Ok(ColorSpace::DeviceGray),
            ColorSpace::Pattern { underlying: None } => Ok(self.clone()),
            ColorSpace::Pattern { underlying: Some(_) } => Ok(ColorSpace::Pattern {
                underlying: Some(Box::new(ColorSpace::DeviceGray)),
            }),
            ColorSpace::Indexed {
                base,
                hival,
                lookup,
            } => {
                let mut gray_lookup = Vec::with_capacity(hival + 1);
                for index in 0..=*hival {
                    let entry = base.decode_lookup_entry(lookup, index)?;
                    let gray = base.components_to_rgb(&entry)?.to_gray();
                    gray_lookup.push((gray.clamp(0.0, 1.0) * 255.0).round() as u8);
                }
                Ok(ColorSpace::Indexed {
                    base: Box::new(ColorSpace::DeviceGray),
                    hival: *hival,
                    lookup: gray_lookup,
                })
            }
            ColorSpace::Separation { name, .. } => Ok(ColorSpace::Separation {
                name: name.clone(),
                alternate: Box::new(ColorSpace::DeviceGray),
                tint: self.sampled_gray_tint()?,
            }),
            ColorSpace::DeviceN {
                names, attributes, ..
            } if names.len() == 1 => Ok(ColorSpace::DeviceN {
                names: names.clone(),
                alternate: Box::new(ColorSpace::DeviceGray),
                tint: self.sampled_gray_tint()?,
                attributes: attributes.clone(),
            }),
            other => match other.num_components() {
                1 => Ok(ColorSpace::DeviceGray),
                3 => Ok(ColorSpace::DeviceN {
                    names: vec!["R".into(), "G".into(), "B".into()],
                    alternate: Box::new(ColorSpace::DeviceGray),
                    tint: Function::rgb_to_gray(),
                    attributes: None,
                }),
                4 => Ok(ColorSpace::DeviceN {
                    names: vec!["C".into(), "M".into(), "Y".into(), "K".into()],
                    alternate: Box::new(ColorSpace::DeviceGray),
                    tint: Function::cmyk_to_gray(),
                    attributes: None,
                }),
                n => Err(GrayscaleError::UnsupportedColorspace { components: n }),
            },
        }
    }

    /// 256-sample tint transform `t -> gray(self(t))` for one-colorant spaces
    fn sampled_gray_tint(&self) -> Result<Function> {
        let samples = (0..=255)
            .map(|i| {
                let t = i as f32 / 255.0;
                Ok(self.components_to_rgb(&[t])?.to_gray())
            })
            .collect::<Result<Vec<f32>>>()?;
        Ok(Function::sampled_1d(&samples, 1))
    }
}

fn array_entry<'a>(doc: &'a Document, arr: &'a [Object], i: usize, family: &str) -> Result<&'a Object> {
    let o = arr.get(i).ok_or_else(|| {
        GrayscaleError::ColorConversion(format!("/{family} colorspace array too short"))
    })?;
    resolve(doc, o)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::rgb_to_gray;
    use crate::function::FunctionKind;
    use crate::postscript::PsProgram;

    fn two_colorant_space() -> ColorSpace {
        ColorSpace::DeviceN {
            names: vec!["Cyan".into(), "Magenta".into()],
            alternate: Box::new(ColorSpace::DeviceCMYK),
            tint: Function {
                domain: vec![0.0, 1.0, 0.0, 1.0],
                range: Some(vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]),
                kind: FunctionKind::Calculator(PsProgram::parse(b"{ 0 0 }").unwrap()),
            },
            attributes: None,
        }
    }

    #[test]
    fn two_components_are_unsupported() {
        let cs = two_colorant_space();
        assert_eq!(cs.num_components(), 2);
        assert!(matches!(
            cs.to_grayscale_colorspace(),
            Err(GrayscaleError::UnsupportedColorspace { components: 2 })
        ));
    }

    #[test]
    fn rgb_becomes_devicen_with_gray_alternate() {
        match ColorSpace::DeviceRGB.to_grayscale_colorspace().unwrap() {
            ColorSpace::DeviceN {
                names,
                alternate,
                tint,
                ..
            } => {
                assert_eq!(names, vec!["R", "G", "B"]);
                assert!(matches!(*alternate, ColorSpace::DeviceGray));
                assert!((tint.apply(&[1.0, 0.0, 0.0]).unwrap()[0] - 0.3).abs() < 1e-6);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn indexed_palette_is_rewritten_to_gray() {
        let cs = ColorSpace::Indexed {
            base: Box::new(ColorSpace::DeviceRGB),
            hival: 1,
            lookup: vec![255, 0, 0, 0, 0, 255],
        };
        match cs.to_grayscale_colorspace().unwrap() {
            ColorSpace::Indexed {
                base,
                hival,
                lookup,
            } => {
                assert!(matches!(*base, ColorSpace::DeviceGray));
                assert_eq!(hival, 1);
                assert_eq!(lookup, vec![77, 28]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn separation_tint_samples_the_gray_value() {
        let cs = ColorSpace::Separation {
            name: "Spot".into(),
            alternate: Box::new(ColorSpace::DeviceRGB),
            tint: Function {
                domain: vec![0.0, 1.0],
                range: Some(vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]),
                // t -> (1 - t, 1, 1): white to cyan
                kind: FunctionKind::Calculator(PsProgram::parse(b"{ 1 exch sub 1 1 }").unwrap()),
            },
        };
        let gray = cs.to_grayscale_colorspace().unwrap();
        let rgb = gray.components_to_rgb(&[1.0]).unwrap();
        assert!((rgb.r - rgb_to_gray(0.0, 1.0, 1.0) as f32).abs() < 1.0 / 255.0);
        assert!(!rgb.is_colored(1e-6));
    }

    #[test]
    fn cmyk_components_go_through_rgb() {
        let rgb = ColorSpace::DeviceCMYK
            .components_to_rgb(&[0.0, 1.0, 1.0, 0.0])
            .unwrap();
        assert_eq!(rgb, Rgb::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn component_count_must_match() {
        for (space, values) in [
            (ColorSpace::DeviceGray, vec![0.1, 0.2, 0.3]),
            (ColorSpace::DeviceRGB, vec![0.5]),
            (ColorSpace::DeviceCMYK, vec![0.0, 1.0, 1.0]),
        ] {
            assert!(
                matches!(space.components_to_rgb(&values), Err(GrayscaleError::TypeMismatch { .. })),
                "{space:?} {values:?}"
            );
        }
    }

    #[test]
    fn icc_component_count_is_checked() {
        let mut doc = Document::with_version("1.5");
        let profile = |n: i64| {
            lopdf::Stream::new(lopdf::Dictionary::from_iter(vec![("N", Object::Integer(n))]), vec![])
        };
        let good = doc.add_object(profile(3));
        let negative = doc.add_object(profile(-3));
        let icc = |id| Object::Array(vec![name("ICCBased"), Object::Reference(id)]);

        assert_eq!(ColorSpace::from_object(&doc, &icc(good)).unwrap().num_components(), 3);
        assert!(matches!(
            ColorSpace::from_object(&doc, &icc(negative)),
            Err(GrayscaleError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn parse_indexed_array() {
        let mut doc = Document::with_version("1.5");
        let obj = Object::Array(vec![
            name("Indexed"),
            name("DeviceRGB"),
            Object::Integer(0),
            Object::String(vec![0, 255, 0], StringFormat::Literal),
        ]);
        let cs = ColorSpace::from_object(&doc, &obj).unwrap();
        assert_eq!(cs.num_components(), 1);
        assert_eq!(cs.components_to_rgb(&[0.0]).unwrap(), Rgb::new(0.0, 1.0, 0.0));
        // serializes back into an array
        assert!(matches!(cs.to_object(&mut doc), Object::Array(_)));
    }
}
