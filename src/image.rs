//! Raster images: decoding image XObjects and inline images to samples,
//! converting them to gray and re-encoding them with their original encoder.

use ::image::codecs::jpeg::JpegEncoder;
use ::image::{DynamicImage, ImageFormat};
use lopdf::{Dictionary, Document, Object, Stream};

use crate::color::{rgb_to_gray, Rgb};
use crate::colorspace::ColorSpace;
use crate::errors::{GrayscaleError, Result};
use crate::filters::{self, DecodeParms, Filter};
use crate::resources::Resources;
use crate::utils::{dict_get, name, to_i64};

/// Samples of a decoded image, rows padded to whole bytes
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub bits_per_component: u8,
    pub color_components: usize,
    pub data: Vec<u8>,
    /// `/Decode` array, if the image has one
    pub decode: Option<Vec<f32>>,
}

impl DecodedImage {
    pub fn row_bytes(&self) -> usize {
        (self.width * self.color_components * self.bits_per_component as usize + 7) / 8
    }

    pub fn row(&self, y: usize) -> Result<&[u8]> {
        let len = self.row_bytes();
        self.data.get(y * len..(y + 1) * len).ok_or_else(|| {
            GrayscaleError::Image(format!(
                "image data too short: {} bytes for {}x{} pixels",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    /// Raw value of the `index`th sample in `row`
    pub fn sample(&self, row: &[u8], index: usize) -> u32 {
        match self.bits_per_component {
            8 => row[index] as u32,
            16 => u16::from_be_bytes([row[2 * index], row[2 * index + 1]]) as u32,
            bits => {
                let bits = bits as usize;
                let pos = index * bits;
                let byte = row[pos / 8] as u32;
                let shift = 8 - bits - pos % 8;
                (byte >> shift) & ((1 << bits) - 1)
            }
        }
    }

    pub fn max_sample(&self) -> f32 {
        ((1u32 << self.bits_per_component) - 1) as f32
    }
}

/// RGB raster, one `Rgb` per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<Rgb>,
}

impl RgbImage {
    pub fn to_gray(&self) -> GrayImage {
        GrayImage {
            width: self.width,
            height: self.height,
            data: self
                .pixels
                .iter()
                .map(|p| (rgb_to_gray(p.r.into(), p.g.into(), p.b.into()).clamp(0.0, 1.0) * 255.0).round() as u8)
                .collect(),
        }
    }

    pub fn is_colored(&self, tolerance: f32) -> bool {
        self.pixels.iter().any(|p| p.is_colored(tolerance))
    }
}

/// 8-bit single channel raster
#[derive(Debug, Clone, PartialEq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

/// Encoder an image was compressed with, used to compress it again
#[derive(Debug, Clone, PartialEq)]
pub enum ImageEncoder {
    /// No filter
    Raw,
    Flate(DecodeParms),
    Lzw(DecodeParms),
    RunLength,
    AsciiHex,
    Ascii85,
    Dct { color_components: usize, quality: u8 },
    Jpx,
    CcittFax,
    Jbig2,
    /// Filter chain in decode order, e.g. `[/ASCII85Decode /DCTDecode]`
    Multi(Vec<ImageEncoder>),
}

impl ImageEncoder {
    /// Builds the encoder from the `/Filter` and `/DecodeParms` entries of
    /// an image dictionary.
    pub fn from_dict(doc: &Document, dict: &Dictionary, jpeg_quality: u8) -> Result<Self> {
        let mut chain = filters::stream_filters(doc, dict)?
            .into_iter()
            .map(|(filter, parms)| {
                let parms = match parms {
                    Some(p) => DecodeParms::from_dict(doc, &p)?,
                    None => DecodeParms::default(),
                };
                Ok(match filter {
                    Filter::Flate => ImageEncoder::Flate(parms),
                    Filter::Lzw => ImageEncoder::Lzw(parms),
                    Filter::RunLength => ImageEncoder::RunLength,
                    Filter::AsciiHex => ImageEncoder::AsciiHex,
                    Filter::Ascii85 => ImageEncoder::Ascii85,
                    Filter::Dct => ImageEncoder::Dct {
                        color_components: 3,
                        quality: jpeg_quality,
                    },
                    Filter::Jpx => ImageEncoder::Jpx,
                    Filter::CcittFax => ImageEncoder::CcittFax,
                    Filter::Jbig2 => ImageEncoder::Jbig2,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(match chain.len() {
            0 => ImageEncoder::Raw,
            1 => chain.remove(0),
            _ => ImageEncoder::Multi(chain),
        })
    }

    /// Name of the filter, the last one of a chain. `None` for raw data.
    pub fn filter_name(&self) -> Option<&'static str> {
        match self {
            ImageEncoder::Raw => None,
            ImageEncoder::Flate(_) => Some(Filter::Flate.name()),
            ImageEncoder::Lzw(_) => Some(Filter::Lzw.name()),
            ImageEncoder::RunLength => Some(Filter::RunLength.name()),
            ImageEncoder::AsciiHex => Some(Filter::AsciiHex.name()),
            ImageEncoder::Ascii85 => Some(Filter::Ascii85.name()),
            ImageEncoder::Dct { .. } => Some(Filter::Dct.name()),
            ImageEncoder::Jpx => Some(Filter::Jpx.name()),
            ImageEncoder::CcittFax => Some(Filter::CcittFax.name()),
            ImageEncoder::Jbig2 => Some(Filter::Jbig2.name()),
            ImageEncoder::Multi(chain) => chain.last().and_then(|e| e.filter_name()),
        }
    }

    /// True if `filter` appears anywhere in the encoder chain
    pub fn uses(&self, filter: Filter) -> bool {
        match self {
            ImageEncoder::Multi(chain) => chain.iter().any(|e| e.uses(filter)),
            other => other.filter_name() == Some(filter.name()),
        }
    }

    /// Codecs that only ever carry bilevel or gray data
    pub fn is_gray_only(&self) -> bool {
        self.uses(Filter::CcittFax) || self.uses(Filter::Jbig2)
    }

    /// Sets the component count of every DCT encoder in the chain
    pub fn set_dct_components(&mut self, n: usize) {
        match self {
            ImageEncoder::Dct {
                color_components, ..
            } => *color_components = n,
            ImageEncoder::Multi(chain) => chain.iter_mut().for_each(|e| e.set_dct_components(n)),
            _ => {}
        }
    }

    /// Encodes an 8-bit gray raster.
    pub fn encode(&self, gray: &GrayImage) -> Result<Vec<u8>> {
        match self {
            ImageEncoder::Raw => Ok(gray.data.clone()),
            ImageEncoder::Dct {
                color_components,
                quality,
            } => {
                if *color_components != 1 {
                    return Err(GrayscaleError::UnsupportedEncodingParameters(format!(
                        "DCT encoder with {color_components} components for a gray image"
                    )));
                }
                let buffer =
                    ::image::GrayImage::from_raw(gray.width as u32, gray.height as u32, gray.data.clone())
                        .ok_or_else(|| {
                            GrayscaleError::Image("gray raster does not match its size".to_string())
                        })?;
                let mut out = Vec::new();
                DynamicImage::ImageLuma8(buffer)
                    .write_with_encoder(JpegEncoder::new_with_quality(&mut out, *quality))?;
                Ok(out)
            }
            ImageEncoder::Multi(chain) => {
                // encode the innermost filter first
                let mut data: Option<Vec<u8>> = None;
                for encoder in chain.iter().rev() {
                    data = Some(match data {
                        None => encoder.encode(gray)?,
                        Some(bytes) => encoder.encode_bytes(&bytes)?,
                    });
                }
                Ok(data.unwrap_or_else(|| gray.data.clone()))
            }
            other => other.encode_bytes(&gray.data),
        }
    }

    fn encode_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        let default = DecodeParms::default();
        match self {
            ImageEncoder::Raw => Ok(data.to_vec()),
            ImageEncoder::Flate(parms) => filters::encode(Filter::Flate, data, parms),
            ImageEncoder::Lzw(parms) => filters::encode(Filter::Lzw, data, parms),
            ImageEncoder::RunLength => filters::encode(Filter::RunLength, data, &default),
            ImageEncoder::AsciiHex => filters::encode(Filter::AsciiHex, data, &default),
            ImageEncoder::Ascii85 => filters::encode(Filter::Ascii85, data, &default),
            other => Err(GrayscaleError::UnimplementedCodec(
                other.filter_name().unwrap_or("?").to_string(),
            )),
        }
    }

    /// `/Filter` and `/DecodeParms` values describing this encoder
    fn filter_entries(&self) -> (Option<Object>, Option<Object>) {
        let decode_parms = |parms: &DecodeParms| {
            if parms.early_change {
                None
            } else {
                Some(Object::Dictionary(Dictionary::from_iter(vec![(
                    "EarlyChange",
                    Object::Integer(0),
                )])))
            }
        };
        match self {
            ImageEncoder::Raw => (None, None),
            ImageEncoder::Lzw(parms) => (Some(name(Filter::Lzw.name())), decode_parms(parms)),
            ImageEncoder::Multi(chain) => {
                let mut names = Vec::new();
                let mut parms = Vec::new();
                for encoder in chain {
                    let (n, p) = encoder.filter_entries();
                    if let Some(n) = n {
                        names.push(n);
                        parms.push(p.unwrap_or(Object::Null));
                    }
                }
                let parms = if parms.iter().all(|p| matches!(p, Object::Null)) {
                    None
                } else {
                    Some(Object::Array(parms))
                };
                (Some(Object::Array(names)), parms)
            }
            other => (other.filter_name().map(name), None),
        }
    }

    /// Plain Flate without predictor, the fallback for encoders that
    /// cannot re-encode.
    pub fn flate() -> Self {
        ImageEncoder::Flate(DecodeParms::default())
    }
}

/// Encodes `gray` with `encoder`. If the encoder rejects its parameters,
/// retries once with plain Flate. Returns the data and the encoder used.
pub fn encode_with_fallback(gray: &GrayImage, encoder: ImageEncoder) -> Result<(Vec<u8>, ImageEncoder)> {
    match encoder.encode(gray) {
        Ok(data) => Ok((data, encoder)),
        Err(GrayscaleError::UnsupportedEncodingParameters(reason)) => {
            log::warn!("cannot re-encode image with {encoder:?} ({reason}), falling back to FlateDecode");
            let fallback = ImageEncoder::flate();
            let data = fallback.encode(gray)?;
            Ok((data, fallback))
        }
        Err(e) => Err(e),
    }
}

/// Decodes image samples, including DCT data through the `image` crate.
/// JPX, CCITT fax and JBIG2 are not decoded.
pub fn decode_samples(
    doc: &Document,
    dict: &Dictionary,
    data: &[u8],
    width: usize,
    height: usize,
    color_components: usize,
    bits_per_component: u8,
) -> Result<DecodedImage> {
    let decoded = filters::decode_stream(doc, dict, data)?;
    let decode = match dict_get(doc, dict, b"Decode")? {
        Some(d) => Some(crate::utils::number_array(doc, d)?),
        None => match dict_get(doc, dict, b"D")? {
            Some(d) => Some(crate::utils::number_array(doc, d)?),
            None => None,
        },
    };

    match decoded.image_codec {
        None if !matches!(bits_per_component, 1 | 2 | 4 | 8 | 16) => Err(GrayscaleError::Image(format!(
            "unsupported /BitsPerComponent {bits_per_component}"
        ))),
        None => Ok(DecodedImage {
            width,
            height,
            bits_per_component,
            color_components,
            data: decoded.data,
            decode,
        }),
        Some((Filter::Dct, _)) => {
            let img = ::image::load_from_memory_with_format(&decoded.data, ImageFormat::Jpeg)?;
            let (color_components, data) = match img {
                DynamicImage::ImageLuma8(buf) => (1, buf.into_raw()),
                // CMYK JPEGs come out of the decoder as RGB already
                other => (3, other.to_rgb8().into_raw()),
            };
            Ok(DecodedImage {
                width,
                height,
                bits_per_component: 8,
                color_components,
                data,
                decode: None,
            })
        }
        Some((codec, _)) => Err(GrayscaleError::UnimplementedCodec(codec.name().to_string())),
    }
}

/// Image XObject, a stream with `/Subtype /Image`
#[derive(Debug, Clone)]
pub struct ImageXObject {
    pub stream: Stream,
}

impl ImageXObject {
    pub fn new(stream: Stream) -> Self {
        Self { stream }
    }

    pub fn width(&self, doc: &Document) -> Result<usize> {
        dimension(doc, &self.stream.dict, b"Width", b"W")
    }

    pub fn height(&self, doc: &Document) -> Result<usize> {
        dimension(doc, &self.stream.dict, b"Height", b"H")
    }

    pub fn is_image_mask(&self, doc: &Document) -> Result<bool> {
        Ok(matches!(
            dict_get(doc, &self.stream.dict, b"ImageMask")?,
            Some(Object::Boolean(true))
        ))
    }

    pub fn has_smask(&self) -> bool {
        self.stream.dict.has(b"SMask")
    }

    /// Colorspace of the image. Image masks report DeviceGray.
    pub fn color_space(&self, doc: &Document) -> Result<ColorSpace> {
        if self.is_image_mask(doc)? {
            return Ok(ColorSpace::DeviceGray);
        }
        match self.stream.dict.get(b"ColorSpace") {
            Ok(cs) => ColorSpace::from_object(doc, cs),
            // JPX images may carry their colorspace inside the codestream
            Err(_) => Ok(ColorSpace::DeviceGray),
        }
    }

    pub fn encoder(&self, doc: &Document, jpeg_quality: u8) -> Result<ImageEncoder> {
        ImageEncoder::from_dict(doc, &self.stream.dict, jpeg_quality)
    }

    pub fn to_image(&self, doc: &Document) -> Result<DecodedImage> {
        let cs = self.color_space(doc)?;
        let bpc = if self.is_image_mask(doc)? {
            1
        } else {
            bits_per_component(dict_get(doc, &self.stream.dict, b"BitsPerComponent")?.and_then(to_i64))?
        };
        decode_samples(
            doc,
            &self.stream.dict,
            &self.stream.content,
            self.width(doc)?,
            self.height(doc)?,
            cs.num_components(),
            bpc,
        )
    }

    /// New image stream holding `gray`, keeping the entries of the
    /// original dictionary that still apply (SMask, Interpolate, ...).
    pub fn from_gray(&self, gray: &GrayImage, encoder: &ImageEncoder, data: Vec<u8>) -> Stream {
        let mut dict = self.stream.dict.clone();
        for key in [
            &b"Filter"[..],
            b"DecodeParms",
            b"Decode",
            b"Length",
            b"ColorSpace",
            b"BitsPerComponent",
        ] {
            dict.remove(key);
        }
        if let Ok(Object::Array(_)) = dict.get(b"Mask") {
            // color key masking refers to the old sample values
            dict.remove(b"Mask");
        }
        dict.set("Width", Object::Integer(gray.width as i64));
        dict.set("Height", Object::Integer(gray.height as i64));
        dict.set("ColorSpace", name("DeviceGray"));
        dict.set("BitsPerComponent", Object::Integer(8));
        let (filter, parms) = encoder.filter_entries();
        if let Some(f) = filter {
            dict.set("Filter", f);
        }
        if let Some(p) = parms {
            dict.set("DecodeParms", p);
        }
        Stream::new(dict, data).with_compression(false)
    }

    /// Same samples, new colorspace. Used for palette images, whose
    /// samples stay valid when only the palette changes.
    pub fn with_color_space(mut self, color_space: Object) -> Self {
        self.stream.dict.set("ColorSpace", color_space);
        self
    }
}

/// Inline image, the single operand of a `BI` operation.
/// The dictionary may use abbreviated keys and names.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub stream: Stream,
}

impl InlineImage {
    pub fn new(stream: Stream) -> Self {
        Self { stream }
    }

    fn entry(&self, full: &[u8], short: &[u8]) -> Option<&Object> {
        self.stream
            .dict
            .get(short)
            .or_else(|_| self.stream.dict.get(full))
            .ok()
    }

    pub fn is_image_mask(&self) -> bool {
        matches!(self.entry(b"ImageMask", b"IM"), Some(Object::Boolean(true)))
    }

    /// Colorspace of the image. Names that are not device spaces are
    /// looked up in the `/ColorSpace` resources.
    pub fn color_space(&self, doc: &Document, resources: &Resources) -> Result<ColorSpace> {
        if self.is_image_mask() {
            return Ok(ColorSpace::DeviceGray);
        }
        match self.entry(b"ColorSpace", b"CS") {
            None => Ok(ColorSpace::DeviceGray),
            Some(Object::Name(n)) => {
                let n = String::from_utf8_lossy(n);
                match ColorSpace::from_family_name(&n) {
                    Some(cs) => Ok(cs),
                    None => resources.color_space(doc, &n),
                }
            }
            Some(other) => ColorSpace::from_object(doc, other),
        }
    }

    pub fn encoder(&self, doc: &Document, jpeg_quality: u8) -> Result<ImageEncoder> {
        ImageEncoder::from_dict(doc, &self.stream.dict, jpeg_quality)
    }

    pub fn to_image(&self, doc: &Document, resources: &Resources) -> Result<DecodedImage> {
        let cs = self.color_space(doc, resources)?;
        let width = dimension(doc, &self.stream.dict, b"Width", b"W")?;
        let height = dimension(doc, &self.stream.dict, b"Height", b"H")?;
        let bpc = if self.is_image_mask() {
            1
        } else {
            bits_per_component(self.entry(b"BitsPerComponent", b"BPC").and_then(to_i64))?
        };
        decode_samples(
            doc,
            &self.stream.dict,
            &self.stream.content,
            width,
            height,
            cs.num_components(),
            bpc,
        )
    }

    /// Inline image holding `gray`, encoded with `encoder` (or Flate, if
    /// the encoder cannot handle its parameters).
    pub fn from_gray(&self, gray: &GrayImage, encoder: ImageEncoder) -> Result<InlineImage> {
        let (data, encoder) = encode_with_fallback(gray, encoder)?;
        let mut dict = Dictionary::new();
        dict.set("W", Object::Integer(gray.width as i64));
        dict.set("H", Object::Integer(gray.height as i64));
        dict.set("CS", name("DeviceGray"));
        dict.set("BPC", Object::Integer(8));
        let (filter, parms) = encoder.filter_entries();
        if let Some(f) = filter {
            dict.set("F", f);
        }
        if let Some(p) = parms {
            dict.set("DP", p);
        }
        for (key, value) in self.stream.dict.iter() {
            if !INLINE_REPLACED_KEYS.contains(&key.as_slice()) {
                dict.set(key.clone(), value.clone());
            }
        }
        Ok(InlineImage::new(Stream::new(dict, data).with_compression(false)))
    }

    pub fn with_color_space(mut self, color_space: Object) -> Self {
        self.stream.dict.remove(b"ColorSpace");
        self.stream.dict.set("CS", color_space);
        self
    }
}

const INLINE_REPLACED_KEYS: &[&[u8]] = &[
    b"W", b"Width", b"H", b"Height", b"CS", b"ColorSpace", b"BPC", b"BitsPerComponent",
    b"F", b"Filter", b"DP", b"DecodeParms", b"D", b"Decode", b"Length", b"L",
];

/// `/BitsPerComponent` of an image, 8 if absent
fn bits_per_component(value: Option<i64>) -> Result<u8> {
    match value.unwrap_or(8) {
        bits @ (1 | 2 | 4 | 8 | 16) => Ok(bits as u8),
        other => Err(GrayscaleError::Image(format!("unsupported /BitsPerComponent {other}"))),
    }
}

fn dimension(doc: &Document, dict: &Dictionary, full: &[u8], short: &[u8]) -> Result<usize> {
    let value = match dict_get(doc, dict, full)? {
        Some(v) => Some(v),
        None => dict_get(doc, dict, short)?,
    };
    value
        .and_then(to_i64)
        .filter(|v| *v >= 0)
        .map(|v| v as usize)
        .ok_or_else(|| {
            GrayscaleError::Image(format!(
                "image without valid /{}",
                String::from_utf8_lossy(full)
            ))
        })
}

/// Encodes RGB pixels as a JPEG, for DCT test fixtures.
#[cfg(test)]
pub(crate) fn jpeg_fixture(pixels: &[[u8; 3]], width: u32, height: u32) -> Vec<u8> {
    let raw: Vec<u8> = pixels.iter().flatten().copied().collect();
    let buffer = ::image::RgbImage::from_raw(width, height, raw).unwrap();
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(buffer)
        .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colorspace::ColorSpace;
    use pretty_assertions::assert_eq;

    fn rgb_image(pixels: &[[u8; 3]]) -> DecodedImage {
        DecodedImage {
            width: pixels.len(),
            height: 1,
            bits_per_component: 8,
            color_components: 3,
            data: pixels.iter().flatten().copied().collect(),
            decode: None,
        }
    }

    #[test]
    fn red_pixel_becomes_thirty_percent_gray() {
        let img = rgb_image(&[[255, 0, 0], [255, 255, 255]]);
        let rgb = ColorSpace::DeviceRGB.image_to_rgb(&img).unwrap();
        assert!(rgb.is_colored(0.01));
        let gray = rgb.to_gray();
        assert_eq!(gray.data, vec![77, 255]);
    }

    #[test]
    fn sub_byte_samples() {
        let img = DecodedImage {
            width: 4,
            height: 1,
            bits_per_component: 2,
            color_components: 1,
            data: vec![0b00_01_10_11],
            decode: None,
        };
        let row = img.row(0).unwrap();
        let samples: Vec<u32> = (0..4).map(|i| img.sample(row, i)).collect();
        assert_eq!(samples, vec![0, 1, 2, 3]);
    }

    #[test]
    fn unsupported_bits_per_component_are_rejected() {
        let doc = Document::with_version("1.5");
        for bits in [0, 3, 12, 32, 264] {
            let image = ImageXObject::new(Stream::new(
                Dictionary::from_iter(vec![
                    ("Subtype", name("Image")),
                    ("Width", Object::Integer(1)),
                    ("Height", Object::Integer(1)),
                    ("ColorSpace", name("DeviceRGB")),
                    ("BitsPerComponent", Object::Integer(bits)),
                ]),
                vec![0; 8],
            ));
            assert!(matches!(image.to_image(&doc), Err(GrayscaleError::Image(_))), "{bits}");

            let inline = InlineImage::new(Stream::new(
                Dictionary::from_iter(vec![
                    ("W", Object::Integer(1)),
                    ("H", Object::Integer(1)),
                    ("CS", name("RGB")),
                    ("BPC", Object::Integer(bits)),
                ]),
                vec![0; 8],
            ));
            assert!(
                matches!(inline.to_image(&doc, &Resources::default()), Err(GrayscaleError::Image(_))),
                "{bits}"
            );
        }
    }

    #[test]
    fn predictor_flate_falls_back_to_plain_flate() {
        let gray = GrayImage {
            width: 2,
            height: 1,
            data: vec![10, 20],
        };
        let encoder = ImageEncoder::Flate(DecodeParms {
            predictor: 15,
            ..DecodeParms::default()
        });
        let (data, used) = encode_with_fallback(&gray, encoder).unwrap();
        assert_eq!(used, ImageEncoder::flate());
        let back = filters::decode(Filter::Flate, &data, &DecodeParms::default()).unwrap();
        assert_eq!(back, vec![10, 20]);
    }

    #[test]
    fn dct_needs_one_component() {
        let gray = GrayImage {
            width: 8,
            height: 8,
            data: vec![128; 64],
        };
        let mut encoder = ImageEncoder::Dct {
            color_components: 3,
            quality: 75,
        };
        assert!(matches!(
            encoder.encode(&gray),
            Err(GrayscaleError::UnsupportedEncodingParameters(_))
        ));
        encoder.set_dct_components(1);
        let jpeg = encoder.encode(&gray).unwrap();
        let back = ::image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert!(matches!(back, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn chain_encodes_innermost_filter_first() {
        let gray = GrayImage {
            width: 3,
            height: 1,
            data: vec![1, 2, 3],
        };
        let encoder = ImageEncoder::Multi(vec![ImageEncoder::AsciiHex, ImageEncoder::flate()]);
        let data = encoder.encode(&gray).unwrap();
        let hex = filters::decode(Filter::AsciiHex, &data, &DecodeParms::default()).unwrap();
        let raw = filters::decode(Filter::Flate, &hex, &DecodeParms::default()).unwrap();
        assert_eq!(raw, vec![1, 2, 3]);
        assert_eq!(encoder.filter_name(), Some("FlateDecode"));
    }
}
