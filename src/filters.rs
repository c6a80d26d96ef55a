//! Stream filters: decoding for everything that is read, encoding for
//! everything that is written back.
//!
//! The image codecs (DCT, JPX, CCITT fax, JBIG2) are only identified here,
//! DCT decoding / encoding lives in `image`.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Document, Object};

use crate::errors::{GrayscaleError, Result};
use crate::utils::{dict_get, filter_names, resolve, to_i64};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Filter {
    Flate,
    Lzw,
    RunLength,
    AsciiHex,
    Ascii85,
    Dct,
    Jpx,
    CcittFax,
    Jbig2,
}

impl Filter {
    /// Parses a filter name, including the abbreviations used in inline images.
    pub fn from_name(name: &str) -> Option<Self> {
        use self::Filter::*;
        Some(match name {
            "FlateDecode" | "Fl" => Flate,
            "LZWDecode" | "LZW" => Lzw,
            "RunLengthDecode" | "RL" => RunLength,
            "ASCIIHexDecode" | "AHx" => AsciiHex,
            "ASCII85Decode" | "A85" => Ascii85,
            "DCTDecode" | "DCT" => Dct,
            "JPXDecode" => Jpx,
            // CCITTDecode shows up in the wild as well
            "CCITTFaxDecode" | "CCF" | "CCITTDecode" => CcittFax,
            "JBIG2Decode" => Jbig2,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        use self::Filter::*;
        match self {
            Flate => "FlateDecode",
            Lzw => "LZWDecode",
            RunLength => "RunLengthDecode",
            AsciiHex => "ASCIIHexDecode",
            Ascii85 => "ASCII85Decode",
            Dct => "DCTDecode",
            Jpx => "JPXDecode",
            CcittFax => "CCITTFaxDecode",
            Jbig2 => "JBIG2Decode",
        }
    }

    /// Codecs that produce image samples instead of a plain byte stream
    pub fn is_image_codec(&self) -> bool {
        matches!(
            self,
            Filter::Dct | Filter::Jpx | Filter::CcittFax | Filter::Jbig2
        )
    }
}

/// `/DecodeParms` for Flate and LZW
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DecodeParms {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
    pub early_change: bool,
}

impl Default for DecodeParms {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
            early_change: true,
        }
    }
}

impl DecodeParms {
    pub fn from_dict(doc: &Document, dict: &Dictionary) -> Result<Self> {
        let mut parms = DecodeParms::default();
        let int = |key: &[u8]| -> Result<Option<i64>> {
            Ok(dict_get(doc, dict, key)?.and_then(to_i64))
        };
        if let Some(p) = int(b"Predictor")? {
            parms.predictor = p;
        }
        if let Some(c) = int(b"Colors")? {
            parms.colors = c.max(1) as usize;
        }
        if let Some(b) = int(b"BitsPerComponent")? {
            parms.bits_per_component = b.max(1) as usize;
        }
        if let Some(c) = int(b"Columns")? {
            parms.columns = c.max(1) as usize;
        }
        if let Some(e) = int(b"EarlyChange")? {
            parms.early_change = e != 0;
        }
        Ok(parms)
    }

    pub fn has_predictor(&self) -> bool {
        self.predictor > 1
    }
}

/// Filters of a stream dictionary together with their parameters.
/// Reads both full and abbreviated (`/F`, `/DP`) keys.
pub fn stream_filters(doc: &Document, dict: &Dictionary) -> Result<Vec<(Filter, Option<Dictionary>)>> {
    let names = filter_names(doc, dict)?;
    let parms = match dict_get(doc, dict, b"DecodeParms")? {
        Some(p) => Some(p),
        None => dict_get(doc, dict, b"DP")?,
    };
    let parms: Vec<Option<Dictionary>> = match parms {
        None | Some(Object::Null) => vec![None; names.len()],
        Some(Object::Dictionary(d)) => vec![Some(d.clone())],
        Some(Object::Array(arr)) => arr
            .iter()
            .map(|o| match resolve(doc, o) {
                Ok(Object::Dictionary(d)) => Some(d.clone()),
                _ => None,
            })
            .collect(),
        Some(other) => return Err(GrayscaleError::mismatch("decode parameters", other)),
    };

    names
        .iter()
        .enumerate()
        .map(|(i, n)| {
            let filter = Filter::from_name(n)
                .ok_or_else(|| GrayscaleError::UnimplementedCodec(n.clone()))?;
            Ok((filter, parms.get(i).cloned().flatten()))
        })
        .collect()
}

/// Decoded stream data. If the filter chain ends in an image codec, the
/// data is only decoded up to that codec and the codec is returned.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub data: Vec<u8>,
    pub image_codec: Option<(Filter, Option<Dictionary>)>,
}

pub fn decode_stream(doc: &Document, dict: &Dictionary, data: &[u8]) -> Result<Decoded> {
    let filters = stream_filters(doc, dict)?;
    let mut data = data.to_vec();
    let mut iter = filters.into_iter().peekable();
    while let Some((filter, parms)) = iter.next() {
        if filter.is_image_codec() {
            if iter.peek().is_some() {
                return Err(GrayscaleError::UnimplementedCodec(format!(
                    "{} followed by further filters",
                    filter.name()
                )));
            }
            return Ok(Decoded {
                data,
                image_codec: Some((filter, parms)),
            });
        }
        let parms = match parms {
            Some(p) => DecodeParms::from_dict(doc, &p)?,
            None => DecodeParms::default(),
        };
        data = decode(filter, &data, &parms)?;
    }
    Ok(Decoded {
        data,
        image_codec: None,
    })
}

/// Fully decoded content of a non-image stream (content streams, functions, ...)
pub fn decode_stream_content(doc: &Document, stream: &lopdf::Stream) -> Result<Vec<u8>> {
    let decoded = decode_stream(doc, &stream.dict, &stream.content)?;
    match decoded.image_codec {
        None => Ok(decoded.data),
        Some((f, _)) => Err(GrayscaleError::UnimplementedCodec(f.name().to_string())),
    }
}

pub fn decode(filter: Filter, data: &[u8], parms: &DecodeParms) -> Result<Vec<u8>> {
    let out = match filter {
        Filter::Flate => {
            let mut decoder = ZlibDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| GrayscaleError::Image(format!("FlateDecode failed: {e}")))?;
            out
        }
        Filter::Lzw => {
            let mut decoder = if parms.early_change {
                weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            } else {
                weezl::decode::Decoder::new(weezl::BitOrder::Msb, 8)
            };
            decoder
                .decode(data)
                .map_err(|e| GrayscaleError::Image(format!("LZWDecode failed: {e:?}")))?
        }
        Filter::RunLength => return Ok(decode_run_length(data)),
        Filter::AsciiHex => return Ok(decode_ascii_hex(data)),
        Filter::Ascii85 => return Ok(decode_ascii85(data)),
        other => return Err(GrayscaleError::UnimplementedCodec(other.name().to_string())),
    };
    if parms.has_predictor() {
        apply_predictor(&out, parms)
    } else {
        Ok(out)
    }
}

/// Encodes `data` with a single non-image filter. Predictors are not
/// supported on the encoding side.
pub fn encode(filter: Filter, data: &[u8], parms: &DecodeParms) -> Result<Vec<u8>> {
    match filter {
        Filter::Flate | Filter::Lzw if parms.has_predictor() => {
            Err(GrayscaleError::UnsupportedEncodingParameters(format!(
                "{} with predictor {}",
                filter.name(),
                parms.predictor
            )))
        }
        Filter::Flate => encode_flate(data),
        Filter::Lzw => {
            let mut encoder = if parms.early_change {
                weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            } else {
                weezl::encode::Encoder::new(weezl::BitOrder::Msb, 8)
            };
            encoder
                .encode(data)
                .map_err(|e| GrayscaleError::Image(format!("LZW encoding failed: {e:?}")))
        }
        Filter::RunLength => Ok(encode_run_length(data)),
        Filter::AsciiHex => Ok(encode_ascii_hex(data)),
        Filter::Ascii85 => Ok(encode_ascii85(data)),
        other => Err(GrayscaleError::UnimplementedCodec(other.name().to_string())),
    }
}

pub fn encode_flate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn apply_predictor(data: &[u8], parms: &DecodeParms) -> Result<Vec<u8>> {
    let bits_per_pixel = parms.colors * parms.bits_per_component;
    let bytes_per_pixel = ((bits_per_pixel + 7) / 8).max(1);
    let row_bytes = (parms.columns * bits_per_pixel + 7) / 8;
    match parms.predictor {
        2 => {
            if parms.bits_per_component != 8 {
                return Err(GrayscaleError::UnsupportedEncodingParameters(format!(
                    "TIFF predictor with {} bits per component",
                    parms.bits_per_component
                )));
            }
            let mut out = data.to_vec();
            for row in out.chunks_mut(row_bytes.max(1)) {
                for i in bytes_per_pixel..row.len() {
                    row[i] = row[i].wrapping_add(row[i - bytes_per_pixel]);
                }
            }
            Ok(out)
        }
        10..=15 => Ok(decode_png_predictor(data, row_bytes, bytes_per_pixel)),
        other => Err(GrayscaleError::UnsupportedEncodingParameters(format!(
            "unknown predictor {other}"
        ))),
    }
}

fn decode_png_predictor(data: &[u8], row_bytes: usize, bytes_per_pixel: usize) -> Vec<u8> {
    let stride = row_bytes + 1;
    let mut out = Vec::with_capacity(data.len() / stride * row_bytes);
    let mut prev_row = vec![0u8; row_bytes];
    let mut current_row = Vec::with_capacity(row_bytes);

    for row in data.chunks(stride) {
        let Some((&tag, row_data)) = row.split_first() else {
            continue;
        };
        current_row.clear();
        for (i, &byte) in row_data.iter().enumerate() {
            let a = if i >= bytes_per_pixel { current_row[i - bytes_per_pixel] } else { 0 };
            let b = prev_row.get(i).copied().unwrap_or(0);
            let c = if i >= bytes_per_pixel {
                prev_row.get(i - bytes_per_pixel).copied().unwrap_or(0)
            } else {
                0
            };
            let decoded = match tag {
                1 => byte.wrapping_add(a),
                2 => byte.wrapping_add(b),
                3 => byte.wrapping_add(((a as u16 + b as u16) / 2) as u8),
                4 => byte.wrapping_add(paeth(a, b, c)),
                _ => byte,
            };
            current_row.push(decoded);
        }
        out.extend_from_slice(&current_row);
        prev_row.clear();
        prev_row.extend_from_slice(&current_row);
        prev_row.resize(row_bytes, 0);
    }
    out
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let pa = (p - a as i32).abs();
    let pb = (p - b as i32).abs();
    let pc = (p - c as i32).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn decode_run_length(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let len = data[i];
        i += 1;
        match len {
            128 => break,
            0..=127 => {
                let end = (i + len as usize + 1).min(data.len());
                out.extend_from_slice(&data[i..end]);
                i = end;
            }
            _ => {
                if let Some(&byte) = data.get(i) {
                    out.extend(std::iter::repeat(byte).take(257 - len as usize));
                    i += 1;
                }
            }
        }
    }
    out
}

fn encode_run_length(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let start = i;
        let byte = data[i];
        while i < data.len() && data[i] == byte && i - start < 128 {
            i += 1;
        }
        let run = i - start;
        if run >= 2 {
            out.push((257 - run) as u8);
            out.push(byte);
            continue;
        }

        i = start;
        while i < data.len() && i - start < 128 {
            if i + 2 < data.len() && data[i] == data[i + 1] && data[i] == data[i + 2] {
                break;
            }
            i += 1;
        }
        if i == start {
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&data[start..i]);
    }
    out.push(128);
    out
}

fn decode_ascii_hex(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;
    for &byte in data {
        let nibble = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            b'>' => break,
            _ => continue,
        };
        match high.take() {
            Some(h) => out.push((h << 4) | nibble),
            None => high = Some(nibble),
        }
    }
    if let Some(h) = high {
        out.push(h << 4);
    }
    out
}

fn encode_ascii_hex(data: &[u8]) -> Vec<u8> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = Vec::with_capacity(data.len() * 2 + 1);
    for &byte in data {
        out.push(HEX[(byte >> 4) as usize]);
        out.push(HEX[(byte & 0xf) as usize]);
    }
    out.push(b'>');
    out
}

fn decode_ascii85(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 4 / 5);
    let mut group: u32 = 0;
    let mut count = 0;
    for &byte in data {
        match byte {
            b'z' if count == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
            b'~' => break,
            b'!'..=b'u' => {
                group = group.wrapping_mul(85).wrapping_add((byte - b'!') as u32);
                count += 1;
                if count == 5 {
                    out.extend_from_slice(&group.to_be_bytes());
                    group = 0;
                    count = 0;
                }
            }
            _ => {}
        }
    }
    if count > 1 {
        for _ in count..5 {
            group = group.wrapping_mul(85).wrapping_add(84);
        }
        out.extend_from_slice(&group.to_be_bytes()[..count - 1]);
    }
    out
}

fn encode_ascii85(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 5 / 4 + 2);
    for chunk in data.chunks(4) {
        let mut bytes = [0u8; 4];
        bytes[..chunk.len()].copy_from_slice(chunk);
        let mut group = u32::from_be_bytes(bytes);
        if group == 0 && chunk.len() == 4 {
            out.push(b'z');
            continue;
        }
        let mut encoded = [0u8; 5];
        for slot in encoded.iter_mut().rev() {
            *slot = (group % 85) as u8 + b'!';
            group /= 85;
        }
        out.extend_from_slice(&encoded[..chunk.len() + 1]);
    }
    out.extend_from_slice(b"~>");
    out
}
