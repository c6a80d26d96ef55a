//! Parsing and writing of content streams.
//!
//! Operators and operands go through `lopdf`. Inline images are cut out of
//! the stream here first, since their data is raw bytes between `ID` and
//! `EI` and may use any filter or colorspace abbreviation.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, Stream};

use crate::errors::{GrayscaleError, Result};
use crate::utils::{as_name, to_f32};

/// Splits a decoded content stream into operations. An inline image becomes
/// one `BI` operation whose single operand is a stream holding the image
/// dictionary and data.
pub fn parse_operations(content: &[u8]) -> Result<Vec<Operation>> {
    let mut operations = Vec::new();
    let mut pos = 0;
    while let Some(bi) = find_keyword(content, pos, b"BI") {
        operations.extend(decode_segment(&content[pos..bi])?);
        let (image, next) = parse_inline_image(content, bi + 2)?;
        operations.push(Operation::new("BI", vec![Object::Stream(image)]));
        pos = next;
    }
    operations.extend(decode_segment(&content[pos..])?);
    Ok(operations)
}

fn decode_segment(segment: &[u8]) -> Result<Vec<Operation>> {
    if segment.iter().all(|b| is_whitespace(*b)) {
        return Ok(Vec::new());
    }
    Content::decode(segment)
        .map(|c| c.operations)
        .map_err(|e| GrayscaleError::Syntax(e.to_string()))
}

/// Parses the image that starts right after a `BI` token at `pos`. Returns
/// the image and the position after its `EI`.
fn parse_inline_image(content: &[u8], pos: usize) -> Result<(Stream, usize)> {
    let id = find_keyword(content, pos, b"ID")
        .ok_or_else(|| GrayscaleError::Syntax("inline image without ID".to_string()))?;
    let dict = parse_inline_dictionary(&content[pos..id])?;

    let mut data_start = id + 2;
    if content.get(data_start).copied().is_some_and(is_whitespace) {
        data_start += 1;
    }
    let exact_end = inline_data_length(&dict)
        .map(|len| data_start + len)
        .filter(|end| *end <= content.len())
        .and_then(|end| ei_after(content, end).map(|next| (end, next)));
    let (data_end, next) = match exact_end {
        Some(found) => found,
        None => scan_for_ei(content, data_start)
            .ok_or_else(|| GrayscaleError::Syntax("inline image without EI".to_string()))?,
    };
    Ok((Stream::new(dict, content[data_start..data_end].to_vec()), next))
}

/// Parses `/Key value ...` by handing it to `lopdf` as the operands of `ID`
fn parse_inline_dictionary(src: &[u8]) -> Result<Dictionary> {
    let mut bytes = src.to_vec();
    bytes.extend_from_slice(b" ID");
    let operations = Content::decode(&bytes)
        .map(|c| c.operations)
        .map_err(|e| GrayscaleError::Syntax(format!("inline image dictionary: {e}")))?;
    let operands = match operations.as_slice() {
        [op] if op.operator == "ID" => &op.operands,
        _ => return Err(GrayscaleError::Syntax("malformed inline image dictionary".to_string())),
    };
    if operands.len() % 2 != 0 {
        return Err(GrayscaleError::Syntax("inline image key without value".to_string()));
    }
    let mut dict = Dictionary::new();
    for pair in operands.chunks(2) {
        match &pair[0] {
            Object::Name(key) => dict.set(key.clone(), pair[1].clone()),
            other => {
                return Err(GrayscaleError::Syntax(format!(
                    "inline image key is not a name: {other:?}"
                )))
            }
        }
    }
    Ok(dict)
}

/// Byte length of the image data, when the dictionary tells it: an explicit
/// `/L`, or the size of unfiltered samples
fn inline_data_length(dict: &Dictionary) -> Option<usize> {
    let entry = |full: &[u8], short: &[u8]| dict.get(full).or_else(|_| dict.get(short)).ok();
    let number = |full: &[u8], short: &[u8]| match entry(full, short) {
        Some(Object::Integer(i)) => usize::try_from(*i).ok(),
        _ => None,
    };
    if let Some(length) = number(b"Length", b"L") {
        return Some(length);
    }
    if entry(b"Filter", b"F").is_some() {
        return None;
    }
    let width = number(b"Width", b"W")?;
    let height = number(b"Height", b"H")?;
    let image_mask = matches!(entry(b"ImageMask", b"IM"), Some(Object::Boolean(true)));
    let (components, bits) = if image_mask {
        (1, 1)
    } else {
        let components = match entry(b"ColorSpace", b"CS") {
            None => 1,
            Some(Object::Name(n)) => match n.as_slice() {
                b"G" | b"DeviceGray" | b"CalGray" => 1,
                b"RGB" | b"DeviceRGB" | b"CalRGB" => 3,
                b"CMYK" | b"DeviceCMYK" => 4,
                _ => return None,
            },
            Some(Object::Array(a)) => match a.first().and_then(as_name).as_deref() {
                Some("I" | "Indexed") => 1,
                _ => return None,
            },
            Some(_) => return None,
        };
        (components, number(b"BitsPerComponent", b"BPC").unwrap_or(8))
    };
    let row = (width.checked_mul(components)?.checked_mul(bits)? + 7) / 8;
    row.checked_mul(height)
}

/// If only whitespace separates `pos` from an `EI` token, the position after it
fn ei_after(content: &[u8], mut pos: usize) -> Option<usize> {
    while content.get(pos).copied().is_some_and(is_whitespace) {
        pos += 1;
    }
    (content.get(pos..pos + 2) == Some(b"EI".as_slice()) && ends_token(content, pos + 2))
        .then_some(pos + 2)
}

/// First `EI` in `content[from..]` that is preceded by whitespace and ends a
/// token. Returns the data end (without the whitespace) and the position
/// after `EI`.
fn scan_for_ei(content: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 2 <= content.len() {
        if &content[i..i + 2] == b"EI" && ends_token(content, i + 2) {
            if i == from {
                return Some((i, i + 2));
            }
            if is_whitespace(content[i - 1]) {
                return Some((i - 1, i + 2));
            }
        }
        i += 1;
    }
    None
}

/// Position of the next `keyword` token at or after `pos`, skipping
/// strings, names and comments
fn find_keyword(content: &[u8], mut pos: usize, keyword: &[u8]) -> Option<usize> {
    let end = content.len();
    while pos < end {
        match content[pos] {
            b'(' => pos = skip_literal_string(content, pos),
            b'%' => {
                while pos < end && !matches!(content[pos], b'\r' | b'\n') {
                    pos += 1;
                }
            }
            b'<' if content.get(pos + 1) == Some(&b'<') => pos += 2,
            b'<' => {
                while pos < end && content[pos] != b'>' {
                    pos += 1;
                }
                pos += 1;
            }
            b'/' => pos = token_end(content, pos + 1),
            b if is_whitespace(b) || is_delimiter(b) => pos += 1,
            _ => {
                let token = token_end(content, pos);
                if &content[pos..token] == keyword {
                    return Some(pos);
                }
                pos = token;
            }
        }
    }
    None
}

fn skip_literal_string(content: &[u8], mut pos: usize) -> usize {
    let mut depth = 0usize;
    while pos < content.len() {
        match content[pos] {
            b'\\' => pos += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return pos + 1;
                }
            }
            _ => {}
        }
        pos += 1;
    }
    content.len()
}

fn token_end(content: &[u8], mut pos: usize) -> usize {
    while pos < content.len() && !is_whitespace(content[pos]) && !is_delimiter(content[pos]) {
        pos += 1;
    }
    pos
}

fn ends_token(content: &[u8], pos: usize) -> bool {
    content
        .get(pos)
        .map_or(true, |b| is_whitespace(*b) || is_delimiter(*b))
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Writes `operations` as content stream bytes, one operation per line
pub fn encode_operations(operations: &[Operation]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut run = Vec::new();
    for op in operations {
        if op.operator == "BI" {
            flush_run(&mut out, &mut run)?;
            write_inline_image(&mut out, op)?;
        } else {
            run.push(op.clone());
        }
    }
    flush_run(&mut out, &mut run)?;
    Ok(out)
}

fn flush_run(out: &mut Vec<u8>, run: &mut Vec<Operation>) -> Result<()> {
    if run.is_empty() {
        return Ok(());
    }
    let content = Content {
        operations: std::mem::take(run),
    };
    out.extend_from_slice(&content.encode()?);
    out.push(b'\n');
    Ok(())
}

fn write_inline_image(out: &mut Vec<u8>, op: &Operation) -> Result<()> {
    let stream = match op.operands.as_slice() {
        [Object::Stream(s)] => s,
        _ => return Err(GrayscaleError::operands("BI", "expected one inline image")),
    };
    let mut entries = Vec::with_capacity(stream.dict.len() * 2 + 2);
    for (key, value) in stream.dict.iter() {
        if !matches!(key.as_slice(), b"Length" | b"L") {
            entries.push(Object::Name(key.clone()));
            entries.push(value.clone());
        }
    }
    entries.push(Object::Name(b"L".to_vec()));
    entries.push(Object::Integer(stream.content.len() as i64));
    // `/K v ... ID`, the dictionary written as the operands of `ID`
    let header = Content {
        operations: vec![Operation::new("ID", entries)],
    };
    out.extend_from_slice(b"BI ");
    out.extend_from_slice(&header.encode()?);
    out.push(b' ');
    out.extend_from_slice(&stream.content);
    out.extend_from_slice(b"\nEI\n");
    Ok(())
}

/// Gray level operand, rounded to six decimals
pub(crate) fn gray_operand(value: f64) -> Object {
    let rounded = (value * 1e6).round() / 1e6;
    Object::Real(if rounded == 0.0 { 0.0 } else { rounded as f32 })
}

/// Checks the operand count of `operator`
pub(crate) fn expect_operands(operator: &str, operands: &[Object], count: usize) -> Result<()> {
    if operands.len() != count {
        return Err(GrayscaleError::operands(
            operator,
            format!("expected {count} operands, got {}", operands.len()),
        ));
    }
    Ok(())
}

/// All operands as numbers
pub(crate) fn number_operands(operator: &str, operands: &[Object]) -> Result<Vec<f32>> {
    operands
        .iter()
        .map(|o| to_f32(o).ok_or_else(|| GrayscaleError::operands(operator, format!("expected a number, got {o:?}"))))
        .collect()
}

/// The single name operand of `cs`, `CS` or `sh`
pub(crate) fn single_name_operand(operator: &str, operands: &[Object]) -> Result<String> {
    expect_operands(operator, operands, 1)?;
    name_operand(operator, &operands[0])
}

pub(crate) fn name_operand(operator: &str, operand: &Object) -> Result<String> {
    as_name(operand)
        .ok_or_else(|| GrayscaleError::operands(operator, format!("expected a name, got {operand:?}")))
}
