//! PDF functions (types 0, 2, 3 and 4)
//!
//! Functions are read from tint transforms and shadings, evaluated when
//! colors have to be converted by hand, and written back for the gray tint
//! transforms that replace the original colorspaces.

use lopdf::{Dictionary, Document, Object, Stream};

use crate::errors::{GrayscaleError, Result};
use crate::filters::decode_stream_content;
use crate::postscript::{PsOperator, PsProgram};
use crate::utils::{dict_get, f32_of, number_array, real_array, resolve, to_i64};

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// `[min0 max0 min1 max1 ...]`, one pair per input
    pub domain: Vec<f32>,
    /// `[min0 max0 ...]`, one pair per output. Required for types 0 and 4.
    pub range: Option<Vec<f32>>,
    pub kind: FunctionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionKind {
    /// Type 0
    Sampled {
        size: Vec<usize>,
        bits_per_sample: u8,
        encode: Vec<f32>,
        decode: Vec<f32>,
        samples: Vec<u8>,
    },
    /// Type 2
    Exponential { c0: Vec<f32>, c1: Vec<f32>, n: f32 },
    /// Type 3
    Stitching {
        functions: Vec<Function>,
        bounds: Vec<f32>,
        encode: Vec<f32>,
    },
    /// Type 4
    Calculator(PsProgram),
}

impl Function {
    pub fn from_object(doc: &Document, obj: &Object) -> Result<Self> {
        let (dict, stream) = match resolve(doc, obj)? {
            Object::Dictionary(d) => (d, None),
            Object::Stream(s) => (&s.dict, Some(s)),
            other => return Err(GrayscaleError::mismatch("function", other)),
        };

        let function_type = dict_get(doc, dict, b"FunctionType")?
            .and_then(to_i64)
            .ok_or_else(|| GrayscaleError::Function("missing /FunctionType".to_string()))?;
        let domain = number_array(doc, dict.get(b"Domain")?)?;
        let range = match dict.get(b"Range") {
            Ok(r) => Some(number_array(doc, r)?),
            Err(_) => None,
        };

        let kind = match (function_type, stream) {
            (0, Some(stream)) => {
                let size: Vec<usize> = number_array(doc, dict.get(b"Size")?)?
                    .into_iter()
                    .map(|s| s.max(1.0) as usize)
                    .collect();
                let bits_per_sample = dict_get(doc, dict, b"BitsPerSample")?
                    .and_then(to_i64)
                    .unwrap_or(8) as u8;
                let encode = match dict.get(b"Encode") {
                    Ok(e) => number_array(doc, e)?,
                    Err(_) => size.iter().flat_map(|s| [0.0, (*s - 1) as f32]).collect(),
                };
                let decode = match dict.get(b"Decode") {
                    Ok(d) => number_array(doc, d)?,
                    Err(_) => range.clone().ok_or_else(|| {
                        GrayscaleError::Function("sampled function without /Range".to_string())
                    })?,
                };
                FunctionKind::Sampled {
                    size,
                    bits_per_sample,
                    encode,
                    decode,
                    samples: decode_stream_content(doc, stream)?,
                }
            }
            (2, _) => {
                let c0 = match dict.get(b"C0") {
                    Ok(c) => number_array(doc, c)?,
                    Err(_) => vec![0.0],
                };
                let c1 = match dict.get(b"C1") {
                    Ok(c) => number_array(doc, c)?,
                    Err(_) => vec![1.0],
                };
                let n = f32_of(resolve(doc, dict.get(b"N")?)?)?;
                FunctionKind::Exponential { c0, c1, n }
            }
            (3, _) => {
                let functions = match resolve(doc, dict.get(b"Functions")?)? {
                    Object::Array(arr) => arr
                        .iter()
                        .map(|f| Function::from_object(doc, f))
                        .collect::<Result<Vec<_>>>()?,
                    other => return Err(GrayscaleError::mismatch("function array", other)),
                };
                let bounds = number_array(doc, dict.get(b"Bounds")?)?;
                let encode = number_array(doc, dict.get(b"Encode")?)?;
                FunctionKind::Stitching {
                    functions,
                    bounds,
                    encode,
                }
            }
            (4, Some(stream)) => {
                FunctionKind::Calculator(PsProgram::parse(&decode_stream_content(doc, stream)?)?)
            }
            (t, _) => {
                return Err(GrayscaleError::Function(format!(
                    "unsupported function type {t}"
                )))
            }
        };

        Ok(Function {
            domain,
            range,
            kind,
        })
    }

    /// Serializes the function. Stream based functions (types 0 and 4) are
    /// added to `doc` and returned as a reference.
    pub fn to_object(&self, doc: &mut Document) -> Object {
        let mut dict = Dictionary::new();
        dict.set("Domain", real_array(&self.domain));
        if let Some(range) = &self.range {
            dict.set("Range", real_array(range));
        }

        match &self.kind {
            FunctionKind::Sampled {
                size,
                bits_per_sample,
                encode,
                decode,
                samples,
            } => {
                dict.set("FunctionType", Object::Integer(0));
                dict.set(
                    "Size",
                    Object::Array(size.iter().map(|s| Object::Integer(*s as i64)).collect()),
                );
                dict.set("BitsPerSample", Object::Integer(*bits_per_sample as i64));
                dict.set("Encode", real_array(encode));
                dict.set("Decode", real_array(decode));
                let id = doc.add_object(Stream::new(dict, samples.clone()));
                Object::Reference(id)
            }
            FunctionKind::Exponential { c0, c1, n } => {
                dict.set("FunctionType", Object::Integer(2));
                dict.set("C0", real_array(c0));
                dict.set("C1", real_array(c1));
                dict.set("N", Object::Real(*n));
                Object::Dictionary(dict)
            }
            FunctionKind::Stitching {
                functions,
                bounds,
                encode,
            } => {
                dict.set("FunctionType", Object::Integer(3));
                let functions = functions.iter().map(|f| f.to_object(doc)).collect();
                dict.set("Functions", Object::Array(functions));
                dict.set("Bounds", real_array(bounds));
                dict.set("Encode", real_array(encode));
                Object::Dictionary(dict)
            }
            FunctionKind::Calculator(program) => {
                dict.set("FunctionType", Object::Integer(4));
                let id = doc.add_object(Stream::new(dict, program.to_bytes()));
                Object::Reference(id)
            }
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.domain.len() / 2
    }

    /// Evaluates the function, clipping inputs to the domain and outputs
    /// to the range.
    pub fn apply(&self, inputs: &[f32]) -> Result<Vec<f32>> {
        if inputs.len() < self.num_inputs() {
            return Err(GrayscaleError::Function(format!(
                "function takes {} inputs, got {}",
                self.num_inputs(),
                inputs.len()
            )));
        }
        let x: Vec<f32> = (0..self.num_inputs())
            .map(|i| clip(inputs[i], self.domain[2 * i], self.domain[2 * i + 1]))
            .collect();

        let mut out = match &self.kind {
            FunctionKind::Sampled {
                size,
                bits_per_sample,
                encode,
                decode,
                samples,
            } => {
                let n_out = decode.len() / 2;
                eval_sampled(&x, &self.domain, size, *bits_per_sample, encode, decode, samples, n_out)?
            }
            FunctionKind::Exponential { c0, c1, n } => {
                let xn = x[0].powf(*n);
                c0.iter()
                    .zip(c1.iter())
                    .map(|(a, b)| a + xn * (b - a))
                    .collect()
            }
            FunctionKind::Stitching {
                functions,
                bounds,
                encode,
            } => {
                let v = x[0];
                let k = bounds.iter().take_while(|b| v >= **b).count().min(functions.len().saturating_sub(1));
                let lo = if k == 0 { self.domain[0] } else { bounds[k - 1] };
                let hi = if k == bounds.len() { self.domain[1] } else { bounds[k] };
                let (e0, e1) = match (encode.get(2 * k), encode.get(2 * k + 1)) {
                    (Some(a), Some(b)) => (*a, *b),
                    _ => return Err(GrayscaleError::Function("stitching /Encode too short".to_string())),
                };
                let f = functions.get(k).ok_or_else(|| {
                    GrayscaleError::Function("stitching function without subfunctions".to_string())
                })?;
                f.apply(&[interpolate(v, lo, hi, e0, e1)])?
            }
            FunctionKind::Calculator(program) => {
                let inputs: Vec<f64> = x.iter().map(|v| *v as f64).collect();
                program.execute(&inputs)?.into_iter().map(|v| v as f32).collect()
            }
        };

        if let Some(range) = &self.range {
            for (i, v) in out.iter_mut().enumerate() {
                if let (Some(lo), Some(hi)) = (range.get(2 * i), range.get(2 * i + 1)) {
                    *v = clip(*v, *lo, *hi);
                }
            }
        }
        Ok(out)
    }

    /// Like [`Function::apply`] in double precision. Calculator functions run
    /// entirely in `f64`; the other kinds are evaluated in `f32` and widened.
    pub fn evaluate(&self, inputs: &[f64]) -> Result<Vec<f64>> {
        let program = match &self.kind {
            FunctionKind::Calculator(program) => program,
            _ => {
                let narrow: Vec<f32> = inputs.iter().map(|v| *v as f32).collect();
                return Ok(self.apply(&narrow)?.into_iter().map(f64::from).collect());
            }
        };
        if inputs.len() < self.num_inputs() {
            return Err(GrayscaleError::Function(format!(
                "function takes {} inputs, got {}",
                self.num_inputs(),
                inputs.len()
            )));
        }
        let x: Vec<f64> = (0..self.num_inputs())
            .map(|i| inputs[i].clamp(self.domain[2 * i].into(), self.domain[2 * i + 1].into()))
            .collect();
        let mut out = program.execute(&x)?;
        if let Some(range) = &self.range {
            for (i, v) in out.iter_mut().enumerate() {
                if let (Some(lo), Some(hi)) = (range.get(2 * i), range.get(2 * i + 1)) {
                    *v = v.clamp((*lo).into(), (*hi).into());
                }
            }
        }
        Ok(out)
    }

    /// Type 4 tint transform `gray = 0.3 r + 0.59 g + 0.11 b`, the same
    /// weights as [`crate::color::rgb_to_gray`]
    pub fn rgb_to_gray() -> Self {
        let mut program = PsProgram::new();
        program
            .push_real(0.11)
            .push_op(PsOperator::Mul)
            .push_op(PsOperator::Exch)
            .push_real(0.59)
            .push_op(PsOperator::Mul)
            .push_op(PsOperator::Add)
            .push_op(PsOperator::Exch)
            .push_real(0.3)
            .push_op(PsOperator::Mul)
            .push_op(PsOperator::Add);
        Function {
            domain: vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
            range: Some(vec![0.0, 1.0]),
            kind: FunctionKind::Calculator(program),
        }
    }

    /// Type 4 tint transform `gray = 1 - min(1, 0.3 c + 0.59 m + 0.11 y + k)`
    pub fn cmyk_to_gray() -> Self {
        let mut saturate = PsProgram::new();
        saturate.push_op(PsOperator::Pop).push_real(1.0);

        let mut program = PsProgram::new();
        program
            .push_op(PsOperator::Exch)
            .push_real(0.11)
            .push_op(PsOperator::Mul)
            .push_op(PsOperator::Add)
            .push_op(PsOperator::Exch)
            .push_real(0.59)
            .push_op(PsOperator::Mul)
            .push_op(PsOperator::Add)
            .push_op(PsOperator::Exch)
            .push_real(0.3)
            .push_op(PsOperator::Mul)
            .push_op(PsOperator::Add)
            .push_op(PsOperator::Dup)
            .push_real(1.0)
            .push_op(PsOperator::Ge)
            .push_proc(saturate)
            .push_op(PsOperator::If)
            .push_real(1.0)
            .push_op(PsOperator::Exch)
            .push_op(PsOperator::Sub);
        Function {
            domain: vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
            range: Some(vec![0.0, 1.0]),
            kind: FunctionKind::Calculator(program),
        }
    }

    /// One-input sampled function over `[0 1]` with 8-bit samples.
    /// `samples` holds `n_out` values per sample point, each in `[0 1]`.
    pub fn sampled_1d(samples: &[f32], n_out: usize) -> Self {
        let n_out = n_out.max(1);
        let points = (samples.len() / n_out).max(1);
        let bytes = samples
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        let unit: Vec<f32> = (0..n_out).flat_map(|_| [0.0, 1.0]).collect();
        Function {
            domain: vec![0.0, 1.0],
            range: Some(unit.clone()),
            kind: FunctionKind::Sampled {
                size: vec![points],
                bits_per_sample: 8,
                encode: vec![0.0, (points - 1) as f32],
                decode: unit,
                samples: bytes,
            },
        }
    }
}

/// Evaluates a list of functions as one: a single function, or an array
/// of 1-in 1-out functions (as allowed in shadings).
pub fn apply_all(functions: &[Function], inputs: &[f32]) -> Result<Vec<f32>> {
    match functions {
        [single] => single.apply(inputs),
        many => {
            let mut out = Vec::with_capacity(many.len());
            for f in many {
                out.extend(f.apply(inputs)?);
            }
            Ok(out)
        }
    }
}

fn clip(v: f32, lo: f32, hi: f32) -> f32 {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

fn interpolate(x: f32, x0: f32, x1: f32, y0: f32, y1: f32) -> f32 {
    if (x1 - x0).abs() < f32::EPSILON {
        y0
    } else {
        y0 + (x - x0) * (y1 - y0) / (x1 - x0)
    }
}

fn read_sample(samples: &[u8], index: usize, bits: u8) -> Result<u32> {
    let bits = bits as usize;
    let bit_pos = index * bits;
    let mut value: u32 = 0;
    for b in 0..bits {
        let pos = bit_pos + b;
        let byte = samples.get(pos / 8).ok_or_else(|| {
            GrayscaleError::Function("sampled function data too short".to_string())
        })?;
        let bit = (byte >> (7 - pos % 8)) & 1;
        value = (value << 1) | bit as u32;
    }
    Ok(value)
}

#[allow(clippy::too_many_arguments)]
fn eval_sampled(
    x: &[f32],
    domain: &[f32],
    size: &[usize],
    bits_per_sample: u8,
    encode: &[f32],
    decode: &[f32],
    samples: &[u8],
    n_out: usize,
) -> Result<Vec<f32>> {
    let m = x.len();
    if size.len() < m || encode.len() < 2 * m {
        return Err(GrayscaleError::Function(
            "sampled function /Size or /Encode too short".to_string(),
        ));
    }

    let e: Vec<f32> = (0..m)
        .map(|i| {
            let v = interpolate(x[i], domain[2 * i], domain[2 * i + 1], encode[2 * i], encode[2 * i + 1]);
            clip(v, 0.0, (size[i] - 1) as f32)
        })
        .collect();

    let max_sample = ((1u64 << bits_per_sample) - 1) as f32;
    let mut out = vec![0.0f32; n_out];

    // multilinear interpolation over the 2^m surrounding sample points
    for corner in 0..(1usize << m) {
        let mut weight = 1.0f32;
        let mut offset = 0usize;
        let mut stride = 1usize;
        for i in 0..m {
            let lo = e[i].floor() as usize;
            let hi = (lo + 1).min(size[i] - 1);
            let frac = e[i] - lo as f32;
            let (idx, w) = if corner & (1 << i) == 0 {
                (lo, 1.0 - frac)
            } else {
                (hi, frac)
            };
            weight *= w;
            offset += idx * stride;
            stride *= size[i];
        }
        if weight == 0.0 {
            continue;
        }
        for (j, slot) in out.iter_mut().enumerate() {
            let raw = read_sample(samples, offset * n_out + j, bits_per_sample)? as f32;
            *slot += weight * raw;
        }
    }

    Ok(out
        .iter()
        .enumerate()
        .map(|(j, raw)| interpolate(*raw, 0.0, max_sample, decode[2 * j], decode[2 * j + 1]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{cmyk_to_gray, rgb_to_gray};

    const SAMPLES: [f64; 5] = [0.0, 0.2, 0.5, 0.8, 1.0];

    #[test]
    fn rgb_program_matches_formula() {
        let f = Function::rgb_to_gray();
        let corners = [
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.2, 0.4, 0.6],
        ];
        for [r, g, b] in corners {
            let out = f.evaluate(&[r, g, b]).unwrap();
            assert_eq!(out.len(), 1);
            assert!((out[0] - rgb_to_gray(r, g, b)).abs() < 1e-9, "{r} {g} {b}");
        }
        for &r in &SAMPLES {
            for &g in &SAMPLES {
                for &b in &SAMPLES {
                    let out = f.evaluate(&[r, g, b]).unwrap();
                    assert!((out[0] - rgb_to_gray(r, g, b)).abs() < 1e-9, "{r} {g} {b}");
                }
            }
        }
    }

    #[test]
    fn cmyk_program_matches_formula() {
        let f = Function::cmyk_to_gray();
        for &c in &SAMPLES {
            for &m in &SAMPLES {
                for &y in &SAMPLES {
                    for &k in &SAMPLES {
                        let out = f.evaluate(&[c, m, y, k]).unwrap();
                        assert!(
                            (out[0] - cmyk_to_gray(c, m, y, k)).abs() < 1e-9,
                            "{c} {m} {y} {k}: {} vs {}",
                            out[0],
                            cmyk_to_gray(c, m, y, k)
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn single_precision_apply_stays_close() {
        let out = Function::rgb_to_gray().apply(&[0.2, 0.4, 0.6]).unwrap();
        assert!((f64::from(out[0]) - rgb_to_gray(0.2, 0.4, 0.6)).abs() < 1e-6);
    }

    #[test]
    fn programs_survive_serialization() {
        let mut doc = Document::with_version("1.5");
        let obj = Function::cmyk_to_gray().to_object(&mut doc);
        let parsed = Function::from_object(&doc, &obj).unwrap();
        let out = parsed.evaluate(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert!((out[0] - cmyk_to_gray(0.1, 0.2, 0.3, 0.4)).abs() < 1e-9);
    }

    #[test]
    fn sampled_interpolates_linearly() {
        let f = Function::sampled_1d(&[0.0, 1.0], 1);
        let out = f.apply(&[0.5]).unwrap();
        assert!((out[0] - 0.5).abs() < 1e-2);
        assert_eq!(f.apply(&[2.0]).unwrap(), vec![1.0]);
    }

    #[test]
    fn exponential_and_stitching() {
        let half = Function {
            domain: vec![0.0, 1.0],
            range: None,
            kind: FunctionKind::Exponential {
                c0: vec![0.0, 0.0, 0.0],
                c1: vec![1.0, 0.5, 0.0],
                n: 1.0,
            },
        };
        assert_eq!(half.apply(&[0.5]).unwrap(), vec![0.5, 0.25, 0.0]);

        let stitched = Function {
            domain: vec![0.0, 1.0],
            range: None,
            kind: FunctionKind::Stitching {
                functions: vec![half.clone(), half],
                bounds: vec![0.5],
                encode: vec![0.0, 1.0, 1.0, 0.0],
            },
        };
        // second half runs backwards
        assert_eq!(stitched.apply(&[1.0]).unwrap(), vec![0.0, 0.0, 0.0]);
        assert_eq!(stitched.apply(&[0.25]).unwrap(), vec![0.5, 0.25, 0.0]);
    }
}
