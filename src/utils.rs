//! Small helpers for reading lopdf objects

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::errors::{GrayscaleError, Result};

const MAX_REFERENCE_CHAIN: usize = 32;

/// Follows `obj` through indirect references to the referenced value.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object> {
    Ok(resolve_with_id(doc, obj)?.1)
}

/// Like [`resolve`], also returns the id of the last indirect object
/// in the chain, if `obj` was a reference.
pub(crate) fn resolve_with_id<'a>(
    doc: &'a Document,
    obj: &'a Object,
) -> Result<(Option<ObjectId>, &'a Object)> {
    let mut current = obj;
    let mut id = None;
    for _ in 0..MAX_REFERENCE_CHAIN {
        match current {
            Object::Reference(r) => {
                id = Some(*r);
                // `get_object` would skip the rest of the chain
                current = doc
                    .objects
                    .get(r)
                    .ok_or(lopdf::Error::ObjectNotFound(*r))?;
            }
            _ => return Ok((id, current)),
        }
    }
    Err(GrayscaleError::mismatch("direct object", current))
}

/// Looks up `key` in `dict` and resolves the value. Missing keys are `None`.
pub(crate) fn dict_get<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Result<Option<&'a Object>> {
    match dict.get(key) {
        Ok(obj) => Ok(Some(resolve(doc, obj)?)),
        Err(_) => Ok(None),
    }
}

pub(crate) fn to_f32(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

pub(crate) fn to_i64(obj: &Object) -> Option<i64> {
    match obj {
        Object::Integer(i) => Some(*i),
        Object::Real(r) if r.fract() == 0.0 => Some(*r as i64),
        _ => None,
    }
}

pub(crate) fn as_name(obj: &Object) -> Option<String> {
    if let Object::Name(ref bytes) = obj {
        Some(String::from_utf8_lossy(bytes).into_owned())
    } else {
        None
    }
}

pub(crate) fn name_of(obj: &Object) -> Result<String> {
    as_name(obj).ok_or_else(|| GrayscaleError::mismatch("name", obj))
}

pub(crate) fn f32_of(obj: &Object) -> Result<f32> {
    to_f32(obj).ok_or_else(|| GrayscaleError::mismatch("number", obj))
}

/// Reads an array of numbers, e.g. `/Domain [0 1]`.
pub(crate) fn number_array(doc: &Document, obj: &Object) -> Result<Vec<f32>> {
    match resolve(doc, obj)? {
        Object::Array(arr) => arr
            .iter()
            .map(|o| f32_of(resolve(doc, o)?))
            .collect(),
        other => Err(GrayscaleError::mismatch("number array", other)),
    }
}

pub(crate) fn real_array(values: &[f32]) -> Object {
    Object::Array(values.iter().map(|v| Object::Real(*v)).collect())
}

pub(crate) fn name(s: &str) -> Object {
    Object::Name(s.as_bytes().to_vec())
}

/// Filter names of a stream or inline image dictionary, in decode order.
/// Accepts both the `/Filter` and the abbreviated `/F` key.
pub(crate) fn filter_names(doc: &Document, dict: &Dictionary) -> Result<Vec<String>> {
    let filter = match dict_get(doc, dict, b"Filter")? {
        Some(f) => Some(f),
        None => dict_get(doc, dict, b"F")?,
    };
    match filter {
        None | Some(Object::Null) => Ok(Vec::new()),
        Some(Object::Name(n)) => Ok(vec![String::from_utf8_lossy(n).into_owned()]),
        Some(Object::Array(arr)) => arr.iter().map(|o| name_of(resolve(doc, o)?)).collect(),
        Some(other) => Err(GrayscaleError::mismatch("filter name", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_follows_reference_chains() {
        let mut doc = Document::with_version("1.5");
        let inner = doc.add_object(Object::Integer(7));
        let outer = doc.add_object(Object::Reference(inner));
        let start = Object::Reference(outer);
        let (id, obj) = resolve_with_id(&doc, &start).unwrap();
        assert_eq!(id, Some(inner));
        assert!(matches!(obj, Object::Integer(7)));

        let missing = Object::Reference((99, 0));
        assert!(matches!(
            resolve_with_id(&doc, &missing),
            Err(GrayscaleError::Pdf(lopdf::Error::ObjectNotFound((99, 0))))
        ));
    }

    #[test]
    fn filter_names_accept_single_and_array() {
        let doc = Document::with_version("1.5");
        let mut dict = Dictionary::new();
        dict.set("Filter", name("FlateDecode"));
        assert_eq!(filter_names(&doc, &dict).unwrap(), vec!["FlateDecode".to_string()]);

        let mut dict = Dictionary::new();
        dict.set("F", Object::Array(vec![name("AHx"), name("DCT")]));
        assert_eq!(filter_names(&doc, &dict).unwrap(), vec!["AHx".to_string(), "DCT".to_string()]);
    }
}
