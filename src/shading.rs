use lopdf::{Dictionary, Document, Object};

use crate::color::Color;
use crate::colorspace::ColorSpace;
use crate::errors::{GrayscaleError, Result};
use crate::utils::{number_array, real_array};

fn shading_dict(shading: &Object) -> Result<&Dictionary> {
    match shading {
        Object::Dictionary(d) => Ok(d),
        Object::Stream(s) => Ok(&s.dict),
        other => Err(GrayscaleError::mismatch("shading dictionary", other)),
    }
}

fn shading_dict_mut(shading: &mut Object) -> Result<&mut Dictionary> {
    match shading {
        Object::Dictionary(d) => Ok(d),
        Object::Stream(s) => Ok(&mut s.dict),
        other => Err(GrayscaleError::mismatch("shading dictionary", other)),
    }
}

/// Colorspace of a shading dictionary or (mesh) shading stream
pub fn shading_color_space(doc: &Document, shading: &Object) -> Result<ColorSpace> {
    let dict = shading_dict(shading)?;
    let cs = dict
        .get(b"ColorSpace")
        .map_err(|_| GrayscaleError::mismatch("shading with /ColorSpace", dict))?;
    ColorSpace::from_object(doc, cs)
}

/// Replaces the colorspace of `shading` with its grayscale counterpart.
///
/// The shading function still produces colors in the old component count,
/// which the new DeviceN tint transform maps to gray. `/Background` is
/// converted along with it.
pub fn to_gray_shading(doc: &mut Document, mut shading: Object) -> Result<Object> {
    let space = shading_color_space(doc, &shading)?;
    let gray_space = space.to_grayscale_colorspace()?;

    let background = match shading_dict(&shading)?.get(b"Background") {
        Ok(bg) => Some(number_array(doc, bg)?),
        Err(_) => None,
    };
    let background = match background {
        Some(values) => {
            let color = space.color_from_components(&values)?;
            Some(gray_background(&space, &gray_space, &color)?)
        }
        None => None,
    };

    let cs_object = gray_space.to_object(doc);
    let dict = shading_dict_mut(&mut shading)?;
    dict.set("ColorSpace", cs_object);
    if let Some(bg) = background {
        dict.set("Background", bg);
    }
    Ok(shading)
}

/// The background color expressed in the new colorspace. DeviceN spaces
/// built for the conversion keep the old components as their input.
fn gray_background(old: &ColorSpace, new: &ColorSpace, color: &Color) -> Result<Object> {
    match (new, color) {
        (ColorSpace::DeviceGray, _) => Ok(real_array(&[old.color_to_gray(color)?])),
        (_, Color::Components(c)) => Ok(real_array(c)),
        (_, Color::Pattern { .. }) => Err(GrayscaleError::mismatch("shading background", color)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::name;
    use pretty_assertions::assert_eq;

    fn axial(cs: Object) -> Object {
        Object::Dictionary(Dictionary::from_iter(vec![
            ("ShadingType", Object::Integer(2)),
            ("ColorSpace", cs),
            ("Coords", real_array(&[0.0, 0.0, 1.0, 0.0])),
        ]))
    }

    #[test]
    fn rgb_shading_becomes_devicen() {
        let mut doc = Document::with_version("1.5");
        let out = to_gray_shading(&mut doc, axial(name("DeviceRGB"))).unwrap();
        let cs = shading_color_space(&doc, &out).unwrap();
        match cs {
            ColorSpace::DeviceN { names, alternate, .. } => {
                assert_eq!(names, vec!["R".to_string(), "G".into(), "B".into()]);
                assert!(matches!(*alternate, ColorSpace::DeviceGray));
            }
            other => panic!("unexpected colorspace {other:?}"),
        }
    }

    #[test]
    fn calgray_background_is_converted() {
        let mut doc = Document::with_version("1.5");
        let calgray = Object::Array(vec![
            name("CalGray"),
            Object::Dictionary(Dictionary::from_iter(vec![(
                "WhitePoint",
                real_array(&[0.9505, 1.0, 1.089]),
            )])),
        ]);
        let mut shading = axial(calgray);
        if let Object::Dictionary(d) = &mut shading {
            d.set("Background", real_array(&[0.5]));
        }
        let out = to_gray_shading(&mut doc, shading).unwrap();
        let dict = shading_dict(&out).unwrap();
        assert!(matches!(dict.get(b"ColorSpace").unwrap(), Object::Name(n) if n == b"DeviceGray"));
        let bg = number_array(&doc, dict.get(b"Background").unwrap()).unwrap();
        assert_eq!(bg.len(), 1);
        assert!((bg[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn two_component_shading_is_rejected() {
        let mut doc = Document::with_version("1.5");
        let cs = Object::Array(vec![
            name("DeviceN"),
            Object::Array(vec![name("A"), name("B")]),
            name("DeviceRGB"),
            Object::Dictionary(Dictionary::from_iter(vec![
                ("FunctionType", Object::Integer(2)),
                ("Domain", real_array(&[0.0, 1.0, 0.0, 1.0])),
                ("C0", real_array(&[0.0, 0.0, 0.0])),
                ("C1", real_array(&[1.0, 1.0, 1.0])),
                ("N", Object::Integer(1)),
            ])),
        ]);
        assert!(matches!(
            to_gray_shading(&mut doc, axial(cs)),
            Err(GrayscaleError::UnsupportedColorspace { components: 2 })
        ));
    }
}
