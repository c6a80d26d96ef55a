// tests/rewrite.rs

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pretty_assertions::assert_eq;

use pdf_grayscale::{
    rewrite_content_stream_to_grayscale, ColorSpace, ConvertOptions, GrayscaleConverter,
    GrayscaleError, Resources,
};

fn name(s: &str) -> Object {
    Object::Name(s.as_bytes().to_vec())
}

fn dict(entries: Vec<(&str, Object)>) -> Object {
    Object::Dictionary(Dictionary::from_iter(entries))
}

fn uncompressed() -> ConvertOptions {
    ConvertOptions {
        compress_streams: false,
        ..Default::default()
    }
}

fn rewrite(doc: &mut Document, resources: &mut Resources, content: &str) -> String {
    let out = rewrite_content_stream_to_grayscale(doc, content.as_bytes(), resources, &uncompressed())
        .unwrap();
    String::from_utf8(out).unwrap()
}

fn stream_content(doc: &Document, id: ObjectId) -> Vec<u8> {
    doc.get_object(id).unwrap().as_stream().unwrap().content.clone()
}

#[test]
fn named_rgb_colorspace_end_to_end() {
    let mut doc = Document::with_version("1.5");
    let mut resources = Resources::new(Dictionary::from_iter(vec![(
        "ColorSpace",
        dict(vec![("Cs1", name("DeviceRGB"))]),
    )]));
    assert_eq!(
        rewrite(&mut doc, &mut resources, "/Cs1 cs 1 0 0 scn 0 0 10 10 re f"),
        "/DeviceGray cs\n0.3 scn\n0 0 10 10 re\nf\n"
    );
}

#[test]
fn device_color_operators() {
    let mut doc = Document::with_version("1.5");
    let mut resources = Resources::default();
    assert_eq!(rewrite(&mut doc, &mut resources, "1 0 0 rg"), "0.3 g\n");
    assert_eq!(rewrite(&mut doc, &mut resources, "0 0 0 1 k"), "0 g\n");
    assert_eq!(rewrite(&mut doc, &mut resources, "0 0 0 0 k"), "1 g\n");
    assert_eq!(rewrite(&mut doc, &mut resources, "0 0 1 RG"), "0.11 G\n");
    assert_eq!(
        rewrite(&mut doc, &mut resources, "/DeviceRGB CS 0 1 0 SC"),
        "/DeviceGray CS\n0.59 SC\n"
    );
    assert_eq!(
        rewrite(&mut doc, &mut resources, "q BT /F1 12 Tf (Hi) Tj ET Q"),
        "q\nBT\n/F1 12 Tf\n(Hi) Tj\nET\nQ\n"
    );
}

#[test]
fn pattern_colorspace_is_kept_and_gets_gray_underlying_space() {
    let mut doc = Document::with_version("1.5");
    let tile = doc.add_object(Stream::new(
        Dictionary::from_iter(vec![
            ("Type", name("Pattern")),
            ("PatternType", Object::Integer(1)),
            ("PaintType", Object::Integer(2)),
            ("TilingType", Object::Integer(1)),
            ("BBox", Object::Array(vec![Object::Integer(0), Object::Integer(0), Object::Integer(1), Object::Integer(1)])),
            ("XStep", Object::Integer(1)),
            ("YStep", Object::Integer(1)),
        ]),
        b"0 0 1 1 re f".to_vec(),
    ));
    let mut resources = Resources::new(Dictionary::from_iter(vec![
        (
            "ColorSpace",
            dict(vec![("P0", Object::Array(vec![name("Pattern"), name("DeviceRGB")]))]),
        ),
        ("Pattern", dict(vec![("P1", Object::Reference(tile))])),
    ]));

    assert_eq!(
        rewrite(&mut doc, &mut resources, "/P0 cs 1 0 0 /P1 scn 0 0 5 5 re f"),
        "/P0 cs\n0.3 /P1 scn\n0 0 5 5 re\nf\n"
    );
    match resources.color_space(&doc, "P0").unwrap() {
        ColorSpace::Pattern {
            underlying: Some(base),
        } => assert!(matches!(*base, ColorSpace::DeviceGray)),
        other => panic!("unexpected colorspace {other:?}"),
    }
    // uncolored tiling patterns are left alone
    assert_eq!(stream_content(&doc, tile), b"0 0 1 1 re f".to_vec());
}

#[test]
fn colored_pattern_is_converted_once() {
    let mut doc = Document::with_version("1.5");
    let tile = doc.add_object(Stream::new(
        Dictionary::from_iter(vec![
            ("PatternType", Object::Integer(1)),
            ("PaintType", Object::Integer(1)),
        ]),
        b"1 0 0 rg 0 0 1 1 re f".to_vec(),
    ));
    let mut resources = Resources::new(Dictionary::from_iter(vec![(
        "Pattern",
        dict(vec![("P1", Object::Reference(tile))]),
    )]));

    let mut converter = GrayscaleConverter::new(uncompressed());
    let out = converter
        .rewrite(
            &mut doc,
            b"/Pattern cs /P1 scn 0 0 5 5 re f /P1 scn 5 5 5 5 re f",
            &mut resources,
        )
        .unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "/Pattern cs\n/P1 scn\n0 0 5 5 re\nf\n/P1 scn\n5 5 5 5 re\nf\n"
    );
    assert_eq!(converter.stats().patterns_converted, 1);
    assert_eq!(stream_content(&doc, tile), b"0.3 g\n0 0 1 1 re\nf\n".to_vec());
}

#[test]
fn forms_are_rewritten_with_their_own_or_the_parent_resources() {
    let mut doc = Document::with_version("1.5");
    let inherits = doc.add_object(Stream::new(
        Dictionary::from_iter(vec![("Type", name("XObject")), ("Subtype", name("Form"))]),
        b"/Cs1 cs 0 0 1 sc 0 0 1 1 re f".to_vec(),
    ));
    let own = doc.add_object(Stream::new(
        Dictionary::from_iter(vec![
            ("Type", name("XObject")),
            ("Subtype", name("Form")),
            (
                "Resources",
                dict(vec![("ColorSpace", dict(vec![("Cs1", name("DeviceCMYK"))]))]),
            ),
        ]),
        b"/Cs1 cs 0 0 0 1 sc".to_vec(),
    ));
    let mut resources = Resources::new(Dictionary::from_iter(vec![
        ("ColorSpace", dict(vec![("Cs1", name("DeviceRGB"))])),
        (
            "XObject",
            dict(vec![("Fm1", Object::Reference(inherits)), ("Fm2", Object::Reference(own))]),
        ),
    ]));

    let mut converter = GrayscaleConverter::new(uncompressed());
    let out = converter
        .rewrite(&mut doc, b"/Fm1 Do /Fm2 Do /Fm1 Do", &mut resources)
        .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "/Fm1 Do\n/Fm2 Do\n/Fm1 Do\n");
    assert_eq!(
        stream_content(&doc, inherits),
        b"/DeviceGray cs\n0.11 sc\n0 0 1 1 re\nf\n".to_vec()
    );
    assert_eq!(stream_content(&doc, own), b"/DeviceGray cs\n0 sc\n".to_vec());
    assert_eq!(converter.stats().forms_converted, 2);
    assert_eq!(converter.stats().xobjects_processed, 2);
}

#[test]
fn self_referencing_form_is_rejected() {
    let mut doc = Document::with_version("1.5");
    let form = doc.new_object_id();
    doc.objects.insert(
        form,
        Object::Stream(Stream::new(
            Dictionary::from_iter(vec![
                ("Subtype", name("Form")),
                ("Resources", dict(vec![("XObject", dict(vec![("Fm1", Object::Reference(form))]))])),
            ]),
            b"/Fm1 Do".to_vec(),
        )),
    );
    let mut resources = Resources::new(Dictionary::from_iter(vec![(
        "XObject",
        dict(vec![("Fm1", Object::Reference(form))]),
    )]));

    let result =
        rewrite_content_stream_to_grayscale(&mut doc, b"/Fm1 Do", &mut resources, &uncompressed());
    assert!(matches!(result, Err(GrayscaleError::CyclicReference(id, 0)) if id == form.0));
}

#[test]
fn shadings() {
    let mut doc = Document::with_version("1.5");
    let two_colorants = Object::Array(vec![
        name("DeviceN"),
        Object::Array(vec![name("Spot1"), name("Spot2")]),
        name("DeviceGray"),
        dict(vec![
            ("FunctionType", Object::Integer(2)),
            ("Domain", Object::Array(vec![Object::Integer(0), Object::Integer(1), Object::Integer(0), Object::Integer(1)])),
            ("N", Object::Integer(1)),
        ]),
    ]);
    let mut resources = Resources::new(Dictionary::from_iter(vec![(
        "Shading",
        dict(vec![
            (
                "Sh1",
                dict(vec![("ShadingType", Object::Integer(2)), ("ColorSpace", name("DeviceCMYK"))]),
            ),
            (
                "Sh2",
                dict(vec![("ShadingType", Object::Integer(2)), ("ColorSpace", two_colorants)]),
            ),
        ]),
    )]));

    assert_eq!(rewrite(&mut doc, &mut resources, "/Sh1 sh"), "/Sh1 sh\n");
    let sh1 = resources
        .lookup(&doc, pdf_grayscale::resources::ResourceKind::Shading, "Sh1")
        .unwrap()
        .unwrap()
        .1;
    let cs = pdf_grayscale::shading::shading_color_space(&doc, &sh1).unwrap();
    assert!(matches!(cs, ColorSpace::DeviceN { ref names, .. } if names.len() == 4));

    let result =
        rewrite_content_stream_to_grayscale(&mut doc, b"/Sh2 sh", &mut resources, &uncompressed());
    assert!(matches!(result, Err(GrayscaleError::UnsupportedColorspace { components: 2 })));
}

#[test]
fn undefined_resources_abort_the_rewrite() {
    let mut doc = Document::with_version("1.5");
    let mut resources = Resources::default();
    for content in ["/Cs9 cs", "/P9 scn", "/Im9 Do"] {
        let result = rewrite_content_stream_to_grayscale(
            &mut doc,
            format!("/Pattern cs {content}").as_bytes(),
            &mut resources,
            &uncompressed(),
        );
        assert!(
            matches!(result, Err(GrayscaleError::UndefinedResource { .. })),
            "{content}: {result:?}"
        );
    }
}
