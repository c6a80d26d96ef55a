// tests/document.rs

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pretty_assertions::assert_eq;

use pdf_grayscale::document::page_content;
use pdf_grayscale::{
    colored_pages, convert_document_to_grayscale, convert_page_to_grayscale, is_page_colored,
    ConvertOptions,
};

fn name(s: &str) -> Object {
    Object::Name(s.as_bytes().to_vec())
}

/// Document with one page per content string. The page tree carries the
/// resources, so every page inherits them.
fn document(pages: &[&[u8]]) -> (Document, Vec<ObjectId>) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let image = doc.add_object(Stream::new(
        Dictionary::from_iter(vec![
            ("Subtype", name("Image")),
            ("Width", Object::Integer(1)),
            ("Height", Object::Integer(1)),
            ("ColorSpace", name("DeviceRGB")),
            ("BitsPerComponent", Object::Integer(8)),
        ]),
        vec![0, 0, 255],
    ));

    let mut kids = Vec::new();
    for content in pages {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.to_vec()));
        let page_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", name("Page")),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
        ]));
        kids.push(page_id);
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter(vec![
            ("Type", name("Pages")),
            ("Kids", Object::Array(kids.iter().map(|k| Object::Reference(*k)).collect())),
            ("Count", Object::Integer(kids.len() as i64)),
            (
                "Resources",
                Object::Dictionary(Dictionary::from_iter(vec![(
                    "XObject",
                    Object::Dictionary(Dictionary::from_iter(vec![("Im1", Object::Reference(image))])),
                )])),
            ),
        ])),
    );
    let catalog = doc.add_object(Dictionary::from_iter(vec![
        ("Type", name("Catalog")),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog));
    (doc, kids)
}

#[test]
fn colored_pages_are_listed() {
    let (doc, _) = document(&[b"0 g 0 0 1 1 re f", b"1 0 0 rg 0 0 1 1 re f", b"/Im1 Do"]);
    let options = ConvertOptions::default();
    assert_eq!(colored_pages(&doc, &options).unwrap(), vec![2, 3]);
}

#[test]
fn whole_document_conversion() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut doc, pages) = document(&[b"0 g", b"1 0 0 rg 0 0 1 1 re f", b"q /Im1 Do Q"]);
    let options = ConvertOptions::default();
    let stats = convert_document_to_grayscale(&mut doc, &options).unwrap();

    assert_eq!(stats.streams_rewritten, 3);
    assert_eq!(stats.operators_rewritten, 1);
    assert_eq!(stats.images_converted, 1);
    assert_eq!(colored_pages(&doc, &options).unwrap(), Vec::<u32>::new());
    // the new content streams are compressed and decode to the rewritten operators
    assert_eq!(page_content(&doc, pages[1]).unwrap(), b"0.3 g\n0 0 1 1 re\nf\n".to_vec());
}

#[test]
fn single_page_conversion() {
    let (mut doc, pages) = document(&[b"0 0 1 RG", b"0 1 0 rg"]);
    let options = ConvertOptions {
        compress_streams: false,
        ..Default::default()
    };
    convert_page_to_grayscale(&mut doc, pages[0], &options).unwrap();
    assert!(!is_page_colored(&doc, pages[0], &options).unwrap());
    assert!(is_page_colored(&doc, pages[1], &options).unwrap());
}

#[test]
fn pages_sharing_a_pattern_colorspace() {
    let (mut doc, pages) = document(&[
        b"/PCs cs 1 0 0 /P1 scn 0 0 1 1 re f",
        b"/PCs cs 0 1 0 /P1 scn 0 0 1 1 re f",
    ]);
    let stencil = doc.add_object(Stream::new(
        Dictionary::from_iter(vec![
            ("PatternType", Object::Integer(1)),
            ("PaintType", Object::Integer(2)),
        ]),
        b"0 0 1 1 re f".to_vec(),
    ));
    let pages_id = match doc.get_object(pages[0]).unwrap().as_dict().unwrap().get(b"Parent") {
        Ok(Object::Reference(id)) => *id,
        other => panic!("unexpected parent {other:?}"),
    };
    let resources = doc
        .get_object_mut(pages_id)
        .unwrap()
        .as_dict_mut()
        .unwrap()
        .get_mut(b"Resources")
        .unwrap()
        .as_dict_mut()
        .unwrap();
    resources.set(
        "ColorSpace",
        Dictionary::from_iter(vec![("PCs", Object::Array(vec![name("Pattern"), name("DeviceRGB")]))]),
    );
    resources.set("Pattern", Dictionary::from_iter(vec![("P1", Object::Reference(stencil))]));

    let options = ConvertOptions::default();
    assert_eq!(colored_pages(&doc, &options).unwrap(), vec![1, 2]);
    convert_document_to_grayscale(&mut doc, &options).unwrap();

    // the second page still reads its RGB operands against the original space
    assert_eq!(
        page_content(&doc, pages[0]).unwrap(),
        b"/PCs cs\n0.3 /P1 scn\n0 0 1 1 re\nf\n".to_vec()
    );
    assert_eq!(
        page_content(&doc, pages[1]).unwrap(),
        b"/PCs cs\n0.59 /P1 scn\n0 0 1 1 re\nf\n".to_vec()
    );
    assert_eq!(colored_pages(&doc, &options).unwrap(), Vec::<u32>::new());
}
