//! Whole-document drivers: convert every page, or list the pages that
//! print in color.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::detect::ColorDetector;
use crate::errors::Result;
use crate::filters::decode_stream_content;
use crate::options::ConvertOptions;
use crate::resources::Resources;
use crate::rewrite::{ConversionStats, GrayscaleConverter};
use crate::xobject::set_stream_content;

/// Decoded content of a page, its content streams joined by newlines
pub fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    for id in doc.get_page_contents(page_id) {
        let stream = doc.get_object(id)?.as_stream()?;
        if !content.is_empty() {
            content.push(b'\n');
        }
        content.extend(decode_stream_content(doc, stream)?);
    }
    Ok(content)
}

/// Replaces the content streams of a page with a single new stream
fn set_page_content(doc: &mut Document, page_id: ObjectId, content: Vec<u8>, compress: bool) -> Result<()> {
    let mut stream = Stream::new(Dictionary::new(), Vec::new());
    set_stream_content(&mut stream, content, compress)?;
    let stream_id = doc.add_object(stream);
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Reference(stream_id));
    Ok(())
}

fn convert_page(converter: &mut GrayscaleConverter, doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let content = page_content(doc, page_id)?;
    let mut resources = Resources::for_page(doc, page_id)?;
    let rewritten = converter.rewrite(doc, &content, &mut resources)?;
    let compress = converter.options().compress_streams;
    set_page_content(doc, page_id, rewritten, compress)
}

/// Converts one page, and everything it paints, to grayscale
pub fn convert_page_to_grayscale(
    doc: &mut Document,
    page_id: ObjectId,
    options: &ConvertOptions,
) -> Result<ConversionStats> {
    let mut converter = GrayscaleConverter::new(options.clone());
    convert_page(&mut converter, doc, page_id)?;
    Ok(*converter.stats())
}

/// Converts every page of `doc` to grayscale. Stops at the first page
/// that fails, leaving the pages before it converted.
pub fn convert_document_to_grayscale(doc: &mut Document, options: &ConvertOptions) -> Result<ConversionStats> {
    let mut converter = GrayscaleConverter::new(options.clone());
    for (page_number, page_id) in doc.get_pages() {
        log::debug!("converting page {page_number}");
        convert_page(&mut converter, doc, page_id)?;
    }
    Ok(*converter.stats())
}

pub fn is_page_colored(doc: &Document, page_id: ObjectId, options: &ConvertOptions) -> Result<bool> {
    let content = page_content(doc, page_id)?;
    let resources = Resources::of_page(doc, page_id)?;
    ColorDetector::new(options.clone()).contains_color(doc, &content, &resources)
}

/// Page numbers (1-based) of the pages that contain color
pub fn colored_pages(doc: &Document, options: &ConvertOptions) -> Result<Vec<u32>> {
    let mut pages = Vec::new();
    for (page_number, page_id) in doc.get_pages() {
        if is_page_colored(doc, page_id, options)? {
            pages.push(page_number);
        }
    }
    Ok(pages)
}
