//! # pdf-grayscale
//!
//! pdf-grayscale rewrites the content streams of a PDF so that everything
//! they paint comes out in gray: color operators, named colorspaces,
//! shadings, patterns, form XObjects, image XObjects and inline images.
//! A second mode answers whether a content stream (or a page) contains
//! color at all, without changing anything.
//!
//! The crate works on [`lopdf`] documents. Loading and saving the file is
//! left to `lopdf`.
//!
//! # Converting a document
//!
//! ```rust,no_run
//! use pdf_grayscale::{convert_document_to_grayscale, ConvertOptions};
//!
//! let mut doc = lopdf::Document::load("input.pdf").unwrap();
//! let stats = convert_document_to_grayscale(&mut doc, &ConvertOptions::default()).unwrap();
//! println!("{} images converted", stats.images_converted);
//! doc.save("output.pdf").unwrap();
//! ```
//!
//! # Converting a single content stream
//!
//! ```rust
//! use lopdf::{Dictionary, Document, Object};
//! use pdf_grayscale::{rewrite_content_stream_to_grayscale, ConvertOptions, Resources};
//!
//! let mut doc = Document::with_version("1.5");
//! let mut resources = Resources::new(Dictionary::from_iter(vec![(
//!     "ColorSpace",
//!     Object::Dictionary(Dictionary::from_iter(vec![(
//!         "Cs1",
//!         Object::Name(b"DeviceRGB".to_vec()),
//!     )])),
//! )]));
//!
//! let content = b"/Cs1 cs 1 0 0 scn 0 0 10 10 re f";
//! let gray = rewrite_content_stream_to_grayscale(
//!     &mut doc,
//!     content,
//!     &mut resources,
//!     &ConvertOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(gray, b"/DeviceGray cs\n0.3 scn\n0 0 10 10 re\nf\n".to_vec());
//! ```
//!
//! # Finding colored pages
//!
//! ```rust,no_run
//! use pdf_grayscale::{colored_pages, ConvertOptions};
//!
//! let doc = lopdf::Document::load("input.pdf").unwrap();
//! for page in colored_pages(&doc, &ConvertOptions::default()).unwrap() {
//!     println!("page {page} prints in color");
//! }
//! ```

pub mod color;
pub mod colorspace;
pub mod content;
pub mod detect;
pub mod document;
pub mod errors;
pub mod filters;
pub mod function;
pub mod graphics;
pub mod image;
pub mod ops;
pub mod options;
pub mod pattern;
pub mod postscript;
pub mod resources;
pub mod rewrite;
pub mod shading;
pub mod xobject;
mod utils;

pub use crate::color::{cmyk_to_gray, is_colored, rgb_to_gray, Cmyk, Color, Rgb};
pub use crate::colorspace::ColorSpace;
pub use crate::detect::{stream_contains_color, ColorDetector};
pub use crate::document::{
    colored_pages, convert_document_to_grayscale, convert_page_to_grayscale, is_page_colored,
};
pub use crate::errors::{GrayscaleError, Result};
pub use crate::function::Function;
pub use crate::options::ConvertOptions;
pub use crate::pattern::{to_gray_pattern, Pattern};
pub use crate::resources::Resources;
pub use crate::rewrite::{rewrite_content_stream_to_grayscale, ConversionStats, GrayscaleConverter};
pub use crate::shading::to_gray_shading;
pub use crate::xobject::XObject;
