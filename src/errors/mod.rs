//! Errors for pdf-grayscale
//!
//! Nearly every error aborts the whole rewrite of a document: a broken
//! resource reference produces no output at all. The only error that is
//! recovered locally is [`GrayscaleError::UnsupportedEncodingParameters`],
//! on which the image recoder retries once with a plain Flate encoder.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrayscaleError {
    /// Malformed content stream
    #[error("content stream syntax error: {0}")]
    Syntax(String),

    /// A named colorspace / pattern / shading / XObject is missing from the resources
    #[error("undefined {kind} resource /{name}")]
    UndefinedResource { kind: &'static str, name: String },

    /// An operand or graphics-state value is not the expected variant
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// Wrong operand count / type for an operator
    #[error("malformed operands for `{operator}`: {reason}")]
    MalformedOperands { operator: String, reason: String },

    /// No gray tint transform exists for this number of components
    #[error("unsupported colorspace for grayscale conversion: N = {components}")]
    UnsupportedColorspace { components: usize },

    /// The original image encoder cannot re-encode with its current parameters
    #[error("unsupported encoding parameters: {0}")]
    UnsupportedEncodingParameters(String),

    /// Codec that is deliberately not implemented (JPXDecode, CCITTFax, JBIG2)
    #[error("unimplemented codec: {0}")]
    UnimplementedCodec(String),

    /// A form XObject or tiling pattern (indirectly) invokes itself
    #[error("cyclic reference to object {0} {1} R")]
    CyclicReference(u32, u16),

    #[error("nesting of forms / patterns deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("color conversion error: {0}")]
    ColorConversion(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("function error: {0}")]
    Function(String),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

impl GrayscaleError {
    pub(crate) fn undefined(kind: &'static str, name: &str) -> Self {
        GrayscaleError::UndefinedResource {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn mismatch(expected: &'static str, found: impl std::fmt::Debug) -> Self {
        GrayscaleError::TypeMismatch {
            expected,
            found: format!("{found:?}"),
        }
    }

    pub(crate) fn operands(operator: &str, reason: impl Into<String>) -> Self {
        GrayscaleError::MalformedOperands {
            operator: operator.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<::image::ImageError> for GrayscaleError {
    fn from(err: ::image::ImageError) -> Self {
        GrayscaleError::Image(err.to_string())
    }
}

impl From<std::io::Error> for GrayscaleError {
    fn from(err: std::io::Error) -> Self {
        GrayscaleError::Image(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GrayscaleError>;
