use serde_derive::{Deserialize, Serialize};

/// Smallest channel difference that is visible on a typical mid-range color
/// laser printer, on the normalized 0.0 - 1.0 scale.
pub const DEFAULT_COLOR_TOLERANCE: f32 = 3.1 / 255.0;

/// Options for converting content streams to grayscale and for detecting color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Images compressed with CCITTFaxDecode or JBIG2Decode are only ever
    /// bilevel / gray, so they are passed through without decoding.
    #[serde(default = "default_true")]
    pub ignore_gray_filters: bool,
    /// Two RGB channels that differ by more than this count as "colored".
    #[serde(default = "default_color_tolerance")]
    pub color_tolerance: f32,
    /// Quality used when re-encoding DCT (JPEG) images as gray.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Maximum nesting of form XObjects / tiling patterns.
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
    /// Flate-compress rewritten page, form and pattern content streams.
    #[serde(default = "default_true")]
    pub compress_streams: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            ignore_gray_filters: true,
            color_tolerance: DEFAULT_COLOR_TOLERANCE,
            jpeg_quality: default_jpeg_quality(),
            max_nesting_depth: default_max_nesting_depth(),
            compress_streams: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_color_tolerance() -> f32 {
    DEFAULT_COLOR_TOLERANCE
}

fn default_jpeg_quality() -> u8 {
    75
}

fn default_max_nesting_depth() -> usize {
    32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let opts: ConvertOptions =
            serde_json::from_str(r#"{ "ignoreGrayFilters": false }"#).unwrap();
        assert!(!opts.ignore_gray_filters);
        assert_eq!(opts.jpeg_quality, 75);
        assert_eq!(opts.max_nesting_depth, 32);
        assert!(opts.compress_streams);
        assert_eq!(opts.color_tolerance, DEFAULT_COLOR_TOLERANCE);
    }
}
