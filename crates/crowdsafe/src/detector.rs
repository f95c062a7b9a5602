//! Body detection for uploaded images.
//!
//! Counting people in an image is delegated to a [`BodyDetector`]. The
//! bundled [`SignatureDetector`] only checks that the upload is a raster
//! image and reports no detections, so the service falls back to its
//! estimate for every upload until a real detector is plugged in.

use rand::Rng;

use crate::error::{Error, Result};

/// Raster formats recognised from their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Portable Network Graphics.
    Png,
    /// JPEG / JFIF.
    Jpeg,
    /// GIF87a or GIF89a.
    Gif,
    /// Windows bitmap.
    Bmp,
    /// `WebP` in a RIFF container.
    WebP,
    /// TIFF, either byte order.
    Tiff,
}

impl ImageFormat {
    /// Identify the image format from the first bytes of a file.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [b'B', b'M', ..] => Some(Self::Bmp),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::WebP),
            [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some(Self::Tiff),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
            Self::Gif => write!(f, "gif"),
            Self::Bmp => write!(f, "bmp"),
            Self::WebP => write!(f, "webp"),
            Self::Tiff => write!(f, "tiff"),
        }
    }
}

/// Counts people in an image.
pub trait BodyDetector: Send + Sync + std::fmt::Debug {
    /// Name of this detector (for logging).
    fn name(&self) -> &'static str;

    /// Count the bodies visible in `image`.
    ///
    /// A count of zero means nothing was detected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpstreamDetector`] if the image cannot be decoded or
    /// analysed.
    fn count_bodies(&self, image: &[u8]) -> Result<u32>;
}

/// Accepts any recognisable raster image and detects nobody in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureDetector;

impl BodyDetector for SignatureDetector {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn count_bodies(&self, image: &[u8]) -> Result<u32> {
        if image.is_empty() {
            return Err(Error::upstream_detector("cannot identify image file: empty upload"));
        }

        match ImageFormat::sniff(image) {
            Some(format) => {
                tracing::debug!("Accepted {} image of {} bytes", format, image.len());
                Ok(0)
            }
            None => Err(Error::upstream_detector(
                "cannot identify image file: unsupported or corrupt image data",
            )),
        }
    }
}

/// Where the crowd count of an image submission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountSource {
    /// The detector found at least one body.
    Detector,
    /// Nothing was detected; the count is a random estimate.
    Fallback,
}

impl std::fmt::Display for CountSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detector => write!(f, "detector"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Inclusive bounds of the fallback estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackRange {
    min: u32,
    max: u32,
}

impl FallbackRange {
    /// Create a range; the bounds are swapped if given in the wrong order.
    #[must_use]
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Resolve a detector count, substituting an estimate for zero.
    pub fn resolve<R: Rng>(&self, detected: u32, rng: &mut R) -> (u32, CountSource) {
        if detected > 0 {
            (detected, CountSource::Detector)
        } else {
            (rng.random_range(self.min..=self.max), CountSource::Fallback)
        }
    }
}

impl Default for FallbackRange {
    fn default() -> Self {
        Self::new(20, 200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    #[test]
    fn test_sniff_known_formats() {
        assert_eq!(ImageFormat::sniff(PNG_HEADER), Some(ImageFormat::Png));
        assert_eq!(
            ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::sniff(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::sniff(b"GIF87a...."), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::sniff(b"BM\x00\x00"), Some(ImageFormat::Bmp));
        assert_eq!(
            ImageFormat::sniff(b"RIFF\x24\x00\x00\x00WEBPVP8 "),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::sniff(b"II*\x00...."), Some(ImageFormat::Tiff));
        assert_eq!(ImageFormat::sniff(b"MM\x00*...."), Some(ImageFormat::Tiff));
    }

    #[test]
    fn test_sniff_rejects_other_data() {
        assert_eq!(ImageFormat::sniff(b""), None);
        assert_eq!(ImageFormat::sniff(b"%PDF-1.7"), None);
        assert_eq!(ImageFormat::sniff(b"RIFF\x24\x00\x00\x00WAVEfmt "), None);
        assert_eq!(ImageFormat::sniff(b"GIF8"), None);
    }

    #[test]
    fn test_signature_detector_reports_no_bodies() {
        let detector = SignatureDetector;
        assert_eq!(detector.count_bodies(PNG_HEADER).unwrap(), 0);
        assert_eq!(detector.name(), "signature");
    }

    #[test]
    fn test_signature_detector_rejects_non_images() {
        let detector = SignatureDetector;

        let err = detector.count_bodies(b"hello world").unwrap_err();
        assert!(err.is_upstream_detector());
        assert!(err.to_string().contains("cannot identify image file"));

        let err = detector.count_bodies(&[]).unwrap_err();
        assert!(err.is_upstream_detector());
    }

    #[test]
    fn test_fallback_used_only_for_zero() {
        let range = FallbackRange::default();
        let mut rng = StdRng::seed_from_u64(11);

        assert_eq!(range.resolve(37, &mut rng), (37, CountSource::Detector));

        for _ in 0..500 {
            let (count, source) = range.resolve(0, &mut rng);
            assert_eq!(source, CountSource::Fallback);
            assert!((20..=200).contains(&count), "estimate {count} out of range");
        }
    }

    #[test]
    fn test_fallback_range_normalizes_bounds() {
        let range = FallbackRange::new(90, 10);
        assert_eq!(range.min(), 10);
        assert_eq!(range.max(), 90);
    }

    #[test]
    fn test_fallback_range_single_value() {
        let range = FallbackRange::new(42, 42);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(range.resolve(0, &mut rng).0, 42);
    }

    #[test]
    fn test_count_source_display() {
        assert_eq!(CountSource::Detector.to_string(), "detector");
        assert_eq!(CountSource::Fallback.to_string(), "fallback");
    }
}
