//! Decoding of frontend screenshots.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;

use crate::error::ScreenshotError;
use crate::types::Rgb;

/// Pixel layout a screenshot is converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// RGBA, keeps transparency.
    Png,
    /// RGB.
    Jpeg,
}

impl OutputFormat {
    /// Map a file extension (with or without the dot) to a format.
    pub fn from_extension(ext: &str) -> Result<Self, ScreenshotError> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            _ => Err(ScreenshotError::UnsupportedExtension(format!(
                ".{}",
                ext.trim_start_matches('.')
            ))),
        }
    }

    pub fn channels(self) -> u8 {
        match self {
            Self::Png => 4,
            Self::Jpeg => 3,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenshotOptions {
    /// Save the decoded image here. No extension means `.png`.
    pub filename: Option<PathBuf>,
    /// Background color in `[0, 1]`; `None` renders transparent.
    pub bg_color: Option<Rgb>,
    /// Render size `(width, height)` in pixels.
    pub resolution: Option<(u32, u32)>,
    /// `None` uses the session's configured screenshot timeout.
    pub timeout: Option<Duration>,
}

impl ScreenshotOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.filename = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_bg_color(mut self, color: Rgb) -> Self {
        self.bg_color = Some(color);
        self
    }

    #[must_use]
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some((width, height));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `data` payload of the `request_screenshot` message.
    pub fn request_data(&self) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        if let Some(color) = self.bg_color {
            data.insert("bg_color".into(), serde_json::json!(color));
        }
        if let Some((width, height)) = self.resolution {
            data.insert("width".into(), width.into());
            data.insert("height".into(), height.into());
        }
        serde_json::Value::Object(data)
    }

    /// Output path (with an extension) and pixel format.
    ///
    /// Checked before the request is sent so a bad extension never costs a
    /// round trip.
    pub fn target(&self) -> Result<(Option<PathBuf>, OutputFormat), ScreenshotError> {
        let Some(path) = &self.filename else {
            return Ok((None, OutputFormat::Png));
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => Ok((Some(path.clone()), OutputFormat::from_extension(ext)?)),
            None => Ok((Some(path.with_extension("png")), OutputFormat::Png)),
        }
    }
}

/// Decoded screenshot pixels, row-major, `channels` bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

/// Decode a base64 image (optionally prefixed with a data-URI header),
/// convert it to `format` and save it to `path` if given.
pub fn decode(
    payload: &str,
    format: OutputFormat,
    path: Option<&Path>,
) -> Result<Screenshot, ScreenshotError> {
    let b64 = payload.split_once(',').map_or(payload, |(_, data)| data);
    let bytes = STANDARD.decode(b64.trim())?;
    let image = image::load_from_memory(&bytes)?;

    let (width, height, pixels) = match format {
        OutputFormat::Png => {
            let rgba = image.to_rgba8();
            if let Some(path) = path {
                rgba.save_with_format(path, format.image_format())?;
            }
            (rgba.width(), rgba.height(), rgba.into_raw())
        }
        OutputFormat::Jpeg => {
            let rgb = image.to_rgb8();
            if let Some(path) = path {
                rgb.save_with_format(path, format.image_format())?;
            }
            (rgb.width(), rgb.height(), rgb.into_raw())
        }
    };
    tracing::debug!(width, height, ?format, saved = path.is_some(), "screenshot decoded");
    Ok(Screenshot {
        width,
        height,
        channels: format.channels(),
        pixels,
    })
}

/// Encode `image` as a PNG data URI, the form frontends reply with.
pub fn encode_png_data_uri(image: &image::DynamicImage) -> Result<String, ScreenshotError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(format!(
        "data:image/png;base64,{}",
        STANDARD.encode(buf.into_inner())
    ))
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, Rgba, RgbaImage};

    use super::*;

    fn sample() -> String {
        let img = RgbaImage::from_pixel(3, 2, Rgba([255, 0, 0, 128]));
        encode_png_data_uri(&DynamicImage::ImageRgba8(img)).expect("encode")
    }

    #[test]
    fn png_decodes_to_rgba() {
        let shot = decode(&sample(), OutputFormat::Png, None).expect("decode");
        assert_eq!((shot.width, shot.height, shot.channels), (3, 2, 4));
        assert_eq!(shot.pixels.len(), 3 * 2 * 4);
        assert_eq!(&shot.pixels[..4], &[255, 0, 0, 128]);
    }

    #[test]
    fn jpeg_target_drops_alpha() {
        let shot = decode(&sample(), OutputFormat::Jpeg, None).expect("decode");
        assert_eq!(shot.channels, 3);
        assert_eq!(shot.pixels.len(), 3 * 2 * 3);
    }

    #[test]
    fn header_is_optional() {
        let full = sample();
        let (_, bare) = full.split_once(',').expect("has header");
        assert!(decode(bare, OutputFormat::Png, None).is_ok());
    }

    #[test]
    fn saves_to_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let opts = ScreenshotOptions::new().with_filename(dir.path().join("shot"));
        let (path, format) = opts.target().expect("valid");
        let path = path.expect("path set");
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));

        decode(&sample(), format, Some(path.as_path())).expect("decode and save");
        let reloaded = image::open(&path).expect("saved file is an image");
        assert_eq!(reloaded.width(), 3);

        let jpg = dir.path().join("shot.JPG");
        let (_, format) = ScreenshotOptions::new()
            .with_filename(&jpg)
            .target()
            .expect("jpg ok");
        assert_eq!(format, OutputFormat::Jpeg);
        decode(&sample(), format, Some(jpg.as_path())).expect("jpeg save");
        assert!(jpg.exists());
    }

    #[test]
    fn unsupported_extension_rejected() {
        let err = ScreenshotOptions::new()
            .with_filename("out.gif")
            .target()
            .expect_err("gif unsupported");
        assert!(matches!(err, ScreenshotError::UnsupportedExtension(ref e) if e == ".gif"));
    }

    #[test]
    fn garbage_payload_is_error() {
        assert!(matches!(
            decode("not base64!!", OutputFormat::Png, None),
            Err(ScreenshotError::Base64(_))
        ));
    }

    #[test]
    fn request_data_fields() {
        let data = ScreenshotOptions::new()
            .with_bg_color([1.0, 1.0, 1.0])
            .with_resolution(640, 480)
            .request_data();
        assert_eq!(data["width"], 640);
        assert_eq!(data["height"], 480);
        assert_eq!(data["bg_color"], serde_json::json!([1.0, 1.0, 1.0]));
        assert_eq!(ScreenshotOptions::new().request_data(), serde_json::json!({}));
    }
}
