//! Raster transform canvas: crop, rotate and scale a decoded image, then
//! encode the result as JPEG for upload.
//!
//! Coordinates come in two spaces. A crop is drawn against the image as it
//! is displayed (possibly downscaled), while sampling happens against the
//! source pixel buffer. The per-axis factors `sx = natural / displayed` map
//! the first onto the second.
//!
//! The output canvas is sized to the crop footprint in source pixels (or the
//! full natural size without a crop) before any transform is applied.
//! Rotation and scale then happen inside that fixed frame, composed as
//! `translate(center) * rotate(θ) * scale(s) * translate(-center)`, so
//! corners rotated out of the frame are clipped and uncovered canvas stays
//! transparent.

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageReader, Rgba, RgbaImage};
use kurbo::Affine;
use std::path::Path;
use std::sync::Arc;

pub const JPEG_QUALITY: u8 = 95;
pub const EDITED_MIME_TYPE: &str = "image/jpeg";

pub const SCALE_MIN: f64 = 0.5;
pub const SCALE_MAX: f64 = 2.0;
pub const SCALE_STEP: f64 = 0.1;

const TRANSFORM_GRID: f64 = 1_048_576.0;

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("crop region must have a positive size, got {width}x{height}")]
    InvalidCrop { width: f64, height: f64 },

    #[error("scale must be positive, got {0}")]
    InvalidScale(f64),

    #[error("rotation must be a finite angle, got {0}")]
    InvalidRotation(f64),

    #[error("crop region {crop:?} lies outside the {width}x{height} image")]
    CropOutOfBounds {
        crop: CropRegion,
        width: f64,
        height: f64,
    },

    #[error("image too large to render: {width}x{height}")]
    TooLarge { width: u32, height: u32 },

    #[error("displayed size must be positive, got {width}x{height}")]
    InvalidDisplaySize { width: f64, height: f64 },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crop rectangle in displayed-image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRegion {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, EditError> {
        let valid = [x, y, width, height].iter().all(|v| v.is_finite()) && width > 0.0 && height > 0.0;
        if !valid {
            return Err(EditError::InvalidCrop { width, height });
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Parse `x,y,width,height`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid crop '{}': {}", s, e))?;
        match parts[..] {
            [x, y, w, h] => Self::new(x, y, w, h).map_err(|e| e.to_string()),
            _ => Err(format!("crop must be x,y,width,height, got '{}'", s)),
        }
    }

    fn to_source(self, scale: AxisScale) -> SourceRect {
        SourceRect {
            x: self.x * scale.sx,
            y: self.y * scale.sy,
            width: self.width * scale.sx,
            height: self.height * scale.sy,
        }
    }
}

/// Displayed-to-source scale factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisScale {
    pub sx: f64,
    pub sy: f64,
}

#[derive(Debug, Clone, Copy)]
struct SourceRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// A decoded image together with the size it is displayed at.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pixels: RgbaImage,
    displayed_width: f64,
    displayed_height: f64,
}

impl SourceImage {
    /// Displayed at natural size until told otherwise.
    pub fn new(pixels: RgbaImage) -> Self {
        let (w, h) = pixels.dimensions();
        Self {
            pixels,
            displayed_width: w as f64,
            displayed_height: h as f64,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EditError> {
        Ok(Self::new(image::load_from_memory(bytes)?.to_rgba8()))
    }

    pub fn open(path: &Path) -> Result<Self, EditError> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        Ok(Self::new(image.to_rgba8()))
    }

    pub fn with_displayed_size(mut self, width: f64, height: f64) -> Result<Self, EditError> {
        self.set_displayed_size(width, height)?;
        Ok(self)
    }

    pub fn set_displayed_size(&mut self, width: f64, height: f64) -> Result<(), EditError> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(EditError::InvalidDisplaySize { width, height });
        }
        self.displayed_width = width;
        self.displayed_height = height;
        Ok(())
    }

    /// Whether the crop lies within the displayed image.
    pub fn contains(&self, crop: &CropRegion) -> bool {
        const SLACK: f64 = 1e-6;
        crop.x >= -SLACK
            && crop.y >= -SLACK
            && crop.x + crop.width <= self.displayed_width + SLACK
            && crop.y + crop.height <= self.displayed_height + SLACK
    }

    pub fn natural_size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn axis_scale(&self) -> AxisScale {
        let (w, h) = self.natural_size();
        AxisScale {
            sx: w as f64 / self.displayed_width,
            sy: h as f64 / self.displayed_height,
        }
    }
}

/// Encoded editor output, ready for the upload pipeline.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub filename: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Drawing transform for a canvas of the given size.
pub fn canvas_transform(width: u32, height: u32, rotation_deg: f64, scale: f64) -> Affine {
    let center = (width as f64 / 2.0, height as f64 / 2.0);
    Affine::translate(center)
        * Affine::rotate(rotation_deg.to_radians())
        * Affine::scale(scale)
        * Affine::translate((-center.0, -center.1))
}

fn validate(rotation_deg: f64, scale: f64) -> Result<(), EditError> {
    if !rotation_deg.is_finite() {
        return Err(EditError::InvalidRotation(rotation_deg));
    }
    if !(scale.is_finite() && scale > 0.0) {
        return Err(EditError::InvalidScale(scale));
    }
    Ok(())
}

/// Render the transformed canvas. May be zero-sized for a sub-pixel crop.
pub fn render(
    source: &SourceImage,
    crop: Option<&CropRegion>,
    rotation_deg: f64,
    scale: f64,
) -> Result<RgbaImage, EditError> {
    validate(rotation_deg, scale)?;

    let (natural_w, natural_h) = source.natural_size();
    let (rect, canvas_w, canvas_h) = match crop {
        Some(crop) => {
            if !source.contains(crop) {
                return Err(EditError::CropOutOfBounds {
                    crop: *crop,
                    width: source.displayed_width,
                    height: source.displayed_height,
                });
            }
            let rect = crop.to_source(source.axis_scale());
            // Canvas extents truncate like an integer pixel buffer would.
            (rect, rect.width as u32, rect.height as u32)
        }
        None => (
            SourceRect {
                x: 0.0,
                y: 0.0,
                width: natural_w as f64,
                height: natural_h as f64,
            },
            natural_w,
            natural_h,
        ),
    };

    if canvas_w == 0 || canvas_h == 0 {
        return Ok(RgbaImage::new(canvas_w, canvas_h));
    }

    let place = Affine::scale_non_uniform(canvas_w as f64 / rect.width, canvas_h as f64 / rect.height)
        * Affine::translate((-rect.x, -rect.y));
    let transform = snap(canvas_transform(canvas_w, canvas_h, rotation_deg, scale) * place);
    if transform == Affine::IDENTITY && (canvas_w, canvas_h) == (natural_w, natural_h) {
        return Ok(source.pixels.clone());
    }

    let (width, height) = surface_size(canvas_w, canvas_h)?;
    let paint = image_paint(&source.pixels)?;

    let mut ctx = vello_cpu::RenderContext::new(width, height);
    ctx.set_transform(vello_cpu::kurbo::Affine::new(transform.as_coeffs()));
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(paint);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        rect.x,
        rect.y,
        rect.x + rect.width,
        rect.y + rect.height,
    ));
    ctx.flush();

    let mut pixmap = vello_cpu::Pixmap::new(width, height);
    ctx.render_to_pixmap(&mut pixmap);
    Ok(unpremultiply(&pixmap, canvas_w, canvas_h))
}

/// Round the transform onto a fixed grid so trigonometric noise cannot tell
/// θ and θ + 360 apart.
fn snap(transform: Affine) -> Affine {
    Affine::new(
        transform
            .as_coeffs()
            .map(|c| (c * TRANSFORM_GRID).round() / TRANSFORM_GRID + 0.0),
    )
}

fn surface_size(width: u32, height: u32) -> Result<(u16, u16), EditError> {
    match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(EditError::TooLarge { width, height }),
    }
}

fn image_paint(pixels: &RgbaImage) -> Result<vello_cpu::Image, EditError> {
    let (width, height) = pixels.dimensions();
    let (w, h) = surface_size(width, height)?;

    let mut may_have_opacities = false;
    let premul = pixels
        .pixels()
        .map(|&Rgba([r, g, b, a])| {
            may_have_opacities |= a != 255;
            let af = a as u16 + 1;
            let scale = |c: u8| ((c as u16 * af) >> 8) as u8;
            vello_cpu::peniko::color::PremulRgba8 {
                r: scale(r),
                g: scale(g),
                b: scale(b),
                a,
            }
        })
        .collect();

    let pixmap = vello_cpu::Pixmap::from_parts_with_opacity(premul, w, h, may_have_opacities);
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

fn unpremultiply(pixmap: &vello_cpu::Pixmap, width: u32, height: u32) -> RgbaImage {
    let data = pixmap.data_as_u8_slice();
    RgbaImage::from_fn(width, height, |x, y| {
        let i = (y as usize * width as usize + x as usize) * 4;
        let a = data[i + 3];
        if a == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        let channel = |c: u8| ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8;
        Rgba([channel(data[i]), channel(data[i + 1]), channel(data[i + 2]), a])
    })
}

/// Encode as JPEG at quality 95, compositing transparent areas over black.
pub fn encode_jpeg(canvas: &RgbaImage) -> Result<Vec<u8>, EditError> {
    let rgb: Vec<u8> = canvas
        .pixels()
        .flat_map(|p| {
            let alpha = p[3] as f64 / 255.0;
            [0, 1, 2].map(|c| (p[c] as f64 * alpha).round() as u8)
        })
        .collect();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .write_image(&rgb, canvas.width(), canvas.height(), ExtendedColorType::Rgb8)
        .map_err(EditError::Encode)?;
    Ok(bytes)
}

pub fn edited_filename(at: DateTime<Utc>) -> String {
    format!("edited-{}.jpg", at.timestamp_millis())
}

/// Crop, rotate, scale and encode. Returns `None` when the canvas would be
/// empty, so there is nothing to save.
pub fn edit(
    source: &SourceImage,
    crop: Option<&CropRegion>,
    rotation_deg: f64,
    scale: f64,
) -> Result<Option<EncodedImage>, EditError> {
    let canvas = render(source, crop, rotation_deg, scale)?;
    if canvas.width() == 0 || canvas.height() == 0 {
        return Ok(None);
    }
    let bytes = encode_jpeg(&canvas)?;
    Ok(Some(EncodedImage {
        filename: edited_filename(Utc::now()),
        mime_type: EDITED_MIME_TYPE,
        bytes,
    }))
}

/// One open editing session. Owns the decoded image, which is released when
/// the session is closed or dropped.
#[derive(Debug)]
pub struct EditorSession {
    source: Option<SourceImage>,
    crop: Option<CropRegion>,
    rotation: f64,
    scale: f64,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorSession {
    pub fn new() -> Self {
        Self {
            source: None,
            crop: None,
            rotation: 0.0,
            scale: 1.0,
        }
    }

    pub fn load(&mut self, source: SourceImage) {
        self.source = Some(source);
        self.crop = None;
        self.rotation = 0.0;
        self.scale = 1.0;
    }

    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), EditError> {
        self.load(SourceImage::decode(bytes)?);
        Ok(())
    }

    pub fn load_path(&mut self, path: &Path) -> Result<(), EditError> {
        self.load(SourceImage::open(path)?);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn close(&mut self) {
        self.source = None;
        self.crop = None;
    }

    pub fn set_displayed_size(&mut self, width: f64, height: f64) -> Result<(), EditError> {
        match self.source.as_mut() {
            Some(source) => source.set_displayed_size(width, height),
            None => Ok(()),
        }
    }

    pub fn crop(&self) -> Option<&CropRegion> {
        self.crop.as_ref()
    }

    /// Commit a crop. It must lie within the displayed image once one is loaded.
    pub fn set_crop(&mut self, crop: CropRegion) -> Result<(), EditError> {
        if let Some(source) = &self.source {
            if !source.contains(&crop) {
                return Err(EditError::CropOutOfBounds {
                    crop,
                    width: source.displayed_width,
                    height: source.displayed_height,
                });
            }
        }
        self.crop = Some(crop);
        Ok(())
    }

    pub fn clear_crop(&mut self) {
        self.crop = None;
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn set_rotation(&mut self, degrees: f64) -> Result<(), EditError> {
        if !degrees.is_finite() {
            return Err(EditError::InvalidRotation(degrees));
        }
        self.rotation = degrees;
        Ok(())
    }

    /// The 90° button.
    pub fn rotate_quarter(&mut self) {
        self.rotation = (self.rotation + 90.0) % 360.0;
    }

    pub fn nudge_rotation(&mut self, delta: f64) {
        self.rotation = (self.rotation + delta).rem_euclid(360.0);
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Slider semantics: clamped to [0.5, 2.0] in steps of 0.1.
    pub fn set_scale(&mut self, scale: f64) -> Result<(), EditError> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(EditError::InvalidScale(scale));
        }
        let stepped = (scale / SCALE_STEP).round() * SCALE_STEP;
        self.scale = (stepped.clamp(SCALE_MIN, SCALE_MAX) * 10.0).round() / 10.0;
        Ok(())
    }

    pub fn step_scale(&mut self, steps: i32) {
        let target = self.scale + steps as f64 * SCALE_STEP;
        self.scale = (target.clamp(SCALE_MIN, SCALE_MAX) * 10.0).round() / 10.0;
    }

    pub fn reset_scale(&mut self) {
        self.scale = 1.0;
    }

    /// `None` until an image is loaded.
    pub fn render(&self) -> Result<Option<RgbaImage>, EditError> {
        let Some(source) = &self.source else {
            return Ok(None);
        };
        render(source, self.crop.as_ref(), self.rotation, self.scale).map(Some)
    }

    /// Encode the current edit. `None` until an image is loaded.
    pub fn edit(&self) -> Result<Option<EncodedImage>, EditError> {
        let Some(source) = &self.source else {
            tracing::debug!("Edit requested before the image was loaded");
            return Ok(None);
        };
        edit(source, self.crop.as_ref(), self.rotation, self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 40) as u8, (y * 60) as u8, 7, 255]))
    }

    fn assert_close(actual: &Rgba<u8>, expected: &Rgba<u8>) {
        let close = actual.0.iter().zip(expected.0.iter()).all(|(a, e)| a.abs_diff(*e) <= 2);
        assert!(close, "{:?} != {:?}", actual, expected);
    }

    #[test]
    fn test_identity_preserves_pixels() {
        let mut pixels = gradient(5, 3);
        pixels.put_pixel(2, 1, Rgba([200, 100, 50, 128]));
        let source = SourceImage::new(pixels.clone());

        let out = render(&source, None, 0.0, 1.0).unwrap();
        assert_eq!(out.dimensions(), (5, 3));
        assert_eq!(out, pixels);
    }

    #[test]
    fn test_crop_footprint_in_source_pixels() {
        let source = SourceImage::new(RgbaImage::new(1920, 1080))
            .with_displayed_size(960.0, 540.0)
            .unwrap();
        assert_eq!(source.axis_scale(), AxisScale { sx: 2.0, sy: 2.0 });

        let crop = CropRegion::new(100.0, 100.0, 200.0, 100.0).unwrap();
        let out = render(&source, Some(&crop), 0.0, 1.0).unwrap();
        assert_eq!(out.dimensions(), (400, 200));
    }

    #[test]
    fn test_crop_copies_source_region() {
        let pixels = gradient(6, 6);
        let source = SourceImage::new(pixels.clone())
            .with_displayed_size(3.0, 3.0)
            .unwrap();
        let crop = CropRegion::new(1.0, 1.0, 1.0, 1.0).unwrap();

        let out = render(&source, Some(&crop), 0.0, 1.0).unwrap();
        assert_eq!(out.dimensions(), (2, 2));
        assert_close(out.get_pixel(0, 0), pixels.get_pixel(2, 2));
        assert_close(out.get_pixel(1, 1), pixels.get_pixel(3, 3));
    }

    #[test]
    fn test_rotation_is_periodic() {
        let source = SourceImage::new(gradient(5, 3));
        assert_eq!(
            render(&source, None, 90.0, 1.0).unwrap(),
            render(&source, None, 450.0, 1.0).unwrap()
        );

        let source = SourceImage::new(gradient(6, 6))
            .with_displayed_size(4.0, 4.0)
            .unwrap();
        let crop = CropRegion::new(0.5, 0.5, 3.0, 2.0).unwrap();
        assert_eq!(
            render(&source, Some(&crop), 37.0, 1.3).unwrap(),
            render(&source, Some(&crop), 397.0, 1.3).unwrap()
        );
    }

    #[test]
    fn test_half_turn_mirrors_both_axes() {
        let pixels = gradient(3, 2);
        let source = SourceImage::new(pixels.clone());

        let out = render(&source, None, 180.0, 1.0).unwrap();
        assert_eq!(out.dimensions(), (3, 2));
        for (x, y, px) in out.enumerate_pixels() {
            assert_close(px, pixels.get_pixel(2 - x, 1 - y));
        }
    }

    #[test]
    fn test_rotation_keeps_canvas_size() {
        let source = SourceImage::new(gradient(5, 3));
        let out = render(&source, None, 90.0, 1.0).unwrap();
        assert_eq!(out.dimensions(), (5, 3));
    }

    #[test]
    fn test_downscale_leaves_transparent_border() {
        let source = SourceImage::new(gradient(4, 4));
        let out = render(&source, None, 0.0, 0.5).unwrap();
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(3, 3)[3], 0);
        assert_eq!(out.get_pixel(1, 1)[3], 255);
        assert_eq!(out.get_pixel(2, 2)[3], 255);
    }

    #[test]
    fn test_off_axis_rotation_clips_corners() {
        let source = SourceImage::new(gradient(10, 10));
        let out = render(&source, None, 45.0, 1.0).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(9, 9)[3], 0);
        assert_eq!(out.get_pixel(5, 5)[3], 255);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(CropRegion::new(0.0, 0.0, 0.0, 10.0).is_err());
        assert!(CropRegion::new(0.0, 0.0, 10.0, -1.0).is_err());
        assert!(CropRegion::new(f64::NAN, 0.0, 10.0, 10.0).is_err());

        let source = SourceImage::new(gradient(2, 2));
        assert!(matches!(render(&source, None, 0.0, 0.0), Err(EditError::InvalidScale(_))));
        assert!(matches!(render(&source, None, 0.0, -1.0), Err(EditError::InvalidScale(_))));
        assert!(matches!(
            render(&source, None, f64::INFINITY, 1.0),
            Err(EditError::InvalidRotation(_))
        ));
        assert!(SourceImage::new(gradient(2, 2)).with_displayed_size(0.0, 1.0).is_err());
    }

    #[test]
    fn test_crop_outside_image_rejected() {
        let source = SourceImage::new(gradient(4, 4));
        let huge = CropRegion::new(0.0, 0.0, 1e12, 1e12).unwrap();
        assert!(matches!(
            render(&source, Some(&huge), 0.0, 1.0),
            Err(EditError::CropOutOfBounds { .. })
        ));
        let shifted = CropRegion::new(3.0, 0.0, 2.0, 2.0).unwrap();
        assert!(render(&source, Some(&shifted), 0.0, 1.0).is_err());
        let negative = CropRegion::new(-1.0, 0.0, 2.0, 2.0).unwrap();
        assert!(render(&source, Some(&negative), 0.0, 1.0).is_err());

        let full = CropRegion::new(0.0, 0.0, 4.0, 4.0).unwrap();
        assert_eq!(render(&source, Some(&full), 0.0, 1.0).unwrap().dimensions(), (4, 4));
    }

    #[test]
    fn test_session_rejects_crop_outside_image() {
        let mut session = EditorSession::new();
        session.load(SourceImage::new(gradient(8, 8)).with_displayed_size(4.0, 4.0).unwrap());
        let crop = CropRegion::new(2.0, 2.0, 4.0, 1.0).unwrap();
        assert!(matches!(session.set_crop(crop), Err(EditError::CropOutOfBounds { .. })));
        assert!(session.crop().is_none());

        session.set_crop(CropRegion::new(2.0, 2.0, 2.0, 1.0).unwrap()).unwrap();
        assert_eq!(session.render().unwrap().unwrap().dimensions(), (4, 2));
    }

    #[test]
    fn test_any_positive_scale_accepted() {
        let source = SourceImage::new(gradient(4, 4));
        assert!(render(&source, None, 0.0, 7.5).is_ok());
        assert!(render(&source, None, 0.0, 0.01).is_ok());
    }

    #[test]
    fn test_parse_crop() {
        let crop = CropRegion::parse("10, 20,30,40").unwrap();
        assert_eq!(crop, CropRegion::new(10.0, 20.0, 30.0, 40.0).unwrap());
        assert!(CropRegion::parse("1,2,3").is_err());
        assert!(CropRegion::parse("1,2,0,4").is_err());
        assert!(CropRegion::parse("a,b,c,d").is_err());
    }

    #[test]
    fn test_sub_pixel_crop_saves_nothing() {
        let source = SourceImage::new(gradient(4, 4))
            .with_displayed_size(400.0, 400.0)
            .unwrap();
        let crop = CropRegion::new(0.0, 0.0, 50.0, 50.0).unwrap();
        assert!(edit(&source, Some(&crop), 0.0, 1.0).unwrap().is_none());
    }

    #[test]
    fn test_edit_encodes_jpeg() {
        let source = SourceImage::new(gradient(8, 4));
        let encoded = edit(&source, None, 0.0, 1.0).unwrap().unwrap();
        assert_eq!(encoded.mime_type, "image/jpeg");
        assert!(encoded.filename.starts_with("edited-"));
        assert!(encoded.filename.ends_with(".jpg"));

        let decoded = image::load_from_memory(&encoded.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
        assert_eq!(
            image::guess_format(&encoded.bytes).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_edited_filename_uses_millis() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(edited_filename(at), "edited-1700000000123.jpg");
    }

    #[test]
    fn test_session_not_ready_is_noop() {
        let session = EditorSession::new();
        assert!(!session.is_ready());
        assert!(session.render().unwrap().is_none());
        assert!(session.edit().unwrap().is_none());
    }

    #[test]
    fn test_session_controls() {
        let mut session = EditorSession::new();
        session.load(SourceImage::new(gradient(4, 4)));
        assert!(session.is_ready());

        for expected in [90.0, 180.0, 270.0, 0.0] {
            session.rotate_quarter();
            assert_eq!(session.rotation(), expected);
        }
        session.set_rotation(350.0).unwrap();
        session.rotate_quarter();
        assert_eq!(session.rotation(), 80.0);
        session.set_rotation(0.0).unwrap();
        session.nudge_rotation(-1.0);
        assert_eq!(session.rotation(), 359.0);

        session.set_scale(3.0).unwrap();
        assert_eq!(session.scale(), 2.0);
        session.set_scale(0.1).unwrap();
        assert_eq!(session.scale(), 0.5);
        session.set_scale(1.26).unwrap();
        assert_eq!(session.scale(), 1.3);
        session.step_scale(-2);
        assert_eq!(session.scale(), 1.1);
        assert!(session.set_scale(0.0).is_err());
        session.reset_scale();
        assert_eq!(session.scale(), 1.0);
    }

    #[test]
    fn test_session_load_resets_and_close_releases() {
        let mut session = EditorSession::new();
        session.load(SourceImage::new(gradient(4, 4)));
        session.set_crop(CropRegion::new(0.0, 0.0, 2.0, 2.0).unwrap()).unwrap();
        session.rotate_quarter();
        assert_eq!(session.render().unwrap().unwrap().dimensions(), (2, 2));

        session.load(SourceImage::new(gradient(3, 3)));
        assert!(session.crop().is_none());
        assert_eq!(session.rotation(), 0.0);

        session.close();
        assert!(!session.is_ready());
        assert!(session.edit().unwrap().is_none());
    }

    #[test]
    fn test_session_load_bytes() {
        let source = SourceImage::new(gradient(8, 4));
        let encoded = edit(&source, None, 0.0, 1.0).unwrap().unwrap();

        let mut session = EditorSession::new();
        session.load_bytes(&encoded.bytes).unwrap();
        assert_eq!(session.source().unwrap().natural_size(), (8, 4));
        assert!(session.load_bytes(b"not an image").is_err());
    }
}
