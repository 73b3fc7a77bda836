//! One-shot thumbnail capture for a recording.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;

/// Edge length of captured thumbnails, in pixels.
pub const THUMBNAIL_SIZE: u32 = 500;

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("thumbnail render failed: {0}")]
    Render(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encode(#[from] image::ImageError),
}

/// Seam to the external camera/renderer producing the still image.
pub trait ThumbnailRenderer: Send {
    fn render(&self, size: u32) -> Result<RgbaImage, ThumbnailError>;
}

/// Render one still of the scene and write it as `<dir>/<base_name>.png`,
/// creating the directory if needed. Called once per recording.
pub fn capture_thumbnail(
    renderer: &dyn ThumbnailRenderer,
    directory: &Path,
    base_name: &str,
) -> Result<PathBuf, ThumbnailError> {
    fs::create_dir_all(directory)?;
    let image = renderer.render(THUMBNAIL_SIZE)?;
    let path = directory.join(format!("{base_name}.png"));
    image.save_with_format(&path, image::ImageFormat::Png)?;
    tracing::debug!(path = %path.display(), "thumbnail written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct FlatColorRenderer;

    impl ThumbnailRenderer for FlatColorRenderer {
        fn render(&self, size: u32) -> Result<RgbaImage, ThumbnailError> {
            Ok(RgbaImage::from_pixel(size, size, image::Rgba([40, 120, 200, 255])))
        }
    }

    struct BrokenRenderer;

    impl ThumbnailRenderer for BrokenRenderer {
        fn render(&self, _size: u32) -> Result<RgbaImage, ThumbnailError> {
            Err(ThumbnailError::Render("no camera target".to_string()))
        }
    }

    #[test]
    fn writes_png_next_to_archives() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("usdz");
        let path = capture_thumbnail(&FlatColorRenderer, &out, "chair").unwrap();
        assert_eq!(path, out.join("chair.png"));
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), THUMBNAIL_SIZE);
    }

    #[test]
    fn render_failure_propagates() {
        let dir = tempdir().unwrap();
        let result = capture_thumbnail(&BrokenRenderer, dir.path(), "chair");
        assert!(matches!(result, Err(ThumbnailError::Render(_))));
    }
}
