use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::ImageReader;
use rerender_contracts::{ImagePayload, PipelineError};
use tracing::debug;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Reads a local file into a payload. Content is not validated; any readable
/// file is accepted and left for the collaborator to reject.
pub fn select_file(path: &Path) -> Result<ImagePayload, PipelineError> {
    let bytes = fs::read(path).map_err(|err| PipelineError::UnreadableFile {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    let declared = mime_for_path(path);
    let payload = payload_from_bytes(bytes, declared);
    debug!(
        path = %path.display(),
        mime_type = payload.mime_type(),
        bytes = payload.len(),
        dimensions = ?payload.dimensions(),
        "image selected"
    );
    Ok(payload)
}

/// Builds a payload from raw bytes, sniffing the MIME type when none is
/// declared and probing pixel dimensions from the header.
pub fn payload_from_bytes(bytes: Vec<u8>, declared_mime: Option<&str>) -> ImagePayload {
    let mime_type = declared_mime
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| sniff_mime(&bytes).map(str::to_string))
        .unwrap_or_else(|| FALLBACK_MIME.to_string());
    let dimensions = probe_dimensions(&bytes);
    ImagePayload::new(bytes, mime_type).with_dimensions(dimensions)
}

pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())?;
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::Path;

    use image::{ImageFormat, Rgb, RgbImage};
    use rerender_contracts::PipelineError;

    use super::{mime_for_path, payload_from_bytes, select_file};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn select_file_reads_png_with_dimensions() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("ref.png");
        std::fs::write(&path, png_bytes(32, 20))?;

        let payload = select_file(&path)?;
        assert_eq!(payload.mime_type(), "image/png");
        assert_eq!(payload.dimensions(), Some((32, 20)));
        Ok(())
    }

    #[test]
    fn select_file_accepts_non_image_content() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, b"not an image")?;

        let payload = select_file(&path)?;
        assert_eq!(payload.mime_type(), "application/octet-stream");
        assert_eq!(payload.bytes(), b"not an image");
        assert!(payload.dimensions().is_none());
        Ok(())
    }

    #[test]
    fn select_file_reports_unreadable_path() {
        let err = select_file(Path::new("/definitely/missing/ref.png")).unwrap_err();
        assert!(matches!(err, PipelineError::UnreadableFile { .. }));
        assert!(err.to_string().contains("/definitely/missing/ref.png"));
    }

    #[test]
    fn declared_extension_wins_over_sniffing() {
        let payload = payload_from_bytes(png_bytes(4, 4), mime_for_path(Path::new("a.JPG")));
        assert_eq!(payload.mime_type(), "image/jpeg");

        let sniffed = payload_from_bytes(png_bytes(4, 4), None);
        assert_eq!(sniffed.mime_type(), "image/png");
    }
}
