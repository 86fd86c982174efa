use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// One image held in memory: raw bytes plus the declared MIME type.
///
/// Bytes are shared, so cloning a payload into an in-flight request does not
/// copy the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Arc<[u8]>,
    mime_type: String,
    dimensions: Option<(u32, u32)>,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            dimensions: None,
        }
    }

    pub fn from_base64(data: &str, mime_type: impl Into<String>) -> Result<Self, base64::DecodeError> {
        let bytes = BASE64.decode(data.trim().as_bytes())?;
        Ok(Self::new(bytes, mime_type))
    }

    pub fn with_dimensions(mut self, dimensions: Option<(u32, u32)>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Pixel `(width, height)` when the header could be read at intake.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn encoded(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.encoded())
    }
}

/// A slot that is either empty or holds exactly one payload.
///
/// `display_url` is derived from the payload, so it is present iff the
/// encoded data and MIME type are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSlot {
    payload: Option<ImagePayload>,
}

impl ImageSlot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(&mut self, payload: ImagePayload) {
        self.payload = Some(payload);
    }

    pub fn clear(&mut self) {
        self.payload = None;
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }

    pub fn payload(&self) -> Option<&ImagePayload> {
        self.payload.as_ref()
    }

    pub fn encoded_data(&self) -> Option<String> {
        self.payload.as_ref().map(ImagePayload::encoded)
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.payload.as_ref().map(ImagePayload::mime_type)
    }

    pub fn display_url(&self) -> Option<String> {
        self.payload.as_ref().map(ImagePayload::data_url)
    }
}

impl From<ImagePayload> for ImageSlot {
    fn from(payload: ImagePayload) -> Self {
        Self {
            payload: Some(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ImagePayload, ImageSlot};

    #[test]
    fn display_url_tracks_payload_presence() {
        let mut slot = ImageSlot::empty();
        assert!(slot.display_url().is_none());
        assert!(slot.encoded_data().is_none());
        assert!(slot.mime_type().is_none());

        slot.set(ImagePayload::new(b"abc".to_vec(), "image/png"));
        assert_eq!(slot.encoded_data().as_deref(), Some("YWJj"));
        assert_eq!(slot.mime_type(), Some("image/png"));
        assert_eq!(
            slot.display_url().as_deref(),
            Some("data:image/png;base64,YWJj")
        );

        slot.clear();
        assert!(slot.is_empty());
        assert!(slot.display_url().is_none());
    }

    #[test]
    fn from_base64_decodes_and_rejects_garbage() {
        let payload = ImagePayload::from_base64(" YWJj\n", "image/jpeg").unwrap();
        assert_eq!(payload.bytes(), b"abc");
        assert_eq!(payload.mime_type(), "image/jpeg");
        assert!(payload.dimensions().is_none());

        assert!(ImagePayload::from_base64("***", "image/png").is_err());
    }

    #[test]
    fn clones_share_bytes() {
        let payload = ImagePayload::new(vec![1u8; 64], "image/png").with_dimensions(Some((8, 8)));
        let copy = payload.clone();
        assert_eq!(copy, payload);
        assert_eq!(copy.bytes().as_ptr(), payload.bytes().as_ptr());
        assert_eq!(copy.dimensions(), Some((8, 8)));
    }
}
