use std::io::Cursor;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use rerender_contracts::{AspectRatio, ImagePayload, StyleMetadata};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::intake::probe_dimensions;
use crate::service::{map_object, EditRequest, GenerateRequest, ServiceReply, StyleService};

const LONG_SIDE: u32 = 512;

const ART_STYLES: [&str; 4] = [
    "Ufotable 2D anime",
    "Hyper-realistic 3D Unreal Engine render",
    "35mm cinematic film still",
    "Ink and watercolor illustration",
];

/// Offline collaborator: deterministic metadata and solid-colour images.
#[derive(Debug, Clone)]
pub struct DryrunService {
    decode_model: String,
    image_model: String,
}

impl DryrunService {
    pub fn new(decode_model: impl Into<String>, image_model: impl Into<String>) -> Self {
        Self {
            decode_model: decode_model.into(),
            image_model: image_model.into(),
        }
    }
}

impl Default for DryrunService {
    fn default() -> Self {
        Self::new("dryrun-vision-1", "dryrun-image-1")
    }
}

impl StyleService for DryrunService {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn decode(&self, image: &ImagePayload) -> Result<StyleMetadata> {
        tracing::debug!(model = %self.decode_model, bytes = image.len(), "dryrun decode");
        let digest = digest_parts(&[image.bytes()]);
        let art_style = ART_STYLES[digest[0] as usize % ART_STYLES.len()];
        let tag = hex::encode(&digest[..4]);
        Ok(StyleMetadata {
            art_style: art_style.to_string(),
            outfit_details: format!("layered outfit #{tag}"),
            pose_and_gestures: "three-quarter stance, one hand raised".to_string(),
            background_elements: format!("atmospheric backdrop #{tag}"),
            lighting_and_color: format!(
                "key light rgb({}, {}, {})",
                digest[1], digest[2], digest[3]
            ),
            composition: "medium shot, no foreground occlusion".to_string(),
        })
    }

    fn generate(&self, request: &GenerateRequest) -> Result<ServiceReply> {
        let (width, height) = dims_for_ratio(request.aspect_ratio);
        let digest = digest_parts(&[
            request.prompt.as_bytes(),
            request.reference.bytes(),
            request.subject.bytes(),
        ]);
        let image = solid_png(width, height, &digest)?;
        Ok(ServiceReply {
            image: Some(image),
            model: self.image_model.clone(),
            provider_request: map_object(json!({
                "endpoint": "dryrun-native",
                "aspect_ratio": request.aspect_ratio.as_str(),
                "prompt_chars": request.prompt.chars().count(),
            })),
            provider_response: map_object(json!({
                "status": "ok",
                "width": width,
                "height": height,
            })),
            warnings: Vec::new(),
        })
    }

    fn edit(&self, request: &EditRequest) -> Result<ServiceReply> {
        let (width, height) = request
            .image
            .dimensions()
            .or_else(|| probe_dimensions(request.image.bytes()))
            .unwrap_or((LONG_SIDE, LONG_SIDE));
        let digest = digest_parts(&[request.image.bytes(), request.instruction.as_bytes()]);
        let image = solid_png(width, height, &digest)?;
        Ok(ServiceReply {
            image: Some(image),
            model: self.image_model.clone(),
            provider_request: map_object(json!({
                "endpoint": "dryrun-native",
                "instruction": request.instruction,
            })),
            provider_response: map_object(json!({
                "status": "ok",
                "width": width,
                "height": height,
            })),
            warnings: Vec::new(),
        })
    }
}

fn dims_for_ratio(ratio: AspectRatio) -> (u32, u32) {
    let (w, h) = ratio.terms().unwrap_or((1, 1));
    if w >= h {
        (LONG_SIDE, LONG_SIDE * h / w)
    } else {
        (LONG_SIDE * w / h, LONG_SIDE)
    }
}

fn digest_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn solid_png(width: u32, height: u32, digest: &[u8; 32]) -> Result<ImagePayload> {
    let image = RgbImage::from_pixel(width, height, Rgb([digest[0], digest[1], digest[2]]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context("dryrun image encode failed")?;
    Ok(ImagePayload::new(out.into_inner(), "image/png").with_dimensions(Some((width, height))))
}
