use rerender_contracts::{FidelityMode, StyleMetadata};

/// Art-style keywords that mark a reference as drawn rather than rendered.
pub const STYLIZED_KEYWORDS: [&str; 6] = ["anime", "2d", "illustration", "cartoon", "drawing", "sketch"];

pub const DECODE_INSTRUCTION: &str = "ACT AS A PROMPT ENGINEER. Analyze this image to create a REVERSE-ENGINEERED prompt.
Provide a structured JSON response with these keys:
- artStyle: The exact medium (e.g., Ufotable 2D anime, Hyper-realistic 3D Unreal Engine render).
- outfitDetails: Comprehensive clothing description.
- poseAndGestures: Body posture and specific hand gestures.
- backgroundElements: Environment and atmosphere.
- lightingAndColor: Palette and light source.
- composition: Describe framing AND any foreground occlusions (e.g., 'hands clasped over mouth', 'sword blade across eyes', 'magical energy obscuring jawline'). This is CRITICAL for reconstruction.";

/// Case-insensitive substring test against [`STYLIZED_KEYWORDS`].
pub fn is_stylized(art_style: &str) -> bool {
    let lowered = art_style.to_lowercase();
    STYLIZED_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

pub fn fidelity_directive(fidelity: FidelityMode, metadata: &StyleMetadata) -> String {
    match fidelity {
        FidelityMode::Hard if is_stylized(&metadata.art_style) => format!(
            "TRANSLATE THE USER TO THE STYLE: Do not paste a photo. Draw the user as if they are a character in this specific style ({}). Flatten the skin shading, enlarge eyes slightly if the style demands it, but keep the user's likeness through facial structure.",
            metadata.art_style
        ),
        FidelityMode::Hard => format!(
            "FULL TRANSFORMATION: The subject MUST be fully converted into the medium of '{}'. Render the subject using the specific textures, skin shaders, and lighting models of that medium.",
            metadata.art_style
        ),
        FidelityMode::Realistic => "REALISTIC ADAPTATION: Keep the subject looking like a real human, but apply cinematic lighting, props, and environment of the reference. The result should look like a high-budget live-action adaptation of the style.".to_string(),
    }
}

/// Full instruction for the style-mimic call. Image 1 is the reference,
/// Image 2 the subject, matching the order the parts are sent in.
pub fn compose_mimic_prompt(metadata: &StyleMetadata, fidelity: FidelityMode) -> String {
    let directive = fidelity_directive(fidelity, metadata);
    format!(
        "
TASK: Generate a cohesive image merging the STYLE of Image 1 with the IDENTITY of Image 2.

[IDENTITY PRESERVATION BLOCK]
IDENTITY PRIORITY: You must preserve the User's (Image 2) facial structure, eye shape, nose shape, and ethnicity. However, you MUST render these features using the Art Style of Image 1.

[IMAGE 1 - THE BLUEPRINT]
This image dictates the Art Style, Pose, Composition, Lighting, and Background.
- Style Description: {art_style}
- Required Pose: {pose}
- Reference Composition Authority: The Reference Image (Image 1) dictates the scene. If Image 1 has hands covering the face (e.g., Sukuna/Megumi signs), you MUST draw the User performing that exact hand sign. The hands must cover the user's face exactly as they do in the reference.

[IMAGE 2 - THE ACTOR]
This image dictates the Facial Features and Identity.
- Identity Instructions: Transfer the user's eye shape, nose, mouth, and jawline.
- CRITICAL: Do NOT simply paste Image 2 onto Image 1.
- STYLIZATION: You must paint/render the face of Image 2 to match the specific texture and shading of Image 1.
  - If Image 1 is Anime -> Draw Image 2 as an anime character.
  - If Image 1 is 3D Render -> Render Image 2 with 3D skin textures.
  - If Image 1 is Photoreal -> Keep Image 2 photorealistic but match the lighting.

OUTPUT GOAL: A seamless, single image. No cropping. The result should look like the person in Image 2 is cosplaying or starring in the world of Image 1.

{directive}
",
        art_style = metadata.art_style,
        pose = metadata.pose_and_gestures,
    )
}

#[cfg(test)]
mod tests {
    use rerender_contracts::{FidelityMode, StyleMetadata};

    use super::{compose_mimic_prompt, fidelity_directive, is_stylized};

    fn metadata(art_style: &str) -> StyleMetadata {
        StyleMetadata {
            art_style: art_style.to_string(),
            outfit_details: "black coat".to_string(),
            pose_and_gestures: "domain expansion hand sign".to_string(),
            background_elements: "shrine".to_string(),
            lighting_and_color: "crimson rim light".to_string(),
            composition: "hands covering lower face".to_string(),
        }
    }

    #[test]
    fn stylized_keywords_are_case_insensitive_substrings() {
        assert!(is_stylized("Ufotable 2D ANIME"));
        assert!(is_stylized("pencil Sketch"));
        assert!(is_stylized("watercolor illustrations"));
        assert!(is_stylized("Cartoon Network look"));
        assert!(is_stylized("charcoal drawing"));
        assert!(!is_stylized("Hyper-realistic 3D Unreal Engine render"));
        assert!(!is_stylized("35mm film photograph"));
    }

    #[test]
    fn hard_stylized_redraws_in_style() {
        let directive = fidelity_directive(FidelityMode::Hard, &metadata("anime"));
        assert!(directive.starts_with("TRANSLATE THE USER TO THE STYLE"));
        assert!(directive.contains("Do not paste a photo"));
        assert!(directive.contains("(anime)"));
    }

    #[test]
    fn hard_non_stylized_transforms_medium() {
        let directive = fidelity_directive(FidelityMode::Hard, &metadata("Unreal Engine render"));
        assert!(directive.starts_with("FULL TRANSFORMATION"));
        assert!(directive.contains("'Unreal Engine render'"));
        assert!(directive.contains("skin shaders"));
    }

    #[test]
    fn realistic_ignores_style_kind() {
        for style in ["anime", "photograph"] {
            let directive = fidelity_directive(FidelityMode::Realistic, &metadata(style));
            assert!(directive.starts_with("REALISTIC ADAPTATION"));
            assert!(directive.contains("live-action adaptation"));
        }
    }

    #[test]
    fn composed_prompt_carries_fixed_directives() {
        let prompt = compose_mimic_prompt(&metadata("anime"), FidelityMode::Hard);
        assert!(prompt.contains("[IDENTITY PRESERVATION BLOCK]"));
        assert!(prompt.contains("facial structure, eye shape, nose shape, and ethnicity"));
        assert!(prompt.contains("Reference Composition Authority"));
        assert!(prompt.contains("exact hand sign"));
        assert!(prompt.contains("Do NOT simply paste Image 2 onto Image 1"));
        assert!(prompt.contains("- Style Description: anime"));
        assert!(prompt.contains("- Required Pose: domain expansion hand sign"));
        assert!(prompt.trim_end().ends_with(&fidelity_directive(
            FidelityMode::Hard,
            &metadata("anime")
        )));
    }
}
