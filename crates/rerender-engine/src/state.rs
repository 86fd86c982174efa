//! Pipeline state and its transitions.
//!
//! Every operation is split into a `begin`/`finish` pair: `begin` validates
//! and flips busy flags, returning the job to hand to the collaborator;
//! `finish` applies the outcome. Jobs carry a [`Ticket`], and a finish call
//! whose ticket no longer matches the state (after `cancel`/`reset`, or a newer
//! reference image) is discarded as [`PipelineError::Cancelled`].

use rerender_contracts::{
    AspectRatio, FidelityMode, ImagePayload, ImageSlot, Operation, PipelineError, StyleMetadata,
};

use crate::aspect::infer_ratio;
use crate::prompt::compose_mimic_prompt;
use crate::service::{EditRequest, GenerateRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    reference_version: u64,
}

#[derive(Debug, Clone)]
pub struct DecodeJob {
    pub ticket: Ticket,
    pub image: ImagePayload,
}

#[derive(Debug, Clone)]
pub struct MimicJob {
    pub ticket: Ticket,
    pub fidelity: FidelityMode,
    pub stylized: bool,
    pub request: GenerateRequest,
}

#[derive(Debug, Clone)]
pub struct EditJob {
    pub ticket: Ticket,
    pub request: EditRequest,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    ref_image: ImageSlot,
    user_image: ImageSlot,
    result_image: ImageSlot,
    metadata: Option<StyleMetadata>,
    fidelity: FidelityMode,
    aspect_ratio: AspectRatio,
    inferred_ratio: Option<AspectRatio>,
    decoding: bool,
    generating: bool,
    editing: bool,
    last_error: Option<PipelineError>,
    edit_prompt: String,
    epoch: u64,
    reference_version: u64,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ref_image(&self) -> &ImageSlot {
        &self.ref_image
    }

    pub fn user_image(&self) -> &ImageSlot {
        &self.user_image
    }

    pub fn result_image(&self) -> &ImageSlot {
        &self.result_image
    }

    pub fn metadata(&self) -> Option<&StyleMetadata> {
        self.metadata.as_ref()
    }

    pub fn fidelity(&self) -> FidelityMode {
        self.fidelity
    }

    /// The stored selection, which may still be `Auto`.
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn inferred_ratio(&self) -> Option<AspectRatio> {
        self.inferred_ratio
    }

    /// Concrete ratio a generation request would use right now.
    pub fn resolved_ratio(&self) -> AspectRatio {
        if !self.aspect_ratio.is_auto() {
            return self.aspect_ratio;
        }
        self.inferred_ratio.unwrap_or(AspectRatio::Square)
    }

    pub fn is_decoding(&self) -> bool {
        self.decoding
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_busy(&self) -> bool {
        self.decoding || self.generating || self.editing
    }

    pub fn last_error(&self) -> Option<&PipelineError> {
        self.last_error.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.last_error.as_ref().map(ToString::to_string)
    }

    pub fn edit_prompt(&self) -> &str {
        &self.edit_prompt
    }

    /// Stores a new reference image and starts its decode.
    ///
    /// Returns `None` when the slot already holds the same image and its
    /// metadata is present or still being decoded.
    pub fn set_reference_image(&mut self, payload: ImagePayload) -> Option<DecodeJob> {
        let unchanged = self.ref_image.payload() == Some(&payload);
        if unchanged && (self.metadata.is_some() || self.decoding) {
            return None;
        }

        self.reference_version += 1;
        self.ref_image.set(payload.clone());
        self.metadata = None;
        self.last_error = None;
        self.decoding = true;
        self.inferred_ratio = None;
        self.refresh_inferred_ratio();

        Some(DecodeJob {
            ticket: self.ticket(),
            image: payload,
        })
    }

    pub fn set_user_image(&mut self, payload: ImagePayload) {
        self.user_image.set(payload);
    }

    pub fn set_fidelity(&mut self, fidelity: FidelityMode) {
        self.fidelity = fidelity;
    }

    /// Stores the selection; choosing `Auto` re-runs inference for the loaded
    /// reference.
    pub fn set_aspect_ratio(&mut self, ratio: AspectRatio) {
        self.aspect_ratio = ratio;
        self.refresh_inferred_ratio();
    }

    pub fn set_edit_prompt(&mut self, text: impl Into<String>) {
        self.edit_prompt = text.into();
    }

    pub fn finish_decode(
        &mut self,
        ticket: Ticket,
        outcome: Result<StyleMetadata, PipelineError>,
    ) -> Result<(), PipelineError> {
        if ticket != self.ticket() {
            return Err(PipelineError::Cancelled {
                operation: Operation::Decode,
            });
        }
        self.decoding = false;
        match outcome {
            Ok(metadata) => {
                self.metadata = Some(metadata);
                Ok(())
            }
            Err(err) => {
                self.metadata = None;
                Err(self.fail(err))
            }
        }
    }

    pub fn begin_mimic(&mut self) -> Result<MimicJob, PipelineError> {
        if self.generating {
            return Err(self.fail(PipelineError::Busy {
                operation: Operation::Generate,
            }));
        }
        let (Some(reference), Some(subject)) = (
            self.ref_image.payload().cloned(),
            self.user_image.payload().cloned(),
        ) else {
            return Err(self.fail(PipelineError::MissingInput));
        };
        let Some(metadata) = self.metadata.as_ref() else {
            return Err(self.fail(PipelineError::MetadataNotReady));
        };

        let prompt = compose_mimic_prompt(metadata, self.fidelity);
        let stylized = crate::prompt::is_stylized(&metadata.art_style);
        let aspect_ratio = self.resolved_ratio();
        self.last_error = None;
        self.generating = true;

        Ok(MimicJob {
            ticket: self.ticket(),
            fidelity: self.fidelity,
            stylized,
            request: GenerateRequest {
                reference,
                subject,
                prompt,
                aspect_ratio,
            },
        })
    }

    pub fn finish_mimic(
        &mut self,
        ticket: Ticket,
        outcome: Result<ImagePayload, PipelineError>,
    ) -> Result<(), PipelineError> {
        if ticket.epoch != self.epoch {
            return Err(PipelineError::Cancelled {
                operation: Operation::Generate,
            });
        }
        self.generating = false;
        match outcome {
            Ok(image) => {
                self.result_image.set(image);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Starts an edit of the current result. An empty instruction or an
    /// empty result slot is a no-op and yields `Ok(None)`.
    pub fn begin_edit(&mut self, instruction: &str) -> Result<Option<EditJob>, PipelineError> {
        let instruction = instruction.trim();
        let Some(image) = self.result_image.payload().cloned() else {
            return Ok(None);
        };
        if instruction.is_empty() {
            return Ok(None);
        }
        if self.editing {
            return Err(self.fail(PipelineError::Busy {
                operation: Operation::Edit,
            }));
        }

        self.last_error = None;
        self.editing = true;
        Ok(Some(EditJob {
            ticket: self.ticket(),
            request: EditRequest {
                image,
                instruction: instruction.to_string(),
            },
        }))
    }

    pub fn finish_edit(
        &mut self,
        ticket: Ticket,
        outcome: Result<ImagePayload, PipelineError>,
    ) -> Result<(), PipelineError> {
        if ticket.epoch != self.epoch {
            return Err(PipelineError::Cancelled {
                operation: Operation::Edit,
            });
        }
        self.editing = false;
        match outcome {
            Ok(image) => {
                self.result_image.set(image);
                self.edit_prompt.clear();
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Invalidates every in-flight job and clears the busy flags. Returns the
    /// operations that were running.
    pub fn cancel_in_flight(&mut self) -> Vec<Operation> {
        let mut cancelled = Vec::new();
        if self.decoding {
            cancelled.push(Operation::Decode);
        }
        if self.generating {
            cancelled.push(Operation::Generate);
        }
        if self.editing {
            cancelled.push(Operation::Edit);
        }
        self.epoch += 1;
        self.decoding = false;
        self.generating = false;
        self.editing = false;
        cancelled
    }

    /// Back to the empty session. Fidelity, ratio selection and the edit
    /// prompt text survive.
    pub fn reset(&mut self) -> Vec<Operation> {
        let cancelled = self.cancel_in_flight();
        self.ref_image.clear();
        self.user_image.clear();
        self.result_image.clear();
        self.metadata = None;
        self.inferred_ratio = None;
        self.last_error = None;
        cancelled
    }

    /// Stores a failure as the session's error (unless it is a cancellation)
    /// and hands it back.
    pub fn fail(&mut self, err: PipelineError) -> PipelineError {
        if err.is_reportable() {
            self.last_error = Some(err.clone());
        }
        err
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            epoch: self.epoch,
            reference_version: self.reference_version,
        }
    }

    fn refresh_inferred_ratio(&mut self) {
        if !self.aspect_ratio.is_auto() {
            return;
        }
        self.inferred_ratio = self
            .ref_image
            .payload()
            .and_then(ImagePayload::dimensions)
            .map(|(width, height)| infer_ratio(width, height));
    }
}

#[cfg(test)]
mod tests {
    use rerender_contracts::{
        AspectRatio, FidelityMode, ImagePayload, Operation, PipelineError, StyleMetadata,
    };

    use super::PipelineState;

    fn image(tag: &[u8], dims: Option<(u32, u32)>) -> ImagePayload {
        ImagePayload::new(tag.to_vec(), "image/png").with_dimensions(dims)
    }

    fn metadata(art_style: &str) -> StyleMetadata {
        StyleMetadata {
            art_style: art_style.to_string(),
            outfit_details: "jacket".to_string(),
            pose_and_gestures: "arms raised".to_string(),
            background_elements: "forest".to_string(),
            lighting_and_color: "golden hour".to_string(),
            composition: "sword across eyes".to_string(),
        }
    }

    fn ready_state() -> PipelineState {
        let mut state = PipelineState::new();
        let job = state
            .set_reference_image(image(b"ref", Some((1600, 1000))))
            .expect("new reference decodes");
        state
            .finish_decode(job.ticket, Ok(metadata("anime")))
            .expect("decode applies");
        state.set_user_image(image(b"user", Some((800, 800))));
        state
    }

    #[test]
    fn new_reference_clears_metadata_and_error_before_decode_resolves() {
        let mut state = ready_state();
        state.fail(PipelineError::MissingInput);

        let job = state.set_reference_image(image(b"ref-2", None));
        assert!(job.is_some());
        assert!(state.metadata().is_none());
        assert!(state.last_error().is_none());
        assert!(state.is_decoding());
    }

    #[test]
    fn same_reference_does_not_redecode_unless_previous_decode_failed() {
        let mut state = ready_state();
        assert!(state.set_reference_image(image(b"ref", Some((1600, 1000)))).is_none());
        assert!(state.metadata().is_some());

        let job = state
            .set_reference_image(image(b"other", None))
            .expect("different image decodes");
        let err = state.finish_decode(
            job.ticket,
            Err(PipelineError::DecodeFailure {
                detail: "offline".to_string(),
            }),
        );
        assert!(err.is_err());
        assert!(state.set_reference_image(image(b"other", None)).is_some());
    }

    #[test]
    fn auto_ratio_is_inferred_from_reference_dimensions() {
        let state = ready_state();
        assert_eq!(state.aspect_ratio(), AspectRatio::Auto);
        assert_eq!(state.inferred_ratio(), Some(AspectRatio::Landscape16x9));
        assert_eq!(state.resolved_ratio(), AspectRatio::Landscape16x9);
    }

    #[test]
    fn manual_ratio_is_never_overridden() {
        let mut state = PipelineState::new();
        state.set_aspect_ratio(AspectRatio::Portrait3x4);
        state.set_reference_image(image(b"wide", Some((1920, 1080))));
        assert_eq!(state.aspect_ratio(), AspectRatio::Portrait3x4);
        assert_eq!(state.inferred_ratio(), None);
        assert_eq!(state.resolved_ratio(), AspectRatio::Portrait3x4);

        state.set_aspect_ratio(AspectRatio::Auto);
        assert_eq!(state.resolved_ratio(), AspectRatio::Landscape16x9);
    }

    #[test]
    fn auto_without_dimensions_resolves_to_square() {
        let mut state = PipelineState::new();
        state.set_reference_image(image(b"opaque", None));
        assert_eq!(state.inferred_ratio(), None);
        assert_eq!(state.resolved_ratio(), AspectRatio::Square);
    }

    #[test]
    fn mimic_requires_both_images() {
        let mut state = PipelineState::new();
        assert_eq!(state.begin_mimic().unwrap_err(), PipelineError::MissingInput);
        assert_eq!(state.last_error(), Some(&PipelineError::MissingInput));
        assert!(!state.is_generating());

        state.set_user_image(image(b"user", None));
        assert_eq!(state.begin_mimic().unwrap_err(), PipelineError::MissingInput);
    }

    #[test]
    fn mimic_waits_for_metadata() {
        let mut state = PipelineState::new();
        state.set_reference_image(image(b"ref", None));
        state.set_user_image(image(b"user", None));
        assert_eq!(
            state.begin_mimic().unwrap_err(),
            PipelineError::MetadataNotReady
        );
        assert_eq!(
            state.error_message().as_deref(),
            Some("Engine: Waiting for prompt reconstruction...")
        );
    }

    #[test]
    fn mimic_job_uses_hard_stylized_branch_and_inferred_ratio() {
        let mut state = ready_state();
        state.set_fidelity(FidelityMode::Hard);
        let job = state.begin_mimic().expect("inputs ready");
        assert!(state.is_generating());
        assert!(job.stylized);
        assert_eq!(job.request.aspect_ratio, AspectRatio::Landscape16x9);
        assert!(job
            .request
            .prompt
            .contains("TRANSLATE THE USER TO THE STYLE"));
        assert_eq!(job.request.reference.bytes(), b"ref");
        assert_eq!(job.request.subject.bytes(), b"user");
    }

    #[test]
    fn second_mimic_while_generating_is_busy() {
        let mut state = ready_state();
        let _job = state.begin_mimic().expect("inputs ready");
        assert_eq!(
            state.begin_mimic().unwrap_err(),
            PipelineError::Busy {
                operation: Operation::Generate
            }
        );
        assert!(state.is_generating());
    }

    #[test]
    fn failed_mimic_keeps_previous_result_and_clears_flag() {
        let mut state = ready_state();
        let job = state.begin_mimic().expect("inputs ready");
        state
            .finish_mimic(job.ticket, Ok(image(b"result-1", None)))
            .expect("result applies");

        let job = state.begin_mimic().expect("inputs ready");
        let err = state
            .finish_mimic(job.ticket, Err(PipelineError::no_generated_image()))
            .unwrap_err();
        assert_eq!(err, PipelineError::no_generated_image());
        assert!(!state.is_generating());
        assert_eq!(
            state.result_image().payload().map(ImagePayload::bytes),
            Some(&b"result-1"[..])
        );
        assert_eq!(
            state.error_message().as_deref(),
            Some("Re-rendering engine failed to produce image.")
        );
    }

    #[test]
    fn edit_is_noop_without_result_or_instruction() {
        let mut state = ready_state();
        assert!(state.begin_edit("add rain").expect("no-op").is_none());
        assert!(!state.is_editing());

        let job = state.begin_mimic().expect("inputs ready");
        state
            .finish_mimic(job.ticket, Ok(image(b"result", None)))
            .expect("result applies");
        assert!(state.begin_edit("   ").expect("no-op").is_none());
        assert!(state.last_error().is_none());
    }

    #[test]
    fn successful_edit_replaces_result_and_clears_prompt() {
        let mut state = ready_state();
        let job = state.begin_mimic().expect("inputs ready");
        state
            .finish_mimic(job.ticket, Ok(image(b"result", None)))
            .expect("result applies");
        state.set_edit_prompt("add rain");

        let edit = state
            .begin_edit(" add rain ")
            .expect("edit starts")
            .expect("edit job");
        assert_eq!(edit.request.instruction, "add rain");
        assert_eq!(edit.request.image.bytes(), b"result");
        assert!(state.is_editing());

        state
            .finish_edit(edit.ticket, Ok(image(b"rainy", None)))
            .expect("edit applies");
        assert!(!state.is_editing());
        assert_eq!(state.edit_prompt(), "");
        assert_eq!(
            state.result_image().payload().map(ImagePayload::bytes),
            Some(&b"rainy"[..])
        );
    }

    #[test]
    fn failed_edit_keeps_result_and_prompt() {
        let mut state = ready_state();
        let job = state.begin_mimic().expect("inputs ready");
        state
            .finish_mimic(job.ticket, Ok(image(b"result", None)))
            .expect("result applies");
        state.set_edit_prompt("add rain");

        let edit = state.begin_edit("add rain").expect("edit starts").expect("edit job");
        let err = state
            .finish_edit(edit.ticket, Err(PipelineError::no_edited_image()))
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to edit image");
        assert!(!state.is_editing());
        assert_eq!(state.edit_prompt(), "add rain");
        assert_eq!(
            state.result_image().payload().map(ImagePayload::bytes),
            Some(&b"result"[..])
        );
    }

    #[test]
    fn superseded_decode_is_discarded() {
        let mut state = PipelineState::new();
        let first = state
            .set_reference_image(image(b"a", None))
            .expect("decode a");
        let second = state
            .set_reference_image(image(b"b", None))
            .expect("decode b");

        assert_eq!(
            state.finish_decode(first.ticket, Ok(metadata("stale"))),
            Err(PipelineError::Cancelled {
                operation: Operation::Decode
            })
        );
        assert!(state.metadata().is_none());
        assert!(state.is_decoding());

        state
            .finish_decode(second.ticket, Ok(metadata("fresh")))
            .expect("current decode applies");
        assert_eq!(
            state.metadata().map(|m| m.art_style.as_str()),
            Some("fresh")
        );
        assert!(!state.is_decoding());
    }

    #[test]
    fn reset_clears_session_but_keeps_preferences() {
        let mut state = ready_state();
        state.set_fidelity(FidelityMode::Hard);
        state.set_aspect_ratio(AspectRatio::Portrait9x16);
        let job = state.begin_mimic().expect("inputs ready");
        state.fail(PipelineError::MissingInput);

        let cancelled = state.reset();
        assert_eq!(cancelled, vec![Operation::Generate]);
        assert!(state.ref_image().is_empty());
        assert!(state.user_image().is_empty());
        assert!(state.result_image().is_empty());
        assert!(state.metadata().is_none());
        assert!(state.last_error().is_none());
        assert!(!state.is_busy());
        assert_eq!(state.fidelity(), FidelityMode::Hard);
        assert_eq!(state.aspect_ratio(), AspectRatio::Portrait9x16);

        assert_eq!(
            state.finish_mimic(job.ticket, Ok(image(b"late", None))),
            Err(PipelineError::Cancelled {
                operation: Operation::Generate
            })
        );
        assert!(state.result_image().is_empty());
        assert!(state.last_error().is_none());
    }
}
