use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use rerender_contracts::events::EventWriter;
use rerender_contracts::{
    AspectRatio, FidelityMode, ImagePayload, Operation, PipelineError, StyleMetadata,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::intake;
use crate::service::{error_chain_text, map_object, ServiceReply, StyleService};
use crate::state::PipelineState;

const ERROR_DETAIL_MAX_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// Nothing to edit, or nothing to edit it with.
    Skipped,
}

/// Drives the session state machine against a [`StyleService`].
///
/// The state lock is only held for transitions; collaborator calls run
/// without it, so `snapshot`, `cancel` and `reset` stay responsive while a
/// decode or generation is in flight on another thread.
pub struct PipelineController {
    service: Arc<dyn StyleService>,
    state: Mutex<PipelineState>,
    events: Option<EventWriter>,
}

impl PipelineController {
    pub fn new(service: Arc<dyn StyleService>) -> Self {
        Self {
            service,
            state: Mutex::new(PipelineState::new()),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn snapshot(&self) -> PipelineState {
        self.lock().clone()
    }

    pub fn metadata(&self) -> Option<StyleMetadata> {
        self.lock().metadata().cloned()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().error_message()
    }

    pub fn load_reference(&self, path: &Path) -> Result<(), PipelineError> {
        let payload = self.read_input(path)?;
        self.set_reference_image(payload)
    }

    pub fn load_subject(&self, path: &Path) -> Result<(), PipelineError> {
        let payload = self.read_input(path)?;
        self.set_user_image(payload);
        Ok(())
    }

    /// Stores the reference image and decodes it. Blocks until the decode
    /// settles; returns `Cancelled` if the result was superseded meanwhile.
    pub fn set_reference_image(&self, payload: ImagePayload) -> Result<(), PipelineError> {
        let job = {
            let mut state = self.lock();
            let job = state.set_reference_image(payload.clone());
            if job.is_some() {
                self.emit(
                    "reference_set",
                    json!({
                        "mime_type": payload.mime_type(),
                        "bytes": payload.len(),
                        "dimensions": payload.dimensions().map(|(w, h)| json!([w, h])),
                    }),
                );
                if let Some(ratio) = state.inferred_ratio() {
                    info!(ratio = ratio.as_str(), "aspect ratio inferred from reference");
                    self.emit("aspect_inferred", json!({ "aspect_ratio": ratio.as_str() }));
                }
            }
            job
        };
        let Some(job) = job else {
            debug!("reference unchanged; keeping current metadata");
            return Ok(());
        };

        info!(service = self.service.name(), "decoding reference style");
        self.emit("decode_started", json!({ "service": self.service.name() }));
        let started = Instant::now();
        let outcome = self.service.decode(&job.image).map_err(|err| {
            let detail = error_chain_text(&err, ERROR_DETAIL_MAX_CHARS);
            warn!(error = %detail, "style decode failed");
            PipelineError::DecodeFailure { detail }
        });
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut state = self.lock();
        let result = state.finish_decode(job.ticket, outcome);
        match &result {
            Ok(()) => {
                let art_style = state
                    .metadata()
                    .map(|metadata| metadata.art_style.clone())
                    .unwrap_or_default();
                info!(elapsed_ms, art_style = %art_style, "reference decoded");
                self.emit(
                    "decode_finished",
                    json!({ "elapsed_ms": elapsed_ms, "art_style": art_style }),
                );
            }
            Err(err) => self.report_failure("decode_failed", err),
        }
        result
    }

    pub fn set_user_image(&self, payload: ImagePayload) {
        self.emit(
            "subject_set",
            json!({
                "mime_type": payload.mime_type(),
                "bytes": payload.len(),
            }),
        );
        self.lock().set_user_image(payload);
    }

    pub fn set_fidelity(&self, fidelity: FidelityMode) {
        self.lock().set_fidelity(fidelity);
    }

    pub fn set_aspect_ratio(&self, ratio: AspectRatio) {
        let mut state = self.lock();
        state.set_aspect_ratio(ratio);
        if ratio.is_auto() {
            if let Some(inferred) = state.inferred_ratio() {
                self.emit(
                    "aspect_inferred",
                    json!({ "aspect_ratio": inferred.as_str() }),
                );
            }
        }
    }

    pub fn set_edit_prompt(&self, text: &str) {
        self.lock().set_edit_prompt(text);
    }

    /// Re-renders the subject in the decoded reference style.
    pub fn run_mimic(&self) -> Result<(), PipelineError> {
        let job = {
            let mut state = self.lock();
            match state.begin_mimic() {
                Ok(job) => job,
                Err(err) => {
                    self.report_failure("mimic_failed", &err);
                    return Err(err);
                }
            }
        };

        let aspect_ratio = job.request.aspect_ratio;
        info!(
            fidelity = job.fidelity.as_str(),
            stylized = job.stylized,
            aspect_ratio = aspect_ratio.as_str(),
            "re-rendering subject"
        );
        self.emit(
            "mimic_started",
            json!({
                "fidelity": job.fidelity.as_str(),
                "stylized": job.stylized,
                "aspect_ratio": aspect_ratio.as_str(),
                "prompt": job.request.prompt,
            }),
        );
        let started = Instant::now();
        let (outcome, provider) = match self.service.generate(&job.request) {
            Ok(reply) => {
                for warning in &reply.warnings {
                    warn!(model = %reply.model, "{warning}");
                }
                let provider = provider_details(&reply);
                (
                    reply.image.ok_or_else(PipelineError::no_generated_image),
                    Some(provider),
                )
            }
            Err(err) => {
                let message = error_chain_text(&err, ERROR_DETAIL_MAX_CHARS);
                warn!(error = %message, "generation call failed");
                (Err(PipelineError::GenerationFailure { message }), None)
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let produced = outcome.as_ref().ok().map(image_summary);

        let mut state = self.lock();
        let result = state.finish_mimic(job.ticket, outcome);
        match &result {
            Ok(()) => {
                info!(elapsed_ms, "re-render complete");
                self.emit(
                    "mimic_finished",
                    json!({
                        "elapsed_ms": elapsed_ms,
                        "result": produced,
                        "provider": provider,
                    }),
                );
            }
            Err(err) => self.report_failure("mimic_failed", err),
        }
        result
    }

    /// Applies a free-text edit to the current result. The instruction text
    /// is cleared on success and kept on failure.
    pub fn run_edit(&self, instruction: &str) -> Result<EditOutcome, PipelineError> {
        let job = {
            let mut state = self.lock();
            match state.begin_edit(instruction) {
                Ok(Some(job)) => {
                    state.set_edit_prompt(instruction);
                    job
                }
                Ok(None) => {
                    debug!("edit skipped: no result image or empty instruction");
                    return Ok(EditOutcome::Skipped);
                }
                Err(err) => {
                    self.report_failure("edit_failed", &err);
                    return Err(err);
                }
            }
        };

        info!(instruction = %job.request.instruction, "editing result");
        self.emit(
            "edit_started",
            json!({ "instruction": job.request.instruction }),
        );
        let started = Instant::now();
        let (outcome, provider) = match self.service.edit(&job.request) {
            Ok(reply) => {
                for warning in &reply.warnings {
                    warn!(model = %reply.model, "{warning}");
                }
                let provider = provider_details(&reply);
                (
                    reply.image.ok_or_else(PipelineError::no_edited_image),
                    Some(provider),
                )
            }
            Err(err) => {
                let message = error_chain_text(&err, ERROR_DETAIL_MAX_CHARS);
                warn!(error = %message, "edit call failed");
                (Err(PipelineError::EditFailure { message }), None)
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let produced = outcome.as_ref().ok().map(image_summary);

        let mut state = self.lock();
        let result = state.finish_edit(job.ticket, outcome);
        match &result {
            Ok(()) => {
                info!(elapsed_ms, "edit applied");
                self.emit(
                    "edit_finished",
                    json!({
                        "elapsed_ms": elapsed_ms,
                        "result": produced,
                        "provider": provider,
                    }),
                );
            }
            Err(err) => self.report_failure("edit_failed", err),
        }
        result.map(|()| EditOutcome::Applied)
    }

    /// Abandons in-flight calls. Their results are discarded when they land.
    pub fn cancel(&self) -> Vec<Operation> {
        let cancelled = self.lock().cancel_in_flight();
        if !cancelled.is_empty() {
            let names: Vec<&str> = cancelled.iter().map(|op| op.as_str()).collect();
            info!(operations = ?names, "in-flight work cancelled");
            self.emit("cancelled", json!({ "operations": names }));
        }
        cancelled
    }

    pub fn reset(&self) {
        let cancelled = self.lock().reset();
        let names: Vec<&str> = cancelled.iter().map(|op| op.as_str()).collect();
        info!("session reset");
        self.emit("reset", json!({ "cancelled": names }));
    }

    /// Writes the current result image to `path`.
    pub fn save_result(&self, path: &Path) -> Result<PathBuf> {
        let Some(image) = self.lock().result_image().payload().cloned() else {
            bail!("no result image to save; run /mimic first");
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(path, image.bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), bytes = image.len(), "result saved");
        Ok(path.to_path_buf())
    }

    fn read_input(&self, path: &Path) -> Result<ImagePayload, PipelineError> {
        intake::select_file(path).map_err(|err| {
            warn!(path = %path.display(), "{err}");
            self.lock().fail(err)
        })
    }

    fn report_failure(&self, event_type: &str, err: &PipelineError) {
        if !err.is_reportable() {
            debug!("{err}");
            return;
        }
        let detail = match err {
            PipelineError::DecodeFailure { detail } => Some(detail.as_str()),
            _ => None,
        };
        self.emit(
            event_type,
            json!({ "error": err.to_string(), "detail": detail }),
        );
    }

    fn emit(&self, event_type: &str, payload: Value) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(err) = events.emit(event_type, map_object(payload)) {
            warn!(event_type, "failed to write event: {err:#}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Collaborator request/response summary for the event log. Inline image
/// bodies are stripped when the event is written.
fn provider_details(reply: &ServiceReply) -> Value {
    json!({
        "model": reply.model,
        "request": reply.provider_request,
        "response": reply.provider_response,
        "warnings": reply.warnings,
    })
}

fn image_summary(image: &ImagePayload) -> Value {
    json!({
        "mime_type": image.mime_type(),
        "bytes": image.len(),
        "dimensions": image.dimensions().map(|(w, h)| json!([w, h])),
    })
}
