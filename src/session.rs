use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::acquire::AcquireError;
use crate::i18n::ui_text;
use crate::llm::{GeminiClient, GenerationError};
use crate::parser::{parse_response, ParseError};
use crate::prompts::build_prompt;
use crate::types::{GeneratedResult, ImageFile, ImageSlot, Language, Mode};
use crate::utils::timing::{complete_submission_timer, start_submission_timer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SubmissionError {
    pub fn user_message(&self, language: Language) -> &'static str {
        match self {
            SubmissionError::Generation(err) => err.user_message(language),
            SubmissionError::Parse(_) => ui_text(language).error_instruction,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SubmissionError::Generation(GenerationError::Cancelled))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitRejected {
    #[error("select a mode first")]
    NoMode,
    #[error("a request is already in flight")]
    InFlight,
    #[error("missing image for slot {0:?}")]
    MissingImage(ImageSlot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting,
}

/// Identifies one image load. Only the newest ticket for a slot, issued
/// under the current mode, may store its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    slot: ImageSlot,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Stored,
    Failed,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub mode: Mode,
    pub language: Language,
    pub prompt: &'static str,
    pub images: Vec<ImageFile>,
}

impl SubmissionRequest {
    pub fn image_names(&self) -> Vec<String> {
        self.images.iter().map(|image| image.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    pub slot: ImageSlot,
    pub label: &'static str,
    pub image: Option<ImageFile>,
    pub error: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub mode: Option<Mode>,
    pub language: Language,
    pub phase: Phase,
    pub can_submit: bool,
    pub slots: Vec<SlotView>,
    pub outcome: Option<Result<GeneratedResult, SubmissionError>>,
}

#[derive(Debug, Default)]
struct SlotState {
    image: Option<ImageFile>,
    error: Option<AcquireError>,
    generation: u64,
}

/// Owns everything the user has chosen so far and gates submissions.
#[derive(Debug)]
pub struct Session {
    mode: Option<Mode>,
    language: Language,
    slots: [SlotState; 2],
    phase: Phase,
    outcome: Option<Result<GeneratedResult, SubmissionError>>,
}

impl Session {
    pub fn new(language: Language) -> Self {
        Session {
            mode: None,
            language,
            slots: Default::default(),
            phase: Phase::Idle,
            outcome: None,
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn image(&self, slot: ImageSlot) -> Option<&ImageFile> {
        self.slots[slot.index()].image.as_ref()
    }

    pub fn select_mode(&mut self, mode: Mode) {
        self.mode = Some(mode);
        for slot in &mut self.slots {
            slot.image = None;
            slot.error = None;
            slot.generation += 1;
        }
        self.outcome = None;
        info!("Mode selected: {}", mode);
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn begin_image_load(&mut self, slot: ImageSlot) -> LoadTicket {
        let state = &mut self.slots[slot.index()];
        state.generation += 1;
        LoadTicket {
            slot,
            generation: state.generation,
        }
    }

    pub fn finish_image_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<ImageFile, AcquireError>,
    ) -> LoadOutcome {
        let state = &mut self.slots[ticket.slot.index()];
        if state.generation != ticket.generation {
            info!("Discarding stale image load for {:?}", ticket.slot);
            return LoadOutcome::Stale;
        }

        match result {
            Ok(image) => {
                info!(
                    "Stored {} ({}) in {:?}",
                    image.name, image.mime_type, ticket.slot
                );
                state.image = Some(image);
                state.error = None;
                LoadOutcome::Stored
            }
            Err(err) => {
                warn!("Image load for {:?} failed: {}", ticket.slot, err);
                state.error = Some(err);
                LoadOutcome::Failed
            }
        }
    }

    fn missing_slot(&self, mode: Mode) -> Option<ImageSlot> {
        mode.required_slots()
            .iter()
            .copied()
            .find(|slot| self.slots[slot.index()].image.is_none())
    }

    pub fn can_submit(&self) -> bool {
        match self.mode {
            Some(mode) => self.phase == Phase::Idle && self.missing_slot(mode).is_none(),
            None => false,
        }
    }

    pub fn begin_submission(&mut self) -> Result<SubmissionRequest, SubmitRejected> {
        if self.phase == Phase::Submitting {
            return Err(SubmitRejected::InFlight);
        }
        let mode = self.mode.ok_or(SubmitRejected::NoMode)?;
        if let Some(slot) = self.missing_slot(mode) {
            return Err(SubmitRejected::MissingImage(slot));
        }

        let images = mode
            .required_slots()
            .iter()
            .filter_map(|slot| self.slots[slot.index()].image.clone())
            .collect();

        self.phase = Phase::Submitting;
        self.outcome = None;

        Ok(SubmissionRequest {
            mode,
            language: self.language,
            prompt: build_prompt(mode, self.language),
            images,
        })
    }

    /// Records the outcome and reopens the gate. Images are kept so the
    /// same request can be sent again.
    pub fn complete_submission(&mut self, result: Result<GeneratedResult, SubmissionError>) {
        if self.phase != Phase::Submitting {
            warn!("Ignoring submission result received while idle");
            return;
        }
        self.phase = Phase::Idle;
        self.outcome = Some(result);
    }

    pub fn outcome(&self) -> Option<&Result<GeneratedResult, SubmissionError>> {
        self.outcome.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let text = ui_text(self.language);
        let slots = match self.mode {
            Some(mode) => mode
                .required_slots()
                .iter()
                .map(|&slot| {
                    let state = &self.slots[slot.index()];
                    SlotView {
                        slot,
                        label: text.slot_label(mode, slot),
                        image: state.image.clone(),
                        error: state
                            .error
                            .as_ref()
                            .map(|err| err.user_message(self.language)),
                    }
                })
                .collect(),
            None => Vec::new(),
        };

        SessionSnapshot {
            mode: self.mode,
            language: self.language,
            phase: self.phase,
            can_submit: self.can_submit(),
            slots,
            outcome: self.outcome.clone(),
        }
    }
}

/// Calls the model for a prepared request and shapes the reply for its mode.
pub async fn generate_result(
    client: &GeminiClient,
    request: &SubmissionRequest,
    cancel: &CancellationToken,
) -> Result<GeneratedResult, SubmissionError> {
    let mut timer = start_submission_timer(request.mode, request.language, request.image_names());

    let outcome = match client
        .generate(request.prompt, request.language, &request.images, cancel)
        .await
    {
        Ok(parts) => parse_response(request.mode, &parts).map_err(SubmissionError::from),
        Err(err) => Err(SubmissionError::from(err)),
    };

    match &outcome {
        Ok(result) => {
            info!("Generated {} result", result.mode());
            complete_submission_timer(&mut timer, "success", None)
        }
        Err(err) if err.is_cancelled() => complete_submission_timer(&mut timer, "cancelled", None),
        Err(err) => complete_submission_timer(&mut timer, "error", Some(err.to_string())),
    }
    outcome
}
