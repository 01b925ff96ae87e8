//! IntakeController — owns the current stage and answers, applies
//! transitions, and fans stage changes out to subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use crate::error::IntakeError;
use crate::intake::answers::{AnswerUpdate, BranchFieldPolicy, IntakeAnswers, validate_stage};
use crate::intake::completion::{CompletionOrchestrator, CompletionOutcome};
use crate::intake::persistence::ProgressSaver;
use crate::intake::stage::{IntakeStage, next_stage, previous_stage};

const EVENT_CAPACITY: usize = 64;

/// Controller settings.
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    /// Pause between accepting `advance`/`retreat` and committing the new
    /// stage, matching the front end's slide animation.
    pub transition_delay: Duration,
    pub branch_policy: BranchFieldPolicy,
    /// Fixed "today" for birth-date validation; `None` uses the local date.
    pub today: Option<NaiveDate>,
}

/// Notifications emitted on every committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntakeEvent {
    StageChanged { from: IntakeStage, to: IntakeStage },
    Completed { outcome: CompletionOutcome },
    ExitedToLanding,
}

/// What a transition request did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    Moved { from: IntakeStage, to: IntakeStage },
    Completed { outcome: CompletionOutcome },
    ExitedToLanding,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntakeSnapshot {
    pub stage: IntakeStage,
    pub progress_percent: u8,
    pub answers: IntakeAnswers,
}

#[derive(Debug)]
struct IntakeState {
    stage: IntakeStage,
    answers: IntakeAnswers,
}

/// Clears the in-progress flag when the transition ends, however it ends.
struct TransitionGuard<'a>(&'a AtomicBool);

impl<'a> TransitionGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, IntakeError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| IntakeError::TransitionInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives one seeker through the intake wizard.
pub struct IntakeController {
    state: RwLock<IntakeState>,
    transitioning: AtomicBool,
    events: broadcast::Sender<IntakeEvent>,
    saver: ProgressSaver,
    completion: CompletionOrchestrator,
    config: ControllerConfig,
}

impl IntakeController {
    /// A fresh session at the first stage with empty answers.
    pub fn new(
        saver: ProgressSaver,
        completion: CompletionOrchestrator,
        config: ControllerConfig,
    ) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(IntakeState {
                stage: IntakeStage::FIRST,
                answers: IntakeAnswers::default(),
            }),
            transitioning: AtomicBool::new(false),
            events,
            saver,
            completion,
            config,
        }
    }

    /// Start from previously collected answers instead of an empty form.
    pub fn with_answers(mut self, answers: IntakeAnswers) -> Self {
        self.state.get_mut().answers = answers;
        self
    }

    /// Subscribe to transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<IntakeEvent> {
        self.events.subscribe()
    }

    pub async fn current_stage(&self) -> IntakeStage {
        self.state.read().await.stage
    }

    pub async fn snapshot(&self) -> IntakeSnapshot {
        let state = self.state.read().await;
        IntakeSnapshot {
            stage: state.stage,
            progress_percent: state.stage.progress_percent(),
            answers: state.answers.clone(),
        }
    }

    /// Apply field updates from the active stage's view. No validation and
    /// no save happen here; both belong to the next transition.
    pub async fn update_answers(&self, update: AnswerUpdate) -> IntakeSnapshot {
        {
            let mut state = self.state.write().await;
            state.answers.apply(update, self.config.branch_policy);
        }
        self.snapshot().await
    }

    /// Move forward, or complete the intake from the terminal stage.
    pub async fn advance(&self) -> Result<Transition, IntakeError> {
        let _guard = TransitionGuard::acquire(&self.transitioning)?;
        self.advance_locked().await
    }

    /// Record the partner answer and move on from the partner question.
    pub async fn choose_partner(&self, has_partner: bool) -> Result<Transition, IntakeError> {
        let _guard = TransitionGuard::acquire(&self.transitioning)?;
        {
            let mut state = self.state.write().await;
            if state.stage != IntakeStage::PartnerQuery {
                return Err(IntakeError::NotAtPartnerQuery { stage: state.stage });
            }
            state.answers.set_has_partner(has_partner);
        }
        self.advance_locked().await
    }

    /// Move back; from the first stage this leaves the wizard.
    pub async fn retreat(&self) -> Result<Transition, IntakeError> {
        let _guard = TransitionGuard::acquire(&self.transitioning)?;
        let (from, answers) = self.current().await;

        let Some(to) = previous_stage(from, &answers) else {
            info!(stage = %from, "Exiting intake to landing");
            let _ = self.events.send(IntakeEvent::ExitedToLanding);
            return Ok(Transition::ExitedToLanding);
        };

        self.pause().await;
        Ok(self.commit(from, to).await)
    }

    /// Jump straight to `stage` (deep link or resume). No precondition is
    /// checked, but the jump is committed, announced and saved like any
    /// other transition.
    pub async fn jump_to(&self, stage: IntakeStage) -> Result<Transition, IntakeError> {
        let _guard = TransitionGuard::acquire(&self.transitioning)?;
        let from = self.state.read().await.stage;
        Ok(self.commit(from, stage).await)
    }

    async fn advance_locked(&self) -> Result<Transition, IntakeError> {
        let (from, answers) = self.current().await;
        validate_stage(from, &answers, self.today())
            .map_err(|source| IntakeError::Incomplete { stage: from, source })?;

        let Some(to) = next_stage(from, &answers) else {
            let outcome = self.completion.complete(&answers).await;
            info!(record_id = ?outcome.record_id(), "Intake completed");
            let _ = self.events.send(IntakeEvent::Completed {
                outcome: outcome.clone(),
            });
            return Ok(Transition::Completed { outcome });
        };

        self.pause().await;
        Ok(self.commit(from, to).await)
    }

    /// The single path every stage change goes through.
    async fn commit(&self, from: IntakeStage, to: IntakeStage) -> Transition {
        let answers = {
            let mut state = self.state.write().await;
            state.stage = to;
            state.answers.clone()
        };
        debug!(from = %from, to = %to, "Stage changed");
        let _ = self.events.send(IntakeEvent::StageChanged { from, to });
        self.saver.save(&answers);
        Transition::Moved { from, to }
    }

    async fn current(&self) -> (IntakeStage, IntakeAnswers) {
        let state = self.state.read().await;
        (state.stage, state.answers.clone())
    }

    async fn pause(&self) {
        if !self.config.transition_delay.is_zero() {
            tokio::time::sleep(self.config.transition_delay).await;
        }
    }

    fn today(&self) -> NaiveDate {
        self.config
            .today
            .unwrap_or_else(|| Local::now().date_naive())
    }
}
