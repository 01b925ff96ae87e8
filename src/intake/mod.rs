//! The branching intake wizard.
//!
//! [`stage`] defines the stages and the edges between them, [`answers`] the
//! form data and per-stage checks. [`controller::IntakeController`] drives a
//! session, saving through [`persistence::ProgressSaver`] and finishing in
//! [`completion::CompletionOrchestrator`]. [`entry`] handles the ways into
//! the app that bypass the wizard.

pub mod answers;
pub mod completion;
pub mod controller;
pub mod entry;
pub mod persistence;
pub mod stage;

pub use answers::{AnswerUpdate, BranchFieldPolicy, IntakeAnswers, ReadingCategory};
pub use completion::{CompletionConfig, CompletionOrchestrator, CompletionOutcome};
pub use controller::{ControllerConfig, IntakeController, IntakeEvent, IntakeSnapshot, Transition};
pub use entry::{EntryHandler, EntryOutcome, EntryPoint, EntryQuery};
pub use persistence::ProgressSaver;
pub use stage::{IntakeStage, next_stage, previous_stage};
