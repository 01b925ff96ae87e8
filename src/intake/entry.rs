//! Query-string entry points: payment return, magic link, direct stage view.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::intake::answers::{BranchFieldPolicy, IntakeAnswers, ReadingCategory};
use crate::intake::persistence::{fallback_snapshot, stored_record_id};
use crate::intake::stage::IntakeStage;
use crate::reading::{GeneratedReading, ReadingGenerator, SeekerProfile, generate_reading};
use crate::store::{LocalStorage, RecordStatus, RecordStore};

/// Parameters the app can be loaded with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntryQuery {
    pub payment_success: Option<String>,
    /// Stage name for direct navigation.
    pub view: Option<String>,
    /// Local storage namespace of the returning session.
    pub session: Option<String>,
    pub name: Option<String>,
    pub dob: Option<String>,
    pub partner: Option<String>,
    #[serde(rename = "partnerDob")]
    pub partner_dob: Option<String>,
    #[serde(rename = "type")]
    pub reading_type: Option<String>,
    pub q: Option<String>,
    pub email: Option<String>,
}

impl EntryQuery {
    fn has_magic_link_fields(&self) -> bool {
        [
            &self.name,
            &self.dob,
            &self.partner,
            &self.partner_dob,
            &self.reading_type,
            &self.q,
            &self.email,
        ]
        .iter()
        .any(|v| v.is_some())
    }

    /// Answers rebuilt from the magic-link fields; absent fields are empty.
    pub fn magic_link_answers(&self) -> IntakeAnswers {
        let text = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or_default().to_string();
        let mut answers = IntakeAnswers::default();
        answers.set_name(text(&self.name));
        answers.set_birth_date(text(&self.dob));
        answers.set_reading_type(text(&self.reading_type));
        answers.set_question(text(&self.q));
        answers.set_email(text(&self.email));

        let partner = text(&self.partner);
        answers.set_partner_name(partner.clone());
        answers.set_partner_birth_date(text(&self.partner_dob));
        if !partner.is_empty() {
            answers.set_category(ReadingCategory::Love, BranchFieldPolicy::Retain);
            answers.set_has_partner(true);
        }
        answers
    }
}

/// How the app was entered, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// Back from the hosted payment page.
    PaymentReturn { session: Option<String> },
    /// Answers supplied in the URL; skip the wizard.
    MagicLink(IntakeAnswers),
    /// Open the wizard at a given stage.
    DirectView(IntakeStage),
    Landing,
}

impl EntryPoint {
    pub fn resolve(query: &EntryQuery) -> Self {
        if query.payment_success.as_deref() == Some("true") {
            return Self::PaymentReturn {
                session: query.session.clone(),
            };
        }
        if query.has_magic_link_fields() {
            return Self::MagicLink(query.magic_link_answers());
        }
        if let Some(view) = query.view.as_deref() {
            match view.parse() {
                Ok(stage) => return Self::DirectView(stage),
                Err(e) => warn!(view, error = %e, "Ignoring unknown view"),
            }
        }
        Self::Landing
    }
}

/// What the front end should show after resolving an entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum EntryOutcome {
    PaymentConfirmed {
        record_id: Option<Uuid>,
        answers: Option<IntakeAnswers>,
    },
    Reading {
        answers: IntakeAnswers,
        reading: GeneratedReading,
        /// False when name or birth date was missing and the placeholder
        /// reading is shown instead.
        generated: bool,
    },
    DirectView {
        stage: IntakeStage,
    },
    Landing,
}

/// Carries out the entry points that need collaborators.
pub struct EntryHandler {
    store: Arc<dyn RecordStore>,
    generator: Arc<dyn ReadingGenerator>,
    generation_timeout: Duration,
}

impl EntryHandler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        generator: Arc<dyn ReadingGenerator>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            generator,
            generation_timeout,
        }
    }

    /// Resolve `entry`. `local` is the returning session's storage and is
    /// only consulted for a payment return.
    pub async fn open(&self, entry: EntryPoint, local: Option<&dyn LocalStorage>) -> EntryOutcome {
        match entry {
            EntryPoint::PaymentReturn { .. } => match local {
                Some(local) => self.confirm_payment(local).await,
                None => {
                    warn!("Payment return without a session");
                    EntryOutcome::PaymentConfirmed {
                        record_id: None,
                        answers: None,
                    }
                }
            },
            EntryPoint::MagicLink(answers) => self.magic_link(answers).await,
            EntryPoint::DirectView(stage) => EntryOutcome::DirectView { stage },
            EntryPoint::Landing => EntryOutcome::Landing,
        }
    }

    async fn magic_link(&self, answers: IntakeAnswers) -> EntryOutcome {
        if !answers.has_name() || answers.birth_date.trim().is_empty() {
            info!("Magic link is missing name or birth date, showing placeholder reading");
            return EntryOutcome::Reading {
                reading: GeneratedReading::placeholder(&answers.name),
                answers,
                generated: false,
            };
        }

        info!(seeker = %answers.name, "Generating reading from magic link");
        let profile = SeekerProfile::from(&answers);
        let reading =
            generate_reading(self.generator.as_ref(), &profile, self.generation_timeout).await;
        EntryOutcome::Reading {
            answers,
            reading,
            generated: true,
        }
    }

    /// Mark the stored record complete and return its answers, falling back
    /// to the local snapshot when the record cannot be read.
    async fn confirm_payment(&self, local: &dyn LocalStorage) -> EntryOutcome {
        let record_id = stored_record_id(local).await;

        let record = match record_id {
            Some(id) => self
                .store
                .get(id)
                .await
                .inspect_err(|e| warn!(record_id = %id, error = %e, "Failed to load intake record"))
                .ok()
                .flatten(),
            None => None,
        };

        let Some(record) = record else {
            let answers = fallback_snapshot(local).await;
            warn!(
                record_id = ?record_id,
                from_snapshot = answers.is_some(),
                "Payment confirmed without a stored record"
            );
            return EntryOutcome::PaymentConfirmed { record_id, answers };
        };

        if let Err(e) = self
            .store
            .update(record.id, &record.answers, RecordStatus::Complete)
            .await
        {
            warn!(record_id = %record.id, error = %e, "Failed to mark intake record complete");
        } else {
            info!(record_id = %record.id, "Payment confirmed, intake record complete");
        }

        EntryOutcome::PaymentConfirmed {
            record_id: Some(record.id),
            answers: Some(record.answers),
        }
    }
}
