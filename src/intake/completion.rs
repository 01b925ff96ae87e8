//! Completion — what happens when the seeker submits the final stage.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::intake::answers::IntakeAnswers;
use crate::intake::persistence::ProgressSaver;
use crate::reading::{GeneratedReading, ReadingGenerator, SeekerProfile, generate_reading};
use crate::store::RecordStatus;

/// Settings for the completion step.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Hosted payment page the seeker is sent to.
    pub payment_url: String,
    /// Email substring that skips payment and reveals the reading directly.
    /// Matched case-insensitively; an empty marker disables the bypass.
    pub bypass_marker: String,
    /// Pause the front end holds before following the redirect. Only an
    /// animation hint; nothing waits on it here.
    pub redirect_delay: Duration,
    /// Bound on each generation call.
    pub generation_timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            payment_url: "https://buy.stripe.com/test_checkout".to_string(),
            bypass_marker: "test".to_string(),
            redirect_delay: Duration::from_millis(1200),
            generation_timeout: Duration::from_secs(30),
        }
    }
}

impl CompletionConfig {
    pub fn is_bypass(&self, email: &str) -> bool {
        !self.bypass_marker.is_empty()
            && email
                .to_lowercase()
                .contains(&self.bypass_marker.to_lowercase())
    }
}

/// Result of completing the intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Show the generated reading in-app.
    Reveal {
        record_id: Option<Uuid>,
        reading: GeneratedReading,
    },
    /// Send the browser to the payment page after `delay`.
    Redirect {
        record_id: Option<Uuid>,
        url: String,
        #[serde(with = "millis")]
        delay: Duration,
    },
}

impl CompletionOutcome {
    pub fn record_id(&self) -> Option<Uuid> {
        match self {
            Self::Reveal { record_id, .. } | Self::Redirect { record_id, .. } => *record_id,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Runs the final save and then either reveals or redirects.
pub struct CompletionOrchestrator {
    saver: ProgressSaver,
    generator: Arc<dyn ReadingGenerator>,
    config: CompletionConfig,
}

impl CompletionOrchestrator {
    pub fn new(
        saver: ProgressSaver,
        generator: Arc<dyn ReadingGenerator>,
        config: CompletionConfig,
    ) -> Self {
        Self {
            saver,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    /// Complete the intake.
    ///
    /// Safe to call more than once: the saver reuses the stored record id, so
    /// a repeat completion updates the same record.
    pub async fn complete(&self, answers: &IntakeAnswers) -> CompletionOutcome {
        let record_id = self.saver.save_now(answers, RecordStatus::Pending).await;

        if !self.config.is_bypass(&answers.email) {
            info!(record_id = ?record_id, url = %self.config.payment_url, "Redirecting to payment");
            return CompletionOutcome::Redirect {
                record_id,
                url: self.config.payment_url.clone(),
                delay: self.config.redirect_delay,
            };
        }

        info!(record_id = ?record_id, "Bypass marker present, generating reading in-app");
        let profile = SeekerProfile::from(answers);
        let reading =
            generate_reading(self.generator.as_ref(), &profile, self.config.generation_timeout)
                .await;
        let record_id = self
            .saver
            .save_now(answers, RecordStatus::Complete)
            .await
            .or(record_id);

        CompletionOutcome::Reveal { record_id, reading }
    }
}
