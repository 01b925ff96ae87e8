//! Content generation — the teaser and full reading shown on the reveal page.
//!
//! The generator itself is a black box behind [`ReadingGenerator`]. Every
//! failure (error or timeout) is replaced with fixed fallback copy so the
//! reveal page is never blank.

pub mod gemini;
pub mod prompts;

pub use gemini::{GeminiConfig, GeminiGenerator};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::GenerationError;
use crate::intake::answers::{IntakeAnswers, ReadingCategory};

/// Generic message shown next to fallback content.
pub const RETRY_NOTICE: &str =
    "The connection to the spirit realm was unsteady. Please try again in a moment for your fully personal reading.";

/// What the generator is told about the seeker. Missing optional answers are
/// empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekerProfile {
    pub name: String,
    pub birth_date: String,
    pub category: Option<ReadingCategory>,
    pub reading_type: String,
    pub career_status: String,
    pub card_pile: String,
    pub focus_area: String,
    pub partner_name: String,
    pub partner_birth_date: String,
    pub question: String,
}

impl From<&IntakeAnswers> for SeekerProfile {
    fn from(answers: &IntakeAnswers) -> Self {
        let owned = |v: &Option<String>| v.clone().unwrap_or_default();
        // Partner details only belong in a love reading with a partner.
        let with_partner = answers.has_partner != Some(false);
        Self {
            name: answers.name.clone(),
            birth_date: answers.birth_date.clone(),
            category: answers.category,
            reading_type: owned(&answers.reading_type),
            career_status: owned(&answers.career_status),
            card_pile: owned(&answers.card_pile),
            focus_area: owned(&answers.focus_area),
            partner_name: if with_partner { owned(&answers.partner_name) } else { String::new() },
            partner_birth_date: if with_partner {
                owned(&answers.partner_birth_date)
            } else {
                String::new()
            },
            question: answers.question.clone(),
        }
    }
}

/// The short hook shown first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teaser {
    pub teaser: String,
    pub energy_signature: String,
}

impl Teaser {
    pub fn fallback() -> Self {
        Self {
            teaser: "The cards are swirling with a deep indigo light, suggesting a secret soon to be revealed in your heart.".to_string(),
            energy_signature: "A radiant, shimmering aura of anticipation and growth.".to_string(),
        }
    }
}

/// The full reading: exactly three paragraphs (energy, answer, path).
///
/// This is the only accepted shape; the five-section variant
/// (intro/auraAnalysis/vision/guidance/closing) is not supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FullReading {
    pub paragraph1: String,
    pub paragraph2: String,
    pub paragraph3: String,
}

impl FullReading {
    pub fn fallback(name: &str) -> Self {
        Self {
            paragraph1: format!(
                "I am sensing a powerful shift in your energy field, {name}. The cards show a period of transformation where old patterns fall away to make room for something new."
            ),
            paragraph2: "Regarding your question, patience is your greatest ally right now. The universe is rearranging circumstances behind the scenes to align with your true desires.".to_string(),
            paragraph3: "Moving forward, focus on self-love and clear boundaries. A sign will appear within the next lunar cycle confirming you are on the right path. Blessings to you.".to_string(),
        }
    }

    pub fn is_blank(&self) -> bool {
        [&self.paragraph1, &self.paragraph2, &self.paragraph3]
            .iter()
            .all(|p| p.trim().is_empty())
    }
}

/// The content-generation collaborator.
#[async_trait]
pub trait ReadingGenerator: Send + Sync {
    /// Short teaser + energy signature.
    async fn teaser(&self, profile: &SeekerProfile) -> Result<Teaser, GenerationError>;

    /// Three-paragraph full reading.
    async fn full_reading(&self, profile: &SeekerProfile) -> Result<FullReading, GenerationError>;
}

/// Both pieces of generated content, ready for the reveal page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedReading {
    pub teaser: Teaser,
    pub full_reading: FullReading,
    /// True when the teaser is fallback copy.
    pub teaser_fallback: bool,
    /// True when the full reading is fallback copy.
    pub full_reading_fallback: bool,
    /// Set when any piece fell back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl GeneratedReading {
    /// Static placeholder reading, used when there is not enough data to ask
    /// the generator at all.
    pub fn placeholder(name: &str) -> Self {
        Self::assemble(None, None, name)
    }

    fn assemble(teaser: Option<Teaser>, full_reading: Option<FullReading>, name: &str) -> Self {
        let teaser_fallback = teaser.is_none();
        let full_reading_fallback = full_reading.is_none();
        Self {
            teaser: teaser.unwrap_or_else(Teaser::fallback),
            full_reading: full_reading.unwrap_or_else(|| FullReading::fallback(name)),
            teaser_fallback,
            full_reading_fallback,
            notice: (teaser_fallback || full_reading_fallback).then(|| RETRY_NOTICE.to_string()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.teaser_fallback || self.full_reading_fallback
    }
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T, GenerationError>>,
) -> Result<T, GenerationError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout { timeout: limit }),
    }
}

/// Request both pieces concurrently and await them jointly.
///
/// Each call is bounded by `limit`; an error, a timeout or a blank full
/// reading is replaced with that piece's fallback copy.
pub async fn generate_reading(
    generator: &dyn ReadingGenerator,
    profile: &SeekerProfile,
    limit: Duration,
) -> GeneratedReading {
    let (teaser, full_reading) = tokio::join!(
        with_timeout(limit, generator.teaser(profile)),
        with_timeout(limit, generator.full_reading(profile)),
    );

    let teaser = teaser
        .inspect_err(|e| warn!(seeker = %profile.name, error = %e, "Teaser generation failed"))
        .ok()
        .filter(|t| !t.teaser.trim().is_empty());
    let full_reading = full_reading
        .inspect_err(|e| warn!(seeker = %profile.name, error = %e, "Full reading generation failed"))
        .ok()
        .filter(|r| !r.is_blank());

    let reading = GeneratedReading::assemble(teaser, full_reading, &profile.name);
    info!(
        seeker = %profile.name,
        teaser_fallback = reading.teaser_fallback,
        full_reading_fallback = reading.full_reading_fallback,
        "Reading generated"
    );
    reading
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted generators shared by the intake tests.

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Generator whose two calls succeed or fail independently.
    pub struct ScriptedGenerator {
        pub teaser_ok: bool,
        pub full_ok: bool,
        pub delay: Duration,
        pub calls: AtomicUsize,
        pub last_question: std::sync::Mutex<Option<String>>,
    }

    impl ScriptedGenerator {
        pub fn new(teaser_ok: bool, full_ok: bool) -> Self {
            Self {
                teaser_ok,
                full_ok,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                last_question: std::sync::Mutex::new(None),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn record(&self, profile: &SeekerProfile) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_question.lock().unwrap() = Some(profile.question.clone());
        }
    }

    #[async_trait]
    impl ReadingGenerator for ScriptedGenerator {
        async fn teaser(&self, profile: &SeekerProfile) -> Result<Teaser, GenerationError> {
            self.record(profile);
            tokio::time::sleep(self.delay).await;
            if self.teaser_ok {
                Ok(Teaser {
                    teaser: format!("A vision for {}", profile.name),
                    energy_signature: "Steady gold".to_string(),
                })
            } else {
                Err(GenerationError::RequestFailed {
                    provider: "scripted".to_string(),
                    reason: "teaser down".to_string(),
                })
            }
        }

        async fn full_reading(
            &self,
            profile: &SeekerProfile,
        ) -> Result<FullReading, GenerationError> {
            self.record(profile);
            tokio::time::sleep(self.delay).await;
            if self.full_ok {
                Ok(FullReading {
                    paragraph1: format!("{} glows.", profile.name),
                    paragraph2: "Yes.".to_string(),
                    paragraph3: "Go.".to_string(),
                })
            } else {
                Err(GenerationError::RequestFailed {
                    provider: "scripted".to_string(),
                    reason: "full reading down".to_string(),
                })
            }
        }
    }
}
