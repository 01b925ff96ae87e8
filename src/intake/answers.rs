//! Form field store — the answers a seeker accumulates across stages.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

use super::stage::IntakeStage;

/// Situation text must be longer than this many characters.
pub const MIN_SITUATION_CHARS: usize = 10;

/// Earliest accepted birth year is the one after this.
pub const MIN_BIRTH_YEAR_EXCLUSIVE: i32 = 1900;

/// The kind of reading a seeker asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingCategory {
    Love,
    Career,
    General,
    CardPile,
}

impl ReadingCategory {
    /// Human label used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Love => "Love & Relationships",
            Self::Career => "Career & Wealth",
            Self::General => "Life Purpose & Spirituality",
            Self::CardPile => "Card Pile",
        }
    }
}

impl std::fmt::Display for ReadingCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Love => "Love",
            Self::Career => "Career",
            Self::General => "General",
            Self::CardPile => "CardPile",
        };
        write!(f, "{s}")
    }
}

/// Choices the front end offers at the sub-path and card-reveal stages.
pub mod catalog {
    pub const LOVE_READING_TYPES: &[&str] = &[
        "Love & Relationships",
        "Twin Flame Bond",
        "Soulmate Discovery",
        "Breakup Recovery",
    ];
    pub const CAREER_STATUSES: &[&str] = &[
        "Employed",
        "Entrepreneur",
        "Between Jobs",
        "Student",
    ];
    pub const GENERAL_FOCUSES: &[&str] = &["Life Purpose", "Spiritual Growth", "Personal Crossroads"];
    pub const CARD_PILES: &[&str] = &["Pile 1", "Pile 2", "Pile 3"];
    pub const CARD_PILE_FOCUS_AREAS: &[&str] =
        &["Love & Relationships", "Career & Wealth", "General Life Path"];
}

/// What to do with branch-specific fields when the category changes.
///
/// `Retain` keeps every field once set, so switching Love → Career → Love
/// brings the partner details back. `ClearOnCategoryChange` drops the fields
/// that belong to the category being left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchFieldPolicy {
    #[default]
    Retain,
    ClearOnCategoryChange,
}

/// Everything the seeker has entered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeAnswers {
    pub name: String,
    /// `YYYY-MM-DD`, as entered.
    pub birth_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ReadingCategory>,
    /// Love or General sub-selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub career_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_pile: Option<String>,
    /// Answer to the partner question; `None` until asked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_partner: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_area: Option<String>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub email: String,
}

/// A partial update from the active stage's view. Absent fields are left
/// untouched; there is no way to remove a field through an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerUpdate {
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub category: Option<ReadingCategory>,
    pub reading_type: Option<String>,
    pub career_status: Option<String>,
    pub card_pile: Option<String>,
    pub partner_name: Option<String>,
    pub partner_birth_date: Option<String>,
    pub focus_area: Option<String>,
    pub question: Option<String>,
    pub email: Option<String>,
}

impl IntakeAnswers {
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_birth_date(&mut self, birth_date: impl Into<String>) {
        self.birth_date = birth_date.into();
    }

    /// Set the reading category, applying `policy` to the fields of the
    /// category being left.
    pub fn set_category(&mut self, category: ReadingCategory, policy: BranchFieldPolicy) {
        let previous = self.category.replace(category);
        if policy == BranchFieldPolicy::Retain || previous.is_none() || previous == Some(category) {
            return;
        }
        match previous {
            Some(ReadingCategory::Love) => {
                self.has_partner = None;
                self.partner_name = None;
                self.partner_birth_date = None;
                self.reading_type = None;
            }
            Some(ReadingCategory::General) => self.reading_type = None,
            Some(ReadingCategory::Career) => self.career_status = None,
            Some(ReadingCategory::CardPile) => {
                self.card_pile = None;
                self.focus_area = None;
            }
            None => {}
        }
    }

    pub fn set_reading_type(&mut self, reading_type: impl Into<String>) {
        self.reading_type = Some(reading_type.into());
    }

    pub fn set_career_status(&mut self, status: impl Into<String>) {
        self.career_status = Some(status.into());
    }

    pub fn set_card_pile(&mut self, pile: impl Into<String>) {
        self.card_pile = Some(pile.into());
    }

    pub fn set_has_partner(&mut self, has_partner: bool) {
        self.has_partner = Some(has_partner);
    }

    pub fn set_partner_name(&mut self, name: impl Into<String>) {
        self.partner_name = Some(name.into());
    }

    pub fn set_partner_birth_date(&mut self, birth_date: impl Into<String>) {
        self.partner_birth_date = Some(birth_date.into());
    }

    pub fn set_focus_area(&mut self, focus: impl Into<String>) {
        self.focus_area = Some(focus.into());
    }

    pub fn set_question(&mut self, question: impl Into<String>) {
        self.question = question.into();
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into();
    }

    /// Apply a partial update field by field.
    pub fn apply(&mut self, update: AnswerUpdate, policy: BranchFieldPolicy) {
        if let Some(v) = update.name {
            self.set_name(v);
        }
        if let Some(v) = update.birth_date {
            self.set_birth_date(v);
        }
        if let Some(v) = update.category {
            self.set_category(v, policy);
        }
        if let Some(v) = update.reading_type {
            self.set_reading_type(v);
        }
        if let Some(v) = update.career_status {
            self.set_career_status(v);
        }
        if let Some(v) = update.card_pile {
            self.set_card_pile(v);
        }
        if let Some(v) = update.partner_name {
            self.set_partner_name(v);
        }
        if let Some(v) = update.partner_birth_date {
            self.set_partner_birth_date(v);
        }
        if let Some(v) = update.focus_area {
            self.set_focus_area(v);
        }
        if let Some(v) = update.question {
            self.set_question(v);
        }
        if let Some(v) = update.email {
            self.set_email(v);
        }
    }

    /// The sub-selection that matters for the current category.
    pub fn sub_selection(&self) -> Option<&str> {
        let value = match self.category? {
            ReadingCategory::Love | ReadingCategory::General => self.reading_type.as_deref(),
            ReadingCategory::Career => self.career_status.as_deref(),
            ReadingCategory::CardPile => self.card_pile.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

/// Check a `YYYY-MM-DD` birth date: parseable, year after 1900 and not in
/// the future relative to `today`'s year.
pub fn validate_birth_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingBirthDate);
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ValidationError::MalformedBirthDate)?;
    let year = date.year();
    if year <= MIN_BIRTH_YEAR_EXCLUSIVE || year > today.year() {
        return Err(ValidationError::BirthYearOutOfRange { year });
    }
    Ok(date)
}

/// The precondition that must hold before `advance()` may leave `stage`.
pub fn validate_stage(
    stage: IntakeStage,
    answers: &IntakeAnswers,
    today: NaiveDate,
) -> Result<(), ValidationError> {
    match stage {
        IntakeStage::Name => {
            if !answers.has_name() {
                return Err(ValidationError::MissingName);
            }
        }
        IntakeStage::Birthdate => {
            validate_birth_date(&answers.birth_date, today)?;
        }
        IntakeStage::Category => {
            if answers.category.is_none() {
                return Err(ValidationError::MissingCategory);
            }
        }
        IntakeStage::SubPath => {
            // Without a category the sub-path screen has nothing to ask.
            if answers.category.is_some() && answers.sub_selection().is_none() {
                return Err(ValidationError::MissingSubSelection);
            }
        }
        IntakeStage::PartnerQuery => {
            if answers.has_partner.is_none() {
                return Err(ValidationError::MissingPartnerChoice);
            }
        }
        IntakeStage::PartnerDetails => {
            if is_blank(&answers.partner_name) || is_blank(&answers.partner_birth_date) {
                return Err(ValidationError::MissingPartnerDetails);
            }
        }
        IntakeStage::Situation => {
            if answers.question.trim().chars().count() <= MIN_SITUATION_CHARS {
                return Err(ValidationError::SituationTooShort);
            }
        }
        IntakeStage::Email => {
            if !answers.email.contains('@') {
                return Err(ValidationError::MalformedEmail);
            }
        }
        IntakeStage::CardReveal | IntakeStage::DeliveryInfo => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 12).unwrap()
    }

    #[test]
    fn setters_overwrite_and_never_clear_by_default() {
        let mut answers = IntakeAnswers::default();
        answers.set_category(ReadingCategory::Love, BranchFieldPolicy::Retain);
        answers.set_partner_name("Jordan");
        answers.set_partner_birth_date("1991-03-04");
        answers.set_category(ReadingCategory::Career, BranchFieldPolicy::Retain);
        answers.set_career_status("Entrepreneur");

        assert_eq!(answers.category, Some(ReadingCategory::Career));
        assert_eq!(answers.partner_name.as_deref(), Some("Jordan"));
        assert_eq!(answers.partner_birth_date.as_deref(), Some("1991-03-04"));

        answers.set_category(ReadingCategory::Love, BranchFieldPolicy::Retain);
        assert_eq!(answers.career_status.as_deref(), Some("Entrepreneur"));
        assert_eq!(answers.partner_name.as_deref(), Some("Jordan"));
    }

    #[test]
    fn clear_policy_drops_fields_of_abandoned_branch() {
        let mut answers = IntakeAnswers::default();
        answers.set_category(ReadingCategory::Love, BranchFieldPolicy::ClearOnCategoryChange);
        answers.set_has_partner(true);
        answers.set_partner_name("Jordan");
        answers.set_category(ReadingCategory::Career, BranchFieldPolicy::ClearOnCategoryChange);

        assert!(answers.partner_name.is_none());
        assert!(answers.has_partner.is_none());

        // Re-selecting the same category keeps its fields.
        answers.set_career_status("Student");
        answers.set_category(ReadingCategory::Career, BranchFieldPolicy::ClearOnCategoryChange);
        assert_eq!(answers.career_status.as_deref(), Some("Student"));
    }

    #[test]
    fn apply_only_touches_present_fields() {
        let mut answers = IntakeAnswers {
            name: "Alex".to_string(),
            email: "alex@test.com".to_string(),
            ..Default::default()
        };
        answers.apply(
            AnswerUpdate {
                question: Some("Will I succeed?".to_string()),
                ..Default::default()
            },
            BranchFieldPolicy::Retain,
        );
        assert_eq!(answers.name, "Alex");
        assert_eq!(answers.email, "alex@test.com");
        assert_eq!(answers.question, "Will I succeed?");
    }

    #[test]
    fn birth_date_rules() {
        assert_eq!(
            validate_birth_date("", today()),
            Err(ValidationError::MissingBirthDate)
        );
        assert_eq!(
            validate_birth_date("02/05/1990", today()),
            Err(ValidationError::MalformedBirthDate)
        );
        assert_eq!(
            validate_birth_date("1900-12-31", today()),
            Err(ValidationError::BirthYearOutOfRange { year: 1900 })
        );
        assert_eq!(
            validate_birth_date("2027-01-01", today()),
            Err(ValidationError::BirthYearOutOfRange { year: 2027 })
        );
        assert!(validate_birth_date("1990-05-02", today()).is_ok());
        assert!(validate_birth_date("1901-01-01", today()).is_ok());
    }

    #[test]
    fn stage_preconditions() {
        let mut answers = IntakeAnswers::default();
        assert_eq!(
            validate_stage(IntakeStage::Name, &answers, today()),
            Err(ValidationError::MissingName)
        );
        answers.set_name("   ");
        assert!(validate_stage(IntakeStage::Name, &answers, today()).is_err());
        answers.set_name("Alex");
        assert!(validate_stage(IntakeStage::Name, &answers, today()).is_ok());

        assert_eq!(
            validate_stage(IntakeStage::Category, &answers, today()),
            Err(ValidationError::MissingCategory)
        );
        answers.set_category(ReadingCategory::Career, BranchFieldPolicy::Retain);
        assert_eq!(
            validate_stage(IntakeStage::SubPath, &answers, today()),
            Err(ValidationError::MissingSubSelection)
        );
        answers.set_career_status("Entrepreneur");
        assert!(validate_stage(IntakeStage::SubPath, &answers, today()).is_ok());

        answers.set_question("Will I?");
        assert_eq!(
            validate_stage(IntakeStage::Situation, &answers, today()),
            Err(ValidationError::SituationTooShort)
        );
        answers.set_question("Will I succeed?");
        assert!(validate_stage(IntakeStage::Situation, &answers, today()).is_ok());

        answers.set_email("alex.test.com");
        assert_eq!(
            validate_stage(IntakeStage::Email, &answers, today()),
            Err(ValidationError::MalformedEmail)
        );
        answers.set_email("alex@test.com");
        assert!(validate_stage(IntakeStage::Email, &answers, today()).is_ok());

        assert!(validate_stage(IntakeStage::CardReveal, &answers, today()).is_ok());
        assert!(validate_stage(IntakeStage::DeliveryInfo, &answers, today()).is_ok());
    }

    #[test]
    fn partner_stage_preconditions() {
        let mut answers = IntakeAnswers::default();
        assert_eq!(
            validate_stage(IntakeStage::PartnerQuery, &answers, today()),
            Err(ValidationError::MissingPartnerChoice)
        );
        answers.set_has_partner(true);
        assert!(validate_stage(IntakeStage::PartnerQuery, &answers, today()).is_ok());

        answers.set_partner_name("Jordan");
        assert_eq!(
            validate_stage(IntakeStage::PartnerDetails, &answers, today()),
            Err(ValidationError::MissingPartnerDetails)
        );
        answers.set_partner_birth_date("1991-03-04");
        assert!(validate_stage(IntakeStage::PartnerDetails, &answers, today()).is_ok());
    }

    #[test]
    fn sub_selection_follows_category() {
        let mut answers = IntakeAnswers::default();
        answers.set_card_pile("Pile 2");
        answers.set_reading_type("Twin Flame Bond");
        assert_eq!(answers.sub_selection(), None);

        answers.set_category(ReadingCategory::CardPile, BranchFieldPolicy::Retain);
        assert_eq!(answers.sub_selection(), Some("Pile 2"));
        answers.set_category(ReadingCategory::Love, BranchFieldPolicy::Retain);
        assert_eq!(answers.sub_selection(), Some("Twin Flame Bond"));
    }

    #[test]
    fn answers_serde_skips_unset_options() {
        let answers = IntakeAnswers {
            name: "Sam".to_string(),
            birth_date: "1985-01-01".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&answers).unwrap();
        assert_eq!(json["name"], "Sam");
        assert!(json.get("partner_name").is_none());
        assert!(json.get("category").is_none());

        let parsed: IntakeAnswers = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, answers);
    }
}
