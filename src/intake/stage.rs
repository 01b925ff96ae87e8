//! Step registry — the intake stages and the edges between them.

use serde::{Deserialize, Serialize};

use super::answers::{IntakeAnswers, ReadingCategory};

/// One screen of the intake wizard.
///
/// Variants are declared in progress-bar order. Navigation is not linear:
/// see [`next_stage`] and [`previous_stage`] for the branch rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStage {
    Name,
    Birthdate,
    Category,
    SubPath,
    PartnerQuery,
    PartnerDetails,
    CardReveal,
    Situation,
    Email,
    DeliveryInfo,
}

impl IntakeStage {
    /// Every stage, in display order.
    pub const ALL: [IntakeStage; 10] = [
        Self::Name,
        Self::Birthdate,
        Self::Category,
        Self::SubPath,
        Self::PartnerQuery,
        Self::PartnerDetails,
        Self::CardReveal,
        Self::Situation,
        Self::Email,
        Self::DeliveryInfo,
    ];

    /// The stage a fresh session starts on.
    pub const FIRST: IntakeStage = Self::Name;

    /// The stage whose submission triggers completion.
    pub const TERMINAL: IntakeStage = Self::DeliveryInfo;

    /// Zero-based position in display order.
    pub fn ordinal(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or_default()
    }

    /// Progress through the wizard, 0–100, for the progress indicator.
    pub fn progress_percent(&self) -> u8 {
        let done = self.ordinal() + 1;
        ((done * 100) / Self::ALL.len()) as u8
    }

    pub fn is_terminal(&self) -> bool {
        *self == Self::TERMINAL
    }
}

impl std::fmt::Display for IntakeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::Birthdate => "birthdate",
            Self::Category => "category",
            Self::SubPath => "sub_path",
            Self::PartnerQuery => "partner_query",
            Self::PartnerDetails => "partner_details",
            Self::CardReveal => "card_reveal",
            Self::Situation => "situation",
            Self::Email => "email",
            Self::DeliveryInfo => "delivery_info",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for IntakeStage {
    type Err = String;

    /// Accepts the snake_case name as well as the upper-case form used in
    /// `?view=` links (e.g. `SUB_PATH`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.to_string() == wanted)
            .ok_or_else(|| format!("Unknown intake stage: {s}"))
    }
}

/// Forward edge out of `current`, or `None` when `current` is the terminal
/// stage and the next step is completion.
pub fn next_stage(current: IntakeStage, answers: &IntakeAnswers) -> Option<IntakeStage> {
    use IntakeStage::*;
    let next = match current {
        Name => Birthdate,
        Birthdate => Category,
        Category => SubPath,
        SubPath => match answers.category {
            Some(ReadingCategory::Love) => PartnerQuery,
            Some(ReadingCategory::CardPile) => CardReveal,
            Some(ReadingCategory::Career) | Some(ReadingCategory::General) | None => Situation,
        },
        PartnerQuery => match answers.has_partner {
            Some(false) => Situation,
            Some(true) | None => PartnerDetails,
        },
        PartnerDetails => Situation,
        CardReveal => Situation,
        Situation => Email,
        Email => DeliveryInfo,
        DeliveryInfo => return None,
    };
    Some(next)
}

/// Backward edge out of `current`, or `None` at the first stage (the caller
/// leaves the wizard for the landing page).
///
/// Mirrors [`next_stage`]: retreating right after advancing always lands on
/// the stage the user came from.
pub fn previous_stage(current: IntakeStage, answers: &IntakeAnswers) -> Option<IntakeStage> {
    use IntakeStage::*;
    let prev = match current {
        Name => return None,
        Birthdate => Name,
        Category => Birthdate,
        SubPath => Category,
        PartnerQuery => SubPath,
        PartnerDetails => PartnerQuery,
        CardReveal => SubPath,
        Situation => match answers.category {
            Some(ReadingCategory::CardPile) => CardReveal,
            Some(ReadingCategory::Love) => match answers.has_partner {
                Some(false) => PartnerQuery,
                Some(true) | None => PartnerDetails,
            },
            Some(ReadingCategory::Career) | Some(ReadingCategory::General) | None => SubPath,
        },
        Email => Situation,
        DeliveryInfo => Email,
    };
    Some(prev)
}
