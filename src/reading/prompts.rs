//! Prompt builders for the teaser and full-reading requests.

use crate::intake::answers::ReadingCategory;

use super::SeekerProfile;

/// Persona the readings are written as.
pub const READER_PERSONA: &str = "Wanda";

/// One line of category-specific context for the teaser prompt.
fn teaser_focus(profile: &SeekerProfile) -> String {
    match profile.category {
        Some(ReadingCategory::Love) if !profile.partner_name.is_empty() => format!(
            "They are asking about their connection with {} (born {}). Situation: {}.",
            profile.partner_name, profile.partner_birth_date, profile.reading_type
        ),
        Some(ReadingCategory::Love) => {
            format!("They are asking about love: {}.", profile.reading_type)
        }
        Some(ReadingCategory::Career) => format!(
            "They are asking about career and wealth. Professional status: {}.",
            profile.career_status
        ),
        Some(ReadingCategory::CardPile) => format!(
            "They chose card pile {}. Interpret the energy of this pile for them.",
            profile.card_pile
        ),
        Some(ReadingCategory::General) | None => format!(
            "They are asking about life purpose and spirituality. Focus: {}.",
            profile.reading_type
        ),
    }
}

/// Category-specific context and first-paragraph instruction for the full
/// reading.
fn full_reading_focus(profile: &SeekerProfile) -> (String, String) {
    let name = &profile.name;
    match profile.category {
        Some(ReadingCategory::Love) => {
            let context = if profile.partner_name.is_empty() {
                "Focus: love in general or a future partner.".to_string()
            } else {
                format!(
                    "Partner: {} (born {}).",
                    profile.partner_name, profile.partner_birth_date
                )
            };
            let together = if profile.partner_name.is_empty() {
                String::new()
            } else {
                format!(" and {}", profile.partner_name)
            };
            let instruction = format!(
                "Paragraph 1 (the connection): tune into the energy of {name}{together} right now. \
                 Describe the vibration, the emotional landscape and what their aura shows about love."
            );
            (context, instruction)
        }
        Some(ReadingCategory::Career) => (
            format!("Career status: {}.", profile.career_status),
            format!(
                "Paragraph 1 (the professional aura): tune into {name}'s professional energy \
                 field. Describe the blocks or flows of abundance around them."
            ),
        ),
        Some(ReadingCategory::CardPile) => (
            format!(
                "Selected pile: {}. Focus area: {}.",
                profile.card_pile, profile.focus_area
            ),
            format!(
                "Paragraph 1 (the cards): tune into the energy of {} that called to {name} about \
                 {}. Describe the imagery and the immediate feeling of this pile.",
                profile.card_pile, profile.focus_area
            ),
        ),
        Some(ReadingCategory::General) | None => (
            "Focus: life purpose and spiritual path.".to_string(),
            format!(
                "Paragraph 1 (the soul path): tune into {name}'s higher self. Describe the \
                 current phase of their soul's journey and the vibration they give off."
            ),
        ),
    }
}

fn category_label(profile: &SeekerProfile) -> &'static str {
    profile
        .category
        .map(|c| c.label())
        .unwrap_or("General Guidance")
}

/// Prompt for the short teaser + energy signature.
pub fn teaser_prompt(profile: &SeekerProfile) -> String {
    format!(
        "You are {persona}, a spiritual intuitive and psychic.\n\
         The seeker wants a reading about: {category} - {reading_type}.\n\
         Seeker: {name}, born {birth_date}.\n\
         {focus}\n\
         Their question: \"{question}\"\n\n\
         Instructions:\n\
         1. Sense the spiritual vibration of the question and the situation.\n\
         2. Write a mysterious but comforting two-sentence initial vision (the teaser).\n\
         3. Write one sentence describing their energy signature.\n\
         4. Do not give the full answer. Stay slightly cryptic.\n\n\
         Respond with a JSON object: {{\"teaser\": string, \"energySignature\": string}}.",
        persona = READER_PERSONA,
        category = category_label(profile),
        reading_type = profile.reading_type,
        name = profile.name,
        birth_date = profile.birth_date,
        focus = teaser_focus(profile),
        question = profile.question,
    )
}

/// Prompt for the three-paragraph full reading.
pub fn full_reading_prompt(profile: &SeekerProfile) -> String {
    let (context, first_paragraph) = full_reading_focus(profile);
    format!(
        "You are {persona}, giving a deep, personal psychic reading for:\n\
         Seeker: {name} (born {birth_date})\n\
         Reading category: {category}\n\
         Specific focus: {reading_type}\n\
         {context}\n\
         Question: \"{question}\"\n\n\
         Write exactly three paragraphs, without titles:\n\n\
         {first_paragraph}\n\n\
         Paragraph 2 (the truth): answer the question \"{question}\" directly. Say what you \
         see about this specific situation. Use their name.\n\n\
         Paragraph 3 (the path): give clear, practical spiritual guidance for what comes next \
         and end with a blessing.\n\n\
         Respond with a JSON object: {{\"paragraph1\": string, \"paragraph2\": string, \
         \"paragraph3\": string}}.",
        persona = READER_PERSONA,
        name = profile.name,
        birth_date = profile.birth_date,
        category = category_label(profile),
        reading_type = profile.reading_type,
        question = profile.question,
    )
}

/// Extract a JSON object from model output that might contain markdown or
/// extra text.
pub fn extract_json_object(text: &str) -> &str {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed;
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner;
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            return &trimmed[start..=end];
        }
    }

    trimmed
}
