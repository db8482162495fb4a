//! Input gate for the name field. Pure; never touches fetch state.

use unicode_general_category::{get_general_category, GeneralCategory};
use unicode_segmentation::UnicodeSegmentation;

use crate::{domain::IdentityToken, error::ValidationError};

pub const MAX_NAME_LEN: usize = 20;

const NAME_SEPARATORS: [char; 4] = ['·', '•', '・', '.'];
const ZERO_WIDTH_JOINER: char = '\u{200D}';

pub fn validate(raw: &str) -> Result<IdentityToken, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    if perceived_len(trimmed) > MAX_NAME_LEN {
        return Err(ValidationError::TooLong);
    }

    if !trimmed.graphemes(true).all(is_name_grapheme) {
        return Err(ValidationError::InvalidFormat);
    }

    Ok(IdentityToken::new_unchecked(trimmed.to_string()))
}

/// Length as a reader counts it: one grapheme cluster per character.
pub fn perceived_len(value: &str) -> usize {
    value.graphemes(true).count()
}

/// A cluster is judged by its base char; anything attached to the base must be
/// a combining mark, a joiner, or a variation selector.
fn is_name_grapheme(cluster: &str) -> bool {
    let mut chars = cluster.chars();
    let Some(base) = chars.next() else {
        return false;
    };
    is_name_char(base) && chars.all(|c| is_name_char(c) || is_attachment(c))
}

fn is_attachment(c: char) -> bool {
    matches!(
        get_general_category(c),
        GeneralCategory::NonspacingMark
            | GeneralCategory::SpacingMark
            | GeneralCategory::EnclosingMark
    ) || c == ZERO_WIDTH_JOINER
        || matches!(c, '\u{FE00}'..='\u{FE0F}')
}

fn is_name_char(c: char) -> bool {
    c.is_alphabetic() || c.is_ascii_digit() || c.is_whitespace() || NAME_SEPARATORS.contains(&c)
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
