use std::ops::RangeInclusive;

use thiserror::Error;

pub const TITLE_LENGTH: RangeInclusive<usize> = 3..=200;
pub const DESCRIPTION_LENGTH: RangeInclusive<usize> = 10..=2000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BacklogValidationError {
    #[error("title must be between {min} and {max} characters, got {actual}")]
    Title {
        min: usize,
        max: usize,
        actual: usize,
    },
    #[error("description must be between {min} and {max} characters, got {actual}")]
    Description {
        min: usize,
        max: usize,
        actual: usize,
    },
}

pub fn validate_card(title: &str, description: &str) -> Result<(), BacklogValidationError> {
    let actual = title.chars().count();
    if !TITLE_LENGTH.contains(&actual) {
        return Err(BacklogValidationError::Title {
            min: *TITLE_LENGTH.start(),
            max: *TITLE_LENGTH.end(),
            actual,
        });
    }

    let actual = description.chars().count();
    if !DESCRIPTION_LENGTH.contains(&actual) {
        return Err(BacklogValidationError::Description {
            min: *DESCRIPTION_LENGTH.start(),
            max: *DESCRIPTION_LENGTH.end(),
            actual,
        });
    }

    Ok(())
}
