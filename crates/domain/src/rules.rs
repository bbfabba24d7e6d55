use crate::BookingError;

/// Largest party a single reservation may carry unless configured otherwise.
pub const DEFAULT_MAX_PARTY_SIZE: u32 = 20;

/// Longest accepted reservation note, in characters.
pub const MAX_NOTES_LEN: usize = 1000;

/// Tunable booking limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingRules {
    pub max_party_size: u32,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            max_party_size: DEFAULT_MAX_PARTY_SIZE,
        }
    }
}

impl BookingRules {
    pub fn validate_party_size(&self, party_size: u32) -> Result<(), BookingError> {
        if party_size == 0 {
            return Err(BookingError::validation(
                "party_size",
                "must be at least 1",
            ));
        }
        if party_size > self.max_party_size {
            return Err(BookingError::validation(
                "party_size",
                format!("must be at most {}", self.max_party_size),
            ));
        }
        Ok(())
    }

    pub fn validate_notes(&self, notes: Option<&str>) -> Result<(), BookingError> {
        match notes {
            Some(notes) if notes.chars().count() > MAX_NOTES_LEN => Err(BookingError::validation(
                "notes",
                format!("must be at most {MAX_NOTES_LEN} characters"),
            )),
            _ => Ok(()),
        }
    }
}
