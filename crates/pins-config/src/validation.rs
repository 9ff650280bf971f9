use std::sync::LazyLock;

use pins_common::{Error, Result};
use regex::Regex;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

const MAX_IDENTIFIER_LEN: usize = 128;

/// Validation for names that are spliced into SQL statements.
pub struct IdentifierValidator;

impl IdentifierValidator {
    pub fn is_identifier(value: &str) -> bool {
        value.len() <= MAX_IDENTIFIER_LEN && IDENTIFIER.is_match(value)
    }

    /// `kind` names the setting in the error message.
    pub fn validate(kind: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(Error::Config(format!("{kind} name cannot be empty")));
        }
        if value.len() > MAX_IDENTIFIER_LEN {
            return Err(Error::Config(format!("{kind} name too long")));
        }
        if !IDENTIFIER.is_match(value) {
            return Err(Error::Config(format!(
                "{kind} name '{value}' must contain only letters, digits and underscores \
                 and must not start with a digit"
            )));
        }
        Ok(())
    }
}
