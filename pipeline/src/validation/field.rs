//! Memo and destination tag parsing.

use super::ValidationError;
use crate::config::MAX_MEMO_LENGTH;
use crate::transaction::{AdditionalFieldState, AdditionalFieldType, AdditionalParams};

/// Parses user input for an additional field.
///
/// Empty input yields [`AdditionalFieldState::Empty`]; whether an empty
/// field is acceptable is decided when a draft is requested.
pub fn parse_additional_field(
    field_type: AdditionalFieldType,
    raw: &str,
) -> Result<AdditionalFieldState, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(AdditionalFieldState::Empty(field_type));
    }

    let params = match field_type {
        AdditionalFieldType::Memo => {
            if value.len() > MAX_MEMO_LENGTH {
                return Err(ValidationError::InvalidMemo {
                    reason: format!("longer than {MAX_MEMO_LENGTH} bytes"),
                });
            }
            if value.chars().any(char::is_control) {
                return Err(ValidationError::InvalidMemo {
                    reason: "contains control characters".to_string(),
                });
            }
            AdditionalParams::Memo(value.to_string())
        }
        AdditionalFieldType::DestinationTag => {
            let tag = value
                .parse::<u32>()
                .map_err(|_| ValidationError::InvalidDestinationTag {
                    value: value.to_string(),
                })?;
            AdditionalParams::DestinationTag(tag)
        }
    };

    Ok(AdditionalFieldState::Filled {
        field_type,
        value: value.to_string(),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_empty_state() {
        assert_eq!(
            parse_additional_field(AdditionalFieldType::Memo, "  "),
            Ok(AdditionalFieldState::Empty(AdditionalFieldType::Memo))
        );
    }

    #[test]
    fn destination_tag_parses_u32() {
        let state = parse_additional_field(AdditionalFieldType::DestinationTag, "123456").unwrap();
        assert_eq!(
            state.params(),
            Some(&AdditionalParams::DestinationTag(123_456))
        );
    }

    #[test]
    fn destination_tag_rejects_overflow_and_text() {
        for raw in ["4294967296", "-1", "abc"] {
            assert!(matches!(
                parse_additional_field(AdditionalFieldType::DestinationTag, raw),
                Err(ValidationError::InvalidDestinationTag { .. })
            ));
        }
    }

    #[test]
    fn memo_length_is_bounded() {
        let long = "m".repeat(MAX_MEMO_LENGTH + 1);
        assert!(matches!(
            parse_additional_field(AdditionalFieldType::Memo, &long),
            Err(ValidationError::InvalidMemo { .. })
        ));

        let exact = "m".repeat(MAX_MEMO_LENGTH);
        assert!(parse_additional_field(AdditionalFieldType::Memo, &exact).is_ok());
    }
}
