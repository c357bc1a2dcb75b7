//! Caller identity normalization (spec §3: "a normalized phone-number
//! string (E.164)").

/// Normalize a raw caller id to E.164 form: a leading `+` followed by
/// digits only. Returns `None` if the input has no digits to normalize.
///
/// This does not validate country-code plausibility — it only strips
/// formatting noise (spaces, dashes, parens) so that `"+1 (555) 555-0100"`
/// and `"+15555550100"` key the same Conversation Record.
pub fn normalize_e164(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if !raw.trim_start().starts_with('+') {
        // Assume a US/Canada number missing the country code if it's
        // exactly 10 digits; otherwise leave as-is and let the `+` prefix
        // be added without assuming a country code.
        if digits.len() == 10 {
            digits = format!("1{digits}");
        }
    }
    Some(format!("+{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_e164_is_unchanged() {
        assert_eq!(normalize_e164("+15555550100").as_deref(), Some("+15555550100"));
    }

    #[test]
    fn strips_formatting_punctuation() {
        assert_eq!(
            normalize_e164("+1 (555) 555-0100").as_deref(),
            Some("+15555550100")
        );
    }

    #[test]
    fn bare_ten_digit_number_gets_us_country_code() {
        assert_eq!(normalize_e164("5555550100").as_deref(), Some("+15555550100"));
    }

    #[test]
    fn empty_input_is_none() {
        assert_eq!(normalize_e164(""), None);
        assert_eq!(normalize_e164("abc"), None);
    }
}
