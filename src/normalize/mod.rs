//! Country identifier normalization.
//!
//! Both extracts are keyed on a country, but the indicator extract uses alpha-3
//! codes (often quoted or padded) while the event extract already carries ISO
//! numeric codes. Everything is reduced to the three-digit numeric form here.
//! A `None` result means the row is dropped by the caller; it is never an error.

pub mod registry;

const NOISE: &[char] = &['"', '\''];

fn strip_noise(token: &str) -> &str {
    token.trim_matches(|c: char| c.is_whitespace() || NOISE.contains(&c))
}

/// Map a raw alpha-3 token to its numeric country code.
pub fn numeric_iso(token: &str) -> Option<String> {
    let cleaned = strip_noise(token).to_ascii_uppercase();
    registry::lookup_alpha3(&cleaned).map(str::to_string)
}

/// Canonicalize an already-numeric event identifier (e.g. `4` or `"840"`).
pub fn normalize_event_iso(token: &str) -> Option<String> {
    let cleaned = strip_noise(token);
    if cleaned.is_empty() || cleaned.len() > 3 || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{:0>3}", cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_and_case_are_ignored() {
        let expected = Some("840".to_string());
        assert_eq!(numeric_iso(" 'usa' "), expected);
        assert_eq!(numeric_iso("USA"), expected);
        assert_eq!(numeric_iso("usa"), expected);
        assert_eq!(numeric_iso("\"USA\""), expected);
        assert_eq!(numeric_iso(" \"'Usa'\"\t"), expected);
    }

    #[test]
    fn test_unknown_codes_are_absent() {
        assert_eq!(numeric_iso("ZZZ"), None);
        assert_eq!(numeric_iso(""), None);
        assert_eq!(numeric_iso("US"), None);
        // OECD aggregates are not countries
        assert_eq!(numeric_iso("OECD"), None);
        assert_eq!(numeric_iso("EA20"), None);
    }

    #[test]
    fn test_leading_zero_codes_keep_padding() {
        assert_eq!(numeric_iso("AUS"), Some("036".to_string()));
    }

    #[test]
    fn test_event_iso_is_zero_padded() {
        assert_eq!(normalize_event_iso("840"), Some("840".to_string()));
        assert_eq!(normalize_event_iso("36"), Some("036".to_string()));
        assert_eq!(normalize_event_iso(" '4' "), Some("004".to_string()));
        assert_eq!(normalize_event_iso("USA"), None);
        assert_eq!(normalize_event_iso(""), None);
        assert_eq!(normalize_event_iso("8400"), None);
    }
}
