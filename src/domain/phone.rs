//! Phone input parsing and normalization.
//!
//! Splits free-form lines ("Budi 08123456789" or bare numbers) into
//! identifier + phone, normalizes to E.164-style Indonesian format, and
//! deduplicates by normalized number. Pure functions, no I/O.
//!
//! The normalization is a lossy Indonesia-specific heuristic (leading `0`
//! becomes `+62`, bare digit runs are assumed local) and is not guaranteed
//! correct for arbitrary international input.

use crate::domain::PhoneRecord;

/// Identifiers longer than this are truncated (character-wise).
const MAX_IDENTIFIER_CHARS: usize = 12;

/// Split one input line into identifier and phone number.
///
/// One token: the phone number, no identifier. Multiple tokens: the last is
/// the phone number, the rest joined by spaces form the identifier. Empty or
/// whitespace-only input yields an empty phone number for the caller to
/// filter out; this never fails.
pub fn parse_phone_input(raw: &str) -> (Option<String>, String) {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    match tokens.as_slice() {
        [] => (None, String::new()),
        [phone] => (None, (*phone).to_string()),
        [name @ .., phone] => {
            let identifier: String = name.join(" ").chars().take(MAX_IDENTIFIER_CHARS).collect();
            (Some(identifier), (*phone).to_string())
        }
    }
}

/// Normalize a phone number to `+62`-prefixed form.
///
/// All non-digits are stripped first, then: a `62` prefix gains `+`, a
/// leading `0` becomes `+62`, a bare run of ≥9 digits is assumed local and
/// gains `+62`, anything else just gains `+`. Idempotent: normalizing an
/// already-normalized number is a no-op.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return String::new();
    }
    if digits.starts_with("62") {
        format!("+{digits}")
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("+62{rest}")
    } else if digits.len() >= 9 {
        format!("+62{digits}")
    } else {
        format!("+{digits}")
    }
}

/// Parse a batch of input lines into deduplicated phone records.
///
/// Blank lines and lines without digits are dropped. Duplicates (by
/// normalized number) keep the first occurrence, identifier included; the
/// count of removed duplicates is returned alongside.
pub fn parse_phone_batch(inputs: &[String]) -> (Vec<PhoneRecord>, usize) {
    let mut seen = std::collections::HashSet::new();
    let mut records: Vec<PhoneRecord> = Vec::new();
    let mut duplicates_removed = 0usize;

    for raw in inputs {
        let (identifier, phone) = parse_phone_input(raw);
        let normalized = normalize_phone(&phone);
        if normalized.is_empty() {
            continue;
        }
        if !seen.insert(normalized.clone()) {
            duplicates_removed += 1;
            continue;
        }
        records.push(PhoneRecord {
            identifier,
            phone_number: normalized,
            original_input: raw.trim().to_string(),
        });
    }

    (records, duplicates_removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_token_is_phone_only() {
        let (identifier, phone) = parse_phone_input("08123456789");
        assert_eq!(identifier, None);
        assert_eq!(phone, "08123456789");
    }

    #[test]
    fn parse_last_token_is_phone() {
        let (identifier, phone) = parse_phone_input("Budi Santoso 08123456789");
        assert_eq!(identifier.as_deref(), Some("Budi Santoso"));
        assert_eq!(phone, "08123456789");
    }

    #[test]
    fn parse_identifier_truncated_to_twelve_chars() {
        let (identifier, _) = parse_phone_input("Bambang Pamungkas Utomo 08123456789");
        assert_eq!(identifier.as_deref(), Some("Bambang Pamu"));
    }

    #[test]
    fn parse_empty_input_never_fails() {
        assert_eq!(parse_phone_input(""), (None, String::new()));
        assert_eq!(parse_phone_input("   \t "), (None, String::new()));
    }

    #[test]
    fn normalize_local_and_country_prefixes() {
        assert_eq!(normalize_phone("08123456789"), "+628123456789");
        assert_eq!(normalize_phone("628123456789"), "+628123456789");
        assert_eq!(normalize_phone("+628123456789"), "+628123456789");
        assert_eq!(normalize_phone("8123456789"), "+628123456789");
        assert_eq!(normalize_phone("0812-3456-789"), "+628123456789");
        assert_eq!(normalize_phone("(0812) 345 6789"), "+628123456789");
    }

    #[test]
    fn normalize_short_numbers_keep_their_digits() {
        assert_eq!(normalize_phone("12345"), "+12345");
        assert_eq!(normalize_phone(""), "");
        assert_eq!(normalize_phone("abc"), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in [
            "08123456789",
            "628123456789",
            "+628123456789",
            "8123456789",
            "12345",
            "0812-3456-789",
        ] {
            let once = normalize_phone(input);
            assert_eq!(normalize_phone(&once), once, "input: {input}");
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence_with_identifier() {
        let inputs = vec![
            "Budi 08123456789".to_string(),
            "08123456789".to_string(),
        ];
        let (records, duplicates_removed) = parse_phone_batch(&inputs);

        assert_eq!(records.len(), 1);
        assert_eq!(duplicates_removed, 1);
        assert_eq!(records[0].identifier.as_deref(), Some("Budi"));
        assert_eq!(records[0].phone_number, "+628123456789");
        assert_eq!(records[0].original_input, "Budi 08123456789");
    }

    #[test]
    fn dedup_invariant_holds() {
        let inputs: Vec<String> = vec![
            "08111111111",
            "0811 1111 111",
            "628111111111",
            "08222222222",
            "",
            "Siti 08222222222",
            "08333333333",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let (records, duplicates_removed) = parse_phone_batch(&inputs);

        let unique: std::collections::HashSet<String> = inputs
            .iter()
            .map(|i| normalize_phone(&parse_phone_input(i).1))
            .filter(|p| !p.is_empty())
            .collect();
        let non_empty = inputs
            .iter()
            .filter(|i| !normalize_phone(&parse_phone_input(i).1).is_empty())
            .count();

        assert_eq!(records.len(), unique.len());
        assert_eq!(duplicates_removed, non_empty - records.len());
    }
}
