use validator::ValidateEmail;

/// Upper bound on invitations created from a single bulk request.
pub const MAX_BULK_INVITATIONS: usize = 100;

/// Returns `true` when the candidate is a syntactically valid email address.
pub fn is_valid_email(candidate: &str) -> bool {
    candidate.to_string().validate_email()
}

/// Extracts the valid addresses from a comma separated list.
///
/// Entries are trimmed before validation, invalid entries are dropped, and
/// only the first [`MAX_BULK_INVITATIONS`] valid entries are kept. Order and
/// duplicates are preserved.
pub fn extract_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|candidate| is_valid_email(candidate))
        .take(MAX_BULK_INVITATIONS)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_valid_entries_in_order() {
        let emails = extract_emails("a@x.com, not-an-email, b@y.com");
        assert_eq!(emails, vec!["a@x.com".to_string(), "b@y.com".to_string()]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(extract_emails("").is_empty());
        assert!(extract_emails(" , ,").is_empty());
        assert!(extract_emails("nobody, @x.com, a@, a b@x.com").is_empty());
    }

    #[test]
    fn preserves_duplicates() {
        let emails = extract_emails("a@x.com,a@x.com");
        assert_eq!(emails.len(), 2);
    }

    #[test]
    fn caps_at_one_hundred_valid_entries() {
        let raw = (0..250)
            .map(|i| {
                if i % 2 == 0 {
                    format!("user{i}@example.com")
                } else {
                    format!("invalid-{i}")
                }
            })
            .collect::<Vec<_>>()
            .join(",");

        let emails = extract_emails(&raw);
        assert_eq!(emails.len(), MAX_BULK_INVITATIONS);
        assert_eq!(emails.first().map(String::as_str), Some("user0@example.com"));
        assert_eq!(emails.last().map(String::as_str), Some("user198@example.com"));
        assert!(emails.iter().all(|email| is_valid_email(email)));
    }
}
