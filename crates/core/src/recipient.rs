use regex::Regex;
use std::sync::LazyLock;

pub const UNKNOWN_RECIPIENT: &str = "Unknown";

const LABELS: &[&str] = &["Name", "Student", "Recipient"];

static RECIPIENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    LABELS
        .iter()
        .map(|label| {
            // Capture stays on the label's line.
            Regex::new(&format!(r"(?i)\b{label}:[ \t]*([A-Za-z][A-Za-z \t]*)"))
                .expect("recipient pattern is valid")
        })
        .collect()
});

/// Find a recipient name introduced by a known label, in label priority order.
pub fn extract_recipient(text: &str) -> Option<String> {
    RECIPIENT_PATTERNS
        .iter()
        .filter_map(|re| re.captures(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .find(|name| !name.is_empty())
}

/// Same as [`extract_recipient`], falling back to [`UNKNOWN_RECIPIENT`].
pub fn recipient_or_unknown(text: &str) -> String {
    extract_recipient(text).unwrap_or_else(|| UNKNOWN_RECIPIENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_label() {
        let text = "Student: Joe Smith\nHomework 1";
        assert_eq!(extract_recipient(text), Some("Joe Smith".to_string()));
    }

    #[test]
    fn labels_are_case_insensitive() {
        assert_eq!(
            extract_recipient("RECIPIENT:   Ada Lovelace  "),
            Some("Ada Lovelace".to_string())
        );
    }

    #[test]
    fn name_label_wins_over_later_labels() {
        let text = "Recipient: Grace Hopper\nName: Alan Turing";
        assert_eq!(extract_recipient(text), Some("Alan Turing".to_string()));
    }

    #[test]
    fn no_label_yields_unknown() {
        assert_eq!(extract_recipient("quarterly numbers"), None);
        assert_eq!(recipient_or_unknown("quarterly numbers"), "Unknown");
        assert_eq!(recipient_or_unknown(""), "Unknown");
    }

    #[test]
    fn label_without_name_is_skipped() {
        assert_eq!(recipient_or_unknown("Name: 12345"), "Unknown");
        assert_eq!(
            extract_recipient("Name: \nStudent: Kim Lee"),
            Some("Kim Lee".to_string())
        );
    }

    #[test]
    fn label_must_be_a_word() {
        assert_eq!(extract_recipient("Surname: Smith"), None);
    }
}
