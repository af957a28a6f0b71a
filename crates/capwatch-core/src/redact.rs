//! Masks account identifiers and ARNs before text reaches logs or storage.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"arn:aws[a-zA-Z-]*:[^\s"',]+"#).expect("ARN pattern is valid")
});

static ACCOUNT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{12}\b").expect("account id pattern is valid"));

/// Replace ARNs with `[ARN]` and 12-digit account ids with `[ACCOUNT_ID]`.
pub fn redact(message: &str) -> Cow<'_, str> {
    let without_arns = ARN.replace_all(message, "[ARN]");
    match without_arns {
        Cow::Borrowed(text) => ACCOUNT_ID.replace_all(text, "[ACCOUNT_ID]"),
        Cow::Owned(text) => Cow::Owned(ACCOUNT_ID.replace_all(&text, "[ACCOUNT_ID]").into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_arns_and_account_ids() {
        let out = redact("topic arn:aws:sns:us-east-1:123456789012:alerts in account 210987654321");
        assert_eq!(out, "topic [ARN] in account [ACCOUNT_ID]");
    }

    #[test]
    fn leaves_plain_text_borrowed() {
        let out = redact("nothing to hide");
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn keeps_shorter_numbers() {
        assert_eq!(redact("retry 3 of 12345"), "retry 3 of 12345");
    }
}
