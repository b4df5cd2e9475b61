use crate::bail;
use crate::error::{ErrorKind, ProrepResult};

/// Parses a logical value written as text.
///
/// Accepts `yes`/`no`, `true`/`false` and their single-letter forms, ignoring case.
pub fn parse_logical(s: &str) -> ProrepResult<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "t" => Ok(true),
        "no" | "n" | "false" | "f" => Ok(false),
        _ => bail!(
            ErrorKind::ConversionError,
            "Invalid logical value",
            format!("Logical value must be yes/no or true/false (received: {s})")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_progress_and_sql_spellings() {
        assert!(parse_logical("yes").unwrap());
        assert!(parse_logical("TRUE").unwrap());
        assert!(!parse_logical("no").unwrap());
        assert!(!parse_logical(" false ").unwrap());
    }

    #[test]
    fn rejects_other_text() {
        let err = parse_logical("maybe").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConversionError);
    }
}
