//! SQL identifier validation and quoting for dynamically named tables.

/// Longest identifier PostgreSQL keeps without truncation
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Check that `name` is a plain identifier: a letter or underscore followed by
/// letters, digits or underscores.
pub fn validate_identifier(name: &str) -> Result<(), &'static str> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err("identifier is empty"),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            return Err("identifier must start with a letter or underscore")
        }
        _ => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("identifier may only contain letters, digits and underscores");
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err("identifier is longer than 63 characters");
    }
    Ok(())
}

/// Double-quote an identifier so mixed case is preserved
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."name"` or `"name"`
pub fn qualified_name(schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(name)),
        None => quote_identifier(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_identifier("Hospital_Management").is_ok());
        assert!(validate_identifier("_staging2").is_ok());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("drop table; --").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_identifier("AmountPaid"), "\"AmountPaid\"");
        assert_eq!(
            qualified_name(Some("dbo"), "Hospital_KPI_Summary"),
            "\"dbo\".\"Hospital_KPI_Summary\""
        );
        assert_eq!(qualified_name(None, "t"), "\"t\"");
    }
}
