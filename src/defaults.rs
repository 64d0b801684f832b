//! Default value normalization
//!
//! Rewrites raw catalog default expressions such as `((0))`, `(N'abc')` or
//! `(getdate())` into C# literal syntax.

const CHAR_TYPES: &[&str] = &["char", "nchar", "varchar", "nvarchar", "text", "ntext"];
const DECIMAL_TYPES: &[&str] = &["decimal", "numeric", "money", "smallmoney"];

/// Normalize a raw catalog default into a C# expression
///
/// Returns `None` when the column has no default.
pub fn normalize(raw: Option<&str>, db_type: &str, nullable: bool, length: i32) -> Option<String> {
    let raw = raw.map(str::trim).filter(|r| !r.is_empty())?;
    let db_type = db_type.to_lowercase();
    let value = strip_wrapping_parens(raw);
    if value.eq_ignore_ascii_case("null") {
        return None;
    }

    let literal = if db_type == "bit" {
        match remove_parens(value).trim() {
            "1" => "true".to_string(),
            "0" => "false".to_string(),
            other => other.to_string(),
        }
    } else if CHAR_TYPES.contains(&db_type.as_str()) {
        let value = value
            .strip_prefix('N')
            .filter(|v| v.starts_with('\''))
            .unwrap_or(value);
        match unquote(value) {
            Some(inner) => {
                let inner = inner.trim();
                if !nullable && length == 1 {
                    let ch = if inner.is_empty() { " " } else { inner };
                    format!("'{}'", ch.replace('\'', "\\'"))
                } else {
                    format!("\"{}\"", inner.replace('"', "\\\""))
                }
            }
            None => value.to_string(),
        }
    } else if db_type.contains("date") {
        match unquote(value) {
            Some(inner) => format!("SqlDateTime.Parse(\"{}\").Value", inner),
            None => {
                let lowered = value.to_lowercase();
                if lowered == "getdate()" || lowered == "current_timestamp" || lowered == "sysdatetime()" {
                    "DateTime.Now".to_string()
                } else {
                    value.to_string()
                }
            }
        }
    } else if DECIMAL_TYPES.contains(&db_type.as_str()) {
        format!("{}m", remove_parens(value).trim())
    } else {
        remove_parens(value).trim().replace("@@spid", "-1")
    };

    if literal.is_empty() {
        None
    } else {
        Some(literal)
    }
}

/// Strip parens that wrap the whole expression: `((1))` -> `1`, `(a)+(b)` unchanged
fn strip_wrapping_parens(mut value: &str) -> &str {
    loop {
        let trimmed = value.trim();
        if !(trimmed.starts_with('(') && trimmed.ends_with(')')) || !wraps_whole(trimmed) {
            return trimmed;
        }
        value = &trimmed[1..trimmed.len() - 1];
    }
}

fn wraps_whole(value: &str) -> bool {
    let mut depth = 0usize;
    let mut in_quote = false;
    for (i, c) in value.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != value.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn remove_parens(value: &str) -> String {
    value.chars().filter(|c| *c != '(' && *c != ')').collect()
}

fn unquote(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_default() {
        assert_eq!(normalize(None, "int", false, -1), None);
        assert_eq!(normalize(Some(""), "int", false, -1), None);
        assert_eq!(normalize(Some("  "), "varchar", true, 10), None);
    }

    #[test]
    fn test_bit_default() {
        assert_eq!(normalize(Some("(1)"), "bit", false, -1).as_deref(), Some("true"));
        assert_eq!(normalize(Some("((0))"), "bit", false, -1).as_deref(), Some("false"));
    }

    #[test]
    fn test_single_char_empty_default() {
        assert_eq!(normalize(Some("('')"), "varchar", false, 1).as_deref(), Some("' '"));
        assert_eq!(normalize(Some("('Y')"), "char", false, 1).as_deref(), Some("'Y'"));
    }

    #[test]
    fn test_string_default() {
        assert_eq!(
            normalize(Some("(N'hello ')"), "nvarchar", true, 50).as_deref(),
            Some("\"hello\"")
        );
        assert_eq!(normalize(Some("('')"), "varchar", true, 1).as_deref(), Some("\"\""));
        assert_eq!(normalize(Some("(NULL)"), "varchar", true, 10), None);
    }

    #[test]
    fn test_date_defaults() {
        assert_eq!(
            normalize(Some("(getdate())"), "datetime", true, -1).as_deref(),
            Some("DateTime.Now")
        );
        assert_eq!(
            normalize(Some("('20090101')"), "smalldatetime", false, -1).as_deref(),
            Some("SqlDateTime.Parse(\"20090101\").Value")
        );
    }

    #[test]
    fn test_decimal_default() {
        assert_eq!(normalize(Some("((0.5))"), "decimal", false, -1).as_deref(), Some("0.5m"));
        assert_eq!(normalize(Some("((0))"), "money", false, -1).as_deref(), Some("0m"));
    }

    #[test]
    fn test_other_defaults() {
        assert_eq!(normalize(Some("((42))"), "int", false, -1).as_deref(), Some("42"));
        assert_eq!(normalize(Some("(@@spid)"), "int", false, -1).as_deref(), Some("-1"));
    }

    #[test]
    fn test_strip_wrapping_parens() {
        assert_eq!(strip_wrapping_parens("((1))"), "1");
        assert_eq!(strip_wrapping_parens("(a)+(b)"), "(a)+(b)");
        assert_eq!(strip_wrapping_parens("(getdate())"), "getdate()");
        assert_eq!(strip_wrapping_parens("(')')"), "')'");
    }
}
