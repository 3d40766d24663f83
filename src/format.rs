//! Row formatter: turns raw field values into literals for insert statements
//!
//! Values are embedded directly in SQL text rather than bound as parameters,
//! so text is dollar-quoted with a tag derived from the field name:
//!
//! ```text
//! artist_name = "Ty Dolla $ign"   ->   $artist_name$Ty Dolla $ign$artist_name$
//! ```
//!
//! NULL and the "nan" marker become the bare literal `null`, numeric values
//! pass through untouched.

use std::collections::BTreeMap;

use crate::models::{FieldValue, RawRow};

/// Literal emitted for null and not-a-number values
pub const NULL_LITERAL: &str = "null";

/// A row of SQL literals keyed by column name
pub type FormattedRow = BTreeMap<String, String>;

/// Format a single value for literal embedding
pub fn format_value(field: &str, value: &FieldValue) -> String {
    if value.is_null_like() {
        return NULL_LITERAL.to_string();
    }

    match value {
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Float(f) if f.is_finite() => f.to_string(),
        FieldValue::Decimal(d) if is_numeric_literal(d) => d.trim().to_string(),
        other => dollar_quote(field, &other.to_string()),
    }
}

/// Format every field of a row
pub fn format_row(row: &RawRow) -> FormattedRow {
    row.iter()
        .map(|(name, value)| (name.clone(), format_value(name, value)))
        .collect()
}

/// Wrap text in a dollar quote whose tag is built from the field name.
///
/// The tag is lengthened with a numeric suffix until the closing delimiter
/// first appears at the very end of the quoted body.
pub fn dollar_quote(field: &str, text: &str) -> String {
    let base = quote_tag(field);
    let mut tag = base.clone();
    let mut suffix = 0;

    while !closes_cleanly(text, &tag) {
        suffix += 1;
        tag = format!("{}_{}", base, suffix);
    }

    format!("${tag}${text}${tag}$")
}

/// Build a SQL insert for `table` from a formatted row.
///
/// Columns missing from the row are inserted as `null`.
pub fn insert_statement(table: &str, columns: &[&str], row: &FormattedRow) -> String {
    let values: Vec<&str> = columns
        .iter()
        .map(|column| row.get(*column).map(String::as_str).unwrap_or(NULL_LITERAL))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        table,
        columns.join(", "),
        values.join(", ")
    )
}

/// Dollar-quote tags follow identifier rules: ASCII letters, digits and
/// underscores, not starting with a digit.
fn quote_tag(field: &str) -> String {
    let tag: String = field
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    match tag.chars().next() {
        None => "v".to_string(),
        Some(first) if first.is_ascii_digit() => format!("v{}", tag),
        Some(_) => tag,
    }
}

fn closes_cleanly(text: &str, tag: &str) -> bool {
    let closing = format!("${tag}$");
    let quoted = format!("{text}{closing}");
    quoted.find(&closing) == Some(text.len())
}

fn is_numeric_literal(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        && text.parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::tokenizer::{Token, Tokenizer};

    /// Tokenize a formatted literal and return the string payload it encodes
    fn dollar_payload(literal: &str) -> String {
        let tokens = Tokenizer::new(&PostgreSqlDialect {}, literal)
            .tokenize()
            .unwrap();
        match tokens.as_slice() {
            [Token::DollarQuotedString(s)] => s.value.clone(),
            other => panic!("expected one dollar-quoted string, got {:?}", other),
        }
    }

    #[test]
    fn test_null_and_nan_become_null() {
        for value in [
            FieldValue::Null,
            FieldValue::Float(f64::NAN),
            FieldValue::from("nan"),
            FieldValue::from("NaN"),
            FieldValue::from("NAN"),
            FieldValue::Decimal("NaN".to_string()),
        ] {
            assert_eq!(format_value("level", &value), NULL_LITERAL, "{:?}", value);
        }
    }

    #[test]
    fn test_numbers_pass_through() {
        assert_eq!(format_value("year", &FieldValue::Integer(2020)), "2020");
        assert_eq!(format_value("year", &FieldValue::Integer(-7)), "-7");
        assert_eq!(format_value("duration", &FieldValue::Float(237.5)), "237.5");
        assert_eq!(
            format_value("duration", &FieldValue::Decimal("237.00000".to_string())),
            "237.00000"
        );
    }

    #[test]
    fn test_numeric_format_is_stable() {
        for value in [
            FieldValue::Integer(1541990217796),
            FieldValue::Float(-117.15),
            FieldValue::Float(0.000125),
            FieldValue::Decimal("35.14968".to_string()),
        ] {
            let once = format_value("v", &value);
            let reparsed = FieldValue::Decimal(once.clone());
            assert_eq!(format_value("v", &reparsed), once);
        }
    }

    #[test]
    fn test_decimal_with_junk_is_quoted() {
        let literal = format_value(
            "duration",
            &FieldValue::Decimal("1); DROP TABLE songs".to_string()),
        );
        assert!(literal.starts_with("$duration$"));
        assert_eq!(dollar_payload(&literal), "1); DROP TABLE songs");
    }

    #[test]
    fn test_text_is_dollar_quoted_by_field() {
        assert_eq!(
            format_value("title", &FieldValue::from("Fair Chance")),
            "$title$Fair Chance$title$"
        );
    }

    #[test]
    fn test_text_with_dollar_round_trips() {
        for text in [
            "Thundercat, Ty Dolla $ign, Lil B",
            "$$",
            "A$AP Rocky",
            "ends with $",
            "$artist_name$ inside",
            "trailing $artist_name",
            "it's \"quoted\"",
            "",
        ] {
            let literal = format_value("artist_name", &FieldValue::from(text));
            assert_eq!(dollar_payload(&literal), text, "literal {}", literal);
        }
    }

    #[test]
    fn test_tag_collision_extends_tag() {
        let literal = dollar_quote("name", "x $name$ y");
        assert_eq!(literal, "$name_1$x $name$ y$name_1$");
    }

    #[test]
    fn test_tag_sanitized() {
        assert_eq!(dollar_quote("userAgent", "a"), "$useragent$a$useragent$");
        assert_eq!(dollar_quote("1st col", "a"), "$v1st_col$a$v1st_col$");
        assert_eq!(dollar_quote("", "a"), "$v$a$v$");
    }

    #[test]
    fn test_insert_statement() {
        let row = format_row(&RawRow::from([
            ("song_id".to_string(), FieldValue::from("S1")),
            ("year".to_string(), FieldValue::Integer(2020)),
        ]));
        let sql = insert_statement("songs", &["song_id", "title", "year"], &row);
        assert_eq!(
            sql,
            "INSERT INTO songs (song_id, title, year) VALUES ($song_id$S1$song_id$, null, 2020);"
        );
    }
}
