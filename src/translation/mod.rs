mod parsers;
mod scanner;

use parsers::{
    is_block_comment_end, is_block_comment_start, is_cast, is_line_comment_start, matches_tag,
    try_start_dollar_quote,
};
use scanner::{State, scan_identifier};

use crate::error::VeloxError;
use crate::types::{ParameterSet, Value};

/// Positional placeholder style a backend expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1`.
    Sqlite,
}

impl PlaceholderStyle {
    fn marker(self) -> char {
        match self {
            PlaceholderStyle::Postgres => '$',
            PlaceholderStyle::Sqlite => '?',
        }
    }
}

/// SQL rewritten from named `:name` placeholders to a backend's positional form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedStatement {
    sql: String,
    names: Vec<String>,
}

impl NamedStatement {
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn into_sql(self) -> String {
        self.sql
    }

    /// Placeholder names in positional order; a name used twice appears once.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Order one parameter set by placeholder position.
    ///
    /// Keys the statement does not reference are ignored.
    ///
    /// # Errors
    /// Returns `VeloxError::MissingParameter` for the first placeholder without a value.
    pub fn bind(&self, set: &ParameterSet) -> Result<Vec<Value>, VeloxError> {
        self.names
            .iter()
            .map(|name| {
                set.get(name)
                    .cloned()
                    .ok_or_else(|| VeloxError::MissingParameter(name.clone()))
            })
            .collect()
    }
}

/// Rewrite named placeholders (`:name`) into `?N` or `$N` placeholders.
///
/// Quoted strings, quoted identifiers, comments, dollar-quoted blocks and Postgres `::` casts
/// are left untouched. A name repeated in the text reuses its first position:
/// ```rust
/// use velox_sql::translation::{compile_named, PlaceholderStyle};
///
/// let stmt = compile_named(
///     "UPDATE t SET a = :a WHERE id = :id OR parent = :id",
///     PlaceholderStyle::Postgres,
/// );
/// assert_eq!(stmt.sql(), "UPDATE t SET a = $1 WHERE id = $2 OR parent = $2");
/// assert_eq!(stmt.names(), ["a", "id"]);
/// ```
#[must_use]
pub fn compile_named(sql: &str, target: PlaceholderStyle) -> NamedStatement {
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;
    let bytes = sql.as_bytes();
    // Start of the not-yet-copied slice of `sql`.
    let mut copied = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => state = State::BlockComment(1),
                b'$' => {
                    if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    }
                }
                b':' if is_cast(bytes, idx) => idx += 1,
                b':' => {
                    if let Some((end, name)) = scan_identifier(bytes, idx + 1) {
                        let position = match names.iter().position(|n| n == name) {
                            Some(existing) => existing + 1,
                            None => {
                                names.push(name.to_owned());
                                names.len()
                            }
                        };
                        out.push_str(&sql[copied..idx]);
                        out.push(target.marker());
                        out.push_str(&position.to_string());
                        copied = end;
                        idx = end - 1;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    idx += 1;
                    if depth == 1 {
                        state = State::Normal;
                    } else {
                        state = State::BlockComment(depth - 1);
                    }
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    let tag_len = tag.len();
                    state = State::Normal;
                    idx += tag_len + 1;
                }
            }
        }

        idx += 1;
    }

    out.push_str(&sql[copied..]);
    NamedStatement { sql: out, names }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn rewrites_for_sqlite() {
        let stmt = compile_named(
            "select * from t where a = :a and b = :b_2",
            PlaceholderStyle::Sqlite,
        );
        assert_eq!(stmt.sql(), "select * from t where a = ?1 and b = ?2");
        assert_eq!(stmt.names(), ["a", "b_2"]);
    }

    #[test]
    fn rewrites_for_postgres() {
        let stmt = compile_named("insert into t values(:id, :name)", PlaceholderStyle::Postgres);
        assert_eq!(stmt.sql(), "insert into t values($1, $2)");
    }

    #[test]
    fn skips_inside_literals_and_comments() {
        let sql = "select ':a', :a -- :b\n/* :c */ from t where \"x:y\" = :a";
        let stmt = compile_named(sql, PlaceholderStyle::Sqlite);
        assert_eq!(
            stmt.sql(),
            "select ':a', ?1 -- :b\n/* :c */ from t where \"x:y\" = ?1"
        );
        assert_eq!(stmt.names(), ["a"]);
    }

    #[test]
    fn skips_casts_and_dollar_quotes() {
        let sql = "select :v::text, $foo$ :inner $foo$ from t where n = :n";
        let stmt = compile_named(sql, PlaceholderStyle::Postgres);
        assert_eq!(
            stmt.sql(),
            "select $1::text, $foo$ :inner $foo$ from t where n = $2"
        );
        assert_eq!(stmt.names(), ["v", "n"]);
    }

    #[test]
    fn leaves_sql_without_placeholders_alone() {
        let sql = "select 1 from t where a = ':'";
        let stmt = compile_named(sql, PlaceholderStyle::Sqlite);
        assert_eq!(stmt.sql(), sql);
        assert!(stmt.names().is_empty());
    }

    #[test]
    fn bind_orders_by_position_and_reports_missing() {
        let stmt = compile_named("select :b, :a, :b", PlaceholderStyle::Sqlite);
        let bound = stmt
            .bind(&params! { "a" => 1, "b" => 2, "unused" => 3 })
            .unwrap();
        assert_eq!(bound, vec![Value::Int(2), Value::Int(1)]);

        let err = stmt.bind(&params! { "b" => 2 }).unwrap_err();
        assert!(matches!(err, VeloxError::MissingParameter(ref n) if n == "a"));
    }
}
