//! Statement parameter binding
//!
//! `?` placeholders are rewritten into ClickHouse typed parameters
//! (`{p1:UInt64}`) and the values travel as `param_p1=...` on the request, so
//! no argument text is ever spliced into the SQL.

use crate::{Error, Result};

/// Value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unsigned 64-bit integer (block numbers)
    UInt64(u64),
    /// Signed 64-bit integer
    Int64(i64),
    /// 64-bit float
    Float64(f64),
    /// UTF-8 string
    String(String),
    /// Boolean
    Bool(bool),
}

impl Value {
    /// ClickHouse type used in the placeholder
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::UInt64(_) => "UInt64",
            Value::Int64(_) => "Int64",
            Value::Float64(_) => "Float64",
            Value::String(_) => "String",
            Value::Bool(_) => "Bool",
        }
    }

    /// Value in ClickHouse's escaped text format
    pub fn to_param(&self) -> String {
        match self {
            Value::UInt64(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Float64(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::String(s) => escape(s),
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Statement with placeholders rewritten and values rendered
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    /// SQL sent as the request body
    pub sql: String,
    /// `(name, value)` pairs, without the `param_` prefix
    pub params: Vec<(String, String)>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexer {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Rewrite `?` placeholders outside literals and comments
///
/// Fails with [`Error::Bind`] when the placeholder count does not match `args`.
pub fn bind(sql: &str, args: &[Value]) -> Result<BoundStatement> {
    let mut out = String::with_capacity(sql.len() + args.len() * 12);
    let mut params = Vec::with_capacity(args.len());
    let mut state = Lexer::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Lexer::Code => match c {
                '?' => {
                    let idx = params.len();
                    let value = args.get(idx).ok_or_else(|| {
                        Error::Bind(format!(
                            "statement has more placeholders than the {} supplied arguments",
                            args.len()
                        ))
                    })?;
                    let name = format!("p{}", idx + 1);
                    out.push_str(&format!("{{{}:{}}}", name, value.type_name()));
                    params.push((name, value.to_param()));
                    continue;
                }
                '\'' | '"' | '`' => state = Lexer::Quoted(c),
                '-' if chars.peek() == Some(&'-') => state = Lexer::LineComment,
                '/' if chars.peek() == Some(&'*') => state = Lexer::BlockComment,
                _ => {}
            },
            Lexer::Quoted(quote) => {
                if c == '\\' {
                    out.push(c);
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                    continue;
                }
                if c == quote {
                    state = Lexer::Code;
                }
            }
            Lexer::LineComment => {
                if c == '\n' {
                    state = Lexer::Code;
                }
            }
            Lexer::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    out.push(c);
                    if let Some(slash) = chars.next() {
                        out.push(slash);
                    }
                    state = Lexer::Code;
                    continue;
                }
            }
        }
        out.push(c);
    }

    if params.len() != args.len() {
        return Err(Error::Bind(format!(
            "statement has {} placeholders but {} arguments were supplied",
            params.len(),
            args.len()
        )));
    }

    Ok(BoundStatement { sql: out, params })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_range_query() {
        let bound = bind(
            "SELECT address FROM t WHERE b >= ? AND b < ?",
            &[100u64.into(), 200u64.into()],
        )
        .unwrap();
        assert_eq!(
            bound.sql,
            "SELECT address FROM t WHERE b >= {p1:UInt64} AND b < {p2:UInt64}"
        );
        assert_eq!(
            bound.params,
            vec![
                ("p1".to_string(), "100".to_string()),
                ("p2".to_string(), "200".to_string())
            ]
        );
    }

    #[test]
    fn test_bind_skips_literals_and_comments() {
        let sql = "SELECT '?', \"a?\", `b?` -- why?\nFROM t /* ? */ WHERE x = ?";
        let bound = bind(sql, &["v".into()]).unwrap();
        assert_eq!(
            bound.sql,
            "SELECT '?', \"a?\", `b?` -- why?\nFROM t /* ? */ WHERE x = {p1:String}"
        );
        assert_eq!(bound.params, vec![("p1".to_string(), "v".to_string())]);
    }

    #[test]
    fn test_bind_escaped_quote_inside_literal() {
        let bound = bind("SELECT 'it\\'s ?' WHERE a = ?", &[1i64.into()]).unwrap();
        assert_eq!(bound.sql, "SELECT 'it\\'s ?' WHERE a = {p1:Int64}");
    }

    #[test]
    fn test_bind_count_mismatch() {
        assert!(matches!(
            bind("SELECT ?", &[]),
            Err(Error::Bind(_))
        ));
        assert!(matches!(
            bind("SELECT 1", &[1u64.into()]),
            Err(Error::Bind(_))
        ));
    }

    #[test]
    fn test_bind_without_placeholders() {
        let bound = bind("SELECT max(last_access_block) FROM t", &[]).unwrap();
        assert_eq!(bound.sql, "SELECT max(last_access_block) FROM t");
        assert!(bound.params.is_empty());
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(Value::Bool(false).to_param(), "false");
        assert_eq!(Value::Int64(-3).to_param(), "-3");
        assert_eq!(Value::from("a\tb\\c\n").to_param(), "a\\tb\\\\c\\n");
        assert_eq!(Value::from(String::from("0xabc")).type_name(), "String");
    }
}
