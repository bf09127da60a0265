//! Sql string operation.
use std::{borrow::Cow, fmt};

use crate::encode::Encoded;

/// Type that represent sql string.
pub trait Sql {
    /// Returns sql string.
    fn sql(&self) -> &str;

    /// Return `true` if current statement should be cached.
    fn persistent(&self) -> bool;
}

impl Sql for &str {
    fn sql(&self) -> &str {
        self
    }

    fn persistent(&self) -> bool {
        true
    }
}

impl Sql for String {
    fn sql(&self) -> &str {
        self
    }

    fn persistent(&self) -> bool {
        false
    }
}

/// Non persistent query string.
#[derive(Debug)]
pub struct SqlOnce<'sql>(&'sql str);

impl Sql for SqlOnce<'_> {
    fn sql(&self) -> &str {
        self.0
    }

    fn persistent(&self) -> bool {
        false
    }
}

/// Extension trait for easier query persistence config.
pub trait SqlExt<'a> {
    /// Disable statement caching.
    fn once(self) -> SqlOnce<'a>;
}

impl<'a> SqlExt<'a> for &'a str {
    fn once(self) -> SqlOnce<'a> {
        SqlOnce(self)
    }
}

impl<'a> SqlExt<'a> for SqlOnce<'a> {
    fn once(self) -> SqlOnce<'a> {
        self
    }
}

/// Substitute `$N` placeholders with sql literal of the bound parameters.
///
/// Placeholders inside quoted literal, quoted identifier, dollar quoted string,
/// and comment are left untouched.
pub(crate) fn bind_sql<'a>(sql: &'a str, params: &[Encoded]) -> Result<Cow<'a, str>, ParamError> {
    if params.is_empty() && !sql.contains('$') {
        return Ok(Cow::Borrowed(sql));
    }

    let src = sql.as_bytes();
    let mut out = Vec::with_capacity(sql.len() + params.len() * 8);
    let mut i = 0;

    // copy verbatim up to `end`
    macro_rules! skip_until {
        ($end:expr) => {{
            let end = $end;
            out.extend_from_slice(&src[i..end]);
            i = end;
        }};
    }

    while i < src.len() {
        match src[i] {
            b'\'' => {
                let escaped = i > 0 && matches!(src[i - 1], b'E' | b'e') && !is_ident(src.get(i.wrapping_sub(2)));
                skip_until!(quoted_end(src, i, b'\'', escaped));
            }
            b'"' => skip_until!(quoted_end(src, i, b'"', false)),
            b'-' if src.get(i + 1) == Some(&b'-') => {
                let end = src[i..].iter().position(|e| *e == b'\n').map_or(src.len(), |n| i + n);
                skip_until!(end);
            }
            b'/' if src.get(i + 1) == Some(&b'*') => {
                let end = find(&src[i + 2..], b"*/").map_or(src.len(), |n| i + 2 + n + 2);
                skip_until!(end);
            }
            b'$' if i > 0 && is_ident(Some(&src[i - 1])) => skip_until!(i + 1),
            b'$' => {
                let digits = src[i + 1..].iter().take_while(|e| e.is_ascii_digit()).count();
                if digits > 0 {
                    let n: usize = sql[i + 1..i + 1 + digits]
                        .parse()
                        .map_err(|_| ParamError::Missing { index: usize::MAX, bound: params.len() })?;
                    let Some(param) = n.checked_sub(1).and_then(|n| params.get(n)) else {
                        return Err(ParamError::Missing { index: n, bound: params.len() });
                    };
                    param.append_query(&mut out);
                    i += 1 + digits;
                    continue;
                }

                // dollar quote, `$$..$$` or `$tag$..$tag$`
                let tag_len = src[i + 1..].iter().take_while(|e| is_ident(Some(*e))).count();
                if src.get(i + 1 + tag_len) == Some(&b'$') {
                    let tag = &src[i..i + tag_len + 2];
                    let body = i + tag.len();
                    let end = find(&src[body..], tag).map_or(src.len(), |n| body + n + tag.len());
                    skip_until!(end);
                } else {
                    skip_until!(i + 1);
                }
            }
            _ => {
                let next = src[i + 1..]
                    .iter()
                    .position(|e| matches!(e, b'\'' | b'"' | b'-' | b'/' | b'$'))
                    .map_or(src.len(), |n| i + 1 + n);
                skip_until!(next);
            }
        }
    }

    match String::from_utf8(out) {
        Ok(ok) => Ok(Cow::Owned(ok)),
        Err(_) => Err(ParamError::NonUtf8),
    }
}

fn is_ident(b: Option<&u8>) -> bool {
    matches!(b, Some(b) if b.is_ascii_alphanumeric() || *b == b'_' || *b >= 0x80)
}

/// Returns the index after closing quote, doubled quote is an escaped quote.
fn quoted_end(src: &[u8], start: usize, quote: u8, backslash: bool) -> usize {
    let mut i = start + 1;
    while i < src.len() {
        match src[i] {
            b'\\' if backslash => i += 2,
            b if b == quote => {
                if src.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    src.len()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// An error when query parameters does not match the sql placeholders.
#[derive(Clone)]
pub enum ParamError {
    /// Placeholder refer to a parameter that is not bound.
    Missing {
        index: usize,
        bound: usize,
    },
    /// Bound parameter is not valid utf8.
    NonUtf8,
    /// Prepared statement expect different parameter count.
    Count {
        expect: usize,
        found: usize,
    },
    /// Bound parameter does not fit in a message.
    TooLarge {
        index: usize,
    },
}

impl std::error::Error for ParamError { }

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { index, bound } => {
                write!(f, "placeholder `${index}` have no value, only {bound} parameters bound")
            }
            Self::NonUtf8 => f.write_str("bound parameter is not valid utf8"),
            Self::Count { expect, found } => {
                write!(f, "statement expect {expect} parameters, found {found}")
            }
            Self::TooLarge { index } => write!(f, "parameter `${index}` is too large"),
        }
    }
}

impl fmt::Debug for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Encode;

    fn bind(sql: &str, params: Vec<Encoded>) -> Result<String, ParamError> {
        bind_sql(sql, &params).map(Cow::into_owned)
    }

    #[test]
    fn substitute() {
        let sql = bind("SELECT $1, $2, $1", vec![1i32.encode(), "o'k".encode()]).unwrap();
        assert_eq!(sql, "SELECT 1, 'o''k', 1");

        let sql = bind("SELECT $10", (1..=10i32).map(Encode::encode).collect()).unwrap();
        assert_eq!(sql, "SELECT 10");
    }

    #[test]
    fn untouched_placeholder() {
        let sql = "SELECT '$1', \"$1\", $$ $1 $$, $tag$ $1 $tag$, a$1 -- $1\n/* $1 */";
        assert_eq!(bind(sql, vec![]).unwrap(), sql);

        let sql = "SELECT E'\\'$1', $1";
        assert_eq!(bind(sql, vec![true.encode()]).unwrap(), "SELECT E'\\'$1', true");
    }

    #[test]
    fn missing_param() {
        let err = bind("SELECT $1, $2", vec![1i32.encode()]).unwrap_err();
        assert!(matches!(err, ParamError::Missing { index: 2, bound: 1 }));
        assert!(bind("SELECT $0", vec![1i32.encode()]).is_err());
    }
}
