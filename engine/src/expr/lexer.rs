use errors::{ExprError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),
    LParen,
    RParen,
    Comma,
    Question,
    Colon,
    OrOr,
    AndAnd,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

/// Tokenizes the source; each token carries its byte position for
/// diagnostics.
pub fn lex(source: &str) -> Result<Vec<(Token, usize)>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let b = bytes[pos];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b'(' => {
                tokens.push((Token::LParen, pos));
                pos += 1;
            }
            b')' => {
                tokens.push((Token::RParen, pos));
                pos += 1;
            }
            b',' => {
                tokens.push((Token::Comma, pos));
                pos += 1;
            }
            b'?' => {
                tokens.push((Token::Question, pos));
                pos += 1;
            }
            b':' => {
                tokens.push((Token::Colon, pos));
                pos += 1;
            }
            b'+' => {
                tokens.push((Token::Plus, pos));
                pos += 1;
            }
            b'-' => {
                tokens.push((Token::Minus, pos));
                pos += 1;
            }
            b'*' => {
                tokens.push((Token::Star, pos));
                pos += 1;
            }
            b'/' => {
                tokens.push((Token::Slash, pos));
                pos += 1;
            }
            b'%' => {
                tokens.push((Token::Percent, pos));
                pos += 1;
            }
            b'|' => {
                if bytes.get(pos + 1) == Some(&b'|') {
                    tokens.push((Token::OrOr, pos));
                    pos += 2;
                } else {
                    return Err(unexpected(pos, "|"));
                }
            }
            b'&' => {
                if bytes.get(pos + 1) == Some(&b'&') {
                    tokens.push((Token::AndAnd, pos));
                    pos += 2;
                } else {
                    return Err(unexpected(pos, "&"));
                }
            }
            b'=' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push((Token::Eq, pos));
                    pos += 2;
                } else {
                    return Err(unexpected(pos, "="));
                }
            }
            b'!' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push((Token::Ne, pos));
                    pos += 2;
                } else {
                    tokens.push((Token::Not, pos));
                    pos += 1;
                }
            }
            b'<' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push((Token::Le, pos));
                    pos += 2;
                } else {
                    tokens.push((Token::Lt, pos));
                    pos += 1;
                }
            }
            b'>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push((Token::Ge, pos));
                    pos += 2;
                } else {
                    tokens.push((Token::Gt, pos));
                    pos += 1;
                }
            }
            b'\'' | b'"' => {
                let (value, next) = lex_string(bytes, pos, b)?;
                tokens.push((Token::Str(value), pos));
                pos = next;
            }
            b'0'..=b'9' | b'.' => {
                let (value, next) = lex_number(source, bytes, pos)?;
                tokens.push((Token::Number(value), pos));
                pos = next;
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let (ident, next) = lex_ident(source, bytes, pos);
                let token = match ident.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => Token::Ident(ident),
                };
                tokens.push((token, pos));
                pos = next;
            }
            other => return Err(unexpected(pos, &(other as char).to_string())),
        }
    }

    Ok(tokens)
}

fn unexpected(position: usize, what: &str) -> errors::Error {
    ExprError::Parse {
        position,
        message: format!("unexpected character {what:?}"),
    }
    .into()
}

fn lex_string(bytes: &[u8], start: usize, quote: u8) -> Result<(String, usize)> {
    let mut value = String::new();
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => {
                let escaped = bytes.get(pos + 1).ok_or_else(|| ExprError::Parse {
                    position: pos,
                    message: "dangling escape".to_string(),
                })?;
                value.push(match escaped {
                    b'n' => '\n',
                    b't' => '\t',
                    other => *other as char,
                });
                pos += 2;
            }
            b if b == quote => return Ok((value, pos + 1)),
            b => {
                value.push(b as char);
                pos += 1;
            }
        }
    }
    Err(ExprError::Parse {
        position: start,
        message: "unterminated string".to_string(),
    }
    .into())
}

fn lex_number(source: &str, bytes: &[u8], start: usize) -> Result<(f64, usize)> {
    let mut pos = start;
    while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
        pos += 1;
    }
    source[start..pos]
        .parse::<f64>()
        .map(|n| (n, pos))
        .map_err(|_| {
            ExprError::Parse {
                position: start,
                message: format!("bad number {:?}", &source[start..pos]),
            }
            .into()
        })
}

fn lex_ident(source: &str, bytes: &[u8], start: usize) -> (String, usize) {
    let mut pos = start;
    while pos < bytes.len() {
        let b = bytes[pos];
        let ident_char = b.is_ascii_alphanumeric() || b == b'_';
        // Dotted member access stays part of the identifier: data.x, Math.abs.
        let dot = b == b'.'
            && bytes
                .get(pos + 1)
                .map(|n| n.is_ascii_alphanumeric() || *n == b'_')
                .unwrap_or(false);
        if ident_char || dot {
            pos += 1;
        } else {
            break;
        }
    }
    (source[start..pos].to_string(), pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_operators() {
        let tokens = lex("a && b || !c == 1.5").unwrap();
        let kinds: Vec<Token> = tokens.into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Ident("a".to_string()),
                Token::AndAnd,
                Token::Ident("b".to_string()),
                Token::OrOr,
                Token::Not,
                Token::Ident("c".to_string()),
                Token::Eq,
                Token::Number(1.5),
            ]
        );
    }

    #[test]
    fn test_lex_dotted_ident() {
        let tokens = lex("instance.timeInStateMs > constant.limit").unwrap();
        assert_eq!(tokens[0].0, Token::Ident("instance.timeInStateMs".to_string()));
        assert_eq!(tokens[2].0, Token::Ident("constant.limit".to_string()));
    }

    #[test]
    fn test_lex_strings_and_escapes() {
        let tokens = lex(r#"'it\'s' "two\n""#).unwrap();
        assert_eq!(tokens[0].0, Token::Str("it's".to_string()));
        assert_eq!(tokens[1].0, Token::Str("two\n".to_string()));
        assert!(lex("'open").is_err());
    }

    #[test]
    fn test_lex_rejects_single_ampersand() {
        assert!(lex("a & b").is_err());
        assert!(lex("a = b").is_err());
        assert!(lex("a # b").is_err());
    }

    #[test]
    fn test_keywords() {
        let tokens = lex("true false null").unwrap();
        assert_eq!(tokens[0].0, Token::Bool(true));
        assert_eq!(tokens[1].0, Token::Bool(false));
        assert_eq!(tokens[2].0, Token::Null);
    }
}
