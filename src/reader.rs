//! Reader: text to [`Value`] trees.
//!
//! Tokenizing is done with nom combinators; parsing is plain recursive
//! descent over the token vector through a [`TokenReader`] cursor.

use std::collections::BTreeMap;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, tag, take_till, take_while},
    character::complete::{anychar, char, one_of},
    combinator::{opt, recognize},
    multi::many0_count,
};

use tracing::trace;

use crate::ast::{MapKey, NumberType, Value};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Characters that end a plain (symbol or number) token
const TOKEN_DELIMITERS: &str = " \t\n\r\x0c,[]{}()'\"`;";

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0c' | ',')
}

fn separators(input: &str) -> IResult<&str, &str> {
    take_while(is_separator).parse(input)
}

/// A double-quoted string token. The closing quote is optional so that an
/// unterminated string still becomes one token and can be reported as such.
fn string_token(input: &str) -> IResult<&str, &str> {
    recognize((
        char('"'),
        many0_count(alt((recognize((char('\\'), anychar)), is_not("\\\"")))),
        opt(char('"')),
    ))
    .parse(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
    recognize((char(';'), take_till(|c| c == '\n'))).parse(input)
}

fn token(input: &str) -> IResult<&str, &str> {
    alt((
        tag("~@"),
        recognize(one_of("[]{}()'`~^@")),
        string_token,
        comment,
        is_not(TOKEN_DELIMITERS),
    ))
    .parse(input)
}

/// Split `input` into tokens, dropping separators and comments.
pub fn tokenize(input: &str) -> Result<Vec<&str>, ParseError> {
    let mut tokens = Vec::new();
    let mut rest = input;
    loop {
        let (after_separators, _) = separators(rest).map_err(|_| invalid_syntax_at(rest))?;
        if after_separators.is_empty() {
            return Ok(tokens);
        }
        let (remaining, tok) =
            token(after_separators).map_err(|_| invalid_syntax_at(after_separators))?;
        if !tok.starts_with(';') {
            tokens.push(tok);
        }
        rest = remaining;
    }
}

fn invalid_syntax_at(rest: &str) -> ParseError {
    let near: String = rest.chars().take(10).collect();
    ParseError::with_found(ParseErrorKind::InvalidSyntax, "Invalid syntax", &near)
}

/// Cursor over a token stream. Both operations fail once the stream is
/// exhausted.
pub struct TokenReader<'a> {
    tokens: Vec<&'a str>,
    position: usize,
}

impl<'a> TokenReader<'a> {
    pub fn new(tokens: Vec<&'a str>) -> Self {
        TokenReader {
            tokens,
            position: 0,
        }
    }

    /// The token at the current position
    pub fn peek(&self) -> Result<&'a str, ParseError> {
        self.tokens
            .get(self.position)
            .copied()
            .ok_or_else(unexpected_end)
    }

    /// The token at the current position, advancing past it
    pub fn next(&mut self) -> Result<&'a str, ParseError> {
        let token = self.peek()?;
        self.position += 1;
        Ok(token)
    }
}

fn unexpected_end() -> ParseError {
    ParseError::from_message(ParseErrorKind::Incomplete, "Unexpected end of input")
}

/// Read the first form of `input`.
///
/// Tokens after the first complete form are ignored. Input containing only
/// whitespace and comments is an error.
pub fn read_str(input: &str) -> Result<Value, Error> {
    let tokens = tokenize(input)?;
    trace!(tokens = tokens.len(), "tokenized");
    if tokens.is_empty() {
        return Err(ParseError::from_message(ParseErrorKind::Empty, "Empty input").into());
    }
    let mut reader = TokenReader::new(tokens);
    Ok(read_form(&mut reader, 0)?)
}

fn read_form(reader: &mut TokenReader<'_>, depth: usize) -> Result<Value, ParseError> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(ParseError::from_message(
            ParseErrorKind::TooDeeplyNested,
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ));
    }
    match reader.peek()? {
        "(" => read_sequence(reader, "(", ")", depth).map(|items| Value::List(items.into())),
        "[" => read_sequence(reader, "[", "]", depth).map(|items| Value::Vector(items.into())),
        "{" => read_map(reader, depth),
        closing @ (")" | "]" | "}") => Err(ParseError::with_found(
            ParseErrorKind::UnbalancedDelimiter,
            "Unexpected closing delimiter",
            closing,
        )),
        _ => read_atom(reader.next()?),
    }
}

fn read_sequence(
    reader: &mut TokenReader<'_>,
    open: &str,
    close: &str,
    depth: usize,
) -> Result<Vec<Value>, ParseError> {
    let first = reader.next()?;
    if first != open {
        return Err(ParseError::with_found(
            ParseErrorKind::InvalidSyntax,
            format!("Expected '{open}'"),
            first,
        ));
    }

    let mut items = Vec::new();
    loop {
        let token = reader.peek().map_err(|_| {
            ParseError::from_message(
                ParseErrorKind::Incomplete,
                format!("Unexpected end of input, expected '{close}'"),
            )
        })?;
        if token == close {
            reader.next()?;
            return Ok(items);
        }
        items.push(read_form(reader, depth + 1)?);
    }
}

fn read_map(reader: &mut TokenReader<'_>, depth: usize) -> Result<Value, ParseError> {
    let items = read_sequence(reader, "{", "}", depth)?;
    if items.len() % 2 != 0 {
        return Err(ParseError::from_message(
            ParseErrorKind::MalformedMap,
            "Map literal needs an even number of elements",
        ));
    }

    let mut map = BTreeMap::new();
    let mut items = items.into_iter();
    while let (Some(key), Some(value)) = (items.next(), items.next()) {
        let key = MapKey::try_from(key).map_err(|bad| {
            ParseError::with_found(
                ParseErrorKind::MalformedMap,
                "Map keys must be strings or keywords",
                &format!("{bad}"),
            )
        })?;
        // Duplicate keys: the last one wins.
        map.insert(key, value);
    }
    Ok(Value::Map(map.into()))
}

fn is_number_token(token: &str) -> bool {
    let digits = token.strip_prefix(['-', '+']).unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn read_atom(token: &str) -> Result<Value, ParseError> {
    if is_number_token(token) {
        return token.parse::<NumberType>().map(Value::Number).map_err(|_| {
            ParseError::with_found(
                ParseErrorKind::ImplementationLimit,
                "Integer literal out of range",
                token,
            )
        });
    }
    if token.starts_with('"') {
        return unescape_string(token).map(Value::String);
    }
    Ok(match token {
        "nil" => Value::Nil,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match token.strip_prefix(':') {
            Some(name) => Value::Keyword(name.to_owned()),
            None => Value::Symbol(token.to_owned()),
        },
    })
}

/// Decode a string token including its surrounding quotes.
fn unescape_string(token: &str) -> Result<String, ParseError> {
    let mut chars = token.chars();
    chars.next(); // opening quote
    let mut result = String::with_capacity(token.len());

    loop {
        match chars.next() {
            Some('"') => {
                return if chars.as_str().is_empty() {
                    Ok(result)
                } else {
                    Err(ParseError::with_found(
                        ParseErrorKind::InvalidSyntax,
                        "Unexpected characters after string literal",
                        token,
                    ))
                };
            }
            Some('\\') => match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('a') => result.push('\x07'),
                Some('b') => result.push('\x08'),
                Some('f') => result.push('\x0c'),
                Some('v') => result.push('\x0b'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('x') => result.push(code_point(&mut chars, None, 2, 16, token)?),
                Some('u') => result.push(code_point(&mut chars, None, 4, 16, token)?),
                Some('U') => result.push(code_point(&mut chars, None, 8, 16, token)?),
                Some(first @ '0'..='7') => {
                    result.push(code_point(&mut chars, Some(first), 3, 8, token)?);
                }
                Some(other) => {
                    return Err(ParseError::with_found(
                        ParseErrorKind::InvalidSyntax,
                        format!("Unknown escape sequence '\\{other}'"),
                        token,
                    ));
                }
                None => return Err(unterminated(token)),
            },
            Some(ch) => result.push(ch),
            None => return Err(unterminated(token)),
        }
    }
}

/// The character named by a numeric escape of exactly `width` digits
/// (`\xHH`, `\uHHHH`, `\UHHHHHHHH` or octal `\NNN`, at most `\377`).
fn code_point(
    chars: &mut std::str::Chars<'_>,
    first: Option<char>,
    width: usize,
    radix: u32,
    token: &str,
) -> Result<char, ParseError> {
    let invalid = || {
        ParseError::with_found(
            ParseErrorKind::InvalidSyntax,
            "Invalid numeric escape sequence",
            token,
        )
    };

    let mut code: u32 = 0;
    let rest = width - usize::from(first.is_some());
    let digits = first.into_iter().chain(chars.by_ref().take(rest));
    let mut count = 0;
    for digit in digits {
        code = code * radix + digit.to_digit(radix).ok_or_else(invalid)?;
        count += 1;
    }
    if count != width || (radix == 8 && code > 0o377) {
        return Err(invalid());
    }
    char::from_u32(code).ok_or_else(invalid)
}

fn unterminated(token: &str) -> ParseError {
    ParseError::with_found(
        ParseErrorKind::UnterminatedString,
        "Unterminated string",
        token,
    )
}
