//! Streaming JSON reader.
//!
//! A pull parser over a borrowed `&str`. The reader state is a cursor plus
//! a scope stack, so [`JsonReader::peek_json`] is a plain clone whose cost
//! is bounded by nesting depth: nothing of the document is buffered.
//!
//! Strings without escapes are handed out borrowed from the input.

use std::borrow::Cow;
use std::fmt::{self, Write as _};

use serde_json::{Map, Number, Value};

use super::error::DecodeError;

/// Deepest nesting of objects and arrays a reader accepts.
pub const MAX_DEPTH: usize = 128;

/// Kind of the next token in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    BeginArray,
    EndArray,
    BeginObject,
    EndObject,
    Name,
    String,
    Number,
    Boolean,
    Null,
    EndDocument,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Token::BeginArray => "BEGIN_ARRAY",
            Token::EndArray => "END_ARRAY",
            Token::BeginObject => "BEGIN_OBJECT",
            Token::EndObject => "END_OBJECT",
            Token::Name => "NAME",
            Token::String => "STRING",
            Token::Number => "NUMBER",
            Token::Boolean => "BOOLEAN",
            Token::Null => "NULL",
            Token::EndDocument => "END_DOCUMENT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    EmptyDocument,
    NonEmptyDocument,
    EmptyObject,
    /// A name has been read; the `:` and its value are next.
    DanglingName,
    NonEmptyObject,
    EmptyArray,
    NonEmptyArray,
}

/// Token recognized by the last peek. Brackets and literals are already
/// consumed; strings, names and numbers still start at `pos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Peeked {
    BeginObject,
    EndObject,
    BeginArray,
    EndArray,
    Name,
    String,
    Number,
    True,
    False,
    Null,
    EndDocument,
}

impl Peeked {
    fn token(self) -> Token {
        match self {
            Peeked::BeginObject => Token::BeginObject,
            Peeked::EndObject => Token::EndObject,
            Peeked::BeginArray => Token::BeginArray,
            Peeked::EndArray => Token::EndArray,
            Peeked::Name => Token::Name,
            Peeked::String => Token::String,
            Peeked::Number => Token::Number,
            Peeked::True | Peeked::False => Token::Boolean,
            Peeked::Null => Token::Null,
            Peeked::EndDocument => Token::EndDocument,
        }
    }
}

#[derive(Debug, Clone)]
enum PathSegment {
    Field(Option<String>),
    Index(usize),
}

/// A key the reader lets through in strict mode, at the scope depth of the
/// object it belongs to. `strip` keys are also left out of the fields
/// adapters collect.
#[derive(Debug, Clone)]
struct KnownKey {
    key: String,
    depth: usize,
    strip: bool,
}

/// Pull reader over a single JSON document.
#[derive(Debug, Clone)]
pub struct JsonReader<'a> {
    input: &'a str,
    pos: usize,
    peeked: Option<Peeked>,
    scopes: Vec<Scope>,
    path: Vec<PathSegment>,
    fail_on_unknown: bool,
    /// Keys tolerated by [`skip_name`](Self::skip_name) in strict mode.
    discriminators: Vec<KnownKey>,
}

impl<'a> JsonReader<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            peeked: None,
            scopes: vec![Scope::EmptyDocument],
            path: Vec::new(),
            fail_on_unknown: false,
            discriminators: Vec::new(),
        }
    }

    /// Whether [`skip_name`](Self::skip_name) rejects names.
    pub fn fail_on_unknown(&self) -> bool {
        self.fail_on_unknown
    }

    pub fn set_fail_on_unknown(&mut self, fail_on_unknown: bool) {
        self.fail_on_unknown = fail_on_unknown;
    }

    /// Non-destructive view of the reader. Reading from the returned reader
    /// leaves `self` untouched.
    pub fn peek_json(&self) -> JsonReader<'a> {
        self.clone()
    }

    /// JSONPath-like location of the reader, e.g. `$.error_logs.order`.
    pub fn path(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.path {
            match segment {
                PathSegment::Field(Some(name)) => {
                    out.push('.');
                    out.push_str(name);
                }
                PathSegment::Field(None) => {}
                PathSegment::Index(index) => {
                    let _ = write!(out, "[{index}]");
                }
            }
        }
        out
    }

    pub fn peek(&mut self) -> Result<Token, DecodeError> {
        Ok(self.peek_internal()?.token())
    }

    pub fn has_next(&mut self) -> Result<bool, DecodeError> {
        Ok(!matches!(
            self.peek_internal()?,
            Peeked::EndObject | Peeked::EndArray | Peeked::EndDocument
        ))
    }

    pub fn begin_object(&mut self) -> Result<(), DecodeError> {
        self.expect(Peeked::BeginObject, "BEGIN_OBJECT")?;
        self.check_depth()?;
        self.scopes.push(Scope::EmptyObject);
        self.path.push(PathSegment::Field(None));
        Ok(())
    }

    pub fn end_object(&mut self) -> Result<(), DecodeError> {
        self.expect(Peeked::EndObject, "END_OBJECT")?;
        self.scopes.pop();
        self.path.pop();
        self.value_consumed();
        Ok(())
    }

    pub fn begin_array(&mut self) -> Result<(), DecodeError> {
        self.expect(Peeked::BeginArray, "BEGIN_ARRAY")?;
        self.check_depth()?;
        self.scopes.push(Scope::EmptyArray);
        self.path.push(PathSegment::Index(0));
        Ok(())
    }

    pub fn end_array(&mut self) -> Result<(), DecodeError> {
        self.expect(Peeked::EndArray, "END_ARRAY")?;
        self.scopes.pop();
        self.path.pop();
        self.value_consumed();
        Ok(())
    }

    pub fn next_name(&mut self) -> Result<Cow<'a, str>, DecodeError> {
        self.expect(Peeked::Name, "a name")?;
        let name = self.read_string_literal()?;
        self.set_path_name(&name);
        Ok(name)
    }

    /// Consumes the next name if it is one of `names` and returns its
    /// index. Otherwise the name is left in place and `None` is returned.
    pub fn select_name(&mut self, names: &[&str]) -> Result<Option<usize>, DecodeError> {
        let peeked = self.peek_internal()?;
        if peeked != Peeked::Name {
            return Err(self.unexpected("a name", peeked));
        }
        let start = self.pos;
        let name = self.read_string_literal()?;
        match names.iter().position(|candidate| *candidate == name) {
            Some(index) => {
                self.peeked = None;
                self.set_path_name(&name);
                Ok(Some(index))
            }
            None => {
                self.pos = start;
                Ok(None)
            }
        }
    }

    /// Skips the next name. In strict mode only discriminator keys may be
    /// skipped; any other name fails with [`DecodeError::UnexpectedKey`].
    pub fn skip_name(&mut self) -> Result<(), DecodeError> {
        let name = self.next_name()?;
        if self.fail_on_unknown && !self.tolerates(&name) {
            return Err(DecodeError::UnexpectedKey {
                name: name.into_owned(),
                path: self.path(),
            });
        }
        Ok(())
    }

    /// Whether `name` is a discriminator key of the object being read.
    pub fn is_discriminator(&self, name: &str) -> bool {
        self.known_key(name).is_some_and(|known| known.strip)
    }

    /// Whether strict mode lets `name` through in the object being read.
    pub fn tolerates(&self, name: &str) -> bool {
        self.known_key(name).is_some()
    }

    fn known_key(&self, name: &str) -> Option<&KnownKey> {
        let depth = self.scopes.len();
        self.discriminators
            .iter()
            .rev()
            .find(|known| known.depth == depth && known.key == name)
    }

    /// Registers `key` as the discriminator of the object about to be read.
    pub(crate) fn push_discriminator(&mut self, key: &str) {
        self.push_known(key, true);
    }

    /// Lets `key` through in strict mode for the object about to be read,
    /// without hiding it from the adapter reading that object.
    pub(crate) fn push_tolerated(&mut self, key: &str) {
        self.push_known(key, false);
    }

    fn push_known(&mut self, key: &str, strip: bool) {
        self.discriminators.push(KnownKey {
            key: key.to_owned(),
            depth: self.scopes.len() + 1,
            strip,
        });
    }

    pub(crate) fn pop_discriminator(&mut self) {
        self.discriminators.pop();
    }

    /// Reads a string value. Numbers are accepted and returned as their
    /// literal text.
    pub fn next_string(&mut self) -> Result<Cow<'a, str>, DecodeError> {
        match self.peek_internal()? {
            Peeked::String => {
                self.peeked = None;
                let value = self.read_string_literal()?;
                self.value_consumed();
                Ok(value)
            }
            Peeked::Number => {
                self.peeked = None;
                let literal = self.read_number_literal()?;
                self.value_consumed();
                Ok(Cow::Borrowed(literal))
            }
            other => Err(self.unexpected("a string", other)),
        }
    }

    pub fn next_bool(&mut self) -> Result<bool, DecodeError> {
        let value = match self.peek_internal()? {
            Peeked::True => true,
            Peeked::False => false,
            other => return Err(self.unexpected("a boolean", other)),
        };
        self.peeked = None;
        self.value_consumed();
        Ok(value)
    }

    pub fn next_null(&mut self) -> Result<(), DecodeError> {
        match self.peek_internal()? {
            Peeked::Null => {
                self.peeked = None;
                self.value_consumed();
                Ok(())
            }
            other => Err(self.unexpected("null", other)),
        }
    }

    pub fn next_f64(&mut self) -> Result<f64, DecodeError> {
        let peeked = self.peek_internal()?;
        if peeked != Peeked::Number {
            return Err(self.unexpected("a double", peeked));
        }
        self.peeked = None;
        let start = self.pos;
        let literal = self.read_number_literal()?;
        let value = literal
            .parse::<f64>()
            .map_err(|_| self.syntax_at(start, "invalid number"))?;
        self.value_consumed();
        Ok(value)
    }

    pub fn next_i64(&mut self) -> Result<i64, DecodeError> {
        let peeked = self.peek_internal()?;
        if peeked != Peeked::Number {
            return Err(self.unexpected("an int", peeked));
        }
        self.peeked = None;
        let literal = self.read_number_literal()?;
        let value = match literal.parse::<i64>() {
            Ok(value) => value,
            Err(_) => match literal.parse::<f64>() {
                Ok(double)
                    if double.fract() == 0.0
                        && double >= i64::MIN as f64
                        && double < i64::MAX as f64 =>
                {
                    double as i64
                }
                _ => {
                    return Err(DecodeError::Custom(format!(
                        "expected an int but was {literal} at path {}",
                        self.path()
                    )));
                }
            },
        };
        self.value_consumed();
        Ok(value)
    }

    /// Reads the next value as a [`serde_json::Value`]. Integral literals
    /// that fit in 64 bits stay integers; everything else is a double.
    pub fn read_value(&mut self) -> Result<Value, DecodeError> {
        match self.peek()? {
            Token::BeginObject => {
                let mut map = Map::new();
                self.begin_object()?;
                while self.has_next()? {
                    let name = self.next_name()?.into_owned();
                    let value = self.read_value()?;
                    if map.contains_key(&name) {
                        return Err(DecodeError::Custom(format!(
                            "map key '{name}' has multiple values at path {}",
                            self.path()
                        )));
                    }
                    map.insert(name, value);
                }
                self.end_object()?;
                Ok(Value::Object(map))
            }
            Token::BeginArray => {
                let mut items = Vec::new();
                self.begin_array()?;
                while self.has_next()? {
                    items.push(self.read_value()?);
                }
                self.end_array()?;
                Ok(Value::Array(items))
            }
            Token::String => Ok(Value::String(self.next_string()?.into_owned())),
            Token::Number => Ok(Value::Number(self.next_number()?)),
            Token::Boolean => Ok(Value::Bool(self.next_bool()?)),
            Token::Null => {
                self.next_null()?;
                Ok(Value::Null)
            }
            other => Err(DecodeError::UnexpectedToken {
                expected: "a value",
                found: other,
                path: self.path(),
            }),
        }
    }

    /// Skips the next value, including any nested objects and arrays.
    pub fn skip_value(&mut self) -> Result<(), DecodeError> {
        let mut depth = 0usize;
        loop {
            match self.peek_internal()? {
                Peeked::BeginObject => {
                    self.begin_object()?;
                    depth += 1;
                }
                Peeked::BeginArray => {
                    self.begin_array()?;
                    depth += 1;
                }
                Peeked::EndObject if depth > 0 => {
                    self.end_object()?;
                    depth -= 1;
                }
                Peeked::EndArray if depth > 0 => {
                    self.end_array()?;
                    depth -= 1;
                }
                Peeked::Name if depth > 0 => {
                    self.next_name()?;
                }
                Peeked::String => {
                    self.next_string()?;
                }
                Peeked::Number => {
                    self.peeked = None;
                    self.read_number_literal()?;
                    self.value_consumed();
                }
                Peeked::True | Peeked::False | Peeked::Null => {
                    self.peeked = None;
                    self.value_consumed();
                }
                other => return Err(self.unexpected("a value", other)),
            }
            if depth == 0 {
                return Ok(());
            }
        }
    }

    /// Fails unless the whole document has been consumed.
    pub fn expect_end(&mut self) -> Result<(), DecodeError> {
        match self.peek_internal()? {
            Peeked::EndDocument => Ok(()),
            _ => Err(DecodeError::NotFullyConsumed { path: self.path() }),
        }
    }

    fn next_number(&mut self) -> Result<Number, DecodeError> {
        let peeked = self.peek_internal()?;
        if peeked != Peeked::Number {
            return Err(self.unexpected("a number", peeked));
        }
        self.peeked = None;
        let start = self.pos;
        let literal = self.read_number_literal()?;
        let integral = !literal.contains(['.', 'e', 'E']);
        let number = if let (true, Ok(value)) = (integral, literal.parse::<i64>()) {
            Number::from(value)
        } else if let (true, Ok(value)) = (integral, literal.parse::<u64>()) {
            Number::from(value)
        } else {
            literal
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .ok_or_else(|| self.syntax_at(start, "invalid number"))?
        };
        self.value_consumed();
        Ok(number)
    }

    /// The document scope sits at the bottom of `scopes`, so its length is
    /// the nesting depth of the value being opened.
    fn check_depth(&self) -> Result<(), DecodeError> {
        if self.scopes.len() > MAX_DEPTH {
            return Err(DecodeError::NestingTooDeep {
                limit: MAX_DEPTH,
                path: self.path(),
            });
        }
        Ok(())
    }

    fn expect(&mut self, want: Peeked, expected: &'static str) -> Result<(), DecodeError> {
        let peeked = self.peek_internal()?;
        if peeked != want {
            return Err(self.unexpected(expected, peeked));
        }
        self.peeked = None;
        Ok(())
    }

    fn peek_internal(&mut self) -> Result<Peeked, DecodeError> {
        if let Some(peeked) = self.peeked {
            return Ok(peeked);
        }
        let peeked = self.do_peek()?;
        self.peeked = Some(peeked);
        Ok(peeked)
    }

    fn do_peek(&mut self) -> Result<Peeked, DecodeError> {
        // The document scope is never popped.
        let top = self.scopes.len() - 1;
        match self.scopes[top] {
            Scope::EmptyArray => {
                self.scopes[top] = Scope::NonEmptyArray;
                if self.next_non_whitespace() == Some(b']') {
                    self.pos += 1;
                    return Ok(Peeked::EndArray);
                }
            }
            Scope::NonEmptyArray => match self.next_non_whitespace() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Peeked::EndArray);
                }
                Some(b',') => self.pos += 1,
                Some(_) => return Err(self.syntax("unterminated array")),
                None => return Err(self.eof()),
            },
            scope @ (Scope::EmptyObject | Scope::NonEmptyObject) => {
                let empty = scope == Scope::EmptyObject;
                let mut next = self.next_non_whitespace();
                if !empty {
                    match next {
                        Some(b'}') => {
                            self.pos += 1;
                            return Ok(Peeked::EndObject);
                        }
                        Some(b',') => {
                            self.pos += 1;
                            next = self.next_non_whitespace();
                        }
                        Some(_) => return Err(self.syntax("unterminated object")),
                        None => return Err(self.eof()),
                    }
                }
                return match next {
                    Some(b'"') => {
                        self.scopes[top] = Scope::DanglingName;
                        Ok(Peeked::Name)
                    }
                    Some(b'}') if empty => {
                        self.pos += 1;
                        Ok(Peeked::EndObject)
                    }
                    Some(_) => Err(self.syntax("expected a name")),
                    None => Err(self.eof()),
                };
            }
            Scope::DanglingName => {
                self.scopes[top] = Scope::NonEmptyObject;
                match self.next_non_whitespace() {
                    Some(b':') => self.pos += 1,
                    Some(_) => return Err(self.syntax("expected ':'")),
                    None => return Err(self.eof()),
                }
            }
            Scope::EmptyDocument => self.scopes[top] = Scope::NonEmptyDocument,
            Scope::NonEmptyDocument => {
                return match self.next_non_whitespace() {
                    None => Ok(Peeked::EndDocument),
                    Some(_) => Err(DecodeError::NotFullyConsumed { path: self.path() }),
                };
            }
        }

        match self.next_non_whitespace() {
            Some(b'{') => {
                self.pos += 1;
                Ok(Peeked::BeginObject)
            }
            Some(b'[') => {
                self.pos += 1;
                Ok(Peeked::BeginArray)
            }
            Some(b'"') => Ok(Peeked::String),
            Some(b't') => self.literal("true", Peeked::True),
            Some(b'f') => self.literal("false", Peeked::False),
            Some(b'n') => self.literal("null", Peeked::Null),
            Some(b'-' | b'0'..=b'9') => Ok(Peeked::Number),
            Some(_) => Err(self.syntax("unexpected character")),
            None => Err(self.eof()),
        }
    }

    fn literal(&mut self, word: &'static str, peeked: Peeked) -> Result<Peeked, DecodeError> {
        let bytes = self.input.as_bytes();
        let end = self.pos + word.len();
        let matches = bytes[self.pos..].starts_with(word.as_bytes())
            && !bytes.get(end).is_some_and(u8::is_ascii_alphanumeric);
        if !matches {
            return Err(self.syntax("unexpected literal"));
        }
        self.pos = end;
        Ok(peeked)
    }

    fn next_non_whitespace(&mut self) -> Option<u8> {
        let bytes = self.input.as_bytes();
        while let Some(&c) = bytes.get(self.pos) {
            match c {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                _ => return Some(c),
            }
        }
        None
    }

    /// Reads a quoted string starting at `pos`.
    fn read_string_literal(&mut self) -> Result<Cow<'a, str>, DecodeError> {
        let input: &'a str = self.input;
        let bytes = input.as_bytes();
        let start = self.pos + 1;
        let mut i = start;

        loop {
            match bytes.get(i) {
                Some(b'"') => {
                    self.pos = i + 1;
                    return Ok(Cow::Borrowed(&input[start..i]));
                }
                Some(b'\\') => break,
                Some(c) if *c < 0x20 => {
                    return Err(self.syntax_at(i, "unescaped control character"));
                }
                Some(_) => i += 1,
                None => return Err(self.eof()),
            }
        }

        let mut out = String::from(&input[start..i]);
        loop {
            match bytes.get(i) {
                Some(b'"') => {
                    self.pos = i + 1;
                    return Ok(Cow::Owned(out));
                }
                Some(b'\\') => {
                    let escaped = *bytes.get(i + 1).ok_or_else(|| self.eof())?;
                    i += 2;
                    match escaped {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{8}'),
                        b'f' => out.push('\u{c}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => {
                            let (ch, next) = self.read_unicode_escape(i)?;
                            out.push(ch);
                            i = next;
                        }
                        _ => return Err(self.syntax_at(i - 1, "invalid escape sequence")),
                    }
                }
                Some(c) if *c < 0x20 => {
                    return Err(self.syntax_at(i, "unescaped control character"));
                }
                Some(_) => {
                    let run = i;
                    while let Some(&c) = bytes.get(i) {
                        if c == b'"' || c == b'\\' || c < 0x20 {
                            break;
                        }
                        i += 1;
                    }
                    out.push_str(&input[run..i]);
                }
                None => return Err(self.eof()),
            }
        }
    }

    /// Decodes the four hex digits at `at`, pairing surrogates. Returns the
    /// character and the index just past the escape.
    fn read_unicode_escape(&self, at: usize) -> Result<(char, usize), DecodeError> {
        let bytes = self.input.as_bytes();
        let first = self.hex4(at)?;
        let mut next = at + 4;
        let code = if (0xD800..0xDC00).contains(&first) {
            if bytes.get(next) != Some(&b'\\') || bytes.get(next + 1) != Some(&b'u') {
                return Err(self.syntax_at(at, "unpaired surrogate"));
            }
            let second = self.hex4(next + 2)?;
            if !(0xDC00..0xE000).contains(&second) {
                return Err(self.syntax_at(at, "unpaired surrogate"));
            }
            next += 6;
            0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
        } else {
            first
        };
        char::from_u32(code)
            .map(|ch| (ch, next))
            .ok_or_else(|| self.syntax_at(at, "invalid unicode escape"))
    }

    fn hex4(&self, at: usize) -> Result<u32, DecodeError> {
        let digits = self
            .input
            .as_bytes()
            .get(at..at + 4)
            .ok_or_else(|| self.eof())?;
        digits.iter().try_fold(0u32, |acc, &digit| {
            let value = char::from(digit)
                .to_digit(16)
                .ok_or_else(|| self.syntax_at(at, "invalid unicode escape"))?;
            Ok(acc * 16 + value)
        })
    }

    fn read_number_literal(&mut self) -> Result<&'a str, DecodeError> {
        let input: &'a str = self.input;
        let bytes = input.as_bytes();
        let start = self.pos;
        let mut i = start;
        let digits = |i: &mut usize| {
            let from = *i;
            while matches!(bytes.get(*i), Some(b'0'..=b'9')) {
                *i += 1;
            }
            *i > from
        };

        if bytes.get(i) == Some(&b'-') {
            i += 1;
        }
        match bytes.get(i) {
            Some(b'0') => i += 1,
            Some(b'1'..=b'9') => {
                digits(&mut i);
            }
            _ => return Err(self.syntax_at(i, "invalid number")),
        }
        if bytes.get(i) == Some(&b'.') {
            i += 1;
            if !digits(&mut i) {
                return Err(self.syntax_at(i, "invalid number"));
            }
        }
        if matches!(bytes.get(i), Some(b'e' | b'E')) {
            i += 1;
            if matches!(bytes.get(i), Some(b'+' | b'-')) {
                i += 1;
            }
            if !digits(&mut i) {
                return Err(self.syntax_at(i, "invalid number"));
            }
        }
        self.pos = i;
        Ok(&input[start..i])
    }

    fn set_path_name(&mut self, name: &str) {
        if let Some(PathSegment::Field(slot)) = self.path.last_mut() {
            *slot = Some(name.to_owned());
        }
    }

    fn value_consumed(&mut self) {
        if let Some(PathSegment::Index(index)) = self.path.last_mut() {
            *index += 1;
        }
    }

    fn syntax(&self, message: &'static str) -> DecodeError {
        self.syntax_at(self.pos, message)
    }

    fn syntax_at(&self, offset: usize, message: &'static str) -> DecodeError {
        DecodeError::Syntax {
            message,
            offset,
            path: self.path(),
        }
    }

    fn eof(&self) -> DecodeError {
        DecodeError::UnexpectedEof { path: self.path() }
    }

    fn unexpected(&self, expected: &'static str, found: Peeked) -> DecodeError {
        DecodeError::UnexpectedToken {
            expected,
            found: found.token(),
            path: self.path(),
        }
    }
}
