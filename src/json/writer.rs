//! Compact JSON writer.
//!
//! Supports flattening: between [`JsonWriter::begin_flatten`] and
//! [`JsonWriter::end_flatten`], an object opened directly inside the current
//! object is merged into it instead of being nested. The sealed adapter uses
//! this to put the discriminator and the subtype's own fields in one object.

use serde_json::{Number, Value};

use super::error::EncodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    EmptyDocument,
    NonEmptyDocument,
    EmptyObject,
    DanglingName,
    NonEmptyObject,
    EmptyArray,
    NonEmptyArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flatten {
    /// The next object opened at this depth is merged into the enclosing one.
    Armed(usize),
    /// An object at this depth is currently merged; its close is swallowed.
    Open(usize),
}

/// Restores the flatten state saved by [`JsonWriter::begin_flatten`].
#[derive(Debug, Clone, Copy)]
#[must_use = "pass the token to end_flatten"]
pub struct FlattenToken(Option<Flatten>);

#[derive(Debug)]
pub struct JsonWriter {
    out: String,
    scopes: Vec<Scope>,
    flatten: Option<Flatten>,
}

impl Default for JsonWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonWriter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            scopes: vec![Scope::EmptyDocument],
            flatten: None,
        }
    }

    /// Returns the written document. Fails if a container is still open.
    pub fn finish(self) -> Result<String, EncodeError> {
        match self.scopes.as_slice() {
            [Scope::NonEmptyDocument] => Ok(self.out),
            [Scope::EmptyDocument] => Err(EncodeError::Nesting("no value written")),
            _ => Err(EncodeError::Nesting("incomplete document")),
        }
    }

    pub fn begin_object(&mut self) -> Result<(), EncodeError> {
        let depth = self.scopes.len();
        if self.flatten == Some(Flatten::Armed(depth))
            && matches!(self.top(), Scope::EmptyObject | Scope::NonEmptyObject)
        {
            self.flatten = Some(Flatten::Open(depth));
            return Ok(());
        }
        self.before_value()?;
        self.scopes.push(Scope::EmptyObject);
        self.out.push('{');
        Ok(())
    }

    pub fn end_object(&mut self) -> Result<(), EncodeError> {
        let depth = self.scopes.len();
        if self.flatten == Some(Flatten::Open(depth)) {
            self.flatten = Some(Flatten::Armed(depth));
            return Ok(());
        }
        match self.top() {
            Scope::EmptyObject | Scope::NonEmptyObject => {
                self.scopes.pop();
                self.out.push('}');
                Ok(())
            }
            Scope::DanglingName => Err(EncodeError::Nesting("dangling name")),
            _ => Err(EncodeError::Nesting("end_object outside an object")),
        }
    }

    pub fn begin_array(&mut self) -> Result<(), EncodeError> {
        self.before_value()?;
        self.scopes.push(Scope::EmptyArray);
        self.out.push('[');
        Ok(())
    }

    pub fn end_array(&mut self) -> Result<(), EncodeError> {
        match self.top() {
            Scope::EmptyArray | Scope::NonEmptyArray => {
                self.scopes.pop();
                self.out.push(']');
                Ok(())
            }
            _ => Err(EncodeError::Nesting("end_array outside an array")),
        }
    }

    pub fn name(&mut self, name: &str) -> Result<(), EncodeError> {
        match self.top() {
            Scope::EmptyObject => {}
            Scope::NonEmptyObject => self.out.push(','),
            Scope::DanglingName => return Err(EncodeError::Nesting("name after name")),
            _ => return Err(EncodeError::Nesting("name outside an object")),
        }
        self.set_top(Scope::DanglingName);
        self.write_quoted(name);
        self.out.push(':');
        Ok(())
    }

    pub fn string_value(&mut self, value: &str) -> Result<(), EncodeError> {
        self.before_value()?;
        self.write_quoted(value);
        Ok(())
    }

    pub fn bool_value(&mut self, value: bool) -> Result<(), EncodeError> {
        self.before_value()?;
        self.out.push_str(if value { "true" } else { "false" });
        Ok(())
    }

    pub fn null_value(&mut self) -> Result<(), EncodeError> {
        self.before_value()?;
        self.out.push_str("null");
        Ok(())
    }

    pub fn i64_value(&mut self, value: i64) -> Result<(), EncodeError> {
        self.before_value()?;
        self.out.push_str(&value.to_string());
        Ok(())
    }

    pub fn f64_value(&mut self, value: f64) -> Result<(), EncodeError> {
        let number = Number::from_f64(value).ok_or(EncodeError::NonFinite(value))?;
        self.before_value()?;
        self.out.push_str(&number.to_string());
        Ok(())
    }

    /// Writes a whole [`serde_json::Value`]. Objects go through
    /// [`begin_object`](Self::begin_object), so they flatten like any other.
    pub fn json_value(&mut self, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Null => self.null_value(),
            Value::Bool(b) => self.bool_value(*b),
            Value::Number(n) => {
                self.before_value()?;
                self.out.push_str(&n.to_string());
                Ok(())
            }
            Value::String(s) => self.string_value(s),
            Value::Array(items) => {
                self.begin_array()?;
                for item in items {
                    self.json_value(item)?;
                }
                self.end_array()
            }
            Value::Object(map) => {
                self.begin_object()?;
                for (name, item) in map {
                    self.name(name)?;
                    self.json_value(item)?;
                }
                self.end_object()
            }
        }
    }

    /// Arms flattening for objects opened directly inside the current one.
    pub fn begin_flatten(&mut self) -> FlattenToken {
        let token = FlattenToken(self.flatten);
        self.flatten = Some(Flatten::Armed(self.scopes.len()));
        token
    }

    pub fn end_flatten(&mut self, token: FlattenToken) {
        self.flatten = token.0;
    }

    fn top(&self) -> Scope {
        self.scopes
            .last()
            .copied()
            .unwrap_or(Scope::EmptyDocument)
    }

    fn set_top(&mut self, scope: Scope) {
        if let Some(top) = self.scopes.last_mut() {
            *top = scope;
        }
    }

    fn before_value(&mut self) -> Result<(), EncodeError> {
        match self.top() {
            Scope::EmptyDocument => self.set_top(Scope::NonEmptyDocument),
            Scope::NonEmptyDocument => {
                return Err(EncodeError::Nesting("JSON must have only one top-level value"));
            }
            Scope::EmptyArray => self.set_top(Scope::NonEmptyArray),
            Scope::NonEmptyArray => self.out.push(','),
            Scope::DanglingName => self.set_top(Scope::NonEmptyObject),
            Scope::EmptyObject | Scope::NonEmptyObject => {
                return Err(EncodeError::Nesting("value inside an object without a name"));
            }
        }
        Ok(())
    }

    fn write_quoted(&mut self, value: &str) {
        self.out.push('"');
        for ch in value.chars() {
            match ch {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                '\u{8}' => self.out.push_str("\\b"),
                '\u{c}' => self.out.push_str("\\f"),
                c if c < '\u{20}' => {
                    self.out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }
}
