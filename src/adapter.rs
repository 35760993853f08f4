//! Adapter capability for one concrete subtype, and the serde bridge.
//!
//! A [`JsonAdapter<T>`] decodes a value of the hierarchy root type `T`
//! from a [`JsonReader`] and encodes it back to a [`JsonWriter`]. The
//! sealed adapter holds one per subtype and never looks inside them.

use std::any::type_name;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::json::{DecodeError, EncodeError, JsonReader, JsonWriter};

/// Root type of a sealed hierarchy.
///
/// `subtype` names the concrete subtype of a value. The write path uses it
/// to find the label to emit, so it must match the name the subtype was
/// declared with.
pub trait Sealed: Clone + Send + Sync + 'static {
    fn subtype(&self) -> &str;
}

pub trait JsonAdapter<T>: Send + Sync {
    fn decode(&self, reader: &mut JsonReader<'_>) -> Result<T, DecodeError>;

    fn encode(&self, writer: &mut JsonWriter, value: &T) -> Result<(), EncodeError>;

    /// Decodes a complete document.
    fn from_json(&self, input: &str) -> Result<T, DecodeError> {
        let mut reader = JsonReader::new(input);
        let value = self.decode(&mut reader)?;
        reader.expect_end()?;
        Ok(value)
    }

    fn to_json(&self, value: &T) -> Result<String, EncodeError> {
        let mut writer = JsonWriter::new();
        self.encode(&mut writer, value)?;
        writer.finish()
    }

    /// Subtype names, besides the one the adapter is registered under, that
    /// it can encode. Hierarchy adapters report their leaves.
    fn encodable_subtypes(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Makes unknown names fail while the wrapped adapter decodes.
pub struct FailOnUnknown<A>(A);

impl<A> FailOnUnknown<A> {
    pub fn new(adapter: A) -> Self {
        Self(adapter)
    }
}

impl<T, A: JsonAdapter<T>> JsonAdapter<T> for FailOnUnknown<A> {
    fn decode(&self, reader: &mut JsonReader<'_>) -> Result<T, DecodeError> {
        let previous = reader.fail_on_unknown();
        reader.set_fail_on_unknown(true);
        let result = self.0.decode(reader);
        reader.set_fail_on_unknown(previous);
        result
    }

    fn encode(&self, writer: &mut JsonWriter, value: &T) -> Result<(), EncodeError> {
        self.0.encode(writer, value)
    }

    fn encodable_subtypes(&self) -> Vec<String> {
        self.0.encodable_subtypes()
    }
}

/// Adapter for a subtype whose payload is a serde type `S`.
///
/// Decoding reads the object into a map, drops the discriminator keys of
/// the enclosing hierarchy and hands the rest to serde, so unknown fields
/// follow `S`'s own serde attributes. `wrap` and `unwrap` convert between
/// the payload and the root type.
///
/// A strict reader also rejects names the decoded payload does not
/// serialize back. Fields given as `null` are let through, since optional
/// fields often skip serializing their empty value.
pub struct SerdeAdapter<S, T> {
    wrap: fn(S) -> T,
    unwrap: fn(&T) -> Option<&S>,
}

impl<S, T> SerdeAdapter<S, T> {
    pub fn new(wrap: fn(S) -> T, unwrap: fn(&T) -> Option<&S>) -> Self {
        Self { wrap, unwrap }
    }
}

impl<S, T> JsonAdapter<T> for SerdeAdapter<S, T>
where
    S: Serialize + DeserializeOwned,
    T: Sealed,
{
    fn decode(&self, reader: &mut JsonReader<'_>) -> Result<T, DecodeError> {
        let path = reader.path();
        let strict = reader.fail_on_unknown();
        let Fields { values, tolerated } = read_fields(reader)?;
        let checked: Vec<String> = if strict {
            values
                .iter()
                .filter(|(name, value)| !value.is_null() && !tolerated.contains(*name))
                .map(|(name, _)| name.clone())
                .collect()
        } else {
            Vec::new()
        };
        let payload: S = serde_json::from_value(Value::Object(values)).map_err(|source| {
            DecodeError::Payload {
                path: path.clone(),
                source,
            }
        })?;
        reject_unused(&payload, checked, &path)?;
        Ok((self.wrap)(payload))
    }

    fn encode(&self, writer: &mut JsonWriter, value: &T) -> Result<(), EncodeError> {
        let payload = (self.unwrap)(value).ok_or_else(|| EncodeError::SubtypeMismatch {
            expected: type_name::<S>(),
            found: value.subtype().to_owned(),
        })?;
        writer.json_value(&serde_json::to_value(payload)?)
    }
}

/// Fails on the first of `names` that `payload` does not serialize.
fn reject_unused<S: Serialize>(payload: &S, names: Vec<String>, path: &str) -> Result<(), DecodeError> {
    if names.is_empty() {
        return Ok(());
    }
    let known = serde_json::to_value(payload).map_err(|source| DecodeError::Payload {
        path: path.to_owned(),
        source,
    })?;
    let Value::Object(known) = known else {
        return Ok(());
    };
    match names.into_iter().find(|name| !known.contains_key(name)) {
        Some(name) => Err(DecodeError::UnexpectedKey {
            path: format!("{path}.{name}"),
            name,
        }),
        None => Ok(()),
    }
}

/// The fields of one object, discriminator keys left out.
pub(crate) struct Fields {
    pub(crate) values: Map<String, Value>,
    /// Names in `values` that a strict reader lets through anyway.
    pub(crate) tolerated: Vec<String>,
}

pub(crate) fn read_fields(reader: &mut JsonReader<'_>) -> Result<Fields, DecodeError> {
    let mut fields = Fields {
        values: Map::new(),
        tolerated: Vec::new(),
    };
    reader.begin_object()?;
    while reader.has_next()? {
        let name = reader.next_name()?;
        if reader.is_discriminator(&name) {
            reader.skip_value()?;
            continue;
        }
        if reader.tolerates(&name) {
            fields.tolerated.push(name.clone().into_owned());
        }
        let value = reader.read_value()?;
        fields.values.insert(name.into_owned(), value);
    }
    reader.end_object()?;
    Ok(fields)
}
