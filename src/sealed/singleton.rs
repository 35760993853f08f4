//! Adapter for subtypes with exactly one instance.

use crate::adapter::{JsonAdapter, Sealed};
use crate::json::{DecodeError, EncodeError, JsonReader, JsonWriter};

/// Encodes as `{}` and decodes any object to the same instance.
///
/// Names in the object are skipped with [`JsonReader::skip_name`], so a
/// strict reader rejects everything except discriminator keys.
pub struct SingletonAdapter<T> {
    instance: T,
}

impl<T: Sealed> SingletonAdapter<T> {
    pub fn new(instance: T) -> Self {
        Self { instance }
    }

    pub fn instance(&self) -> &T {
        &self.instance
    }
}

impl<T: Sealed> JsonAdapter<T> for SingletonAdapter<T> {
    fn decode(&self, reader: &mut JsonReader<'_>) -> Result<T, DecodeError> {
        skip_object(reader)?;
        Ok(self.instance.clone())
    }

    fn encode(&self, writer: &mut JsonWriter, _value: &T) -> Result<(), EncodeError> {
        writer.begin_object()?;
        writer.end_object()
    }
}

pub(crate) fn skip_object(reader: &mut JsonReader<'_>) -> Result<(), DecodeError> {
    reader.begin_object()?;
    while reader.has_next()? {
        reader.skip_name()?;
        reader.skip_value()?;
    }
    reader.end_object()
}
