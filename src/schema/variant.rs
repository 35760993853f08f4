use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::adapter::{JsonAdapter, Sealed, read_fields};
use crate::json::{DecodeError, EncodeError, JsonReader, JsonWriter};

/// A value of a declared hierarchy: its subtype name plus raw fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub subtype: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl Variant {
    pub fn new(subtype: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            subtype: subtype.into(),
            fields,
        }
    }

    /// A value without fields, as singletons decode.
    pub fn unit(subtype: impl Into<String>) -> Self {
        Self::new(subtype, Map::new())
    }
}

impl Sealed for Variant {
    fn subtype(&self) -> &str {
        &self.subtype
    }
}

/// Decodes an object's fields into a [`Variant`] of one subtype.
///
/// Records have no schema, so a strict reader accepts any of their fields.
pub struct RecordAdapter {
    subtype: String,
    reserved: Vec<String>,
}

impl RecordAdapter {
    pub fn new(subtype: impl Into<String>) -> Self {
        Self {
            subtype: subtype.into(),
            reserved: Vec::new(),
        }
    }

    /// Names the record may not encode as fields: the discriminator keys
    /// written into the same object.
    pub fn with_reserved(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.reserved.extend(names);
        self
    }
}

impl JsonAdapter<Variant> for RecordAdapter {
    fn decode(&self, reader: &mut JsonReader<'_>) -> Result<Variant, DecodeError> {
        let fields = read_fields(reader)?;
        Ok(Variant::new(self.subtype.as_str(), fields.values))
    }

    fn encode(&self, writer: &mut JsonWriter, value: &Variant) -> Result<(), EncodeError> {
        if let Some(name) = value.fields.keys().find(|name| self.reserved.contains(*name)) {
            return Err(EncodeError::ReservedName { name: name.clone() });
        }
        writer.begin_object()?;
        for (name, field) in &value.fields {
            writer.name(name)?;
            writer.json_value(field)?;
        }
        writer.end_object()
    }
}
