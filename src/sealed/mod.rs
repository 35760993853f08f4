//! Polymorphic adapter for a sealed hierarchy.
//!
//! Reading is two passes over the same input. A cloned reader scans the
//! top-level object for the discriminator key, the label is resolved
//! against the [`ResolutionTable`], and the chosen subtype adapter then
//! reads the object from the start. Writing emits the discriminator first
//! and flattens the subtype's own object into the same one.

#[cfg(test)]
pub(crate) mod fixtures;
pub mod singleton;
pub mod table;

use std::sync::Arc;

pub use singleton::SingletonAdapter;
pub use table::{
    ConfigError, DefaultMarker, DefaultPolicy, NestedDelegate, ResolutionTable, ResolvedTarget,
    SubtypeDescriptor, SubtypeEntry,
};

use crate::adapter::{JsonAdapter, Sealed};
use crate::json::{DecodeError, EncodeError, JsonReader, JsonWriter, Token};
use singleton::skip_object;
use table::EntryKind;

/// Decodes and encodes values of a hierarchy through its resolution table.
///
/// Cheap to clone; clones share the table.
pub struct SealedAdapter<T> {
    table: Arc<ResolutionTable<T>>,
    strict: bool,
}

impl<T> Clone for SealedAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            strict: self.strict,
        }
    }
}

impl<T> std::fmt::Debug for SealedAdapter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedAdapter")
            .field("table", &self.table)
            .field("strict", &self.strict)
            .finish()
    }
}

impl<T: Sealed> SealedAdapter<T> {
    pub fn new(table: Arc<ResolutionTable<T>>) -> Self {
        Self {
            table,
            strict: false,
        }
    }

    pub fn builder(key: impl Into<String>) -> SealedBuilder<T> {
        SealedBuilder {
            key: key.into(),
            descriptors: Vec::new(),
        }
    }

    /// Same table, but subtype bodies reject names their adapter does not
    /// read, discriminator keys excepted. The discriminator scan itself is
    /// never strict.
    pub fn strict(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            strict: true,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn table(&self) -> &Arc<ResolutionTable<T>> {
        &self.table
    }

    /// Reads one value. JSON `null` and the null default both yield `None`.
    pub fn read(&self, reader: &mut JsonReader<'_>) -> Result<Option<T>, DecodeError> {
        if reader.peek()? == Token::Null {
            reader.next_null()?;
            return Ok(None);
        }

        let label = {
            let mut scan = reader.peek_json();
            scan.set_fail_on_unknown(false);
            read_label(&mut scan, self.table.key())?
        };

        match self.table.resolve(label.as_deref())? {
            ResolvedTarget::Subtype(entry) => self
                .read_body(reader, true, |reader| match entry.kind() {
                    EntryKind::Adapter(adapter) => adapter.decode(reader),
                    EntryKind::Singleton(instance) => {
                        skip_object(reader)?;
                        Ok(instance.clone())
                    }
                })
                .map(Some),
            ResolvedTarget::Null => {
                reader.skip_value()?;
                Ok(None)
            }
            ResolvedTarget::Object(instance) => {
                reader.skip_value()?;
                Ok(Some(instance.clone()))
            }
            // The fallback never writes a discriminator, so it sees the
            // key like any other field.
            ResolvedTarget::Delegate(adapter) => self
                .read_body(reader, false, |reader| adapter.decode(reader))
                .map(Some),
        }
    }

    /// Writes `{key: label, ...fields}` for `value`, or `null` for `None`.
    pub fn write(&self, writer: &mut JsonWriter, value: Option<&T>) -> Result<(), EncodeError> {
        let Some(value) = value else {
            return writer.null_value();
        };
        let subtype = value.subtype();
        let Some(entry) = self.table.entry_for_subtype(subtype) else {
            return match self.table.default_policy() {
                DefaultPolicy::DelegateAdapter { adapter, .. } => adapter.encode(writer, value),
                _ => Err(EncodeError::UnregisteredSubtype {
                    subtype: subtype.to_owned(),
                    known: self
                        .table
                        .subtype_names()
                        .into_iter()
                        .map(str::to_owned)
                        .collect(),
                }),
            };
        };

        writer.begin_object()?;
        writer.name(self.table.key())?;
        writer.string_value(entry.label())?;
        if let EntryKind::Adapter(adapter) = entry.kind() {
            let token = writer.begin_flatten();
            let result = adapter.encode(writer, value);
            writer.end_flatten(token);
            result?;
        }
        writer.end_object()
    }

    /// Decodes a complete document.
    pub fn from_json(&self, input: &str) -> Result<Option<T>, DecodeError> {
        let mut reader = JsonReader::new(input);
        let value = self.read(&mut reader)?;
        reader.expect_end()?;
        Ok(value)
    }

    pub fn to_json(&self, value: &T) -> Result<String, EncodeError> {
        let mut writer = JsonWriter::new();
        self.write(&mut writer, Some(value))?;
        writer.finish()
    }

    fn read_body<R>(
        &self,
        reader: &mut JsonReader<'_>,
        strip_key: bool,
        decode: impl FnOnce(&mut JsonReader<'_>) -> Result<R, DecodeError>,
    ) -> Result<R, DecodeError> {
        let previous = reader.fail_on_unknown();
        if self.strict {
            reader.set_fail_on_unknown(true);
        }
        if strip_key {
            reader.push_discriminator(self.table.key());
        } else {
            reader.push_tolerated(self.table.key());
        }
        let result = decode(reader);
        reader.pop_discriminator();
        reader.set_fail_on_unknown(previous);
        result
    }
}

impl<T: Sealed> JsonAdapter<T> for SealedAdapter<T> {
    fn decode(&self, reader: &mut JsonReader<'_>) -> Result<T, DecodeError> {
        self.read(reader)?
            .ok_or_else(|| DecodeError::UnexpectedNull { path: reader.path() })
    }

    fn encode(&self, writer: &mut JsonWriter, value: &T) -> Result<(), EncodeError> {
        self.write(writer, Some(value))
    }

    fn encodable_subtypes(&self) -> Vec<String> {
        self.table
            .subtype_names()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }
}

/// Scans the current object for `key` and returns its string value.
fn read_label(reader: &mut JsonReader<'_>, key: &str) -> Result<Option<String>, DecodeError> {
    reader.begin_object()?;
    while reader.has_next()? {
        if reader.select_name(&[key])?.is_some() {
            return Ok(Some(reader.next_string()?.into_owned()));
        }
        reader.skip_name()?;
        reader.skip_value()?;
    }
    Ok(None)
}

/// Collects descriptors for [`SealedAdapter`].
pub struct SealedBuilder<T> {
    key: String,
    descriptors: Vec<SubtypeDescriptor<T>>,
}

impl<T: Sealed> SealedBuilder<T> {
    pub fn subtype(mut self, descriptor: SubtypeDescriptor<T>) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn default_null(self) -> Self {
        self.subtype(SubtypeDescriptor::null_default())
    }

    pub fn build_table(self) -> Result<ResolutionTable<T>, ConfigError> {
        ResolutionTable::build(self.key, self.descriptors)
    }

    pub fn build(self) -> Result<SealedAdapter<T>, ConfigError> {
        Ok(SealedAdapter::new(Arc::new(self.build_table()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::fixtures::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_by_label() {
        let adapter = message_adapter(None);
        assert_eq!(
            adapter.from_json(r#"{"type":"success","value":"Okay!"}"#).unwrap(),
            Some(success("Okay!"))
        );
        assert_eq!(
            adapter.from_json(r#"{"value":"Okay!","type":"successful"}"#).unwrap(),
            Some(success("Okay!"))
        );
        assert_eq!(
            adapter
                .from_json(r#"{"type":"error","error_logs":{"order":66}}"#)
                .unwrap(),
            Some(error(&[("order", 66.0)]))
        );
    }

    #[test]
    fn key_order_does_not_matter() {
        let adapter = message_adapter(None);
        let early = adapter
            .from_json(r#"{"type":"error","error_logs":{"order":66}}"#)
            .unwrap();
        let late = adapter
            .from_json(r#"{"error_logs":{"order":66},"type":"error"}"#)
            .unwrap();
        assert_eq!(early, late);
        assert_eq!(late, Some(error(&[("order", 66.0)])));
    }

    #[test]
    fn encodes_with_primary_label() {
        let adapter = message_adapter(None);
        assert_eq!(
            adapter.to_json(&success("Okay!")).unwrap(),
            r#"{"type":"success","value":"Okay!"}"#
        );
        assert_eq!(
            adapter.to_json(&error(&[("order", 66.0)])).unwrap(),
            r#"{"type":"error","error_logs":{"order":66.0}}"#
        );
    }

    #[test]
    fn unknown_label_without_default_fails() {
        let adapter = message_adapter(None);
        let err = adapter.from_json(r#"{"type":"taco","junk":true}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected one of [success, successful, error] for key 'type' but found 'taco'. \
             Register a subtype for this label."
        );
    }

    #[test]
    fn missing_label_without_default_fails() {
        let adapter = message_adapter(None);
        let err = adapter.from_json(r#"{"value":"Okay!"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingDiscriminator { ref key, .. } if key == "type"));
    }

    #[test]
    fn null_default_skips_the_document() {
        let adapter = message_adapter(Some(SubtypeDescriptor::null_default()));
        assert_eq!(adapter.from_json(r#"{"type":"taco","junk":true}"#).unwrap(), None);
        assert_eq!(adapter.from_json(r#"{"junk":[1,{"a":2}]}"#).unwrap(), None);
        assert_eq!(adapter.from_json("null").unwrap(), None);
    }

    #[test]
    fn object_default_returns_the_instance() {
        let adapter =
            message_adapter(Some(SubtypeDescriptor::default_object("Unknown", Message::Unknown)));
        assert_eq!(
            adapter.from_json(r#"{"type":"taco","junk":true}"#).unwrap(),
            Some(Message::Unknown)
        );
        assert_eq!(adapter.from_json("{}").unwrap(), Some(Message::Unknown));
    }

    #[test]
    fn unlabeled_default_object_cannot_be_encoded() {
        let adapter =
            message_adapter(Some(SubtypeDescriptor::default_object("Unknown", Message::Unknown)));
        let err = adapter.to_json(&Message::Unknown).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected one of [Success, Error] but found subtype 'Unknown'. Register this subtype."
        );
    }

    #[test]
    fn labeled_singleton_encodes_as_discriminator_only() {
        let adapter = message_adapter(Some(
            SubtypeDescriptor::default_object("Unknown", Message::Unknown).with_label("unknown"),
        ));
        assert_eq!(adapter.to_json(&Message::Unknown).unwrap(), r#"{"type":"unknown"}"#);
        assert_eq!(
            adapter.from_json(r#"{"type":"unknown"}"#).unwrap(),
            Some(Message::Unknown)
        );
    }

    #[test]
    fn fallback_adapter_decodes_unmatched_documents() {
        let adapter = message_adapter(Some(SubtypeDescriptor::fallback(
            "Fallback",
            success_adapter(),
        )));
        assert_eq!(
            adapter.from_json(r#"{"type":"taco","value":"still"}"#).unwrap(),
            Some(success("still"))
        );
        // Known labels still win over the fallback.
        assert_eq!(
            adapter
                .from_json(r#"{"type":"error","error_logs":{}}"#)
                .unwrap(),
            Some(error(&[]))
        );
    }

    #[test]
    fn null_input_reads_as_none_but_decode_rejects_it() {
        let adapter = message_adapter(None);
        assert_eq!(adapter.from_json("null").unwrap(), None);

        let mut reader = JsonReader::new("null");
        let err = JsonAdapter::decode(&adapter, &mut reader).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedNull { .. }));
    }

    #[test]
    fn writes_null_for_none() {
        let adapter = message_adapter(None);
        let mut writer = JsonWriter::new();
        adapter.write(&mut writer, None).unwrap();
        assert_eq!(writer.finish().unwrap(), "null");
    }

    #[test]
    fn non_string_label_fails() {
        let adapter = message_adapter(None);
        let err = adapter.from_json(r#"{"type":{"nested":true}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedToken { .. }));
    }

    #[test]
    fn values_inside_arrays_decode_in_sequence() {
        let adapter = message_adapter(None);
        let mut reader = JsonReader::new(
            r#"[{"type":"success","value":"a"},null,{"type":"error","error_logs":{}}]"#,
        );
        reader.begin_array().unwrap();
        let mut decoded = Vec::new();
        while reader.has_next().unwrap() {
            decoded.push(adapter.read(&mut reader).unwrap());
        }
        reader.end_array().unwrap();
        reader.expect_end().unwrap();
        assert_eq!(decoded, vec![Some(success("a")), None, Some(error(&[]))]);
    }

    #[test]
    fn trailing_content_fails() {
        let adapter = message_adapter(None);
        let err = adapter
            .from_json(r#"{"type":"success","value":"a"} {}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::NotFullyConsumed { .. }));
    }

    #[test]
    fn strict_mode_tolerates_only_the_discriminator() {
        let adapter = SealedAdapter::builder("type")
            .subtype(SubtypeDescriptor::new(
                "Success",
                "success",
                success_adapter(),
            ))
            .subtype(SubtypeDescriptor::singleton("Unknown", "unknown", Message::Unknown))
            .build()
            .unwrap()
            .strict();

        assert_eq!(
            adapter.from_json(r#"{"type":"unknown"}"#).unwrap(),
            Some(Message::Unknown)
        );
        let err = adapter
            .from_json(r#"{"type":"unknown","extra":1}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedKey { ref name, .. } if name == "extra"));

        // Fields the payload reads pass.
        assert_eq!(
            adapter.from_json(r#"{"value":"x","type":"success"}"#).unwrap(),
            Some(success("x"))
        );
    }

    #[test]
    fn strict_mode_rejects_fields_the_payload_ignores() {
        let json = r#"{"type":"success","value":"x","extra":1}"#;
        assert_eq!(
            message_adapter(None).from_json(json).unwrap(),
            Some(success("x"))
        );
        let err = message_adapter(None).strict().from_json(json).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnexpectedKey { ref name, ref path } if name == "extra" && path == "$.extra"
        ));
    }

    #[test]
    fn strict_flag_is_restored_after_a_value() {
        let adapter = SealedAdapter::builder("type")
            .subtype(SubtypeDescriptor::singleton("Unknown", "unknown", Message::Unknown))
            .build()
            .unwrap()
            .strict();
        let mut reader = JsonReader::new(r#"{"type":"unknown"}"#);
        adapter.read(&mut reader).unwrap();
        assert!(!reader.fail_on_unknown());
    }

    #[test]
    fn nested_hierarchy_shares_the_key() {
        let adapter = event_adapter();
        assert_eq!(
            adapter.from_json(r#"{"type":"success_int","value":1}"#).unwrap(),
            Some(Event::SuccessInt(IntValue { value: 1 }))
        );
        assert_eq!(
            adapter.from_json(r#"{"type":"empty_success"}"#).unwrap(),
            Some(Event::EmptySuccess)
        );
        assert_eq!(
            adapter.to_json(&Event::EmptySuccess).unwrap(),
            r#"{"type":"empty_success"}"#
        );
        assert_eq!(
            adapter
                .to_json(&Event::SuccessString(Success { value: "s".into() }))
                .unwrap(),
            r#"{"type":"success_string","value":"s"}"#
        );
    }

    #[test]
    fn group_adapter_decodes_its_own_members() {
        let adapter = SealedAdapter::new(success_group());
        assert_eq!(
            adapter.from_json(r#"{"type":"success_string","value":"s"}"#).unwrap(),
            Some(Event::SuccessString(Success { value: "s".into() }))
        );
        assert!(adapter.from_json(r#"{"type":"error","error_logs":{}}"#).is_err());
    }

    #[test]
    fn different_key_subtree_reads_both_discriminators() {
        let adapter = event_adapter();
        let json = r#"{"type":"something_else","second_type":"success","value":"Okay!"}"#;
        let event = Event::OtherSuccess(Success {
            value: "Okay!".into(),
        });
        assert_eq!(adapter.from_json(json).unwrap(), Some(event.clone()));
        assert_eq!(adapter.to_json(&event).unwrap(), json);

        assert_eq!(
            adapter
                .from_json(r#"{"second_type":"empty_success","type":"something_else"}"#)
                .unwrap(),
            Some(Event::OtherEmpty)
        );
        assert_eq!(
            adapter.to_json(&Event::OtherEmpty).unwrap(),
            r#"{"type":"something_else","second_type":"empty_success"}"#
        );
    }

    #[test]
    fn nested_singleton_skips_unknown_fields() {
        let json = r#"{"type":"empty_success","unknown":1}"#;
        assert_eq!(
            event_adapter().from_json(json).unwrap(),
            Some(Event::EmptySuccess)
        );
        let err = event_adapter().strict().from_json(json).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedKey { ref name, .. } if name == "unknown"));
    }

    #[test]
    fn strict_subtree_tolerates_both_discriminators() {
        let adapter = event_adapter().strict();
        assert_eq!(
            adapter
                .from_json(r#"{"type":"something_else","second_type":"empty_success"}"#)
                .unwrap(),
            Some(Event::OtherEmpty)
        );
    }

    #[test]
    fn fallback_sees_the_discriminator_as_a_field() {
        let adapter = message_adapter(Some(SubtypeDescriptor::fallback(
            "Fallback",
            crate::adapter::SerdeAdapter::new(
                |fields: serde_json::Value| success(&fields.to_string()),
                |_| None,
            ),
        )));
        assert_eq!(
            adapter.from_json(r#"{"type":"taco","n":1}"#).unwrap(),
            Some(success(r#"{"type":"taco","n":1}"#))
        );

        // Strict mode still lets the key through.
        let adapter = message_adapter(Some(SubtypeDescriptor::fallback(
            "Fallback",
            success_adapter(),
        )))
        .strict();
        assert_eq!(
            adapter.from_json(r#"{"type":"taco","value":"v"}"#).unwrap(),
            Some(success("v"))
        );
        assert!(adapter.from_json(r#"{"type":"taco","value":"v","n":1}"#).is_err());
    }

    #[test]
    fn deeply_nested_payloads_fail_cleanly() {
        let depth = 200_000;
        let json = format!(
            r#"{{"type":"success","value":{}{}}}"#,
            "[".repeat(depth),
            "]".repeat(depth)
        );
        let err = message_adapter(None).from_json(&json).unwrap_err();
        assert!(matches!(err, DecodeError::NestingTooDeep { .. }));

        let json = format!(
            r#"{{"value":{}{},"type":"success"}}"#,
            "[".repeat(depth),
            "]".repeat(depth)
        );
        assert!(message_adapter(None).from_json(&json).is_err());
    }

    #[test]
    fn fallback_encodes_unregistered_subtypes_without_discriminator() {
        let adapter = message_adapter(Some(SubtypeDescriptor::fallback(
            "Fallback",
            crate::sealed::SingletonAdapter::new(Message::Unknown),
        )));
        assert_eq!(adapter.to_json(&Message::Unknown).unwrap(), "{}");
    }

    #[test]
    fn adapters_are_shareable_across_threads() {
        let adapter = message_adapter(None);
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let adapter = adapter.clone();
                std::thread::spawn(move || {
                    let json = format!(r#"{{"type":"success","value":"{i}"}}"#);
                    adapter.from_json(&json).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), Some(success(&i.to_string())));
        }
    }
}
