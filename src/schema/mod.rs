//! Hierarchy files: declarative hierarchies over schemaless values.
//!
//! A hierarchy file is a JSON document listing subtypes with their labels.
//! Building it yields a [`SealedAdapter`] over [`Variant`], a value that
//! carries its subtype name and its fields as raw JSON. This is what the
//! `sealedctl` commands run on.

mod variant;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::sealed::{ConfigError, ResolutionTable, SealedAdapter, SubtypeDescriptor};

pub use variant::{RecordAdapter, Variant};

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid hierarchy file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("subtype {subtype}: {reason}")]
    Invalid {
        subtype: String,
        reason: &'static str,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn default_key() -> String {
    "type".to_string()
}

/// Top level of a hierarchy file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HierarchyFile {
    /// Discriminator key, `"type"` unless given.
    #[serde(default = "default_key")]
    pub key: String,
    /// Unmatched or missing labels decode to `null`.
    #[serde(default)]
    pub default_null: bool,
    pub subtypes: Vec<SubtypeSpec>,
}

/// One subtype declaration.
///
/// An entry with `subtypes` and no `key` is a nested hierarchy sharing the
/// parent's key. With a `key` it is a labeled subtype decoded by its own
/// hierarchy. Anything else is a record or, with `singleton`, a singleton.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubtypeSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_labels: Vec<String>,
    #[serde(default)]
    pub singleton: bool,
    /// Singleton: the default object. Record: the fallback adapter.
    #[serde(default)]
    pub default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtypes: Option<Vec<SubtypeSpec>>,
}

impl HierarchyFile {
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = Self::parse(&contents)?;
        tracing::debug!(path = %path.display(), key = %file.key, subtypes = file.subtypes.len(), "loaded hierarchy file");
        Ok(file)
    }

    pub fn parse(contents: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn table(&self) -> Result<ResolutionTable<Variant>, SchemaError> {
        build_table(&self.key, &[], self.default_null, &self.subtypes)
    }

    pub fn build(&self) -> Result<SealedAdapter<Variant>, SchemaError> {
        Ok(SealedAdapter::new(Arc::new(self.table()?)))
    }
}

/// `outer` holds the keys of enclosing hierarchies, which are written into
/// the same object as this one's.
fn build_table(
    key: &str,
    outer: &[String],
    default_null: bool,
    specs: &[SubtypeSpec],
) -> Result<ResolutionTable<Variant>, SchemaError> {
    let mut descriptors = Vec::with_capacity(specs.len() + 1);
    if default_null {
        descriptors.push(SubtypeDescriptor::null_default());
    }
    for spec in specs {
        descriptors.push(descriptor(key, outer, spec)?);
    }
    Ok(ResolutionTable::build(key, descriptors)?)
}

fn descriptor(
    parent_key: &str,
    outer: &[String],
    spec: &SubtypeSpec,
) -> Result<SubtypeDescriptor<Variant>, SchemaError> {
    let invalid = |reason| SchemaError::Invalid {
        subtype: spec.name.clone(),
        reason,
    };
    let name = spec.name.as_str();
    let mut reserved = outer.to_vec();
    reserved.push(parent_key.to_owned());

    let descriptor = match (&spec.subtypes, &spec.key) {
        (Some(_), _) if spec.singleton || spec.default => {
            return Err(invalid("a hierarchy cannot be a singleton or a default"));
        }
        (Some(children), None) => {
            let nested = build_table(parent_key, outer, false, children)?;
            let descriptor = SubtypeDescriptor::nested(name, Arc::new(nested));
            // Labels on a nested hierarchy are rejected by the table builder.
            match &spec.label {
                Some(label) => descriptor.with_label(label.as_str()),
                None => descriptor,
            }
        }
        (Some(children), Some(key)) => {
            let label = spec.label.as_deref().ok_or_else(|| ConfigError::UnlabeledSubtype {
                subtype: spec.name.clone(),
            })?;
            let inner = build_table(key, &reserved, false, children)?;
            SubtypeDescriptor::new(name, label, SealedAdapter::new(Arc::new(inner)))
        }
        (None, Some(_)) => return Err(invalid("'key' requires 'subtypes'")),
        (None, None) => {
            let descriptor = match (spec.singleton, spec.default) {
                (true, true) => SubtypeDescriptor::default_object(name, Variant::unit(name)),
                // No discriminator is written for the fallback, so its own
                // key is an ordinary field.
                (false, true) => SubtypeDescriptor::fallback(
                    name,
                    RecordAdapter::new(name).with_reserved(outer.iter().cloned()),
                ),
                (singleton, false) => {
                    let label = spec.label.as_deref().ok_or_else(|| {
                        ConfigError::UnlabeledSubtype {
                            subtype: spec.name.clone(),
                        }
                    })?;
                    if singleton {
                        SubtypeDescriptor::singleton(name, label, Variant::unit(name))
                    } else {
                        SubtypeDescriptor::new(
                            name,
                            label,
                            RecordAdapter::new(name).with_reserved(reserved),
                        )
                    }
                }
            };
            match (&spec.label, spec.default) {
                (Some(label), true) => descriptor.with_label(label.as_str()),
                _ => descriptor,
            }
        }
    };
    Ok(descriptor.with_alternates(spec.alternate_labels.iter().cloned()))
}
