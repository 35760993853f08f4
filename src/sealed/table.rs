//! Resolution table: label to subtype mapping plus the default policy.
//!
//! Built once from an explicit list of [`SubtypeDescriptor`]s and never
//! mutated afterwards, so a table behind an `Arc` can be read from any
//! number of threads without locking.

use std::collections::HashSet;
use std::fmt;
use std::iter;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::adapter::{JsonAdapter, Sealed};
use crate::json::DecodeError;

/// Errors in a hierarchy declaration. Construction is aborted; no table is
/// produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate label '{label}' defined for {second} and {first}")]
    DuplicateLabel {
        label: String,
        first: String,
        second: String,
    },
    #[error("only one default may be declared: {first} and {second} are both defaults")]
    ConflictingDefault { first: String, second: String },
    #[error("nested hierarchy {subtype} must not declare its own label")]
    AmbiguousNesting { subtype: String },
    #[error("nested hierarchy {subtype} uses key '{found}' but its parent uses '{expected}'")]
    NestedKeyMismatch {
        subtype: String,
        expected: String,
        found: String,
    },
    #[error("subtype {subtype} must declare a type label")]
    UnlabeledSubtype { subtype: String },
    #[error("subtype {subtype} is declared more than once")]
    DuplicateSubtype { subtype: String },
    #[error("the null default cannot carry a label")]
    LabelOnSentinel,
}

/// Which default, if any, a descriptor declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultMarker {
    None,
    Null,
    Object,
    Fallback,
}

enum DescriptorKind<T> {
    Adapter(Arc<dyn JsonAdapter<T>>),
    Singleton(T),
    Nested(Arc<ResolutionTable<T>>),
    Sentinel,
}

/// Declaration of one member of a hierarchy.
pub struct SubtypeDescriptor<T> {
    name: String,
    label: Option<String>,
    alternate_labels: Vec<String>,
    kind: DescriptorKind<T>,
    default: DefaultMarker,
}

impl<T: Sealed> SubtypeDescriptor<T> {
    /// A labeled subtype decoded by `adapter`.
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        adapter: impl JsonAdapter<T> + 'static,
    ) -> Self {
        Self::shared(name, label, Arc::new(adapter))
    }

    pub fn shared(
        name: impl Into<String>,
        label: impl Into<String>,
        adapter: Arc<dyn JsonAdapter<T>>,
    ) -> Self {
        Self::declare(name, Some(label.into()), DescriptorKind::Adapter(adapter))
    }

    /// A labeled singleton. Its JSON form is the discriminator alone.
    pub fn singleton(name: impl Into<String>, label: impl Into<String>, instance: T) -> Self {
        Self::declare(name, Some(label.into()), DescriptorKind::Singleton(instance))
    }

    /// A nested hierarchy sharing this hierarchy's discriminator key.
    pub fn nested(name: impl Into<String>, table: Arc<ResolutionTable<T>>) -> Self {
        Self::declare(name, None, DescriptorKind::Nested(table))
    }

    /// The singleton returned for unmatched or missing labels.
    pub fn default_object(name: impl Into<String>, instance: T) -> Self {
        let mut descriptor = Self::declare(name, None, DescriptorKind::Singleton(instance));
        descriptor.default = DefaultMarker::Object;
        descriptor
    }

    /// The adapter that decodes documents with unmatched or missing labels.
    pub fn fallback(name: impl Into<String>, adapter: impl JsonAdapter<T> + 'static) -> Self {
        let mut descriptor = Self::declare(name, None, DescriptorKind::Adapter(Arc::new(adapter)));
        descriptor.default = DefaultMarker::Fallback;
        descriptor
    }

    /// Unmatched or missing labels decode to `None`.
    pub fn null_default() -> Self {
        let mut descriptor = Self::declare("null default", None, DescriptorKind::Sentinel);
        descriptor.default = DefaultMarker::Null;
        descriptor
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_alternate(mut self, label: impl Into<String>) -> Self {
        self.alternate_labels.push(label.into());
        self
    }

    pub fn with_alternates<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternate_labels
            .extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_marker(&self) -> DefaultMarker {
        self.default
    }

    fn declare(name: impl Into<String>, label: Option<String>, kind: DescriptorKind<T>) -> Self {
        Self {
            name: name.into(),
            label,
            alternate_labels: Vec::new(),
            kind,
            default: DefaultMarker::None,
        }
    }
}

pub(crate) enum EntryKind<T> {
    Adapter(Arc<dyn JsonAdapter<T>>),
    Singleton(T),
}

/// A labeled subtype.
pub struct SubtypeEntry<T> {
    subtype: String,
    label: String,
    alternate_labels: Vec<String>,
    kind: EntryKind<T>,
}

impl<T> SubtypeEntry<T> {
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// The primary label, the only one ever written.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn alternate_labels(&self) -> &[String] {
        &self.alternate_labels
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self.kind, EntryKind::Singleton(_))
    }

    pub(crate) fn kind(&self) -> &EntryKind<T> {
        &self.kind
    }
}

impl<T> fmt::Debug for SubtypeEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubtypeEntry")
            .field("subtype", &self.subtype)
            .field("label", &self.label)
            .field("alternate_labels", &self.alternate_labels)
            .field("singleton", &self.is_singleton())
            .finish()
    }
}

/// A member that is itself a hierarchy sharing the parent's key.
pub struct NestedDelegate<T> {
    subtype: String,
    table: Arc<ResolutionTable<T>>,
}

impl<T> NestedDelegate<T> {
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn table(&self) -> &Arc<ResolutionTable<T>> {
        &self.table
    }
}

/// What happens to documents whose label is missing or unmatched.
pub enum DefaultPolicy<T> {
    None,
    Null,
    ObjectInstance {
        subtype: String,
        instance: T,
    },
    DelegateAdapter {
        subtype: String,
        adapter: Arc<dyn JsonAdapter<T>>,
    },
}

impl<T> DefaultPolicy<T> {
    /// Short description used in logs and diagnostics.
    pub fn describe(&self) -> &str {
        match self {
            DefaultPolicy::None => "none",
            DefaultPolicy::Null => "null default",
            DefaultPolicy::ObjectInstance { subtype, .. }
            | DefaultPolicy::DelegateAdapter { subtype, .. } => subtype,
        }
    }
}

impl<T> fmt::Debug for DefaultPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultPolicy::None => f.write_str("None"),
            DefaultPolicy::Null => f.write_str("Null"),
            DefaultPolicy::ObjectInstance { subtype, .. } => {
                f.debug_tuple("ObjectInstance").field(subtype).finish()
            }
            DefaultPolicy::DelegateAdapter { subtype, .. } => {
                f.debug_tuple("DelegateAdapter").field(subtype).finish()
            }
        }
    }
}

/// Outcome of resolving a discriminator value.
pub enum ResolvedTarget<'a, T> {
    Subtype(&'a SubtypeEntry<T>),
    Null,
    /// The default singleton, borrowed from the table.
    Object(&'a T),
    Delegate(&'a dyn JsonAdapter<T>),
}

impl<T> fmt::Debug for ResolvedTarget<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedTarget::Subtype(entry) => f.debug_tuple("Subtype").field(entry).finish(),
            ResolvedTarget::Null => f.write_str("Null"),
            ResolvedTarget::Object(_) => f.write_str("Object"),
            ResolvedTarget::Delegate(_) => f.write_str("Delegate"),
        }
    }
}

pub struct ResolutionTable<T> {
    key: String,
    entries: Vec<SubtypeEntry<T>>,
    /// Primary and alternate labels, in declaration order.
    labels: IndexMap<String, usize>,
    /// Subtype names the write path can encode through each entry.
    subtypes: IndexMap<String, usize>,
    nested: Vec<NestedDelegate<T>>,
    default: DefaultPolicy<T>,
}

impl<T: Sealed> ResolutionTable<T> {
    /// Builds the table for a hierarchy whose discriminator is `key`.
    pub fn build<I>(key: impl Into<String>, descriptors: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = SubtypeDescriptor<T>>,
    {
        let mut table = Self {
            key: key.into(),
            entries: Vec::new(),
            labels: IndexMap::new(),
            subtypes: IndexMap::new(),
            nested: Vec::new(),
            default: DefaultPolicy::None,
        };
        // Label → declaring subtype, including labels reached through
        // nested delegates.
        let mut owners: IndexMap<String, String> = IndexMap::new();
        let mut names: HashSet<String> = HashSet::new();

        for descriptor in descriptors {
            let SubtypeDescriptor {
                name,
                label,
                alternate_labels,
                kind,
                default,
            } = descriptor;

            match kind {
                DescriptorKind::Nested(nested) => {
                    if label.is_some() || !alternate_labels.is_empty() {
                        return Err(ConfigError::AmbiguousNesting { subtype: name });
                    }
                    if nested.key != table.key {
                        return Err(ConfigError::NestedKeyMismatch {
                            subtype: name,
                            expected: table.key.clone(),
                            found: nested.key.clone(),
                        });
                    }
                    for (label, owner) in nested.label_owners() {
                        claim_label(&mut owners, label, owner)?;
                    }
                    for subtype in nested.subtype_names() {
                        claim_name(&mut names, subtype)?;
                    }
                    table.nested.push(NestedDelegate {
                        subtype: name,
                        table: nested,
                    });
                }
                DescriptorKind::Sentinel => {
                    if label.is_some() || !alternate_labels.is_empty() {
                        return Err(ConfigError::LabelOnSentinel);
                    }
                    table.set_default(name, DefaultPolicy::Null)?;
                }
                DescriptorKind::Singleton(instance) => {
                    if default == DefaultMarker::Object {
                        let policy = DefaultPolicy::ObjectInstance {
                            subtype: name.clone(),
                            instance: instance.clone(),
                        };
                        table.set_default(name.clone(), policy)?;
                    }
                    let kind = EntryKind::Singleton(instance);
                    table.register(&mut owners, &mut names, name, label, alternate_labels, kind, default)?;
                }
                DescriptorKind::Adapter(adapter) => {
                    if default == DefaultMarker::Fallback {
                        let policy = DefaultPolicy::DelegateAdapter {
                            subtype: name.clone(),
                            adapter: Arc::clone(&adapter),
                        };
                        table.set_default(name.clone(), policy)?;
                    }
                    let kind = EntryKind::Adapter(adapter);
                    table.register(&mut owners, &mut names, name, label, alternate_labels, kind, default)?;
                }
            }
        }

        tracing::debug!(
            key = %table.key,
            subtypes = table.entries.len(),
            labels = table.labels.len(),
            nested = table.nested.len(),
            default = table.default.describe(),
            "built resolution table"
        );
        Ok(table)
    }

    #[allow(clippy::too_many_arguments)]
    fn register(
        &mut self,
        owners: &mut IndexMap<String, String>,
        names: &mut HashSet<String>,
        name: String,
        label: Option<String>,
        alternate_labels: Vec<String>,
        kind: EntryKind<T>,
        default: DefaultMarker,
    ) -> Result<(), ConfigError> {
        let Some(label) = label else {
            if default == DefaultMarker::None || !alternate_labels.is_empty() {
                return Err(ConfigError::UnlabeledSubtype { subtype: name });
            }
            // An unlabeled default is reachable only through the policy.
            return Ok(());
        };

        claim_name(names, &name)?;
        let extra_subtypes = match &kind {
            EntryKind::Adapter(adapter) => adapter.encodable_subtypes(),
            EntryKind::Singleton(_) => Vec::new(),
        };
        for subtype in &extra_subtypes {
            claim_name(names, subtype)?;
        }
        for each in iter::once(&label).chain(&alternate_labels) {
            claim_label(owners, each, &name)?;
        }

        let index = self.entries.len();
        for each in iter::once(&label).chain(&alternate_labels) {
            self.labels.insert(each.clone(), index);
        }
        self.subtypes.insert(name.clone(), index);
        for subtype in extra_subtypes {
            self.subtypes.insert(subtype, index);
        }
        self.entries.push(SubtypeEntry {
            subtype: name,
            label,
            alternate_labels,
            kind,
        });
        Ok(())
    }

    fn set_default(&mut self, declared_by: String, policy: DefaultPolicy<T>) -> Result<(), ConfigError> {
        if !matches!(self.default, DefaultPolicy::None) {
            return Err(ConfigError::ConflictingDefault {
                first: self.default.describe().to_owned(),
                second: declared_by,
            });
        }
        self.default = policy;
        Ok(())
    }
}

impl<T> ResolutionTable<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn entries(&self) -> &[SubtypeEntry<T>] {
        &self.entries
    }

    pub fn nested(&self) -> &[NestedDelegate<T>] {
        &self.nested
    }

    pub fn default_policy(&self) -> &DefaultPolicy<T> {
        &self.default
    }

    /// Finds the entry for `label` among this table's labels, then in nested
    /// delegates. Default policies are not consulted.
    pub fn lookup(&self, label: &str) -> Option<&SubtypeEntry<T>> {
        if let Some(&index) = self.labels.get(label) {
            return Some(&self.entries[index]);
        }
        self.nested
            .iter()
            .find_map(|nested| nested.table.lookup(label))
    }

    /// Resolves a discriminator value, applying the default policy when it
    /// is missing or unmatched.
    pub fn resolve(&self, label: Option<&str>) -> Result<ResolvedTarget<'_, T>, DecodeError> {
        if let Some(entry) = label.and_then(|label| self.lookup(label)) {
            return Ok(ResolvedTarget::Subtype(entry));
        }
        tracing::trace!(
            key = %self.key,
            label = ?label,
            policy = self.default.describe(),
            "label not matched"
        );
        match &self.default {
            DefaultPolicy::None => Err(match label {
                Some(label) => DecodeError::UnknownLabel {
                    key: self.key.clone(),
                    label: label.to_owned(),
                    known_labels: self.known_labels(),
                },
                None => DecodeError::MissingDiscriminator {
                    key: self.key.clone(),
                    known_labels: self.known_labels(),
                },
            }),
            DefaultPolicy::Null => Ok(ResolvedTarget::Null),
            DefaultPolicy::ObjectInstance { instance, .. } => Ok(ResolvedTarget::Object(instance)),
            DefaultPolicy::DelegateAdapter { adapter, .. } => {
                Ok(ResolvedTarget::Delegate(adapter.as_ref()))
            }
        }
    }

    /// Entry that encodes values of `subtype`, searching nested delegates.
    pub fn entry_for_subtype(&self, subtype: &str) -> Option<&SubtypeEntry<T>> {
        if let Some(&index) = self.subtypes.get(subtype) {
            return Some(&self.entries[index]);
        }
        self.nested
            .iter()
            .find_map(|nested| nested.table.entry_for_subtype(subtype))
    }

    /// Every label this table matches, nested ones included.
    pub fn known_labels(&self) -> Vec<String> {
        self.label_owners()
            .into_iter()
            .map(|(label, _)| label.to_owned())
            .collect()
    }

    /// Every subtype name the write path can encode.
    pub fn subtype_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.subtypes.keys().map(String::as_str).collect();
        for nested in &self.nested {
            names.extend(nested.table.subtype_names());
        }
        names
    }

    fn label_owners(&self) -> Vec<(&str, &str)> {
        let mut owners: Vec<(&str, &str)> = self
            .labels
            .iter()
            .map(|(label, &index)| (label.as_str(), self.entries[index].subtype.as_str()))
            .collect();
        for nested in &self.nested {
            owners.extend(nested.table.label_owners());
        }
        owners
    }
}

impl<T> fmt::Debug for ResolutionTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionTable")
            .field("key", &self.key)
            .field("entries", &self.entries)
            .field(
                "nested",
                &self
                    .nested
                    .iter()
                    .map(|nested| nested.subtype.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("default", &self.default)
            .finish()
    }
}

fn claim_label(
    owners: &mut IndexMap<String, String>,
    label: &str,
    subtype: &str,
) -> Result<(), ConfigError> {
    if let Some(first) = owners.get(label) {
        return Err(ConfigError::DuplicateLabel {
            label: label.to_owned(),
            first: first.clone(),
            second: subtype.to_owned(),
        });
    }
    owners.insert(label.to_owned(), subtype.to_owned());
    Ok(())
}

fn claim_name(names: &mut HashSet<String>, subtype: &str) -> Result<(), ConfigError> {
    if !names.insert(subtype.to_owned()) {
        return Err(ConfigError::DuplicateSubtype {
            subtype: subtype.to_owned(),
        });
    }
    Ok(())
}
