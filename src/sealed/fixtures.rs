//! Shared test hierarchies.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::table::{ConfigError, ResolutionTable, SubtypeDescriptor};
use super::SealedAdapter;
use crate::adapter::{SerdeAdapter, Sealed};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Success {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogs {
    pub error_logs: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Success(Success),
    Error(ErrorLogs),
    Unknown,
}

impl Sealed for Message {
    fn subtype(&self) -> &str {
        match self {
            Message::Success(_) => "Success",
            Message::Error(_) => "Error",
            Message::Unknown => "Unknown",
        }
    }
}

pub fn success(value: &str) -> Message {
    Message::Success(Success {
        value: value.to_owned(),
    })
}

pub fn error(logs: &[(&str, f64)]) -> Message {
    Message::Error(ErrorLogs {
        error_logs: logs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect(),
    })
}

pub fn success_adapter() -> SerdeAdapter<Success, Message> {
    SerdeAdapter::new(Message::Success, |message| match message {
        Message::Success(success) => Some(success),
        _ => None,
    })
}

pub fn error_adapter() -> SerdeAdapter<ErrorLogs, Message> {
    SerdeAdapter::new(Message::Error, |message| match message {
        Message::Error(logs) => Some(logs),
        _ => None,
    })
}

/// `success` (alias `successful`) and `error`, keyed on `type`, plus an
/// optional default.
pub fn message_table(
    default: Option<SubtypeDescriptor<Message>>,
) -> Result<ResolutionTable<Message>, ConfigError> {
    let mut descriptors = vec![
        SubtypeDescriptor::new("Success", "success", success_adapter()).with_alternate("successful"),
        SubtypeDescriptor::new("Error", "error", error_adapter()),
    ];
    descriptors.extend(default);
    ResolutionTable::build("type", descriptors)
}

pub fn message_adapter(default: Option<SubtypeDescriptor<Message>>) -> SealedAdapter<Message> {
    SealedAdapter::new(Arc::new(message_table(default).unwrap()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntValue {
    pub value: i64,
}

/// Hierarchy with a same-key nested group and a different-key subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SuccessInt(IntValue),
    SuccessString(Success),
    EmptySuccess,
    OtherSuccess(Success),
    OtherEmpty,
    Error(ErrorLogs),
}

impl Sealed for Event {
    fn subtype(&self) -> &str {
        match self {
            Event::SuccessInt(_) => "SuccessInt",
            Event::SuccessString(_) => "SuccessString",
            Event::EmptySuccess => "EmptySuccess",
            Event::OtherSuccess(_) => "OtherSuccess",
            Event::OtherEmpty => "OtherEmpty",
            Event::Error(_) => "Error",
        }
    }
}

/// The same-key group on its own, usable as an adapter for the group.
pub fn success_group() -> Arc<ResolutionTable<Event>> {
    let table = ResolutionTable::build(
        "type",
        vec![
            SubtypeDescriptor::new(
                "SuccessInt",
                "success_int",
                SerdeAdapter::new(Event::SuccessInt, |event| match event {
                    Event::SuccessInt(value) => Some(value),
                    _ => None,
                }),
            ),
            SubtypeDescriptor::new(
                "SuccessString",
                "success_string",
                SerdeAdapter::new(Event::SuccessString, |event| match event {
                    Event::SuccessString(value) => Some(value),
                    _ => None,
                }),
            ),
            SubtypeDescriptor::singleton("EmptySuccess", "empty_success", Event::EmptySuccess),
        ],
    )
    .unwrap();
    Arc::new(table)
}

/// Subtree discriminated by `second_type`.
pub fn other_adapter() -> SealedAdapter<Event> {
    let table = ResolutionTable::build(
        "second_type",
        vec![
            SubtypeDescriptor::new(
                "OtherSuccess",
                "success",
                SerdeAdapter::new(Event::OtherSuccess, |event| match event {
                    Event::OtherSuccess(value) => Some(value),
                    _ => None,
                }),
            ),
            SubtypeDescriptor::singleton("OtherEmpty", "empty_success", Event::OtherEmpty),
        ],
    )
    .unwrap();
    SealedAdapter::new(Arc::new(table))
}

pub fn event_adapter() -> SealedAdapter<Event> {
    let table = ResolutionTable::build(
        "type",
        vec![
            SubtypeDescriptor::nested("Success", success_group()),
            SubtypeDescriptor::new("Other", "something_else", other_adapter()),
            SubtypeDescriptor::new(
                "Error",
                "error",
                SerdeAdapter::new(Event::Error, |event| match event {
                    Event::Error(logs) => Some(logs),
                    _ => None,
                }),
            ),
        ],
    )
    .unwrap();
    SealedAdapter::new(Arc::new(table))
}
