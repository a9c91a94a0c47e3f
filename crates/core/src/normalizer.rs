//! Coerces loosely structured model output into [`ExamResponse`].
//!
//! Individual items are handled permissively: an item that is not valid JSON
//! or not a mapping is logged and dropped, and the rest of the batch goes on.
//! The output schema is strict: every surviving item becomes a [`Question`]
//! with three string fields.

use crate::{ExamError, ExamResponse, Question};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, error, warn};

const QUESTIONS_KEY: &str = "questions";
const QUESTION_KEYS: [&str; 2] = ["question", "pregunta"];
const CHOICES_KEYS: [&str; 2] = ["choices", "opciones"];
const ANSWER_KEYS: [&str; 2] = ["answer", "respuesta"];
const CHOICE_SEPARATOR: &str = ", ";

/// Shape of the raw response, decided once up front.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse<'a> {
    /// `{"questions": [...]}`
    Wrapped(&'a [Value]),
    /// `[...]`
    Sequence(&'a [Value]),
    /// Anything else, treated as a batch of one.
    Single(&'a Value),
}

impl<'a> RawResponse<'a> {
    pub fn classify(raw: &'a Value) -> Result<Self, ExamError> {
        match raw {
            Value::Object(map) if map.contains_key(QUESTIONS_KEY) => match &map[QUESTIONS_KEY] {
                Value::Array(items) => Ok(Self::Wrapped(items)),
                other => Err(ExamError::Normalization(format!(
                    "'{QUESTIONS_KEY}' must be a list, got {}",
                    json_type_name(other)
                ))),
            },
            Value::Array(items) => Ok(Self::Sequence(items)),
            other => Ok(Self::Single(other)),
        }
    }

    pub fn items(&self) -> &'a [Value] {
        match *self {
            Self::Wrapped(items) | Self::Sequence(items) => items,
            Self::Single(item) => std::slice::from_ref(item),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InvalidJson(String),
    NotAMapping(&'static str),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(details) => write!(f, "string item is not valid JSON: {details}"),
            Self::NotAMapping(kind) => write!(f, "expected an object, got {kind}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRejection {
    pub index: usize,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Accepted(Question),
    Rejected(ItemRejection),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizationReport {
    pub exam: ExamResponse,
    pub rejected: Vec<ItemRejection>,
}

pub fn normalize_response(raw: &Value) -> Result<ExamResponse, ExamError> {
    normalize_with_report(raw).map(|report| report.exam)
}

pub fn normalize_with_report(raw: &Value) -> Result<NormalizationReport, ExamError> {
    let shape = RawResponse::classify(raw).map_err(|err| {
        error!(error = %err, "could not normalize model response");
        err
    })?;

    let items = shape.items();
    let mut report = NormalizationReport::default();

    for (index, item) in items.iter().enumerate() {
        match normalize_item(index, item) {
            ItemOutcome::Accepted(question) => report.exam.questions.push(question),
            ItemOutcome::Rejected(rejection) => {
                warn!(index = rejection.index, reason = %rejection.reason, "skipping model item");
                report.rejected.push(rejection);
            }
        }
    }

    debug!(
        received = items.len(),
        accepted = report.exam.len(),
        rejected = report.rejected.len(),
        "normalized model response"
    );

    Ok(report)
}

pub fn normalize_item(index: usize, item: &Value) -> ItemOutcome {
    let parsed;
    let item = match item {
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(value) => {
                parsed = value;
                &parsed
            }
            Err(err) => {
                return ItemOutcome::Rejected(ItemRejection {
                    index,
                    reason: RejectReason::InvalidJson(err.to_string()),
                })
            }
        },
        other => other,
    };

    let Value::Object(fields) = item else {
        return ItemOutcome::Rejected(ItemRejection {
            index,
            reason: RejectReason::NotAMapping(json_type_name(item)),
        });
    };

    ItemOutcome::Accepted(Question {
        question: first_present(fields, &QUESTION_KEYS).map(stringify).unwrap_or_default(),
        choices: first_present(fields, &CHOICES_KEYS).map(join_choices).unwrap_or_default(),
        answer: first_present(fields, &ANSWER_KEYS).map(stringify).unwrap_or_default(),
    })
}

/// First key whose value is present and non-empty.
fn first_present<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .find(|value| !is_blank(value))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn join_choices(value: &Value) -> String {
    match value {
        Value::Array(options) => options
            .iter()
            .map(stringify)
            .collect::<Vec<_>>()
            .join(CHOICE_SEPARATOR),
        other => stringify(other),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
