use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::geometry::BBox;

// ── Items ───────────────────────────────────────────────────────────────────

pub type ItemId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "text_classification")]
    Classification,
    #[serde(rename = "ner")]
    EntityTagging,
    #[serde(rename = "bbox")]
    BoundingBox,
}

impl TaskType {
    pub fn wire_name(self) -> &'static str {
        match self {
            TaskType::Classification => "text_classification",
            TaskType::EntityTagging => "ner",
            TaskType::BoundingBox => "bbox",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name().replacen('_', " ", 1))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub task_type: TaskType,
    pub content: String,
    #[serde(default)]
    pub label_config: Vec<String>,
    /// Stored annotation exactly as the server sent it. May be a JSON string
    /// holding the encoded value.
    #[serde(default)]
    pub annotation: Option<Value>,
}

impl Item {
    /// Drop repeated label names, keeping first occurrences in order.
    pub fn dedup_labels(&mut self) {
        let mut seen = Vec::with_capacity(self.label_config.len());
        self.label_config.retain(|l| {
            if seen.contains(l) {
                false
            } else {
                seen.push(l.clone());
                true
            }
        });
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.label_config.iter().any(|l| l == label)
    }

    pub fn has_annotation(&self) -> bool {
        !matches!(self.annotation, None | Some(Value::Null))
    }
}

/// First `n` characters of `text` followed by an ellipsis.
pub fn snippet(text: &str, n: usize) -> String {
    let mut s: String = text.chars().take(n).collect();
    s.push_str("...");
    s
}

// ── Annotation records ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassLabel {
    pub label: String,
}

/// Entity span. `start` and `end` are character offsets into the content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub label: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Build a span from character offsets, taking the text from `content`.
    pub fn from_offsets(
        label: impl Into<String>,
        content: &str,
        start: usize,
        end: usize,
    ) -> Result<Self, AnnotationError> {
        let len = content.chars().count();
        if start >= end || end > len {
            return Err(AnnotationError::SpanOutOfRange { start, end, len });
        }
        Ok(Self {
            label: label.into(),
            text: content.chars().skip(start).take(end - start).collect(),
            start,
            end,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub label: String,
    pub bbox: BBox,
}

/// Annotation value for one item. The variant always matches the item's task
/// type.
#[derive(Clone, Debug, PartialEq)]
pub enum Annotation {
    Classification(Option<ClassLabel>),
    Entities(Vec<Span>),
    Boxes(Vec<BoxRecord>),
}

#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("stored {task} annotation has an unexpected shape: {found}")]
    Malformed { task: TaskType, found: &'static str },

    #[error("annotation JSON could not be decoded: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{action} is not available for {task} items")]
    WrongTask { task: TaskType, action: &'static str },

    #[error("no annotation at index {index} (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("span {start}..{end} is outside the {len}-character content")]
    SpanOutOfRange { start: usize, end: usize, len: usize },

    #[error("box {index} lies outside the unit square: {bbox:?}")]
    BoxOutOfRange { index: usize, bbox: BBox },
}

impl Annotation {
    pub fn empty(task: TaskType) -> Self {
        match task {
            TaskType::Classification => Annotation::Classification(None),
            TaskType::EntityTagging => Annotation::Entities(Vec::new()),
            TaskType::BoundingBox => Annotation::Boxes(Vec::new()),
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            Annotation::Classification(_) => TaskType::Classification,
            Annotation::Entities(_) => TaskType::EntityTagging,
            Annotation::Boxes(_) => TaskType::BoundingBox,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Annotation::Classification(label) => usize::from(label.is_some()),
            Annotation::Entities(spans) => spans.len(),
            Annotation::Boxes(boxes) => boxes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Structured wire value. A cleared classification encodes as `{}`.
    pub fn to_wire(&self) -> Value {
        let encoded = match self {
            Annotation::Classification(Some(label)) => serde_json::to_value(label),
            Annotation::Classification(None) => Ok(Value::Object(Default::default())),
            Annotation::Entities(spans) => serde_json::to_value(spans),
            Annotation::Boxes(boxes) => serde_json::to_value(boxes),
        };
        // Plain structs of strings, integers and finite floats always encode.
        encoded.unwrap_or(Value::Null)
    }

    /// Decode a stored annotation for an item of the given task type.
    ///
    /// Accepts the value double-encoded as a JSON string. Missing values and
    /// empty containers decode to the empty annotation.
    pub fn decode(task: TaskType, raw: Option<&Value>) -> Result<Self, AnnotationError> {
        let value = match raw {
            None | Some(Value::Null) => return Ok(Self::empty(task)),
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(Self::empty(task)),
            Some(Value::String(s)) => serde_json::from_str::<Value>(s)?,
            Some(v) => v.clone(),
        };

        match task {
            TaskType::Classification => decode_label(value).map(Annotation::Classification),
            TaskType::EntityTagging => decode_records(task, value).map(Annotation::Entities),
            TaskType::BoundingBox => {
                let boxes: Vec<BoxRecord> = decode_records(task, value)?;
                if let Some((index, record)) =
                    boxes.iter().enumerate().find(|(_, r)| !r.bbox.is_normalized())
                {
                    return Err(AnnotationError::BoxOutOfRange {
                        index,
                        bbox: record.bbox,
                    });
                }
                Ok(Annotation::Boxes(boxes))
            }
        }
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn decode_label(value: Value) -> Result<Option<ClassLabel>, AnnotationError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(ref map) if map.is_empty() => Ok(None),
        Value::Object(_) => Ok(Some(serde_json::from_value(value)?)),
        // older clients wrapped the single record in a list
        Value::Array(mut list) if list.len() <= 1 => match list.pop() {
            Some(inner @ Value::Object(_)) => decode_label(inner),
            None => Ok(None),
            Some(other) => Err(AnnotationError::Malformed {
                task: TaskType::Classification,
                found: shape_name(&other),
            }),
        },
        other => Err(AnnotationError::Malformed {
            task: TaskType::Classification,
            found: shape_name(&other),
        }),
    }
}

fn decode_records<T: DeserializeOwned>(
    task: TaskType,
    value: Value,
) -> Result<Vec<T>, AnnotationError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(list) => list
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(AnnotationError::from))
            .collect(),
        Value::Object(ref map) if map.is_empty() => Ok(Vec::new()),
        Value::Object(_) => Ok(vec![serde_json::from_value(value)?]),
        other => Err(AnnotationError::Malformed {
            task,
            found: shape_name(&other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn spans() -> Annotation {
        Annotation::Entities(vec![
            Span {
                label: "PERSON".into(),
                text: "Elon Musk".into(),
                start: 0,
                end: 9,
            },
            Span {
                label: "GPE".into(),
                text: "Berlin".into(),
                start: 45,
                end: 51,
            },
        ])
    }

    fn boxes() -> Annotation {
        Annotation::Boxes(vec![BoxRecord {
            label: "Cat".into(),
            bbox: BBox {
                x: 0.1,
                y: 0.2,
                w: 0.3,
                h: 0.4,
            },
        }])
    }

    #[test]
    fn task_types_use_wire_names() {
        let t: TaskType = serde_json::from_value(json!("ner")).unwrap();
        assert_eq!(t, TaskType::EntityTagging);
        assert_eq!(
            serde_json::to_value(TaskType::Classification).unwrap(),
            json!("text_classification")
        );
        assert_eq!(TaskType::Classification.to_string(), "text classification");
        assert_eq!(TaskType::BoundingBox.to_string(), "bbox");
    }

    #[test]
    fn each_variant_survives_encode_and_decode() {
        let label = Annotation::Classification(Some(ClassLabel {
            label: "pos".into(),
        }));
        for original in [label, spans(), boxes()] {
            let wire = original.to_wire();
            let back = Annotation::decode(original.task_type(), Some(&wire)).unwrap();
            assert_eq!(back, original);
        }
    }

    #[test]
    fn string_encoded_annotation_is_decoded() {
        let raw = Value::String(boxes().to_wire().to_string());
        let decoded = Annotation::decode(TaskType::BoundingBox, Some(&raw)).unwrap();
        assert_eq!(decoded, boxes());
    }

    #[test]
    fn missing_and_empty_values_decode_to_empty() {
        for raw in [None, Some(json!(null)), Some(json!({})), Some(json!([])), Some(json!(""))] {
            for task in [
                TaskType::Classification,
                TaskType::EntityTagging,
                TaskType::BoundingBox,
            ] {
                let decoded = Annotation::decode(task, raw.as_ref()).unwrap();
                assert_eq!(decoded, Annotation::empty(task));
            }
        }
    }

    #[test]
    fn wrapped_classification_record_is_unwrapped() {
        let raw = json!([{ "label": "neg" }]);
        let decoded = Annotation::decode(TaskType::Classification, Some(&raw)).unwrap();
        assert_eq!(
            decoded,
            Annotation::Classification(Some(ClassLabel {
                label: "neg".into()
            }))
        );
    }

    #[test]
    fn single_span_record_becomes_one_element_list() {
        let raw = json!({ "label": "ORG", "text": "Tesla", "start": 22, "end": 27 });
        let decoded = Annotation::decode(TaskType::EntityTagging, Some(&raw)).unwrap();
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn unexpected_shapes_are_rejected() {
        assert_matches!(
            Annotation::decode(TaskType::BoundingBox, Some(&json!(42))),
            Err(AnnotationError::Malformed {
                task: TaskType::BoundingBox,
                found: "number"
            })
        );
        assert_matches!(
            Annotation::decode(
                TaskType::Classification,
                Some(&json!([{"label": "a"}, {"label": "b"}]))
            ),
            Err(AnnotationError::Malformed { .. })
        );
        assert_matches!(
            Annotation::decode(TaskType::EntityTagging, Some(&json!("{not json"))),
            Err(AnnotationError::Json(_))
        );
        assert_matches!(
            Annotation::decode(TaskType::EntityTagging, Some(&json!([{ "label": "ORG" }]))),
            Err(AnnotationError::Json(_))
        );
    }

    #[test]
    fn stored_boxes_must_fit_the_unit_square() {
        let raw = json!([
            { "label": "Cat", "bbox": { "x": 0.0, "y": 0.0, "w": 1.0, "h": 1.0 } },
            { "label": "Cat", "bbox": { "x": 0.9, "y": -0.5, "w": 0.8, "h": 3.0 } }
        ]);
        assert_matches!(
            Annotation::decode(TaskType::BoundingBox, Some(&raw)),
            Err(AnnotationError::BoxOutOfRange { index: 1, .. })
        );

        let edge = json!([
            { "label": "Eye", "bbox": { "x": 0.5, "y": 0.25, "w": 0.5, "h": 0.75 } }
        ]);
        let decoded = Annotation::decode(TaskType::BoundingBox, Some(&edge)).unwrap();
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn cleared_classification_encodes_as_empty_object() {
        assert_eq!(Annotation::Classification(None).to_wire(), json!({}));
    }

    #[test]
    fn span_text_comes_from_character_offsets() {
        let span = Span::from_offsets("GPE", "Café in Zürich", 8, 14).unwrap();
        assert_eq!(span.text, "Zürich");
        assert_matches!(
            Span::from_offsets("GPE", "short", 2, 9),
            Err(AnnotationError::SpanOutOfRange { len: 5, .. })
        );
        assert_matches!(
            Span::from_offsets("GPE", "short", 3, 3),
            Err(AnnotationError::SpanOutOfRange { .. })
        );
    }

    #[test]
    fn item_detail_parses_from_server_json() {
        let mut item: Item = serde_json::from_value(json!({
            "id": 3,
            "task_type": "bbox",
            "content": "https://example.com/cat.jpg",
            "label_config": ["Cat", "Eye", "Cat"],
            "annotation": null
        }))
        .unwrap();
        item.dedup_labels();
        assert_eq!(item.label_config, vec!["Cat", "Eye"]);
        assert!(!item.has_annotation());
        assert!(item.has_label("Eye"));
    }

    #[test]
    fn snippet_counts_characters() {
        assert_eq!(snippet("Zürich is lovely", 6), "Zürich...");
        assert_eq!(snippet("ab", 10), "ab...");
    }
}
