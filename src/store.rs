use serde_json::Value;

use crate::model::{snippet, Annotation, AnnotationError, BoxRecord, ClassLabel, Span, TaskType};

pub const EMPTY_PLACEHOLDER: &str = "No labels applied yet.";

/// What the preview panel shows for the current annotation.
#[derive(Clone, Debug, PartialEq)]
pub enum Preview {
    Empty,
    /// Classification label card.
    Card(String),
    Rows(Vec<PreviewRow>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreviewRow {
    pub label: String,
    pub detail: String,
}

/// Working copy of the selected item's annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationStore {
    value: Annotation,
}

impl AnnotationStore {
    pub fn new(task: TaskType) -> Self {
        Self {
            value: Annotation::empty(task),
        }
    }

    pub fn load(task: TaskType, raw: Option<&Value>) -> Result<Self, AnnotationError> {
        Ok(Self {
            value: Annotation::decode(task, raw)?,
        })
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn to_wire(&self) -> Value {
        self.value.to_wire()
    }

    /// Replace the classification label. At most one label per item.
    pub fn set_label(&mut self, label: impl Into<String>) -> Result<(), AnnotationError> {
        match &mut self.value {
            Annotation::Classification(current) => {
                *current = Some(ClassLabel {
                    label: label.into(),
                });
                Ok(())
            }
            other => Err(AnnotationError::WrongTask {
                task: other.task_type(),
                action: "choosing a single label",
            }),
        }
    }

    pub fn clear_label(&mut self) -> Result<(), AnnotationError> {
        match &mut self.value {
            Annotation::Classification(current) => {
                *current = None;
                Ok(())
            }
            other => Err(AnnotationError::WrongTask {
                task: other.task_type(),
                action: "clearing the label",
            }),
        }
    }

    pub fn push_span(&mut self, span: Span) -> Result<(), AnnotationError> {
        match &mut self.value {
            Annotation::Entities(spans) => {
                spans.push(span);
                Ok(())
            }
            other => Err(AnnotationError::WrongTask {
                task: other.task_type(),
                action: "tagging a span",
            }),
        }
    }

    pub fn push_box(&mut self, record: BoxRecord) -> Result<(), AnnotationError> {
        match &mut self.value {
            Annotation::Boxes(boxes) => {
                boxes.push(record);
                Ok(())
            }
            other => Err(AnnotationError::WrongTask {
                task: other.task_type(),
                action: "drawing a box",
            }),
        }
    }

    /// Remove one record from a span or box list, keeping the others in order.
    pub fn remove(&mut self, index: usize) -> Result<(), AnnotationError> {
        fn take<T>(list: &mut Vec<T>, index: usize) -> Result<(), AnnotationError> {
            if index >= list.len() {
                return Err(AnnotationError::IndexOutOfRange {
                    index,
                    len: list.len(),
                });
            }
            list.remove(index);
            Ok(())
        }

        match &mut self.value {
            Annotation::Entities(spans) => take(spans, index),
            Annotation::Boxes(boxes) => take(boxes, index),
            Annotation::Classification(_) => Err(AnnotationError::WrongTask {
                task: TaskType::Classification,
                action: "removing by index",
            }),
        }
    }

    pub fn spans(&self) -> &[Span] {
        match &self.value {
            Annotation::Entities(spans) => spans,
            _ => &[],
        }
    }

    pub fn boxes(&self) -> &[BoxRecord] {
        match &self.value {
            Annotation::Boxes(boxes) => boxes,
            _ => &[],
        }
    }

    pub fn preview(&self) -> Preview {
        if self.is_empty() {
            return Preview::Empty;
        }
        match &self.value {
            Annotation::Classification(None) => Preview::Empty,
            Annotation::Classification(Some(c)) => Preview::Card(c.label.clone()),
            Annotation::Entities(spans) => Preview::Rows(
                spans
                    .iter()
                    .map(|s| PreviewRow {
                        label: s.label.clone(),
                        detail: snippet(&s.text, 10),
                    })
                    .collect(),
            ),
            Annotation::Boxes(boxes) => Preview::Rows(
                boxes
                    .iter()
                    .map(|b| PreviewRow {
                        label: b.label.clone(),
                        detail: "Box".to_string(),
                    })
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;
    use assert_matches::assert_matches;

    fn span(label: &str, text: &str) -> Span {
        Span {
            label: label.into(),
            text: text.into(),
            start: 0,
            end: text.chars().count(),
        }
    }

    fn unit_box(label: &str, x: f32) -> BoxRecord {
        BoxRecord {
            label: label.into(),
            bbox: BBox {
                x,
                y: 0.0,
                w: 0.1,
                h: 0.1,
            },
        }
    }

    #[test]
    fn choosing_a_label_replaces_the_previous_one() {
        let mut store = AnnotationStore::new(TaskType::Classification);
        store.set_label("pos").unwrap();
        store.set_label("neg").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.preview(), Preview::Card("neg".into()));
        store.clear_label().unwrap();
        assert_eq!(store.preview(), Preview::Empty);
    }

    #[test]
    fn removing_keeps_remaining_order() {
        let mut store = AnnotationStore::new(TaskType::BoundingBox);
        for (i, l) in ["a", "b", "c", "d"].iter().enumerate() {
            store.push_box(unit_box(l, i as f32 * 0.1)).unwrap();
        }
        store.remove(1).unwrap();
        let labels: Vec<_> = store.boxes().iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, ["a", "c", "d"]);
    }

    #[test]
    fn removing_the_only_span_shows_placeholder() {
        let mut store = AnnotationStore::new(TaskType::EntityTagging);
        store.push_span(span("ORG", "Microsoft Corp.")).unwrap();
        assert_eq!(
            store.preview(),
            Preview::Rows(vec![PreviewRow {
                label: "ORG".into(),
                detail: "Microsoft ...".into(),
            }])
        );
        store.remove(0).unwrap();
        assert!(store.spans().is_empty());
        assert_eq!(store.preview(), Preview::Empty);
    }

    #[test]
    fn out_of_range_removal_leaves_store_alone() {
        let mut store = AnnotationStore::new(TaskType::EntityTagging);
        store.push_span(span("ORG", "OpenAI")).unwrap();
        assert_matches!(
            store.remove(1),
            Err(AnnotationError::IndexOutOfRange { index: 1, len: 1 })
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn mutations_must_match_task_type() {
        let mut store = AnnotationStore::new(TaskType::Classification);
        assert_matches!(
            store.push_box(unit_box("Cat", 0.0)),
            Err(AnnotationError::WrongTask { .. })
        );
        assert_matches!(store.remove(0), Err(AnnotationError::WrongTask { .. }));

        let mut store = AnnotationStore::new(TaskType::BoundingBox);
        assert_matches!(store.set_label("x"), Err(AnnotationError::WrongTask { .. }));
        assert_matches!(
            store.push_span(span("ORG", "x")),
            Err(AnnotationError::WrongTask { .. })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn box_rows_read_box() {
        let mut store = AnnotationStore::new(TaskType::BoundingBox);
        store.push_box(unit_box("Eye", 0.5)).unwrap();
        assert_matches!(store.preview(), Preview::Rows(rows) if rows[0].detail == "Box");
    }
}
