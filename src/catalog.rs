use serde_json::Value;
use std::path::Path;

use crate::model::{snippet, Item, ItemId, TaskType};

pub const EXPORT_FILE_NAME: &str = "minilabel_export.json";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("could not write export file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not serialize catalog: {0}")]
    Json(#[from] serde_json::Error),
}

/// One sidebar entry.
#[derive(Clone, Debug, PartialEq)]
pub struct SidebarRow {
    pub id: ItemId,
    pub title: String,
    pub task_type: TaskType,
    pub annotated: bool,
    pub selected: bool,
}

/// Items fetched from the server plus the current selection.
#[derive(Default, Debug)]
pub struct Catalog {
    items: Vec<Item>,
    selected: Option<ItemId>,
}

impl Catalog {
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn replace(&mut self, mut items: Vec<Item>) {
        for item in &mut items {
            item.dedup_labels();
        }
        self.items = items;
    }

    pub fn select(&mut self, id: ItemId) {
        self.selected = Some(id);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Mirror a saved annotation into the catalog entry. Returns false when the
    /// item is not in the catalog (e.g. the list was refreshed meanwhile).
    pub fn mark_saved(&mut self, id: ItemId, annotation: Value) -> bool {
        match self.items.iter_mut().find(|i| i.id == id) {
            Some(item) => {
                item.annotation = Some(annotation);
                true
            }
            None => false,
        }
    }

    pub fn sidebar(&self) -> Vec<SidebarRow> {
        self.items
            .iter()
            .map(|item| SidebarRow {
                id: item.id,
                title: snippet(&item.content, 20),
                task_type: item.task_type,
                annotated: item.has_annotation(),
                selected: self.selected == Some(item.id),
            })
            .collect()
    }

    pub fn export_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.items)
    }

    pub fn export_to(&self, path: &Path) -> Result<(), ExportError> {
        let data = self.export_string()?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: ItemId, task_type: TaskType, content: &str) -> Item {
        Item {
            id,
            task_type,
            content: content.into(),
            label_config: vec!["a".into(), "b".into()],
            annotation: None,
        }
    }

    fn sample() -> Catalog {
        let mut catalog = Catalog::default();
        catalog.replace(vec![
            item(
                1,
                TaskType::Classification,
                "The user interface of this application is surprisingly intuitive.",
            ),
            item(2, TaskType::BoundingBox, "https://example.com/a.jpg"),
        ]);
        catalog
    }

    #[test]
    fn sidebar_reflects_selection_and_saved_state() {
        let mut catalog = sample();
        catalog.select(2);
        assert!(catalog.mark_saved(2, json!([])));

        let rows = catalog.sidebar();
        assert_eq!(rows[0].title, "The user interface o...");
        assert!(!rows[0].selected);
        assert!(!rows[0].annotated);
        assert!(rows[1].selected);
        assert!(rows[1].annotated);
    }

    #[test]
    fn saving_an_unknown_item_is_reported() {
        let mut catalog = sample();
        assert!(!catalog.mark_saved(99, json!({"label": "a"})));
    }

    #[test]
    fn export_writes_pretty_json_with_annotations() {
        let mut catalog = sample();
        catalog.mark_saved(1, json!({"label": "a"}));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EXPORT_FILE_NAME);
        catalog.export_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  {"));
        let back: Vec<Item> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, catalog.items());
        assert_eq!(back[0].annotation, Some(json!({"label": "a"})));
    }
}
