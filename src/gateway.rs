//! Sync gateway: runs API requests off the UI thread and hands the results
//! back as [`Event`]s.
//!
//! Each request gets its own short-lived thread. Nothing is de-duplicated or
//! cancelled here; the session decides which completions are still relevant.

use serde_json::Value;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::api::{ApiError, Backend, Health, SeedResponse};
use crate::model::{Item, ItemId};

#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    ListItems,
    /// `ticket` identifies the selection that asked for this item.
    GetItem { id: ItemId, ticket: u64 },
    SaveAnnotation { id: ItemId, annotation: Value },
    FetchImage { id: ItemId, uri: String },
    Seed,
    Health,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Debug)]
pub enum Event {
    ItemsLoaded(Result<Vec<Item>, ApiError>),
    ItemLoaded {
        id: ItemId,
        ticket: u64,
        result: Result<Item, ApiError>,
    },
    /// Carries the value that was sent so the catalog can mirror it.
    Saved {
        id: ItemId,
        annotation: Value,
        result: Result<(), ApiError>,
    },
    ImageLoaded {
        id: ItemId,
        result: Result<egui::ColorImage, ImageLoadError>,
    },
    Seeded(Result<SeedResponse, ApiError>),
    Health(Result<Health, ApiError>),
}

/// Run one request to completion on the calling thread.
pub fn execute(backend: &dyn Backend, request: Request) -> Event {
    match request {
        Request::ListItems => Event::ItemsLoaded(backend.list_items()),
        Request::GetItem { id, ticket } => Event::ItemLoaded {
            id,
            ticket,
            result: backend.get_item(id),
        },
        Request::SaveAnnotation { id, annotation } => {
            let result = backend.update_annotation(id, &annotation);
            Event::Saved {
                id,
                annotation,
                result,
            }
        }
        Request::FetchImage { id, uri } => Event::ImageLoaded {
            id,
            result: load_image(backend, &uri),
        },
        Request::Seed => Event::Seeded(backend.seed()),
        Request::Health => Event::Health(backend.health()),
    }
}

fn load_image(backend: &dyn Backend, uri: &str) -> Result<egui::ColorImage, ImageLoadError> {
    let bytes = backend.fetch_bytes(uri)?;
    let rgba = image::load_from_memory(&bytes)?.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    let pixels = rgba.as_flat_samples();
    Ok(egui::ColorImage::from_rgba_unmultiplied(
        size,
        pixels.as_slice(),
    ))
}

pub struct Gateway {
    backend: Arc<dyn Backend>,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    repaint: Option<egui::Context>,
}

impl Gateway {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            backend,
            tx,
            rx,
            repaint: None,
        }
    }

    /// Wake the UI whenever a request completes.
    pub fn with_repaint(mut self, ctx: egui::Context) -> Self {
        self.repaint = Some(ctx);
        self
    }

    pub fn submit(&self, request: Request) {
        tracing::debug!(?request, "submitting request");
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let repaint = self.repaint.clone();

        std::thread::spawn(move || {
            let event = execute(backend.as_ref(), request);
            // receiver gone means the app is shutting down
            let _ = tx.send(event);
            if let Some(ctx) = repaint {
                ctx.request_repaint();
            }
        });
    }

    /// Completed requests, in completion order.
    pub fn poll(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }

    #[cfg(test)]
    pub fn wait(&self, timeout: std::time::Duration) -> Option<Event> {
        self.rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory stand-in for the item API.
    #[derive(Default)]
    pub struct FakeBackend {
        pub items: Mutex<BTreeMap<ItemId, Item>>,
        pub saves: Mutex<Vec<(ItemId, Value)>>,
        pub images: Mutex<BTreeMap<String, Vec<u8>>>,
        pub offline: bool,
    }

    impl FakeBackend {
        pub fn with_items(items: Vec<Item>) -> Self {
            let fake = Self::default();
            fake.items
                .lock()
                .unwrap()
                .extend(items.into_iter().map(|i| (i.id, i)));
            fake
        }

        fn check(&self) -> Result<(), ApiError> {
            if self.offline {
                return Err(ApiError::Status {
                    status: 503,
                    body: "offline".into(),
                });
            }
            Ok(())
        }

        fn not_found() -> ApiError {
            ApiError::Status {
                status: 404,
                body: r#"{"detail":"Item not found"}"#.into(),
            }
        }
    }

    impl Backend for FakeBackend {
        fn list_items(&self) -> Result<Vec<Item>, ApiError> {
            self.check()?;
            Ok(self.items.lock().unwrap().values().cloned().collect())
        }

        fn get_item(&self, id: ItemId) -> Result<Item, ApiError> {
            self.check()?;
            self.items
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or_else(Self::not_found)
        }

        fn update_annotation(&self, id: ItemId, annotation: &Value) -> Result<(), ApiError> {
            self.check()?;
            let mut items = self.items.lock().unwrap();
            let item = items.get_mut(&id).ok_or_else(Self::not_found)?;
            // stored server-side as encoded text
            item.annotation = Some(Value::String(annotation.to_string()));
            self.saves.lock().unwrap().push((id, annotation.clone()));
            Ok(())
        }

        fn seed(&self) -> Result<SeedResponse, ApiError> {
            self.check()?;
            let count = self.items.lock().unwrap().len();
            Ok(SeedResponse {
                status: "success".into(),
                message: format!("Database seeded with {count} diverse tasks."),
            })
        }

        fn health(&self) -> Result<Health, ApiError> {
            self.check()?;
            Ok(Health {
                status: "online".into(),
                database: Some("connected".into()),
            })
        }

        fn fetch_bytes(&self, uri: &str) -> Result<Vec<u8>, ApiError> {
            self.check()?;
            self.images
                .lock()
                .unwrap()
                .get(uri)
                .cloned()
                .ok_or_else(Self::not_found)
        }
    }
}
