//! Application state and the command dispatch table.
//!
//! The UI turns every interaction into a [`Command`]; [`Session::dispatch`]
//! mutates state and returns the requests to hand to the gateway. Completed
//! requests come back through [`Session::apply`].

use egui::{Pos2, Vec2};
use std::path::PathBuf;

use crate::catalog::{Catalog, ExportError};
use crate::gateway::{Event, Request};
use crate::geometry;
use crate::model::{AnnotationError, BoxRecord, Item, ItemId, Span, TaskType};
use crate::store::AnnotationStore;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Refresh,
    SelectItem(ItemId),
    SetActiveLabel(String),
    ClearLabel,
    /// Character range selected in the entity text.
    SelectText { start: usize, end: usize },
    /// Displayed size of the bounding-box image.
    SurfaceResized(Vec2),
    /// Pointer events in surface-relative pixels.
    PointerDown(Pos2),
    PointerMove(Pos2),
    PointerUp(Pos2),
    RemoveAnnotation(usize),
    Save,
    Export(PathBuf),
    Seed,
    CheckHealth,
    DismissAlert,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("no item is selected")]
    NoItem,

    #[error("label {0:?} is not configured for this item")]
    UnknownLabel(String),

    #[error("choose a label first")]
    NoActiveLabel,

    #[error("a save is already in progress")]
    SaveInFlight,

    #[error("the image has not been laid out yet")]
    NoSurface,

    #[error("dismiss the error first")]
    AlertPending,

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawState {
    Idle,
    Dragging { origin: Pos2, current: Pos2 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Connection {
    Unknown,
    Online,
    Offline(String),
}

/// The selected item together with its working annotation. Kept as one value
/// so the store is always replaced along with the item.
#[derive(Clone, Debug)]
pub struct Current {
    pub item: Item,
    pub store: AnnotationStore,
}

pub struct Session {
    catalog: Catalog,
    current: Option<Current>,
    active_label: Option<String>,
    draw: DrawState,
    surface: Option<Vec2>,
    saving: bool,
    /// Ticket of the most recent selection; older detail responses are stale.
    ticket: u64,
    pending_image: Option<egui::ColorImage>,
    status: Option<String>,
    alert: Option<String>,
    connection: Connection,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::default(),
            current: None,
            active_label: None,
            draw: DrawState::Idle,
            surface: None,
            saving: false,
            ticket: 0,
            pending_image: None,
            status: None,
            alert: None,
            connection: Connection::Unknown,
        }
    }

    /// Requests issued once when the window opens.
    pub fn startup_requests() -> Vec<Request> {
        vec![Request::Health, Request::ListItems]
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn current(&self) -> Option<&Current> {
        self.current.as_ref()
    }

    pub fn active_label(&self) -> Option<&str> {
        self.active_label.as_deref()
    }

    pub fn draw_state(&self) -> DrawState {
        self.draw
    }

    pub fn surface(&self) -> Option<Vec2> {
        self.surface
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Decoded image for the current bounding-box item, handed over once.
    pub fn take_pending_image(&mut self) -> Option<egui::ColorImage> {
        self.pending_image.take()
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    fn current_mut(&mut self) -> Result<&mut Current, CommandError> {
        self.current.as_mut().ok_or(CommandError::NoItem)
    }

    // ── Commands ────────────────────────────────────────────────────────────

    pub fn dispatch(&mut self, command: Command) -> Result<Vec<Request>, CommandError> {
        tracing::debug!(?command, "dispatch");
        if self.alert.is_some() && command != Command::DismissAlert {
            return Err(CommandError::AlertPending);
        }
        match command {
            Command::Refresh => Ok(vec![Request::ListItems]),
            Command::SelectItem(id) => {
                self.ticket += 1;
                Ok(vec![Request::GetItem {
                    id,
                    ticket: self.ticket,
                }])
            }
            Command::SetActiveLabel(label) => self.set_active_label(label).map(|_| Vec::new()),
            Command::ClearLabel => {
                self.current_mut()?.store.clear_label()?;
                Ok(Vec::new())
            }
            Command::SelectText { start, end } => {
                self.tag_selection(start, end).map(|_| Vec::new())
            }
            Command::SurfaceResized(size) => {
                self.surface = Some(size);
                Ok(Vec::new())
            }
            Command::PointerDown(pos) => self.begin_drag(pos).map(|_| Vec::new()),
            Command::PointerMove(pos) => {
                if let DrawState::Dragging { current, .. } = &mut self.draw {
                    *current = pos;
                }
                Ok(Vec::new())
            }
            Command::PointerUp(pos) => self.finish_drag(pos).map(|_| Vec::new()),
            Command::RemoveAnnotation(index) => {
                self.current_mut()?.store.remove(index)?;
                Ok(Vec::new())
            }
            Command::Save => self.save(),
            Command::Export(path) => {
                self.catalog.export_to(&path)?;
                tracing::info!(path = %path.display(), "exported catalog");
                self.status = Some(format!("Exported to {}", path.display()));
                Ok(Vec::new())
            }
            Command::Seed => Ok(vec![Request::Seed]),
            Command::CheckHealth => Ok(vec![Request::Health]),
            Command::DismissAlert => {
                self.alert = None;
                Ok(Vec::new())
            }
        }
    }

    fn set_active_label(&mut self, label: String) -> Result<(), CommandError> {
        let current = self.current.as_mut().ok_or(CommandError::NoItem)?;
        if !current.item.has_label(&label) {
            return Err(CommandError::UnknownLabel(label));
        }
        if current.item.task_type == TaskType::Classification {
            current.store.set_label(label.clone())?;
        }
        self.active_label = Some(label);
        Ok(())
    }

    fn tag_selection(&mut self, start: usize, end: usize) -> Result<(), CommandError> {
        let label = self.active_label.clone().ok_or(CommandError::NoActiveLabel)?;
        let current = self.current_mut()?;
        let span = Span::from_offsets(label, &current.item.content, start, end)?;
        current.store.push_span(span)?;
        Ok(())
    }

    fn begin_drag(&mut self, pos: Pos2) -> Result<(), CommandError> {
        let current = self.current.as_ref().ok_or(CommandError::NoItem)?;
        if current.item.task_type != TaskType::BoundingBox {
            return Ok(());
        }
        if self.active_label.is_none() {
            return Err(CommandError::NoActiveLabel);
        }
        self.draw = DrawState::Dragging {
            origin: pos,
            current: pos,
        };
        Ok(())
    }

    fn finish_drag(&mut self, pos: Pos2) -> Result<(), CommandError> {
        let DrawState::Dragging { origin, .. } = std::mem::replace(&mut self.draw, DrawState::Idle)
        else {
            return Ok(());
        };
        let label = self.active_label.clone().ok_or(CommandError::NoActiveLabel)?;
        let surface = self.surface.ok_or(CommandError::NoSurface)?;
        let bbox = geometry::normalize_drag(origin, pos, surface).ok_or(CommandError::NoSurface)?;
        debug_assert!(bbox.is_normalized(), "{bbox:?}");
        self.current_mut()?.store.push_box(BoxRecord { label, bbox })?;
        Ok(())
    }

    fn save(&mut self) -> Result<Vec<Request>, CommandError> {
        if self.saving {
            return Err(CommandError::SaveInFlight);
        }
        let current = self.current.as_ref().ok_or(CommandError::NoItem)?;
        let request = Request::SaveAnnotation {
            id: current.item.id,
            annotation: current.store.to_wire(),
        };
        self.saving = true;
        Ok(vec![request])
    }

    // ── Completions ─────────────────────────────────────────────────────────

    /// Fold a completed request into the session. Returns follow-up requests.
    pub fn apply(&mut self, event: Event) -> Vec<Request> {
        match event {
            Event::ItemsLoaded(Ok(items)) => {
                tracing::info!(count = items.len(), "item list loaded");
                self.catalog.replace(items);
                Vec::new()
            }
            Event::ItemsLoaded(Err(e)) => {
                tracing::warn!(error = %e, "failed to load item list");
                self.status = Some(format!("Could not load items: {e}"));
                Vec::new()
            }
            Event::ItemLoaded { id, ticket, .. } if ticket != self.ticket => {
                tracing::debug!(id, ticket, latest = self.ticket, "discarding stale item response");
                Vec::new()
            }
            Event::ItemLoaded {
                id, result: Ok(item), ..
            } => self.enter_item(id, item),
            Event::ItemLoaded {
                id, result: Err(e), ..
            } => {
                tracing::warn!(id, error = %e, "failed to load item");
                self.status = Some(format!("Could not open item #{id}: {e}"));
                Vec::new()
            }
            Event::Saved {
                id,
                annotation,
                result,
            } => {
                self.saving = false;
                match result {
                    Ok(()) => {
                        tracing::info!(id, "annotation saved");
                        if !self.catalog.mark_saved(id, annotation.clone()) {
                            tracing::warn!(id, "saved item is no longer in the catalog");
                        }
                        if let Some(current) = self.current.as_mut().filter(|c| c.item.id == id) {
                            current.item.annotation = Some(annotation);
                        }
                        self.status = Some(format!("Saved item #{id}"));
                    }
                    Err(e) => {
                        tracing::warn!(id, error = %e, "save failed");
                        self.alert = Some(format!("Save failed: {e}"));
                    }
                }
                Vec::new()
            }
            Event::ImageLoaded { id, result } => {
                if self.current.as_ref().map(|c| c.item.id) != Some(id) {
                    tracing::debug!(id, "discarding image for an item no longer shown");
                    return Vec::new();
                }
                match result {
                    Ok(image) => self.pending_image = Some(image),
                    Err(e) => {
                        tracing::warn!(id, error = %e, "failed to load image");
                        self.status = Some(format!("Could not load image: {e}"));
                    }
                }
                Vec::new()
            }
            Event::Seeded(Ok(response)) => {
                tracing::info!(
                    status = %response.status,
                    message = %response.message,
                    "backend seeded"
                );
                // ids from before the seed no longer exist on the server
                self.ticket += 1;
                self.current = None;
                self.active_label = None;
                self.draw = DrawState::Idle;
                self.catalog.clear_selection();
                self.status = Some(response.message);
                vec![Request::ListItems]
            }
            Event::Seeded(Err(e)) => {
                tracing::warn!(error = %e, "seeding failed");
                self.status = Some(format!("Could not seed sample data: {e}"));
                Vec::new()
            }
            Event::Health(Ok(health)) => {
                tracing::info!(
                    status = %health.status,
                    database = ?health.database,
                    "backend health"
                );
                self.connection = if health.status == "online" {
                    Connection::Online
                } else {
                    Connection::Offline(health.status)
                };
                Vec::new()
            }
            Event::Health(Err(e)) => {
                tracing::warn!(error = %e, "health check failed");
                self.connection = Connection::Offline(e.to_string());
                Vec::new()
            }
        }
    }

    fn enter_item(&mut self, id: ItemId, mut item: Item) -> Vec<Request> {
        item.dedup_labels();
        let store = match AnnotationStore::load(item.task_type, item.annotation.as_ref()) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(id, error = %e, "stored annotation unreadable, starting empty");
                self.status = Some(format!("Item #{id}: {e}"));
                AnnotationStore::new(item.task_type)
            }
        };

        let follow_up = match item.task_type {
            TaskType::BoundingBox => vec![Request::FetchImage {
                id,
                uri: item.content.clone(),
            }],
            TaskType::Classification | TaskType::EntityTagging => Vec::new(),
        };

        self.catalog.select(id);
        self.current = Some(Current { item, store });
        self.active_label = None;
        self.draw = DrawState::Idle;
        self.surface = None;
        self.pending_image = None;
        follow_up
    }
}
