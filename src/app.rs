use eframe::egui;
use std::sync::Arc;

use crate::api::Backend;
use crate::catalog::EXPORT_FILE_NAME;
use crate::gateway::{Gateway, Request};
use crate::geometry;
use crate::model::{BoxRecord, Item, ItemId, Span, TaskType};
use crate::session::{Command, Connection, Current, DrawState, Session};
use crate::store::{Preview, EMPTY_PLACEHOLDER};

const ACCENT: egui::Color32 = egui::Color32::from_rgb(99, 102, 241);
const BOX_FILL: egui::Color32 = egui::Color32::from_rgba_premultiplied(20, 20, 48, 51);
const SAVED: egui::Color32 = egui::Color32::from_rgb(16, 185, 129);

// ── App ─────────────────────────────────────────────────────────────────────

pub struct MiniLabelApp {
    session: Session,
    gateway: Gateway,
    texture: Option<(ItemId, egui::TextureHandle)>,
}

impl MiniLabelApp {
    pub fn new(cc: &eframe::CreationContext<'_>, backend: Arc<dyn Backend>) -> Self {
        let gateway = Gateway::new(backend).with_repaint(cc.egui_ctx.clone());
        let app = Self {
            session: Session::new(),
            gateway,
            texture: None,
        };
        app.submit_all(Session::startup_requests());
        app
    }

    fn submit_all(&self, requests: Vec<Request>) {
        for request in requests {
            self.gateway.submit(request);
        }
    }

    fn run(&mut self, command: Command) {
        match self.session.dispatch(command) {
            Ok(requests) => self.submit_all(requests),
            Err(e) => {
                tracing::warn!(error = %e, "command rejected");
                self.session.set_status(e.to_string());
            }
        }
    }

    fn poll_gateway(&mut self) {
        for event in self.gateway.poll() {
            let follow_up = self.session.apply(event);
            self.submit_all(follow_up);
        }
    }

    /// Upload a freshly decoded image, and forget textures of items that are
    /// no longer shown.
    fn ensure_texture(&mut self, ctx: &egui::Context) {
        let current_id = self.session.current().map(|c| c.item.id);
        if self.texture.as_ref().map(|(id, _)| Some(*id)) != Some(current_id) {
            self.texture = None;
        }
        if let (Some(image), Some(id)) = (self.session.take_pending_image(), current_id) {
            let handle =
                ctx.load_texture(format!("item-{id}"), image, egui::TextureOptions::LINEAR);
            self.texture = Some((id, handle));
        }
    }

    fn export(&mut self) {
        if self.session.alert().is_some() {
            return;
        }
        let picked = rfd::FileDialog::new()
            .set_file_name(EXPORT_FILE_NAME)
            .add_filter("JSON", &["json"])
            .save_file();
        if let Some(path) = picked {
            self.run(Command::Export(path));
        }
    }
}

// ── Panels ──────────────────────────────────────────────────────────────────

fn toolbar(ui: &mut egui::Ui, session: &Session, commands: &mut Vec<Command>, export: &mut bool) {
    ui.horizontal(|ui| {
        ui.strong("MiniLabel");
        ui.separator();
        if ui.button("Refresh").clicked() {
            commands.push(Command::Refresh);
        }
        if ui.button("Seed samples").clicked() {
            commands.push(Command::Seed);
        }
        if ui.button("Export JSON").clicked() {
            *export = true;
        }
        ui.separator();
        match session.connection() {
            Connection::Unknown => {
                ui.weak("checking backend...");
            }
            Connection::Online => {
                ui.colored_label(SAVED, "backend online");
            }
            Connection::Offline(reason) => {
                if ui
                    .colored_label(egui::Color32::RED, "backend offline")
                    .on_hover_text(reason)
                    .clicked()
                {
                    commands.push(Command::CheckHealth);
                }
            }
        }
    });
}

fn sidebar(ui: &mut egui::Ui, session: &Session, commands: &mut Vec<Command>) {
    ui.heading("Items");
    egui::ScrollArea::vertical().show(ui, |ui| {
        for row in session.catalog().sidebar() {
            ui.horizontal(|ui| {
                let text = format!("{}\n{}", row.title, row.task_type.to_string().to_uppercase());
                if ui.selectable_label(row.selected, text).clicked() {
                    commands.push(Command::SelectItem(row.id));
                }
                if row.annotated {
                    ui.colored_label(SAVED, "✔");
                }
            });
        }
    });
}

fn label_buttons(
    ui: &mut egui::Ui,
    item: &Item,
    active: Option<&str>,
    commands: &mut Vec<Command>,
) {
    ui.horizontal_wrapped(|ui| {
        for label in &item.label_config {
            if ui
                .selectable_label(active == Some(label.as_str()), label)
                .clicked()
            {
                commands.push(Command::SetActiveLabel(label.clone()));
            }
        }
    });
}

fn preview_panel(ui: &mut egui::Ui, session: &Session, commands: &mut Vec<Command>) {
    let Some(current) = session.current() else {
        ui.heading("Annotations");
        return;
    };
    ui.heading(format!("Annotations ({})", current.store.len()));

    match current.store.preview() {
        Preview::Empty => {
            ui.label(egui::RichText::new(EMPTY_PLACEHOLDER).italics().weak());
        }
        Preview::Card(label) => {
            ui.group(|ui| {
                ui.horizontal(|ui| {
                    ui.colored_label(ACCENT, egui::RichText::new(label).strong());
                    if ui.small_button("✕").on_hover_text("Clear").clicked() {
                        commands.push(Command::ClearLabel);
                    }
                });
            });
        }
        Preview::Rows(rows) => {
            egui::ScrollArea::vertical().show(ui, |ui| {
                for (index, row) in rows.iter().enumerate() {
                    ui.horizontal(|ui| {
                        ui.strong(&row.label);
                        ui.weak(&row.detail);
                        if ui.small_button("🗑").on_hover_text("Remove").clicked() {
                            commands.push(Command::RemoveAnnotation(index));
                        }
                    });
                }
            });
        }
    }

    ui.separator();
    let save = ui.add_enabled(!session.is_saving(), egui::Button::new("Save"));
    if save.clicked() {
        commands.push(Command::Save);
    }
}

// ── Editors ─────────────────────────────────────────────────────────────────

/// Content text with tagged character ranges highlighted.
fn span_layout(text: &str, spans: &[Span], style: &egui::Style) -> egui::text::LayoutJob {
    let plain = egui::TextFormat::simple(
        egui::TextStyle::Body.resolve(style),
        style.visuals.text_color(),
    );
    let tagged = egui::TextFormat {
        background: BOX_FILL,
        underline: egui::Stroke::new(1.0, ACCENT),
        ..plain.clone()
    };

    let mut job = egui::text::LayoutJob::default();
    let mut run = String::new();
    let mut run_tagged = false;
    for (i, ch) in text.chars().enumerate() {
        let is_tagged = spans.iter().any(|s| (s.start..s.end).contains(&i));
        if is_tagged != run_tagged && !run.is_empty() {
            let format = if run_tagged { tagged.clone() } else { plain.clone() };
            job.append(&run, 0.0, format);
            run.clear();
        }
        run_tagged = is_tagged;
        run.push(ch);
    }
    if !run.is_empty() {
        job.append(&run, 0.0, if run_tagged { tagged } else { plain });
    }
    job
}

fn text_editor(ui: &mut egui::Ui, current: &Current, commands: &mut Vec<Command>) {
    let spans = current.store.spans();
    let mut layouter = |ui: &egui::Ui, text: &str, wrap_width: f32| {
        let mut job = span_layout(text, spans, ui.style());
        job.wrap.max_width = wrap_width;
        ui.fonts(|f| f.layout_job(job))
    };

    let mut content = current.item.content.as_str();
    let output = egui::TextEdit::multiline(&mut content)
        .desired_width(f32::INFINITY)
        .layouter(&mut layouter)
        .show(ui);

    if current.item.task_type != TaskType::EntityTagging {
        return;
    }
    let (pointer_down, shift) = ui.input(|i| (i.pointer.any_down(), i.modifiers.shift));
    let range = output.cursor_range.map(|r| {
        let [a, b] = r.sorted_cursors();
        (a.ccursor.index, b.ccursor.index)
    });
    if let Some(command) = finished_selection(range, pointer_down || shift) {
        commands.push(command);
        // collapse the selection so the same range is not tagged twice
        let mut state = output.state.clone();
        let end = egui::text::CCursor::new(range.map_or(0, |(_, end)| end));
        state
            .cursor
            .set_char_range(Some(egui::text::CCursorRange::one(end)));
        state.store(ui.ctx(), output.response.id);
    }
}

/// A non-empty selection becomes a tag once the pointer and shift key are
/// released, however it was made (drag, double-click, shift+click, keyboard).
fn finished_selection(range: Option<(usize, usize)>, extending: bool) -> Option<Command> {
    match range {
        Some((start, end)) if start < end && !extending => {
            Some(Command::SelectText { start, end })
        }
        _ => None,
    }
}

/// Full redraw of the committed boxes.
fn draw_boxes(painter: &egui::Painter, surface: egui::Rect, boxes: &[BoxRecord]) {
    for record in boxes {
        let rect = record.bbox.to_screen(surface);
        painter.rect_filled(rect, 0.0, BOX_FILL);
        painter.rect_stroke(rect, 0.0, egui::Stroke::new(3.0, ACCENT), egui::StrokeKind::Middle);
        painter.text(
            rect.left_top() + egui::vec2(4.0, 2.0),
            egui::Align2::LEFT_TOP,
            &record.label,
            egui::FontId::proportional(13.0),
            egui::Color32::WHITE,
        );
    }
}

fn box_editor(
    ui: &mut egui::Ui,
    session: &Session,
    current: &Current,
    texture: Option<&egui::TextureHandle>,
    commands: &mut Vec<Command>,
) {
    let Some(texture) = texture else {
        ui.spinner();
        return;
    };

    let natural = texture.size_vec2();
    let scale = (ui.available_width() / natural.x).min(1.0);
    let size = natural * scale;
    if session.surface() != Some(size) {
        commands.push(Command::SurfaceResized(size));
    }

    let (response, painter) = ui.allocate_painter(size, egui::Sense::click_and_drag());
    let surface = response.rect;
    painter.image(
        texture.id(),
        surface,
        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
        egui::Color32::WHITE,
    );
    draw_boxes(&painter, surface, current.store.boxes());

    if let DrawState::Dragging { origin, current: pointer } = session.draw_state() {
        let rect = egui::Rect::from_two_pos(
            geometry::to_screen(surface, origin),
            geometry::to_screen(surface, pointer),
        );
        painter.rect_stroke(rect, 0.0, egui::Stroke::new(2.0, ACCENT), egui::StrokeKind::Middle);
    }

    if response.drag_started_by(egui::PointerButton::Primary) {
        let origin = ui.input(|i| i.pointer.press_origin()).or(response.hover_pos());
        if let Some(pos) = origin {
            commands.push(Command::PointerDown(geometry::to_surface(surface, pos)));
        }
    }
    if response.dragged_by(egui::PointerButton::Primary) {
        if let Some(pos) = response.interact_pointer_pos() {
            commands.push(Command::PointerMove(geometry::to_surface(surface, pos)));
        }
    }
    if response.drag_stopped_by(egui::PointerButton::Primary) {
        let end = response
            .interact_pointer_pos()
            .or(ui.input(|i| i.pointer.latest_pos()));
        if let Some(pos) = end {
            commands.push(Command::PointerUp(geometry::to_surface(surface, pos)));
        }
    }
}

fn editor(
    ui: &mut egui::Ui,
    session: &Session,
    texture: Option<&egui::TextureHandle>,
    commands: &mut Vec<Command>,
) {
    let Some(current) = session.current() else {
        ui.centered_and_justified(|ui| {
            ui.label("Select an item from the list to start labeling.");
        });
        return;
    };

    ui.horizontal(|ui| {
        ui.heading(format!("Item #{}", current.item.id));
        ui.label(egui::RichText::new(current.item.task_type.to_string()).color(ACCENT));
    });
    ui.separator();
    label_buttons(ui, &current.item, session.active_label(), commands);
    ui.separator();

    match current.item.task_type {
        TaskType::Classification | TaskType::EntityTagging => text_editor(ui, current, commands),
        TaskType::BoundingBox => box_editor(ui, session, current, texture, commands),
    }
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for MiniLabelApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_gateway();
        self.ensure_texture(ctx);

        let mut commands = Vec::new();
        let mut export = false;

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            toolbar(ui, &self.session, &mut commands, &mut export);
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if self.session.is_saving() {
                    ui.spinner();
                    ui.label("Saving...");
                } else if let Some(status) = self.session.status() {
                    ui.label(status);
                }
            });
        });

        egui::SidePanel::left("items")
            .default_width(220.0)
            .show(ctx, |ui| sidebar(ui, &self.session, &mut commands));

        egui::SidePanel::right("annotations")
            .default_width(240.0)
            .show(ctx, |ui| preview_panel(ui, &self.session, &mut commands));

        let texture = self.texture.as_ref().map(|(_, handle)| handle);
        egui::CentralPanel::default().show(ctx, |ui| {
            editor(ui, &self.session, texture, &mut commands);
        });

        if let Some(message) = self.session.alert() {
            // modal: input behind it is blocked until dismissed
            let modal = egui::Modal::new(egui::Id::new("save-error")).show(ctx, |ui| {
                ui.heading("Error");
                ui.label(message);
                ui.button("OK").clicked()
            });
            if modal.inner || modal.should_close() {
                commands.push(Command::DismissAlert);
            }
        }

        for command in commands {
            self.run(command);
        }
        if export {
            self.export();
        }
    }
}
