use eframe::egui;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod app;
mod catalog;
mod config;
mod gateway;
mod geometry;
mod model;
mod session;
mod store;

use api::ApiClient;
use app::MiniLabelApp;
use config::Config;

// ── Main ────────────────────────────────────────────────────────────────────

fn main() -> eframe::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minilabel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Usage: minilabel [api-url]\n{e}");
            std::process::exit(1);
        }
    };

    let client = match ApiClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Could not set up HTTP client: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(api_url = %config.api_url, "starting MiniLabel");

    let title = format!("MiniLabel ({})", config.api_url);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title(&title),
        ..Default::default()
    };

    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| Ok(Box::new(MiniLabelApp::new(cc, Arc::new(client))))),
    )
}
