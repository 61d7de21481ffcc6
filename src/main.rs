//! Desktop front-end that runs spotdl for a Spotify link

// Error types
mod error;
// Requests, outcomes and status
mod model;
// Environment-driven settings and spotdl config bootstrap
mod config;
// Rewrites/suppresses spotdl output for the details view
mod filter;
// Per-download transcript files
mod session_log;
// Cancel counter and process-tree termination
mod cancel;
// spotdl worker: tool resolution, spawning, output streaming
mod downloader;
// Start / poll / cancel from the UI thread
mod supervisor;

use cancel::CancelDecision;
use config::{AppConfig, POLL_INTERVAL};
use error::AppError;
use model::Outcome;
use supervisor::Supervisor;

// eframe/egui for GUI application framework
use eframe::{egui, App, Frame};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use std::{collections::VecDeque, sync::Arc};
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Program entry point: logging, runtime, then the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spotdl_gui=info")),
        )
        .init();

    // Before any other thread exists, since it writes the process environment.
    config::load_dotenv();

    let rt = RUNTIME.get_or_try_init(|| Runtime::new().map(Arc::new))?;
    let handle = rt.handle().clone();

    let config = AppConfig::from_env();
    info!(tool = ?config.tool, log_dir = ?config.log_dir, "starting spotdl_gui");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([720.0, 500.0])
            .with_resizable(false),
        ..Default::default()
    };
    eframe::run_native(
        "Spotify Downloader",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Box::new(SpotdlApp::new(Supervisor::new(config, handle)))
        }),
    )?;
    Ok(())
}

/// A modal message waiting to be dismissed
struct Notice {
    title: String,
    body: String,
}

/// Application state for the GUI
struct SpotdlApp {
    /// Input field for the Spotify link
    link_input: String,
    /// Destination folder for downloads
    download_folder: String,
    /// Filtered spotdl output shown under "Details"
    output: String,
    /// Modals waiting to be shown, oldest first
    notices: VecDeque<Notice>,
    /// Owns the running download, if any
    supervisor: Supervisor,
}

impl SpotdlApp {
    fn new(supervisor: Supervisor) -> Self {
        Self {
            link_input: String::new(),
            download_folder: String::new(),
            output: String::new(),
            notices: VecDeque::new(),
            supervisor,
        }
    }

    /// Queues a modal behind any that are still open.
    fn show_notice(&mut self, title: &str, body: impl Into<String>) {
        self.notices.push_back(Notice {
            title: title.to_owned(),
            body: body.into(),
        });
    }

    fn dismiss_notice(&mut self) {
        self.notices.pop_front();
    }

    fn start_download(&mut self) {
        match self.supervisor.start(&self.link_input, &self.download_folder) {
            Ok(()) => self.output.clear(),
            Err(AppError::Validation(e)) => self.show_notice(e.title(), e.to_string()),
            Err(AppError::AlreadyRunning) => {
                self.show_notice("Download in progress", AppError::AlreadyRunning.to_string())
            }
            Err(e) => self.show_notice("Error", e.to_string()),
        }
    }

    fn cancel_download(&mut self) {
        if self.supervisor.request_cancel() == CancelDecision::Notice {
            self.show_notice("Hi", "Stop cancelling.");
        }
    }

    fn browse_folder(&mut self) {
        self.supervisor.folder_browsed();
        let mut dialog = FileDialog::new();
        if !self.download_folder.trim().is_empty() {
            dialog = dialog.set_directory(self.download_folder.trim());
        }
        if let Some(folder) = dialog.pick_folder() {
            self.download_folder = folder.display().to_string();
        }
    }

    fn on_finished(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Completed => self.show_notice("Success", "Download completed successfully."),
            Outcome::NotFound(what) => {
                self.show_notice("spotdl not found", format!("Could not run spotdl ({what})."))
            }
            Outcome::Errored(message) => self.show_notice("Error", message),
            // Reported on the status line only
            Outcome::Failed(_) | Outcome::Cancelled => {}
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for SpotdlApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // 1️⃣ Drain spotdl output through the filter
        let polled = self.supervisor.poll();
        for fragment in polled.fragments {
            self.output.push_str(&fragment);
        }
        if let Some(outcome) = polled.finished {
            self.on_finished(outcome);
        }

        // 2️⃣ Modal notice, one at a time
        if let Some(notice) = self.notices.front() {
            let mut dismissed = false;
            egui::Window::new(notice.title.as_str())
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label(notice.body.as_str());
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            if dismissed {
                self.dismiss_notice();
            }
        }

        // 3️⃣ Main panel: link, folder, actions, status, details
        let running = self.supervisor.status().is_running();
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(self.notices.is_empty(), |ui| {
                ui.label("Spotify Link");
                ui.add(egui::TextEdit::singleline(&mut self.link_input).desired_width(f32::INFINITY));

                ui.label("Download Folder");
                ui.horizontal(|ui| {
                    ui.add(egui::TextEdit::singleline(&mut self.download_folder).desired_width(560.0));
                    if ui.button("Browse").clicked() {
                        self.browse_folder();
                    }
                });

                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    if ui.add_enabled(!running, egui::Button::new("Download")).clicked() {
                        self.start_download();
                    }
                    if ui.button("Cancel").clicked() {
                        self.cancel_download();
                    }
                });

                ui.add_space(5.0);
                ui.label(self.supervisor.status().to_string());

                egui::CollapsingHeader::new("Details")
                    .default_open(false)
                    .show(ui, |ui| {
                        egui::ScrollArea::vertical()
                            .stick_to_bottom(true)
                            .auto_shrink([false; 2])
                            .show(ui, |ui| {
                                ui.add(
                                    egui::TextEdit::multiline(&mut self.output.as_str())
                                        .font(egui::TextStyle::Monospace)
                                        .desired_width(f32::INFINITY),
                                );
                            });
                    });
            });
        });

        // 4️⃣ Keep polling while spotdl runs
        if self.supervisor.status().is_running() {
            ctx.request_repaint_after(POLL_INTERVAL);
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.supervisor.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(rt: &Runtime) -> SpotdlApp {
        let config = AppConfig::from_lookup(|key| match key {
            "SPOTDL_GUI_TOOL" => Some("/nonexistent/spotdl".into()),
            "SPOTDL_GUI_LOG_DIR" => Some("".into()),
            _ => None,
        });
        SpotdlApp::new(Supervisor::new(config, rt.handle().clone()))
    }

    #[test]
    fn notices_wait_their_turn() {
        let rt = Runtime::new().unwrap();
        let mut app = app(&rt);

        for _ in 0..cancel::NOTICE_AFTER {
            app.cancel_download();
        }
        app.on_finished(Outcome::Completed);
        app.start_download();

        let titles: Vec<&str> = app.notices.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Hi", "Success", "Invalid link"]);

        app.dismiss_notice();
        assert_eq!(app.notices.front().map(|n| n.body.as_str()), Some("Download completed successfully."));
        app.dismiss_notice();
        app.dismiss_notice();
        assert!(app.notices.is_empty());
    }
}
