//! UI-thread side of a download: start, poll, cancel.
//!
//! Every call here returns immediately. The worker runs on the tokio runtime
//! and talks back only through the session's event queue.

use std::sync::Arc;

use tokio::{
    runtime::Handle,
    sync::mpsc::{UnboundedReceiver, error::TryRecvError, unbounded_channel},
};
use tracing::{debug, info, warn};

use crate::{
    cancel::{CancelCounter, CancelDecision, kill_process_tree, kill_process_tree_now},
    config::AppConfig,
    downloader::{DownloadJob, SessionState, run_download},
    error::{AppError, Result},
    filter::LogFilter,
    model::{DownloadRequest, DownloadStatus, Outcome, SupervisorEvent},
};

/// One download from Start until its outcome has been polled.
struct Session {
    state: Arc<SessionState>,
    events: UnboundedReceiver<SupervisorEvent>,
    filter: LogFilter,
}

/// What one `poll` produced
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollResult {
    /// Visible text, in output order
    pub fragments: Vec<String>,
    /// Set once, when the worker reports its outcome
    pub finished: Option<Outcome>,
}

pub struct Supervisor {
    config: AppConfig,
    runtime: Handle,
    session: Option<Session>,
    counter: CancelCounter,
    status: DownloadStatus,
}

impl Supervisor {
    pub fn new(config: AppConfig, runtime: Handle) -> Self {
        Self {
            config,
            runtime,
            session: None,
            counter: CancelCounter::new(),
            status: DownloadStatus::Idle,
        }
    }

    pub fn status(&self) -> &DownloadStatus {
        &self.status
    }

    /// The download-active flag of the current session.
    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.state.is_active())
    }

    /// Validates the inputs and launches spotdl in the background.
    pub fn start(&mut self, link: &str, folder: &str) -> Result<()> {
        self.counter.reset();

        if self.is_active() {
            warn!("start requested while a download is running");
            return Err(AppError::AlreadyRunning);
        }
        let request = DownloadRequest::new(link, folder)?;
        info!(link = %request.link, folder = %request.folder, "starting download");

        let state = Arc::new(SessionState::started());
        let (tx, rx) = unbounded_channel();
        let job = DownloadJob {
            request,
            config: self.config.clone(),
        };
        self.runtime.spawn(run_download(job, state.clone(), tx));

        self.session = Some(Session {
            state,
            events: rx,
            filter: LogFilter::new(),
        });
        self.status = DownloadStatus::Running;
        Ok(())
    }

    /// Drains whatever the worker has queued so far.
    pub fn poll(&mut self) -> PollResult {
        let mut result = PollResult::default();
        let Some(session) = self.session.as_mut() else {
            return result;
        };

        loop {
            match session.events.try_recv() {
                Ok(SupervisorEvent::Line(line)) => {
                    if let Some(text) = session.filter.visible(&line) {
                        result.fragments.push(text);
                    }
                }
                Ok(SupervisorEvent::Finished(outcome)) => {
                    result.finished = Some(outcome);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("download worker went away without reporting");
                    result.finished = Some(Outcome::Errored("download worker stopped unexpectedly".to_owned()));
                    break;
                }
            }
        }

        if let Some(outcome) = &result.finished {
            self.status = DownloadStatus::Finished(outcome.clone());
            self.session = None;
        }
        result
    }

    /// One press of Cancel.
    pub fn request_cancel(&mut self) -> CancelDecision {
        let active = self.is_active();
        let decision = self.counter.press(active);
        debug!(?decision, presses = self.counter.presses(), active, "cancel pressed");
        match decision {
            CancelDecision::Notice => info!("cancel pressed {} times in a row", crate::cancel::NOTICE_AFTER),
            CancelDecision::Ignored => {}
            CancelDecision::Terminate => {
                if let Some(session) = self.session.take() {
                    if let Some(pid) = session.state.cancel() {
                        kill_process_tree(&self.runtime, pid);
                    }
                }
                self.status = DownloadStatus::Finished(Outcome::Cancelled);
                info!("download cancelled");
            }
        }
        decision
    }

    /// The folder chooser was used.
    pub fn folder_browsed(&mut self) {
        self.counter.reset();
    }

    /// Kills a running download without touching the cancel counter; used on exit.
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            if let Some(pid) = session.state.cancel() {
                kill_process_tree_now(pid);
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
