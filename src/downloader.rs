//! The download worker: resolves spotdl, runs it, streams its output.

use std::{
    ffi::OsString,
    fs::File,
    io::{BufRead, BufReader, PipeReader, Read, Write},
    path::{Path, PathBuf},
    process::Stdio,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use rust_embed::RustEmbed;
use tokio::{
    process::{Child, Command},
    runtime::Handle,
    sync::mpsc::{UnboundedSender, unbounded_channel},
};
use tracing::{debug, error, info, warn};

use crate::{
    cancel::kill_process_tree,
    config::{AppConfig, Credentials, ToolSource, write_spotdl_config},
    error::{AppError, Result},
    model::{DownloadRequest, Outcome, SupervisorEvent},
    session_log::SessionLog,
};

/// Optional spotdl executable shipped inside the binary.
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

fn bundled_name() -> &'static str {
    if cfg!(target_os = "windows") { "spotdl.exe" } else { "spotdl" }
}

pub fn has_bundled_tool() -> bool {
    Asset::get(bundled_name()).is_some()
}

/// State shared between the UI thread and one download worker.
#[derive(Debug, Default)]
pub struct SessionState {
    active: AtomicBool,
    cancelled: AtomicBool,
    pid: Mutex<Option<u32>>,
}

impl SessionState {
    /// A session that is active from the moment it is created.
    pub fn started() -> Self {
        Self {
            active: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Marks the session cancelled and inactive, returning the pid to kill if spawned.
    pub fn cancel(&self) -> Option<u32> {
        self.cancelled.store(true, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        self.pid()
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_pid(&self, pid: Option<u32>) {
        *self.pid.lock().unwrap_or_else(|e| e.into_inner()) = pid;
    }

    fn finish(&self) {
        self.set_pid(None);
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Everything the worker needs, moved onto the background task.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub request: DownloadRequest,
    pub config: AppConfig,
}

/// spotdl arguments after the executable's own base arguments.
pub fn build_args(request: &DownloadRequest, config_flags: bool) -> Vec<String> {
    let mut args = Vec::with_capacity(5);
    if config_flags {
        args.push("--config".to_owned());
        args.push("--no-cache".to_owned());
    }
    args.push(request.link.clone());
    args.push("--output".to_owned());
    args.push(request.folder.clone());
    args
}

/// Program plus base arguments for a tool source.
pub fn resolve_tool(source: &ToolSource) -> Result<(OsString, Vec<OsString>)> {
    match source {
        ToolSource::Program(path) => Ok((path.clone().into_os_string(), Vec::new())),
        ToolSource::Python { interpreter } => {
            Ok((interpreter.clone(), vec!["-m".into(), "spotdl".into()]))
        }
        ToolSource::Bundled => Ok((extract_bundled()?.into_os_string(), Vec::new())),
    }
}

fn extract_bundled() -> Result<PathBuf> {
    let bin = bundled_name();
    let data = Asset::get(bin).ok_or_else(|| AppError::ToolNotFound(format!("bundled {bin}")))?;
    let dir = dirs::cache_dir()
        .ok_or_else(|| AppError::Process("user cache directory not found".to_owned()))?
        .join("spotdl_gui");
    install_tool(&dir, bin, &data.data)
}

/// Puts `bytes` at `dir/name` unless an identical file is already there.
///
/// A changed or foreign file is replaced through a rename, so a copy that is
/// still running keeps its old inode.
fn install_tool(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    if std::fs::read(&path).is_ok_and(|current| current == bytes) {
        return Ok(path);
    }

    let staging = dir.join(format!(".{name}.{}.tmp", std::process::id()));
    let mut f = File::create(&staging)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    drop(f);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o755))?;
    }
    if let Err(e) = std::fs::rename(&staging, &path) {
        let _ = std::fs::remove_file(&staging);
        return Err(e.into());
    }
    debug!(path = %path.display(), "bundled spotdl extracted");
    Ok(path)
}

fn command_line(program: &OsString, args: &[OsString]) -> String {
    std::iter::once(program)
        .chain(args)
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(windows)]
fn configure_process(cmd: &mut Command) {
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn configure_process(cmd: &mut Command) {
    cmd.process_group(0);
}

/// Runs one download to completion and reports exactly one `Finished` event.
pub async fn run_download(
    job: DownloadJob,
    state: Arc<SessionState>,
    events: UnboundedSender<SupervisorEvent>,
) {
    let mut log = None;
    let result = execute(&job, &state, &events, &mut log).await;

    let outcome = match result {
        Ok(()) => Outcome::Completed,
        Err(AppError::NonZeroExit(code)) => Outcome::Failed(code),
        Err(e) => {
            if let Some(log) = log.as_mut() {
                log.error(&e.to_string());
            }
            match e {
                AppError::ToolNotFound(what) => Outcome::NotFound(what),
                other => Outcome::Errored(other.to_string()),
            }
        }
    };
    let outcome = if state.is_cancelled() { Outcome::Cancelled } else { outcome };

    match &outcome {
        Outcome::Completed | Outcome::Cancelled => info!(?outcome, "download finished"),
        _ => error!(?outcome, "download finished"),
    }

    state.finish();
    drop(log);
    let _ = events.send(SupervisorEvent::Finished(outcome));
}

async fn execute(
    job: &DownloadJob,
    state: &SessionState,
    events: &UnboundedSender<SupervisorEvent>,
    log: &mut Option<SessionLog>,
) -> Result<()> {
    if let Some(dir) = &job.config.log_dir {
        let session_log = SessionLog::create(dir)?;
        info!(path = %session_log.path().display(), "session log opened");
        *log = Some(session_log);
    }
    if let Some(log) = log.as_mut() {
        log.request(&job.request.link, &job.request.folder);
    }

    if job.config.bootstrap_config {
        let credentials = Credentials::from_env()?;
        let home = job
            .config
            .home_dir
            .as_deref()
            .ok_or_else(|| AppError::Process("home directory not found".to_owned()))?;
        let path = write_spotdl_config(home, &credentials)?;
        if let Some(log) = log.as_mut() {
            log.write(&format!("Config written: {}\n", path.display()));
        }
    }

    let (program, mut args) = resolve_tool(&job.config.tool)?;
    args.extend(build_args(&job.request, job.config.bootstrap_config).into_iter().map(OsString::from));

    let line = command_line(&program, &args);
    info!(command = %line, "starting spotdl");
    if let Some(log) = log.as_mut() {
        log.command(&line);
    }

    // stdout and stderr share one pipe so lines arrive in the order spotdl wrote them.
    let (reader, writer) = std::io::pipe()?;
    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(writer.try_clone()?))
        .stderr(Stdio::from(writer))
        .kill_on_drop(true);
    configure_process(&mut cmd);

    let spawned = cmd.spawn();
    // The command still holds the parent's write ends; EOF needs them closed.
    drop(cmd);
    let mut child = spawned.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::ToolNotFound(program.to_string_lossy().into_owned()),
        _ => AppError::Io(e),
    })?;

    let pid = child.id();
    state.set_pid(pid);
    // A cancel that arrived before the pid was known could not kill anything.
    if state.is_cancelled() {
        if let Some(pid) = pid {
            kill_process_tree(&Handle::current(), pid);
        }
    }

    let result = stream_output(&mut child, reader, events, log).await;
    if let (Err(e), Some(pid)) = (&result, pid) {
        if !matches!(e, AppError::NonZeroExit(_)) {
            warn!(pid, error = %e, "download aborted, killing process tree");
            kill_process_tree(&Handle::current(), pid);
        }
    }
    result
}

/// Forwards merged output until every writer is closed, then waits for the exit status.
async fn stream_output(
    child: &mut Child,
    reader: PipeReader,
    events: &UnboundedSender<SupervisorEvent>,
    log: &mut Option<SessionLog>,
) -> Result<()> {
    let (line_tx, mut line_rx) = unbounded_channel();
    let pump = tokio::task::spawn_blocking(move || read_lines(reader, line_tx));
    let mut receiver_gone = false;

    while let Some(line) = line_rx.recv().await {
        debug!("spotdl> {}", line.trim_end());
        if let Some(log) = log.as_mut() {
            log.write(&line);
        }
        // Keep draining after the receiver is gone so the child never blocks on a full pipe.
        if events.send(SupervisorEvent::Line(line)).is_err() && !receiver_gone {
            receiver_gone = true;
            warn!("output receiver dropped");
        }
    }
    pump.await
        .map_err(|e| AppError::Process(format!("output reader failed: {e}")))??;

    let status = child.wait().await?;
    if let Some(log) = log.as_mut() {
        log.exit_code(status.code());
    }
    info!(code = ?status.code(), "spotdl exited");

    if status.success() {
        Ok(())
    } else {
        Err(AppError::NonZeroExit(status.code()))
    }
}

/// Splits raw output into `\n`-terminated lines. Bytes that are not UTF-8 are replaced.
fn read_lines(reader: impl Read, lines: UnboundedSender<String>) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&buf);
        let text = text.trim_end_matches('\n').trim_end_matches('\r');
        // A closed receiver only means nobody shows the output any more.
        let _ = lines.send(format!("{text}\n"));
    }
}
