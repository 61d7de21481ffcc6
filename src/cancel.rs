use std::process::Stdio;

use tokio::{process::Command, runtime::Handle};
use tracing::{debug, info, warn};

/// The press that shows the notice instead of cancelling.
pub const NOTICE_AFTER: u8 = 5;

/// Result of one press of the Cancel button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDecision {
    /// Fifth press in a row: show the notice, touch nothing else
    Notice,
    /// Nothing is running
    Ignored,
    /// Kill the running download
    Terminate,
}

/// Counts consecutive Cancel presses with no download start or folder browse in between.
#[derive(Debug, Default)]
pub struct CancelCounter {
    presses: u8,
}

impl CancelCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presses(&self) -> u8 {
        self.presses
    }

    pub fn reset(&mut self) {
        self.presses = 0;
    }

    pub fn press(&mut self, active: bool) -> CancelDecision {
        self.presses += 1;

        if self.presses == NOTICE_AFTER {
            self.presses = 0;
            return CancelDecision::Notice;
        }
        if !active {
            return CancelDecision::Ignored;
        }
        CancelDecision::Terminate
    }
}

/// Force-kills `pid` and everything it started. Returns at once; the kill
/// command runs on the runtime.
pub fn kill_process_tree(runtime: &Handle, pid: u32) {
    info!(pid, "killing downloader process tree");
    let (program, args) = tree_kill_args(pid);
    let mut cmd = Command::new(program);
    cmd.args(&args).stdout(Stdio::null()).stderr(Stdio::null());
    hide_window(&mut cmd);

    runtime.spawn(async move {
        match cmd.status().await {
            Ok(status) if status.success() => debug!(pid, "process tree killed"),
            Ok(status) => warn!(pid, code = ?status.code(), "tree kill command failed"),
            Err(e) => warn!(pid, error = %e, "could not run tree kill command"),
        }
    });
}

/// Blocking variant for shutdown, when the runtime may not get to run anything else.
pub fn kill_process_tree_now(pid: u32) {
    info!(pid, "killing downloader process tree before exit");
    let (program, args) = tree_kill_args(pid);
    let status = std::process::Command::new(program)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = status {
        warn!(pid, error = %e, "could not run tree kill command");
    }
}

#[cfg(windows)]
fn tree_kill_args(pid: u32) -> (&'static str, Vec<String>) {
    ("taskkill", vec!["/F".into(), "/T".into(), "/PID".into(), pid.to_string()])
}

// The downloader is spawned as the leader of its own process group, so the
// negative pid reaches all of its descendants.
#[cfg(not(windows))]
fn tree_kill_args(pid: u32) -> (&'static str, Vec<String>) {
    ("kill", vec!["-KILL".into(), "--".into(), format!("-{pid}")])
}

#[cfg(windows)]
fn hide_window(cmd: &mut Command) {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_window(_cmd: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_presses_are_ignored_until_the_fifth() {
        let mut counter = CancelCounter::new();
        for expected in 1..=4 {
            assert_eq!(counter.press(false), CancelDecision::Ignored);
            assert_eq!(counter.presses(), expected);
        }
        assert_eq!(counter.press(false), CancelDecision::Notice);
        assert_eq!(counter.presses(), 0);
    }

    #[test]
    fn fifth_press_shows_notice_even_while_active() {
        let mut counter = CancelCounter::new();
        for _ in 0..4 {
            counter.press(false);
        }
        assert_eq!(counter.press(true), CancelDecision::Notice);
        assert_eq!(counter.press(true), CancelDecision::Terminate);
    }

    #[test]
    fn reset_starts_the_count_over() {
        let mut counter = CancelCounter::new();
        for _ in 0..4 {
            counter.press(false);
        }
        counter.reset();
        assert_eq!(counter.press(false), CancelDecision::Ignored);
        assert_eq!(counter.presses(), 1);
    }

    #[test]
    fn cycle_repeats() {
        let mut counter = CancelCounter::new();
        let notices = (0..10)
            .filter(|_| counter.press(false) == CancelDecision::Notice)
            .count();
        assert_eq!(notices, 2);
    }

    #[cfg(unix)]
    #[test]
    fn kills_the_whole_group() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut child = Command::new("sh")
                .args(["-c", "sleep 30 & sleep 30; wait"])
                .process_group(0)
                .spawn()
                .unwrap();
            let pid = child.id().unwrap();

            kill_process_tree(&Handle::current(), pid);

            let status = tokio::time::timeout(std::time::Duration::from_secs(10), child.wait())
                .await
                .expect("child survived the kill")
                .unwrap();
            assert!(!status.success());
        });
    }
}
