use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Local;
use tracing::warn;

/// Plain-text transcript of one download: request, command, raw output, result.
pub struct SessionLog {
    path: PathBuf,
    file: File,
}

impl SessionLog {
    /// Creates `<dir>/download_YYYY-MM-DD_HH-MM-SS.log`, creating `dir` if needed.
    pub fn create(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let name = format!("download_{}.log", Local::now().format("%Y-%m-%d_%H-%M-%S"));
        let path = dir.join(name);
        let file = File::create(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends text and flushes. Write failures are logged, never fatal.
    pub fn write(&mut self, text: &str) {
        if let Err(e) = self.file.write_all(text.as_bytes()).and_then(|_| self.file.flush()) {
            warn!(path = %self.path.display(), error = %e, "session log write failed");
        }
    }

    pub fn request(&mut self, link: &str, folder: &str) {
        self.write(&format!("Spotify link: {link}\nOutput folder: {folder}\n\n"));
    }

    pub fn command(&mut self, command_line: &str) {
        self.write(&format!("Executing:\n{command_line}\n\n"));
    }

    pub fn exit_code(&mut self, code: Option<i32>) {
        match code {
            Some(code) => self.write(&format!("\nProcess exited with code: {code}\n")),
            None => self.write("\nProcess terminated by signal\n"),
        }
    }

    pub fn error(&mut self, message: &str) {
        self.write(&format!("\nERROR:\n{message}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::create(&dir.path().join("logs")).unwrap();

        let name = log.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("download_") && name.ends_with(".log"), "{name}");

        log.request("https://open.spotify.com/track/abc", "/music");
        log.command("spotdl https://open.spotify.com/track/abc --output /music");
        log.write("Downloaded \"Foo\": https://open.spotify.com/track/abc\n");
        log.exit_code(Some(0));

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            text,
            "Spotify link: https://open.spotify.com/track/abc\nOutput folder: /music\n\n\
             Executing:\nspotdl https://open.spotify.com/track/abc --output /music\n\n\
             Downloaded \"Foo\": https://open.spotify.com/track/abc\n\
             \nProcess exited with code: 0\n"
        );
    }

    #[test]
    fn error_section() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::create(dir.path()).unwrap();
        log.error("boom");
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "\nERROR:\nboom\n");
    }
}
