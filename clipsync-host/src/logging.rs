use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use tracing_subscriber::{EnvFilter, fmt::MakeWriter};

pub const LOG_FILE_NAME: &str = "clipsync-host.log";

/// Hands every formatter a guard over one shared append-mode file.
#[derive(Clone)]
pub struct FileMakeWriter {
    file: Arc<Mutex<File>>,
}

impl FileMakeWriter {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

pub struct FileWriterGuard {
    file: Arc<Mutex<File>>,
}

impl Write for FileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut locked = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        locked.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut locked = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        locked.flush()
    }
}

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriterGuard {
            file: Arc::clone(&self.file),
        }
    }
}

pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

/// Installs the global subscriber. With `to_file` set, output goes to the
/// log folder instead of stderr; if the file cannot be opened the host keeps
/// logging to stderr.
pub fn init_logging(log_dir: &Path, to_file: bool) {
    let env_filter = EnvFilter::from_default_env();

    if !to_file {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return;
    }

    let path = log_file_path(log_dir);
    let writer = std::fs::create_dir_all(log_dir).and_then(|()| FileMakeWriter::open(&path));
    match writer {
        Ok(make_writer) => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_writer(make_writer)
            .init(),
        Err(err) => {
            eprintln!("failed to open log file {}: {err}", path.display());
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn guards_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_file_path(dir.path());
        let make_writer = FileMakeWriter::open(&path).unwrap();

        make_writer.make_writer().write_all(b"first\n").unwrap();
        make_writer.make_writer().write_all(b"second\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
