//! File output for log lines
//!
//! Plain lines (no ANSI codes) are appended to a single log file. When the
//! file would grow past `max_size_bytes` it is rotated: `wshub.log` becomes
//! `wshub.log.1`, older backups shift up, and anything past `max_backups`
//! is deleted.
//!
//! File logging is off until `init_file_logging` is called. A write error
//! disables it again so console output keeps working.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Where and how much to keep on disk
#[derive(Debug, Clone)]
pub struct FileLogConfig {
    pub path: PathBuf,
    pub max_size_bytes: u64,
    pub max_backups: usize,
}

struct FileSink {
    config: FileLogConfig,
    writer: Option<BufWriter<File>>,
    written: u64,
}

static FILE_SINK: Lazy<Mutex<Option<FileSink>>> = Lazy::new(|| Mutex::new(None));

impl FileSink {
    fn open(config: FileLogConfig) -> io::Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = open_append(&config.path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            config,
            writer: Some(BufWriter::new(file)),
            written,
        })
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let len = line.len() as u64 + 1;
        if self.written > 0 && self.written + len > self.config.max_size_bytes {
            self.rotate()?;
        }

        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => return Err(io::Error::new(io::ErrorKind::Other, "log file closed")),
        };
        writeln!(writer, "{}", line)?;
        self.written += len;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        // Close the current file before renaming it
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let path = &self.config.path;
        let max = self.config.max_backups;
        if max == 0 {
            fs::remove_file(path)?;
        } else {
            let oldest = backup_path(path, max);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for n in (1..max).rev() {
                let from = backup_path(path, n);
                if from.exists() {
                    fs::rename(&from, backup_path(path, n + 1))?;
                }
            }
            fs::rename(path, backup_path(path, 1))?;
        }

        self.writer = Some(BufWriter::new(open_append(path)?));
        self.written = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

/// Start (or redirect) file output
///
/// Any previously open log file is flushed and closed.
pub fn init_file_logging(config: FileLogConfig) -> io::Result<()> {
    let sink = FileSink::open(config)?;
    let previous = FILE_SINK.lock().replace(sink);
    if let Some(mut previous) = previous {
        let _ = previous.flush();
    }
    Ok(())
}

/// Append one line to the log file, if file logging is enabled
pub fn write_to_file(line: &str) {
    let mut guard = FILE_SINK.lock();
    let failed = match guard.as_mut() {
        Some(sink) => sink.write_line(line).err(),
        None => return,
    };

    if let Some(e) = failed {
        *guard = None;
        let _ = writeln!(io::stderr(), "Log file write failed, file logging disabled: {}", e);
    }
}

/// Push buffered lines to disk
pub fn flush_file_logging() {
    if let Some(sink) = FILE_SINK.lock().as_mut() {
        if let Err(e) = sink.flush() {
            let _ = writeln!(io::stderr(), "Log file flush failed: {}", e);
        }
    }
}
