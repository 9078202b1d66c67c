use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Raw copy of everything the child printed and every byte forwarded to it.
/// Write failures are reported once and then ignored so a full disk never
/// interrupts the run.
pub struct Transcript {
    path: PathBuf,
    writer: BufWriter<File>,
    failed: bool,
}

impl Transcript {
    pub fn open(path: &Path, append: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            failed: false,
        })
    }

    pub fn record(&mut self, bytes: &[u8]) {
        if self.failed {
            return;
        }
        if let Err(error) = self.writer.write_all(bytes) {
            self.fail(error);
        }
    }

    pub fn flush(&mut self) {
        if self.failed {
            return;
        }
        if let Err(error) = self.writer.flush() {
            self.fail(error);
        }
    }

    fn fail(&mut self, error: io::Error) {
        self.failed = true;
        tracing::warn!(
            path = %self.path.display(),
            %error,
            "transcript write failed; further output is not recorded"
        );
    }
}

impl Drop for Transcript {
    fn drop(&mut self) {
        self.flush();
    }
}
