use std::fs;
use std::io::{self, BufRead, Seek};
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

/// The `FileWatcher` struct defines the polling based state machine which reads
/// from a file path, transparently updating the underlying file descriptor when
/// the file has been rolled over, as is common for logs.
///
/// A file that exists when the watcher is created is read from its end. A file
/// that appears later, or replaces the watched one, is read from its start.
pub struct FileWatcher {
    path: PathBuf,
    reader: Option<io::BufReader<fs::File>>,
    file_id: Option<(u64, u64)>,
    reopen: bool,
    partial: String,
}

impl FileWatcher {
    /// Create a new `FileWatcher`
    ///
    /// A missing path is not an error: the watcher keeps trying to open it on
    /// every read.
    pub fn new(path: PathBuf) -> io::Result<FileWatcher> {
        match fs::File::open(&path) {
            Ok(f) => {
                let mut rdr = io::BufReader::new(f);
                rdr.seek(io::SeekFrom::End(0))?;
                let metadata = fs::metadata(&path)?;
                Ok(FileWatcher {
                    path: path,
                    reader: Some(rdr),
                    file_id: Some((metadata.dev(), metadata.ino())),
                    reopen: false,
                    partial: String::new(),
                })
            }
            Err(e) => match e.kind() {
                io::ErrorKind::NotFound => Ok(FileWatcher {
                    path: path,
                    reader: None,
                    file_id: None,
                    reopen: false,
                    partial: String::new(),
                }),
                _ => Err(e),
            },
        }
    }

    fn file_id(&self) -> Option<(u64, u64)> {
        fs::metadata(&self.path)
            .ok()
            .map(|metadata| (metadata.dev(), metadata.ino()))
    }

    fn open_at_start(&mut self) {
        if let Ok(f) = fs::File::open(&self.path) {
            self.reader = Some(io::BufReader::new(f));
            self.file_id = self.file_id();
            self.partial.clear();
            debug!("now tailing {}", self.path.display());
        } else {
            self.reader = None;
            self.file_id = None;
        }
        self.reopen = false;
    }

    /// True if the file is gone and has not come back yet.
    pub fn dead(&self) -> bool {
        self.reader.is_none() && self.file_id.is_none()
    }

    /// Read a single complete line, without its newline, into `buffer`.
    ///
    /// Returns `Ok(0)` when no complete line is available yet. A trailing
    /// partial line is held back until its newline arrives.
    pub fn read_line(&mut self, buffer: &mut String) -> io::Result<usize> {
        if self.reopen && self.file_id() != self.file_id {
            self.open_at_start();
        }
        if let Some(ref mut reader) = self.reader {
            match reader.read_line(&mut self.partial) {
                Ok(0) => {
                    self.reopen = true;
                    Ok(0)
                }
                Ok(_) => {
                    if !self.partial.ends_with('\n') {
                        return Ok(0);
                    }
                    self.partial.pop();
                    buffer.push_str(&self.partial);
                    self.partial.clear();
                    Ok(buffer.len())
                }
                Err(e) => {
                    if let io::ErrorKind::NotFound = e.kind() {
                        self.reopen = true;
                    }
                    Err(e)
                }
            }
        } else {
            self.open_at_start();
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempdir::TempDir;

    fn append(path: &PathBuf, data: &str) {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap()
            .write_all(data.as_bytes())
            .unwrap();
    }

    fn lines(watcher: &mut FileWatcher) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            let mut line = String::new();
            if watcher.read_line(&mut line).unwrap() == 0 {
                return out;
            }
            out.push(line);
        }
    }

    #[test]
    fn starts_at_end_and_holds_partial_lines() {
        let dir = TempDir::new("pigeon-watch").unwrap();
        let path = dir.path().join("log");
        append(&path, "old\n");
        let mut watcher = FileWatcher::new(path.clone()).unwrap();
        assert!(lines(&mut watcher).is_empty());
        append(&path, "one\ntw");
        assert_eq!(vec!["one"], lines(&mut watcher));
        append(&path, "o\n");
        assert_eq!(vec!["two"], lines(&mut watcher));
    }

    #[test]
    fn follows_rotation() {
        let dir = TempDir::new("pigeon-watch").unwrap();
        let path = dir.path().join("log");
        let mut watcher = FileWatcher::new(path.clone()).unwrap();
        assert!(watcher.dead());
        assert!(lines(&mut watcher).is_empty());
        append(&path, "first\n");
        assert!(lines(&mut watcher).is_empty());
        assert_eq!(vec!["first"], lines(&mut watcher));

        fs::rename(&path, dir.path().join("log.1")).unwrap();
        append(&path, "second\n");
        assert_eq!(vec!["second"], lines(&mut watcher));
        assert!(!watcher.dead());
    }
}
