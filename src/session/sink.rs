//! Append-only event log.
//!
//! Every write opens the session file, appends one line and closes it again.
//! A failed write costs exactly that one line: the error is reported on the
//! diagnostic stream and the polling loop carries on. Successful rows are
//! mirrored to the diagnostic stream under the `sipper_logger::mirror` target.

use super::pad::TouchEvent;
use crate::config::StorageConfig;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, error, info};

pub const HEADER: &str = "sipper_id , timestamp, state";
const MIRROR_TARGET: &str = "sipper_logger::mirror";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage initialization failed for {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("No session log has been started")]
    NoArtifact,

    #[error("Error opening log file {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Error writing log file {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: io::Error,
    },
}

// Backing medium for session logs
pub trait LogStorage: Send + fmt::Debug {
    fn check(&self) -> Result<(), StorageError>;

    // Handle is closed when dropped
    fn open_append(&self, name: &str) -> io::Result<Box<dyn Write>>;
}

/// Session logs as files in one directory, e.g. on a mounted SD card.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
    sync_each_write: bool,
}

impl DirectoryStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.log_dir.clone(),
            sync_each_write: config.sync_each_write,
        }
    }
}

impl LogStorage for DirectoryStorage {
    fn check(&self) -> Result<(), StorageError> {
        let unavailable = |source| StorageError::Unavailable {
            path: self.root.clone(),
            source,
        };

        fs::create_dir_all(&self.root).map_err(unavailable)?;
        // Writable? A read-only mount only fails at this point
        let probe = self.root.join(".sipper-logger-probe");
        File::create(&probe).map_err(unavailable)?;
        fs::remove_file(&probe).map_err(unavailable)?;

        info!("Log storage ready at {}", self.root.display());
        Ok(())
    }

    fn open_append(&self, name: &str) -> io::Result<Box<dyn Write>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(name))?;

        if self.sync_each_write {
            Ok(Box::new(SyncOnFlush(file)))
        } else {
            Ok(Box::new(file))
        }
    }
}

// Makes `flush` push the appended data to the medium
struct SyncOnFlush(File);

impl Write for SyncOnFlush {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.sync_data()
    }
}

#[derive(Debug)]
pub struct EventLog {
    storage: Box<dyn LogStorage>,
    artifact: Option<String>,
    written: u64,
    dropped: u64,
}

impl EventLog {
    pub fn new(storage: Box<dyn LogStorage>) -> Self {
        Self {
            storage,
            artifact: None,
            written: 0,
            dropped: 0,
        }
    }

    /// Switches to a new session file and writes its header line.
    ///
    /// A header that cannot be written is reported but does not prevent the
    /// session from starting; events may still reach the file later.
    pub fn begin(&mut self, artifact: String) {
        info!("Logging session to {}", artifact);
        self.artifact = Some(artifact);
        self.written = 0;
        self.dropped = 0;

        if let Err(e) = self.append(HEADER) {
            error!("{}", e);
        }
    }

    pub fn record(&mut self, event: &TouchEvent) -> Result<(), SinkError> {
        let row = event.to_string();
        match self.append(&row) {
            Ok(()) => {
                self.written += 1;
                info!(target: MIRROR_TARGET, "{}", row);
                Ok(())
            }
            Err(e) => {
                self.dropped += 1;
                Err(e)
            }
        }
    }

    fn append(&self, line: &str) -> Result<(), SinkError> {
        let name = self.artifact.as_deref().ok_or(SinkError::NoArtifact)?;

        let mut handle = self.storage.open_append(name).map_err(|source| SinkError::Open {
            name: name.to_string(),
            source,
        })?;
        let write_error = |source| SinkError::Write {
            name: name.to_string(),
            source,
        };
        handle.write_all(line.as_bytes()).map_err(write_error)?;
        handle.write_all(b"\n").map_err(write_error)?;
        handle.flush().map_err(write_error)?;

        debug!("Appended to {}: {}", name, line);
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::{LogStorage, StorageError, MIRROR_TARGET};
    use std::collections::BTreeMap;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Shared {
        files: BTreeMap<String, Vec<u8>>,
        fail_next_opens: usize,
        opens: usize,
        open_handles: usize,
    }

    /// In-memory storage whose next N opens can be made to fail.
    #[derive(Debug, Clone, Default)]
    pub struct MemoryStorage(Arc<Mutex<Shared>>);

    impl MemoryStorage {
        pub fn fail_next_opens(&self, count: usize) {
            self.0.lock().unwrap().fail_next_opens = count;
        }

        pub fn contents(&self, name: &str) -> String {
            let shared = self.0.lock().unwrap();
            String::from_utf8(shared.files.get(name).cloned().unwrap_or_default()).unwrap()
        }

        pub fn files(&self) -> Vec<String> {
            self.0.lock().unwrap().files.keys().cloned().collect()
        }

        pub fn opens(&self) -> usize {
            self.0.lock().unwrap().opens
        }

        pub fn open_handles(&self) -> usize {
            self.0.lock().unwrap().open_handles
        }
    }

    struct Handle {
        shared: Arc<Mutex<Shared>>,
        name: String,
    }

    impl Write for Handle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut shared = self.shared.lock().unwrap();
            shared.files.entry(self.name.clone()).or_default().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for Handle {
        fn drop(&mut self) {
            self.shared.lock().unwrap().open_handles -= 1;
        }
    }

    impl LogStorage for MemoryStorage {
        fn check(&self) -> Result<(), StorageError> {
            Ok(())
        }

        fn open_append(&self, name: &str) -> io::Result<Box<dyn Write>> {
            let mut shared = self.0.lock().unwrap();
            shared.opens += 1;
            if shared.fail_next_opens > 0 {
                shared.fail_next_opens -= 1;
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "file busy"));
            }
            shared.open_handles += 1;
            Ok(Box::new(Handle {
                shared: self.0.clone(),
                name: name.to_string(),
            }))
        }
    }

    /// Formatted diagnostic output collected while [`LogCapture::run`] is active
    /// on the calling thread.
    #[derive(Debug, Clone, Default)]
    pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl LogCapture {
        pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::INFO)
                .finish();
            tracing::subscriber::with_default(subscriber, f)
        }

        pub fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .map(str::to_string)
                .collect()
        }

        pub fn mirror_lines(&self) -> Vec<String> {
            self.lines()
                .into_iter()
                .filter(|line| line.contains(MIRROR_TARGET))
                .collect()
        }
    }

    impl Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{LogCapture, MemoryStorage};
    use super::*;
    use crate::session::pad::TouchKind;

    fn event(sipper_id: usize, timestamp: u64, kind: TouchKind) -> TouchEvent {
        TouchEvent {
            sipper_id,
            timestamp,
            kind,
        }
    }

    #[test]
    fn header_then_rows_each_in_own_open() {
        let storage = MemoryStorage::default();
        let mut log = EventLog::new(Box::new(storage.clone()));
        log.begin("261019_134507.csv".into());
        log.record(&event(3, 60, TouchKind::Start)).unwrap();
        log.record(&event(3, 160, TouchKind::Stop)).unwrap();

        assert_eq!(
            storage.contents("261019_134507.csv"),
            "sipper_id , timestamp, state\n3 , 60 , 1\n3 , 160 , 0\n"
        );
        assert_eq!(storage.opens(), 3);
        assert_eq!(storage.open_handles(), 0);
        assert_eq!(log.written(), 2);
    }

    #[test]
    fn failed_open_drops_only_that_event() {
        let storage = MemoryStorage::default();
        let mut log = EventLog::new(Box::new(storage.clone()));
        log.begin("a.csv".into());

        storage.fail_next_opens(1);
        let err = log.record(&event(0, 60, TouchKind::Start)).unwrap_err();
        assert!(err.to_string().starts_with("Error opening log file"));

        log.record(&event(1, 80, TouchKind::Start)).unwrap();
        assert_eq!(
            storage.contents("a.csv"),
            "sipper_id , timestamp, state\n1 , 80 , 1\n"
        );
        assert_eq!(log.dropped(), 1);
        assert_eq!(log.written(), 1);
        assert_eq!(storage.open_handles(), 0);
    }

    #[test]
    fn only_written_rows_are_mirrored() {
        let storage = MemoryStorage::default();
        let capture = LogCapture::default();
        let mut log = EventLog::new(Box::new(storage.clone()));

        capture.run(|| {
            log.begin("m.csv".into());
            log.record(&event(2, 60, TouchKind::Start)).unwrap();
            storage.fail_next_opens(1);
            assert!(log.record(&event(4, 70, TouchKind::Start)).is_err());
            log.record(&event(2, 130, TouchKind::Stop)).unwrap();
        });

        let mirrored = capture.mirror_lines();
        assert_eq!(mirrored.len(), 2);
        assert!(mirrored[0].contains(" INFO "));
        assert!(mirrored[0].ends_with("sipper_logger::mirror: 2 , 60 , 1"));
        assert!(mirrored[1].ends_with("sipper_logger::mirror: 2 , 130 , 0"));
        assert!(!capture.lines().iter().any(|line| line.contains("4 , 70 , 1")));
    }

    #[test]
    fn header_failure_does_not_block_session() {
        let storage = MemoryStorage::default();
        storage.fail_next_opens(1);
        let mut log = EventLog::new(Box::new(storage.clone()));
        log.begin("b.csv".into());
        log.record(&event(5, 100, TouchKind::Start)).unwrap();
        assert_eq!(storage.contents("b.csv"), "5 , 100 , 1\n");
    }

    #[test]
    fn record_before_begin_is_rejected() {
        let mut log = EventLog::new(Box::new(MemoryStorage::default()));
        assert!(matches!(
            log.record(&event(0, 1, TouchKind::Start)),
            Err(SinkError::NoArtifact)
        ));
    }

    #[test]
    fn directory_storage_appends_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            log_dir: dir.path().join("sd"),
            extension: "csv".into(),
            sync_each_write: true,
        };
        let storage = DirectoryStorage::new(&config);
        storage.check().unwrap();

        let mut log = EventLog::new(Box::new(storage));
        log.begin("261019_134507.csv".into());
        log.record(&event(35, 20, TouchKind::Start)).unwrap();

        let written = fs::read_to_string(dir.path().join("sd").join("261019_134507.csv")).unwrap();
        assert_eq!(written, "sipper_id , timestamp, state\n35 , 20 , 1\n");
        assert!(!dir.path().join("sd").join(".sipper-logger-probe").exists());
    }

    #[test]
    fn directory_storage_check_fails_on_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        let config = StorageConfig {
            log_dir: blocker,
            extension: "csv".into(),
            sync_each_write: false,
        };
        let err = DirectoryStorage::new(&config).check().unwrap_err();
        assert!(err.to_string().starts_with("Storage initialization failed"));
    }
}
