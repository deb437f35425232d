//! Owns the gateway's working directory: the
//! advisory single-writer lock, the session counter and per-agent
//! checkpoint metadata, sanitized userdata blobs, the checkpoint event
//! log, and path allocation for the datastore/datalake/batch-output
//! trees.

pub mod error;
pub mod lock;
pub mod metadata;
pub mod sanitize;

use std::path::{Path, PathBuf};

pub use error::{FilesError, Result};
use llmgw_types::WorkingMetadata;
use lock::LockFile;
use metadata::DirectoryMetadata;

pub struct FileManager {
    directory: PathBuf,
    lock: LockFile,
    metadata: DirectoryMetadata,
    session_id: u64,
}

impl FileManager {
    /// Opens (creating if needed) the working directory at `directory`,
    /// acquiring the advisory lock and incrementing the session counter.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;

        let lock = LockFile::acquire(directory.join(".filemanager.lock"))?;

        let mut metadata = DirectoryMetadata::load(&directory.join("metadata.json"));
        metadata.session_counter += 1;
        let session_id = metadata.session_counter;
        metadata.save(&directory.join("metadata.json"))?;

        tracing::info!(dir = %directory.display(), session_id, "file manager opened");

        Ok(FileManager {
            directory,
            lock,
            metadata,
            session_id,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn agent_metadata(&self, agent_name: &str) -> WorkingMetadata {
        self.metadata.agent(agent_name)
    }

    pub fn set_agent_metadata(&mut self, agent_name: impl Into<String>, metadata: WorkingMetadata) {
        self.metadata.set_agent(agent_name, metadata);
    }

    /// Writes pending metadata changes to disk. Idempotent; safe to call
    /// repeatedly (e.g. once per checkpoint transition).
    pub fn persist(&self) -> Result<()> {
        self.metadata.save(&self.directory.join("metadata.json"))
    }

    /// Closes the working directory, releasing the advisory lock. `self`
    /// is consumed so a caller cannot keep using a manager after the lock
    /// is gone.
    pub fn close(self) -> Result<()> {
        self.persist()?;
        self.lock.release();
        Ok(())
    }

    // --- userdata -------------------------------------------------------

    fn userdata_dir(&self) -> PathBuf {
        self.directory.join("userdata")
    }

    fn userdata_path(&self, key: &str) -> PathBuf {
        self.userdata_dir().join(format!("{}.bin", sanitize::sanitize_key(key)))
    }

    /// Saves `value` under `key`. Silently no-ops if the file already
    /// exists and `overwrite` is false — intentional, if surprising.
    pub fn save_userdata<T: serde::Serialize>(&self, key: &str, value: &T, overwrite: bool) -> Result<()> {
        std::fs::create_dir_all(self.userdata_dir())?;
        let path = self.userdata_path(key);
        if path.exists() && !overwrite {
            tracing::debug!(%key, "userdata already exists, not overwriting");
            return Ok(());
        }
        let bytes = bincode::serialize(value)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load_userdata<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        let path = self.userdata_path(key);
        if !path.exists() {
            return Err(FilesError::UserdataNotFound(key.to_string()));
        }
        let bytes = std::fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    // --- path allocation --------------------------------------------------

    pub fn allocate_datastore_dir(&self) -> Result<PathBuf> {
        let dir = self.directory.join("datastore");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn allocate_datastore_path(&self) -> Result<PathBuf> {
        Ok(self.allocate_datastore_dir()?.join("datastore.db"))
    }

    pub fn allocate_datalake_dir(&self) -> Result<PathBuf> {
        let dir = self.allocate_datastore_dir()?.join("datalake");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn allocate_apimeta_dir(&self) -> Result<PathBuf> {
        let dir = self.allocate_datastore_dir()?.join("apimeta");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn allocate_batch_out_dir(&self) -> Result<PathBuf> {
        let dir = self.allocate_datastore_dir()?.join("batch_out");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    // --- checkpoint event log -------------------------------------------

    /// Appends one TSV row to `logs/checkpoint_events.tsv`, writing the
    /// header first if the file is new.
    pub fn log_checkpoint_event(
        &self,
        event_type: &str,
        agent_name: &str,
        checkpoint: Option<&str>,
        seq_id: Option<u64>,
    ) -> Result<()> {
        use std::io::Write;

        let log_dir = self.directory.join("logs");
        std::fs::create_dir_all(&log_dir)?;
        let log_path = log_dir.join("checkpoint_events.tsv");

        let is_new = !log_path.exists();
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&log_path)?;
        if is_new {
            writeln!(file, "session_id\tevent_type\tagent_name\tcheckpoint\tseq_id")?;
        }
        let checkpoint_display = checkpoint.unwrap_or("anonymous");
        let seq_display = seq_id.map(|s| s.to_string()).unwrap_or_else(|| "".to_string());
        writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}",
            self.session_id, event_type, agent_name, checkpoint_display, seq_display
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory_and_increments_session() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workdir");
        let fm = FileManager::open(&path).unwrap();
        assert_eq!(fm.session_id(), 1);
        fm.close().unwrap();

        let fm2 = FileManager::open(&path).unwrap();
        assert_eq!(fm2.session_id(), 2);
    }

    #[test]
    fn second_open_while_locked_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workdir");
        let _fm = FileManager::open(&path).unwrap();
        let second = FileManager::open(&path);
        assert!(matches!(second, Err(FilesError::Locked(_))));
    }

    #[test]
    fn userdata_round_trips_and_respects_overwrite_flag() {
        let dir = tempdir().unwrap();
        let fm = FileManager::open(dir.path().join("workdir")).unwrap();

        fm.save_userdata("my-key", &42u32, false).unwrap();
        let loaded: u32 = fm.load_userdata("my-key").unwrap();
        assert_eq!(loaded, 42);

        fm.save_userdata("my-key", &99u32, false).unwrap();
        let still_old: u32 = fm.load_userdata("my-key").unwrap();
        assert_eq!(still_old, 42, "overwrite=false must no-op on an existing file");

        fm.save_userdata("my-key", &99u32, true).unwrap();
        let updated: u32 = fm.load_userdata("my-key").unwrap();
        assert_eq!(updated, 99);
    }

    #[test]
    fn agent_metadata_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workdir");
        let mut fm = FileManager::open(&path).unwrap();
        fm.set_agent_metadata(
            "a",
            WorkingMetadata {
                latest_checkpoint: Some("chk".into()),
                checkpoint_counter: 7,
            },
        );
        fm.close().unwrap();

        let fm2 = FileManager::open(&path).unwrap();
        let meta = fm2.agent_metadata("a");
        assert_eq!(meta.latest_checkpoint.as_deref(), Some("chk"));
        assert_eq!(meta.checkpoint_counter, 7);
    }

    #[test]
    fn checkpoint_log_writes_header_once() {
        let dir = tempdir().unwrap();
        let fm = FileManager::open(dir.path().join("workdir")).unwrap();
        fm.log_checkpoint_event("enter", "a", Some("chk"), Some(0)).unwrap();
        fm.log_checkpoint_event("exit", "a", Some("chk"), Some(1)).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("workdir/logs/checkpoint_events.tsv")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "session_id\tevent_type\tagent_name\tcheckpoint\tseq_id");
    }
}
