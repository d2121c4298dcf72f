//! Durable model store
//!
//! One bincode file per model identifier under a single directory. The store
//! never deletes anything on its own; `delete` and `purge` exist for explicit
//! administrative use.

use bincode::Options;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::anomaly::IsolationForest;
use crate::error::{Result, VerifiableError};

/// Version of the on-disk record layout
pub const RECORD_FORMAT_VERSION: u32 = 1;

const RECORD_EXTENSION: &str = "bin";
const MAX_IDENTIFIER_LEN: usize = 128;

/// A trained forest together with its identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub format_version: u32,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
    /// Number of samples the forest was trained on
    pub n_samples: usize,
    pub forest: IsolationForest,
}

impl ModelRecord {
    pub fn new(model_id: impl Into<String>, forest: IsolationForest, n_samples: usize) -> Self {
        Self {
            format_version: RECORD_FORMAT_VERSION,
            model_id: model_id.into(),
            created_at: Utc::now(),
            n_samples,
            forest,
        }
    }
}

/// Identifiers become file names, so they are restricted to a safe alphabet
pub fn validate_model_id(model_id: &str) -> Result<()> {
    if model_id.is_empty() || model_id.len() > MAX_IDENTIFIER_LEN {
        return Err(VerifiableError::InvalidInput(format!(
            "model identifier must be 1 to {} characters long",
            MAX_IDENTIFIER_LEN
        )));
    }
    if model_id.starts_with('.') {
        return Err(VerifiableError::InvalidInput(format!(
            "model identifier cannot start with '.': {}",
            model_id
        )));
    }
    if !model_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(VerifiableError::InvalidInput(format!(
            "model identifier may only contain ASCII letters, digits, '-', '_' and '.': {}",
            model_id
        )));
    }
    Ok(())
}

/// Keyed persistence of model records
#[derive(Debug)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    /// Open the store at `path`, creating the directory if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "Opened model store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, model_id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", model_id, RECORD_EXTENSION))
    }

    /// Whether a record exists for `model_id`
    pub fn exists(&self, model_id: &str) -> bool {
        validate_model_id(model_id).is_ok() && self.record_path(model_id).is_file()
    }

    /// Write a record, replacing any previous one for the same identifier
    pub fn save(&self, record: &ModelRecord) -> Result<()> {
        validate_model_id(&record.model_id)?;

        let path = self.record_path(&record.model_id);
        let tmp_path = self
            .root
            .join(format!(".{}.{}.tmp", record.model_id, std::process::id()));

        let bytes = bincode::serialize(record)?;
        let write = || -> std::io::Result<()> {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(&bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            // Readers see either the old record or the new one, never a partial file
            fs::rename(&tmp_path, &path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(
            model_id = %record.model_id,
            path = %path.display(),
            bytes = bytes.len(),
            "Saved model record"
        );
        Ok(())
    }

    /// Load the record for `model_id`
    pub fn load(&self, model_id: &str) -> Result<ModelRecord> {
        validate_model_id(model_id)?;

        let path = self.record_path(model_id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VerifiableError::ModelNotFound(model_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        // A record never decodes to more bytes than the file holds; the limit
        // turns a corrupt length prefix into an error instead of an allocation
        let len = file.metadata()?.len();
        let record: ModelRecord = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(len)
            .deserialize_from(BufReader::new(file))?;
        if record.format_version != RECORD_FORMAT_VERSION {
            return Err(VerifiableError::Serialization(format!(
                "record '{}' has format version {}, expected {}",
                model_id, record.format_version, RECORD_FORMAT_VERSION
            )));
        }
        if record.model_id != model_id {
            return Err(VerifiableError::Serialization(format!(
                "record file for '{}' holds model '{}'",
                model_id, record.model_id
            )));
        }

        Ok(record)
    }

    /// Remove the record for `model_id`; returns whether one existed
    pub fn delete(&self, model_id: &str) -> Result<bool> {
        validate_model_id(model_id)?;
        match fs::remove_file(self.record_path(model_id)) {
            Ok(()) => {
                info!(model_id = %model_id, "Deleted model record");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Identifiers of all stored records, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_model_id(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Remove every record; returns how many were removed
    pub fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        for model_id in self.list()? {
            if self.delete(&model_id)? {
                removed += 1;
            }
        }
        info!(root = %self.root.display(), removed, "Purged model store");
        Ok(removed)
    }
}
