//! Durable `scid,capacity_sat` table shared by the build and merge commands.
//!
//! Every record is flushed as soon as it is appended, so an interrupted build
//! leaves a store that a later build resumes from.

use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::{errors::CapacityError, scid::UndirectedScid};

pub const STORE_HEADER: [&str; 2] = ["scid", "capacity_sat"];

pub type CapacityTable = AHashMap<String, u64>;

pub struct CacheStore {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
    records: RwLock<CapacityTable>,
}

impl CacheStore {
    /// Whether `path` already holds data (exists and is non-empty).
    pub fn is_populated<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
    }

    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self, CapacityError> {
        let path = path.as_ref();
        if Self::is_populated(path) {
            drop_torn_tail(path)?;
        }
        let records = if Self::is_populated(path) {
            read_table(path, true)?
        } else {
            CapacityTable::new()
        };
        let fresh = !Self::is_populated(path);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| io_error(path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer
                .write_record(STORE_HEADER)
                .map_err(|e| csv_error(path, e))?;
            writer.flush().map_err(|e| io_error(path, e))?;
        }
        debug!(path = %path.display(), records = records.len(), fresh, "opened capacity store");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            records: RwLock::new(records),
        })
    }

    /// Reads the complete table; the header row is optional.
    pub fn load_all<P: AsRef<Path>>(path: P) -> Result<CapacityTable, CapacityError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CapacityError::missing_store(path.display().to_string()));
        }
        read_table(path, false)
    }

    pub fn contains(&self, scid: &str) -> bool {
        self.records.read().contains_key(scid)
    }

    pub fn get(&self, scid: &str) -> Option<u64> {
        self.records.read().get(scid).copied()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Writes one record and flushes it. Callers check [`Self::contains`]
    /// first; the store does not deduplicate.
    pub fn append(&self, scid: &str, capacity: u64) -> Result<(), CapacityError> {
        let mut writer = self.writer.lock();
        writer
            .write_record([scid, capacity.to_string().as_str()])
            .map_err(|e| csv_error(&self.path, e))?;
        writer.flush().map_err(|e| io_error(&self.path, e))?;
        self.records.write().insert(scid.to_string(), capacity);
        Ok(())
    }
}

fn read_table(path: &Path, require_header: bool) -> Result<CapacityTable, CapacityError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;
    let mut table = CapacityTable::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.map_err(|e| csv_error(path, e))?;
        if idx == 0 {
            if row.iter().eq(STORE_HEADER) {
                continue;
            }
            if require_header {
                return Err(CapacityError::parse(format!(
                    "{}: expected header '{}'",
                    path.display(),
                    STORE_HEADER.join(",")
                )));
            }
        }
        let (Some(scid), Some(capacity), None) = (row.get(0), row.get(1), row.get(2)) else {
            return Err(CapacityError::parse(format!(
                "{}: row {} must have exactly two fields",
                path.display(),
                idx + 1
            )));
        };
        let capacity = capacity.trim().parse::<u64>().map_err(|_| {
            CapacityError::parse(format!(
                "{}: row {}: capacity '{capacity}' is not an unsigned integer",
                path.display(),
                idx + 1
            ))
        })?;
        // keys are stored in canonical form so `0100x2x0` matches `100x2x0`
        let scid = scid
            .trim()
            .parse::<UndirectedScid>()
            .map_err(|e| CapacityError::parse(format!("{}: row {}: {e}", path.display(), idx + 1)))?
            .to_string();
        if table.contains_key(&scid) {
            warn!(%scid, path = %path.display(), "duplicate capacity record ignored");
            continue;
        }
        table.insert(scid, capacity);
    }
    Ok(table)
}

/// Truncates a trailing partial record left behind by an interrupted write.
fn drop_torn_tail(path: &Path) -> Result<(), CapacityError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| io_error(path, e))?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .map_err(|e| io_error(path, e))?;
    if contents.last() == Some(&b'\n') {
        return Ok(());
    }
    let keep = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    warn!(
        path = %path.display(),
        dropped = contents.len() - keep,
        "discarding incomplete trailing record"
    );
    file.set_len(keep as u64).map_err(|e| io_error(path, e))?;
    file.seek(SeekFrom::End(0)).map_err(|e| io_error(path, e))?;
    Ok(())
}

fn io_error(path: &Path, err: std::io::Error) -> CapacityError {
    CapacityError::io(format!("{}: {err}", path.display()))
}

fn csv_error(path: &Path, err: csv::Error) -> CapacityError {
    if err.is_io_error() {
        CapacityError::io(format!("{}: {err}", path.display()))
    } else {
        CapacityError::parse(format!("{}: {err}", path.display()))
    }
}
