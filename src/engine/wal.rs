//! STOWAGE - Write-Ahead Log (WAL)
//! Every batch is logged to disk before it is applied to the MemTable.
//! Replaying the log on open rebuilds the store's contents.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StorageError};
use crate::types::BatchOp;

use super::memtable::MemTable;

const FRAME_HEADER: usize = 4;
const FRAME_TRAILER: usize = 4;

/// Write-Ahead Log for crash recovery and durability.
///
/// ## Binary Format (per batch)
/// ```text
/// [payload_len: 4 bytes (LE)][payload: bincode Vec<BatchOp>][crc32(payload): 4 bytes (LE)]
/// ```
/// A batch is either fully replayed or not at all.
pub struct WriteAheadLog {
    /// Path to the WAL file on disk.
    path: PathBuf,
    /// File handle opened for appending.
    file: File,
    /// fsync after every append.
    sync_writes: bool,
    /// Number of batch records currently in the file.
    records: usize,
}

/// Outcome of replaying a WAL file.
pub struct Recovery {
    pub memtable: MemTable,
    /// Complete records replayed.
    pub records: usize,
    /// Bytes of a torn trailing record that were discarded.
    pub discarded_bytes: usize,
}

impl WriteAheadLog {
    /// Open or create a WAL file at the specified path.
    pub fn open(path: PathBuf, sync_writes: bool, records: usize) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            sync_writes,
            records,
        })
    }

    /// Returns the path to the WAL file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Number of batch records in the log.
    pub fn records(&self) -> usize {
        self.records
    }

    fn encode_batch(ops: &[BatchOp]) -> Result<Vec<u8>> {
        let payload =
            bincode::serialize(ops).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let mut buf = Vec::with_capacity(FRAME_HEADER + payload.len() + FRAME_TRAILER);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        Ok(buf)
    }

    /// Append a batch and flush it to disk.
    ///
    /// A failed append is rolled back, so the batch is absent after reopen
    /// even when the write or the sync failed halfway.
    pub fn append_batch(&mut self, ops: &[BatchOp]) -> Result<()> {
        let encoded = Self::encode_batch(ops)?;
        let sync_writes = self.sync_writes;
        self.append_with(|file| {
            file.write_all(&encoded)?;
            if sync_writes {
                file.sync_all()?;
            }
            Ok(())
        })
    }

    /// Run `write` against the log file, truncating back to the previous
    /// length if it fails.
    fn append_with<F>(&mut self, write: F) -> Result<()>
    where
        F: FnOnce(&mut File) -> std::io::Result<()>,
    {
        let committed_len = self.file.metadata()?.len();
        if let Err(e) = write(&mut self.file) {
            if let Err(rollback) = self.file.set_len(committed_len) {
                log::error!(
                    "Failed to roll back WAL {:?} to {} bytes: {}",
                    self.path,
                    committed_len,
                    rollback
                );
            }
            return Err(e.into());
        }
        self.records += 1;
        Ok(())
    }

    /// Replay the WAL at `path` into a fresh MemTable.
    ///
    /// A missing file recovers as empty. A record cut short at the end of the
    /// file (crash mid-append) is dropped and the file truncated to the last
    /// whole record. Anything else that does not parse is corruption: the file
    /// is left untouched and recovery fails.
    pub fn recover(path: &Path) -> Result<Recovery> {
        let mut memtable = MemTable::new();
        let mut bytes = Vec::new();
        match File::open(path) {
            Ok(mut file) => {
                file.read_to_end(&mut bytes)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Recovery {
                    memtable,
                    records: 0,
                    discarded_bytes: 0,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let mut offset = 0;
        let mut records = 0;
        while offset < bytes.len() {
            let Frame::Complete { payload, end } = read_frame(&bytes, offset) else {
                // A short record is a torn tail only if no whole record follows it.
                if let Some(next) = find_valid_frame(&bytes, offset + 1) {
                    return Err(StorageError::Corruption(format!(
                        "{:?}: unreadable record at offset {} followed by a valid record at {}",
                        path, offset, next
                    )));
                }
                break;
            };
            if !checksum_matches(&bytes, offset, end) {
                return Err(StorageError::Corruption(format!(
                    "{:?}: checksum mismatch in record at offset {}",
                    path, offset
                )));
            }
            let ops: Vec<BatchOp> = bincode::deserialize(payload).map_err(|e| {
                StorageError::RecoveryFailed(format!("record at offset {}: {}", offset, e))
            })?;
            memtable.apply(ops);
            records += 1;
            offset = end;
        }

        let discarded_bytes = bytes.len() - offset;
        if discarded_bytes > 0 {
            log::warn!(
                "Dropping {} bytes of torn WAL tail in {:?}",
                discarded_bytes,
                path
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }

        Ok(Recovery {
            memtable,
            records,
            discarded_bytes,
        })
    }

    /// Replace the log with a single snapshot record of `memtable`.
    ///
    /// The snapshot is written to a sibling file and renamed over the log,
    /// so a crash leaves either the old or the new log intact.
    pub fn compact(&mut self, memtable: &MemTable) -> Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        let snapshot: Vec<BatchOp> = memtable
            .entries()
            .iter()
            .map(|(k, v)| BatchOp::put(k.clone(), v.clone()))
            .collect();
        {
            let mut tmp = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            if !snapshot.is_empty() {
                tmp.write_all(&Self::encode_batch(&snapshot)?)?;
            }
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.records = usize::from(!snapshot.is_empty());
        Ok(())
    }

    /// Flush buffered writes to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

enum Frame<'a> {
    /// Header, payload and trailer all lie inside the buffer.
    Complete { payload: &'a [u8], end: usize },
    /// The record runs past the end of the buffer.
    Short,
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn read_frame(bytes: &[u8], offset: usize) -> Frame<'_> {
    let Some(payload_len) = read_u32(bytes, offset) else {
        return Frame::Short;
    };
    let payload_start = offset + FRAME_HEADER;
    let end = payload_start
        .saturating_add(payload_len as usize)
        .saturating_add(FRAME_TRAILER);
    if end > bytes.len() {
        return Frame::Short;
    }
    Frame::Complete {
        payload: &bytes[payload_start..end - FRAME_TRAILER],
        end,
    }
}

fn checksum_matches(bytes: &[u8], offset: usize, end: usize) -> bool {
    let payload = &bytes[offset + FRAME_HEADER..end - FRAME_TRAILER];
    read_u32(bytes, end - FRAME_TRAILER) == Some(crc32fast::hash(payload))
}

/// First offset at or after `from` holding a whole, checksummed, decodable record.
fn find_valid_frame(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len()).find(|&offset| match read_frame(bytes, offset) {
        Frame::Complete { payload, end } => {
            checksum_matches(bytes, offset, end)
                && bincode::deserialize::<Vec<BatchOp>>(payload).is_ok()
        }
        Frame::Short => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wal_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("store.wal")
    }

    #[test]
    fn test_append_and_recover() {
        let dir = tempfile::tempdir().unwrap();
        let path = wal_path(&dir);
        {
            let mut wal = WriteAheadLog::open(path.clone(), true, 0).unwrap();
            wal.append_batch(&[BatchOp::put(b"a".to_vec(), b"1".to_vec())])
                .unwrap();
            wal.append_batch(&[
                BatchOp::put(b"b".to_vec(), b"2".to_vec()),
                BatchOp::delete(b"a".to_vec()),
            ])
            .unwrap();
            assert_eq!(wal.records(), 2);
        }
        let recovery = WriteAheadLog::recover(&path).unwrap();
        assert_eq!(recovery.records, 2);
        assert_eq!(recovery.memtable.get(b"a"), None);
        assert_eq!(recovery.memtable.get(b"b"), Some(&b"2".to_vec()));
    }

    #[test]
    fn test_recover_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let recovery = WriteAheadLog::recover(&wal_path(&dir)).unwrap();
        assert!(recovery.memtable.is_empty());
        assert_eq!(recovery.records, 0);
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = wal_path(&dir);
        {
            let mut wal = WriteAheadLog::open(path.clone(), true, 0).unwrap();
            wal.append_batch(&[BatchOp::put(b"kept".to_vec(), b"v".to_vec())])
                .unwrap();
            wal.append_batch(&[BatchOp::put(b"torn".to_vec(), b"v".to_vec())])
                .unwrap();
        }
        let full_len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full_len - 3).unwrap();
        drop(file);

        let recovery = WriteAheadLog::recover(&path).unwrap();
        assert_eq!(recovery.records, 1);
        assert!(recovery.discarded_bytes > 0);
        assert_eq!(recovery.memtable.get(b"kept"), Some(&b"v".to_vec()));
        assert_eq!(recovery.memtable.get(b"torn"), None);

        // The file was truncated, so a second recovery is clean.
        let again = WriteAheadLog::recover(&path).unwrap();
        assert_eq!(again.discarded_bytes, 0);
    }

    #[test]
    fn test_damaged_header_mid_log_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = wal_path(&dir);
        {
            let mut wal = WriteAheadLog::open(path.clone(), true, 0).unwrap();
            for key in [&b"a"[..], b"b", b"c"] {
                wal.append_batch(&[BatchOp::put(key.to_vec(), b"v".to_vec())])
                    .unwrap();
            }
        }
        let mut bytes = std::fs::read(&path).unwrap();
        let original_len = bytes.len();
        bytes[3] = 0x7F;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            WriteAheadLog::recover(&path),
            Err(StorageError::Corruption(_))
        ));
        // Nothing was truncated away.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), original_len as u64);
    }

    #[test]
    fn test_checksum_mismatch_mid_log_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = wal_path(&dir);
        {
            let mut wal = WriteAheadLog::open(path.clone(), true, 0).unwrap();
            wal.append_batch(&[BatchOp::put(b"first".to_vec(), b"1".to_vec())])
                .unwrap();
            wal.append_batch(&[BatchOp::put(b"second".to_vec(), b"2".to_vec())])
                .unwrap();
        }
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[FRAME_HEADER + 1] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            WriteAheadLog::recover(&path),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_failed_append_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = wal_path(&dir);
        let mut wal = WriteAheadLog::open(path.clone(), false, 0).unwrap();
        wal.append_batch(&[BatchOp::put(b"kept".to_vec(), b"v".to_vec())])
            .unwrap();
        let committed_len = std::fs::metadata(&path).unwrap().len();

        // Half a frame reaches the file before the write fails.
        let lost = [BatchOp::put(b"lost".to_vec(), b"v".to_vec())];
        let partial = WriteAheadLog::encode_batch(&lost).unwrap();
        let result = wal.append_with(|file| {
            file.write_all(&partial[..partial.len() / 2])?;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        });
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), committed_len);
        assert_eq!(wal.records(), 1);

        // The whole frame is written but the sync fails.
        let result = wal.append_with(|file| {
            file.write_all(&partial)?;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "sync failed"))
        });
        assert!(result.is_err());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), committed_len);

        wal.append_batch(&[BatchOp::put(b"after".to_vec(), b"v".to_vec())])
            .unwrap();
        let recovery = WriteAheadLog::recover(&path).unwrap();
        assert_eq!(recovery.records, 2);
        assert_eq!(recovery.discarded_bytes, 0);
        assert_eq!(recovery.memtable.get(b"lost"), None);
        assert_eq!(recovery.memtable.get(b"after"), Some(&b"v".to_vec()));
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = wal_path(&dir);
        {
            let mut wal = WriteAheadLog::open(path.clone(), true, 0).unwrap();
            wal.append_batch(&[BatchOp::put(b"key".to_vec(), b"value".to_vec())])
                .unwrap();
        }
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[FRAME_HEADER] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            WriteAheadLog::recover(&path),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_compact_keeps_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = wal_path(&dir);
        let mut wal = WriteAheadLog::open(path.clone(), false, 0).unwrap();
        let mut table = MemTable::new();
        for i in 0..10 {
            let op = BatchOp::put(format!("k{i}").into_bytes(), b"x".to_vec());
            wal.append_batch(std::slice::from_ref(&op)).unwrap();
            table.apply(vec![op]);
        }
        let del = BatchOp::delete(b"k0".to_vec());
        wal.append_batch(std::slice::from_ref(&del)).unwrap();
        table.apply(vec![del]);

        wal.compact(&table).unwrap();
        assert_eq!(wal.records(), 1);

        let recovery = WriteAheadLog::recover(&path).unwrap();
        assert_eq!(recovery.records, 1);
        assert_eq!(recovery.memtable.len(), 9);
        assert_eq!(recovery.memtable.get(b"k0"), None);
    }
}
