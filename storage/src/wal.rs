use crc32fast::Hasher;
use ppi_core::error::{ErrorCode, PpiError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Record header: LSN (8) + CRC (4) + payload length (4).
pub const HEADER_LEN: u64 = 16;

#[derive(Error, Debug)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Data integrity error (CRC mismatch) at LSN {0}")]
    CrcMismatch(u64),
    #[error("Corrupt entry")]
    CorruptEntry,
    #[error("Out-of-order LSN {found} after {previous}")]
    LsnRegression { previous: u64, found: u64 },
    #[error("WAL is unusable after a failed rollback; reopen the store")]
    Poisoned,
}

impl PpiError for WalError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::Internal
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InjectedFault {
    /// Fail after half the record reached the file.
    Write,
    /// Fail after the whole record was written, before fsync completes.
    Sync,
}

/// Append-only log of store transactions.
///
/// Records are `[LSN: u64][CRC32: u32][Len: u32][Payload: Len bytes]`, big endian.
/// The file never holds bytes past `committed_len` once `commit` returns.
pub struct Wal {
    path: PathBuf,
    file: File,
    current_lsn: u64,
    committed_len: u64,
    poisoned: bool,
    #[cfg(test)]
    fault: Option<InjectedFault>,
}

impl Wal {
    /// Open a WAL file, creating it (and its directory) if missing.
    /// The LSN counter starts at 0 until `replay` has run.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;
        let committed_len = file.metadata().await?.len();

        Ok(Self {
            path,
            file,
            current_lsn: 0,
            committed_len,
            poisoned: false,
            #[cfg(test)]
            fault: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append one record and return its LSN.
    ///
    /// On failure the file is cut back to its length before the call and the
    /// LSN is not consumed, so a failed commit leaves nothing to replay. If the
    /// cut itself fails the WAL refuses further commits.
    pub async fn commit(&mut self, payload: &[u8]) -> Result<u64, WalError> {
        if self.poisoned {
            return Err(WalError::Poisoned);
        }
        let lsn = self.current_lsn + 1;
        let record = encode_entry(lsn, payload)?;

        match self.write_durably(&record).await {
            Ok(()) => {
                self.current_lsn = lsn;
                self.committed_len += record.len() as u64;
                Ok(lsn)
            }
            Err(err) => {
                self.rollback().await;
                Err(err)
            }
        }
    }

    async fn write_durably(&mut self, record: &[u8]) -> Result<(), WalError> {
        #[cfg(test)]
        if self.fault == Some(InjectedFault::Write) {
            self.fault = None;
            self.file.write_all(&record[..record.len() / 2]).await?;
            return Err(injected_error());
        }

        self.file.write_all(record).await?;
        self.file.flush().await?;

        #[cfg(test)]
        if self.fault == Some(InjectedFault::Sync) {
            self.fault = None;
            return Err(injected_error());
        }

        self.file.sync_all().await?;
        Ok(())
    }

    async fn rollback(&mut self) {
        let restored = async {
            self.file.set_len(self.committed_len).await?;
            self.file.seek(std::io::SeekFrom::End(0)).await?;
            self.file.sync_all().await
        };
        let result = restored.await;
        if let Err(e) = result {
            tracing::error!(
                path = %self.path.display(),
                committed_len = self.committed_len,
                error = %e,
                "WAL rollback failed"
            );
            self.poisoned = true;
        }
    }

    #[cfg(test)]
    pub(crate) fn inject_fault(&mut self, fault: InjectedFault) {
        self.fault = Some(fault);
    }

    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Replays the WAL from the beginning and returns the last valid LSN.
    /// A torn record at the tail (crash mid-append) is truncated away.
    pub async fn replay<F>(&mut self, mut callback: F) -> Result<u64, WalError>
    where
        F: FnMut(u64, Vec<u8>) -> Result<(), WalError>,
    {
        let file = &mut self.file;
        let file_len = file.metadata().await?.len();
        file.seek(std::io::SeekFrom::Start(0)).await?;

        let mut last_lsn = 0;
        let mut valid_end_pos = 0;

        loop {
            let lsn = match file.read_u64().await {
                Ok(v) => v,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            };

            let header_rest = async {
                let crc = file.read_u32().await?;
                let len = file.read_u32().await?;
                Ok::<_, std::io::Error>((crc, len))
            };
            let (crc, len) = match header_rest.await {
                Ok(v) => v,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            };

            // A length running past the end of the file is a torn or corrupt tail.
            let remaining = file_len.saturating_sub(file.stream_position().await?);
            if u64::from(len) > remaining {
                break;
            }

            let mut payload = vec![0u8; len as usize];
            match file.read_exact(&mut payload).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            }

            let mut hasher = Hasher::new();
            hasher.update(&payload);
            if hasher.finalize() != crc {
                return Err(WalError::CrcMismatch(lsn));
            }
            if lsn <= last_lsn {
                return Err(WalError::LsnRegression {
                    previous: last_lsn,
                    found: lsn,
                });
            }

            callback(lsn, payload)?;
            last_lsn = lsn;
            valid_end_pos = file.stream_position().await?;
        }

        if valid_end_pos < file_len {
            tracing::warn!(
                path = %self.path.display(),
                valid_end_pos,
                "truncating torn WAL tail"
            );
            file.set_len(valid_end_pos).await?;
        }

        file.seek(std::io::SeekFrom::End(0)).await?;
        self.current_lsn = last_lsn;
        self.committed_len = valid_end_pos;

        Ok(last_lsn)
    }
}

fn encode_entry(lsn: u64, payload: &[u8]) -> Result<Vec<u8>, WalError> {
    let len = u32::try_from(payload.len()).map_err(|_| WalError::CorruptEntry)?;

    let mut hasher = Hasher::new();
    hasher.update(payload);
    let crc = hasher.finalize();

    let mut record = Vec::with_capacity(HEADER_LEN as usize + payload.len());
    record.extend_from_slice(&lsn.to_be_bytes());
    record.extend_from_slice(&crc.to_be_bytes());
    record.extend_from_slice(&len.to_be_bytes());
    record.extend_from_slice(payload);
    Ok(record)
}

#[cfg(test)]
fn injected_error() -> WalError {
    WalError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "injected storage fault",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_wal_append_and_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let mut wal = Wal::open(&path).await.expect("failed to open wal");

        let entry1 = b"proteins";
        let lsn1 = wal.commit(entry1).await.expect("commit failed");

        let entry2 = b"interactions";
        let lsn2 = wal.commit(entry2).await.expect("commit failed");

        assert_eq!(lsn1, 1);
        assert_eq!(lsn2, 2);

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        assert_eq!(
            metadata.len(),
            (HEADER_LEN * 2) + entry1.len() as u64 + entry2.len() as u64
        );
    }

    #[tokio::test]
    async fn test_wal_replay_restores_lsn() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replay.wal");

        {
            let mut wal = Wal::open(&path).await.unwrap();
            wal.commit(b"Entry 1").await.unwrap();
            wal.commit(b"Entry 2").await.unwrap();
        }

        let mut wal = Wal::open(&path).await.unwrap();
        let mut recovered = Vec::new();
        let last_lsn = wal
            .replay(|lsn, payload| {
                recovered.push((lsn, payload));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(last_lsn, 2);
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0].1, b"Entry 1");
        assert_eq!(recovered[1].1, b"Entry 2");
        assert_eq!(wal.current_lsn(), 2);

        // Appends continue after the replayed LSN.
        assert_eq!(wal.commit(b"Entry 3").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_wal_truncates_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("torn.wal");

        {
            let mut wal = Wal::open(&path).await.unwrap();
            wal.commit(b"complete").await.unwrap();
        }
        let intact_len = tokio::fs::metadata(&path).await.unwrap().len();

        // Half-written header after the last good record.
        {
            let mut raw = OpenOptions::new().append(true).open(&path).await.unwrap();
            raw.write_all(&[0, 0, 0, 0, 0, 0, 0, 2, 1, 2]).await.unwrap();
            raw.flush().await.unwrap();
        }

        let mut wal = Wal::open(&path).await.unwrap();
        let last = wal.replay(|_, _| Ok(())).await.unwrap();
        assert_eq!(last, 1);
        assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), intact_len);
    }

    #[tokio::test]
    async fn test_wal_detects_crc_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crc.wal");

        {
            let mut wal = Wal::open(&path).await.unwrap();
            wal.commit(b"payload").await.unwrap();
        }

        let mut bytes = tokio::fs::read(&path).await.unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        tokio::fs::write(&path, &bytes).await.unwrap();

        let mut wal = Wal::open(&path).await.unwrap();
        let err = wal.replay(|_, _| Ok(())).await.unwrap_err();
        assert!(matches!(err, WalError::CrcMismatch(1)));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fault.wal");

        let mut wal = Wal::open(&path).await.unwrap();
        assert_eq!(wal.commit(b"first").await.unwrap(), 1);
        let committed = tokio::fs::metadata(&path).await.unwrap().len();

        for fault in [InjectedFault::Write, InjectedFault::Sync] {
            wal.inject_fault(fault);
            assert!(matches!(wal.commit(b"lost").await, Err(WalError::Io(_))));
            assert_eq!(wal.current_lsn(), 1);
            assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), committed);
        }

        // The LSN of the failed commits is reused, and only real records replay.
        assert_eq!(wal.commit(b"second").await.unwrap(), 2);
        drop(wal);

        let mut wal = Wal::open(&path).await.unwrap();
        let mut recovered = Vec::new();
        wal.replay(|lsn, payload| {
            recovered.push((lsn, payload));
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(
            recovered,
            vec![(1, b"first".to_vec()), (2, b"second".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_oversized_length_treated_as_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.wal");

        {
            let mut wal = Wal::open(&path).await.unwrap();
            wal.commit(b"ok").await.unwrap();
        }
        let intact_len = tokio::fs::metadata(&path).await.unwrap().len();

        // Header claiming a ~4 GiB payload with only a few bytes behind it.
        {
            let mut raw = OpenOptions::new().append(true).open(&path).await.unwrap();
            let mut header = Vec::new();
            header.extend_from_slice(&2u64.to_be_bytes());
            header.extend_from_slice(&0u32.to_be_bytes());
            header.extend_from_slice(&u32::MAX.to_be_bytes());
            header.extend_from_slice(b"tail");
            raw.write_all(&header).await.unwrap();
            raw.flush().await.unwrap();
        }

        let mut wal = Wal::open(&path).await.unwrap();
        assert_eq!(wal.replay(|_, _| Ok(())).await.unwrap(), 1);
        assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), intact_len);
        assert_eq!(wal.commit(b"next").await.unwrap(), 2);
    }
}
