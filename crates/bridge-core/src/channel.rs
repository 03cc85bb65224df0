//! Raw access to the two shared files.
//!
//! The outbound file carries commands to the simulation, one per line. The inbound file is
//! appended to by the simulation; we only ever read the region past our cursor. This module
//! never sleeps: every call is a single check, and the caller owns the polling cadence.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{BridgeError, BridgeResult};

/// Result of one incremental check of the inbound file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Size equals the cursor.
    NoNewData,
    /// The file shrank below the cursor. The cursor now sits at `size`; data written before the
    /// truncation is not recovered.
    Truncated { previous: u64, size: u64 },
    /// Exactly the bytes in `[old cursor, new cursor)`.
    Data(Vec<u8>),
}

#[derive(Debug)]
pub struct Channel {
    outbound: PathBuf,
    inbound: PathBuf,
    cursor: u64,
}

impl Channel {
    pub fn new(outbound: impl Into<PathBuf>, inbound: impl Into<PathBuf>) -> Self {
        Self {
            outbound: outbound.into(),
            inbound: inbound.into(),
            cursor: 0,
        }
    }

    pub fn outbound_path(&self) -> &Path {
        &self.outbound
    }

    pub fn inbound_path(&self) -> &Path {
        &self.inbound
    }

    /// Byte offset of the end of previously consumed inbound data.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Empties the outbound file so commands from a previous session are never replayed.
    ///
    /// A missing file is fine; it is recreated empty.
    pub async fn reset_outbound(&self) -> BridgeResult<()> {
        match fs::remove_file(&self.outbound).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(BridgeError::write(&self.outbound, err)),
        }
        fs::write(&self.outbound, b"")
            .await
            .map_err(|err| BridgeError::write(&self.outbound, err))?;
        tracing::debug!(path = %self.outbound.display(), "bridge.channel.outbound_reset");
        Ok(())
    }

    /// Appends `line` plus a newline to the outbound file.
    ///
    /// The whole line goes out in one buffered write followed by a flush and `sync_data`, so a
    /// success means the line is on disk. `line` must not contain a newline itself.
    pub async fn append_command(&self, line: &str) -> BridgeResult<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.outbound)
            .await
            .map_err(|err| BridgeError::write(&self.outbound, err))?;
        file.write_all(buf.as_bytes())
            .await
            .map_err(|err| BridgeError::write(&self.outbound, err))?;
        file.flush()
            .await
            .map_err(|err| BridgeError::write(&self.outbound, err))?;
        file.sync_data()
            .await
            .map_err(|err| BridgeError::write(&self.outbound, err))?;
        Ok(())
    }

    /// Returns the bytes appended to the inbound file since the last read.
    pub async fn read_new_bytes(&mut self) -> BridgeResult<ReadOutcome> {
        let size = fs::metadata(&self.inbound)
            .await
            .map_err(|err| BridgeError::read(&self.inbound, err))?
            .len();

        if size < self.cursor {
            let previous = self.cursor;
            self.cursor = size;
            tracing::warn!(
                path = %self.inbound.display(),
                previous,
                size,
                "bridge.channel.truncated"
            );
            return Ok(ReadOutcome::Truncated { previous, size });
        }
        if size == self.cursor {
            return Ok(ReadOutcome::NoNewData);
        }

        let mut file = fs::File::open(&self.inbound)
            .await
            .map_err(|err| BridgeError::read(&self.inbound, err))?;
        file.seek(SeekFrom::Start(self.cursor))
            .await
            .map_err(|err| BridgeError::read(&self.inbound, err))?;

        let wanted = size - self.cursor;
        let mut buf = Vec::with_capacity(usize::try_from(wanted).unwrap_or(0));
        file.take(wanted)
            .read_to_end(&mut buf)
            .await
            .map_err(|err| BridgeError::read(&self.inbound, err))?;

        // The file may have shrunk between stat and read; only advance past what we got.
        self.cursor += buf.len() as u64;
        if buf.is_empty() {
            return Ok(ReadOutcome::NoNewData);
        }
        Ok(ReadOutcome::Data(buf))
    }

    /// Reads the whole inbound file. Invalid UTF-8 is replaced rather than rejected.
    pub async fn read_all(&self) -> BridgeResult<String> {
        let bytes = fs::read(&self.inbound)
            .await
            .map_err(|err| BridgeError::read(&self.inbound, err))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
