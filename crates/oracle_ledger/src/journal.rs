//! Append-only journal: one JSON line per included transaction.
//!
//! Each entry carries the hash of its predecessor, so the file is a hash
//! chain starting at [`GENESIS`]. Replay verifies the chain before any state
//! is rebuilt from it.

use crate::error::{LedgerError, Result};
use crate::types::Transaction;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Chain root for an empty ledger.
pub const GENESIS: &str = "genesis";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub sequence: u64,
    pub prev: String,
    pub tx_hash: String,
    pub tx: Transaction,
}

pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Open (or create) the journal at `path` and return the entries already in it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<(Self, Vec<JournalEntry>)> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let entries = match fs::read_to_string(&path).await {
            Ok(text) => parse_entries(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        verify_chain(&entries)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok((Self { path, file }, entries))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and flush it to disk before returning.
    pub async fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.file.write_all(&line).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }
}

fn parse_entries(text: &str) -> Result<Vec<JournalEntry>> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| LedgerError::Corrupt {
                sequence: i as u64 + 1,
                reason: format!("unparseable entry: {e}"),
            })
        })
        .collect()
}

/// Check sequence numbering, prev links and recomputed hashes.
pub fn verify_chain(entries: &[JournalEntry]) -> Result<()> {
    let mut tip = GENESIS.to_string();
    for (i, entry) in entries.iter().enumerate() {
        let expected_seq = i as u64 + 1;
        if entry.sequence != expected_seq {
            return Err(LedgerError::Corrupt {
                sequence: entry.sequence,
                reason: format!("expected sequence {expected_seq}"),
            });
        }
        if entry.prev != tip {
            return Err(LedgerError::Corrupt {
                sequence: entry.sequence,
                reason: "prev hash does not match chain tip".into(),
            });
        }
        let actual = entry.tx.chained_hash(&entry.prev);
        if actual != entry.tx_hash {
            return Err(LedgerError::Corrupt {
                sequence: entry.sequence,
                reason: format!("hash mismatch: claimed {}, computed {actual}", entry.tx_hash),
            });
        }
        tip = entry.tx_hash.clone();
    }
    Ok(())
}
