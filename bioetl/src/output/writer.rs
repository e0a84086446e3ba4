//! Atomic file writes and checksums.

use crate::config::OutputFormat;
use crate::errors::{EtlError, Result};
use crate::record::Table;
use crate::schema::DataType;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Chunk size used when hashing files.
pub const CHECKSUM_CHUNK: usize = 8 * 1024;

const RENAME_ATTEMPTS: u32 = 3;
const RENAME_BACKOFF: Duration = Duration::from_millis(100);

/// Outcome of writing one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteResult {
    /// Final path.
    pub path: PathBuf,
    /// Data rows written.
    pub row_count: usize,
    /// Wall time.
    pub duration_sec: f64,
    /// Hex SHA-256 of the final file.
    pub checksum: String,
}

/// Hidden temporary sibling of `path`.
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "output".to_string(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.partial"))
}

/// Writes `bytes` to a temporary sibling, syncs, then renames over `path`.
///
/// The rename is retried up to three times with a short back-off.
///
/// # Errors
///
/// Returns `WRITE_ERROR` when the file cannot be written or renamed.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| EtlError::write(format!("cannot create {}: {e}", parent.display())))?;
    }

    let temp = temp_path(path);
    let written = async {
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(EtlError::write(format!("cannot write {}: {e}", temp.display())));
    }

    let mut attempt = 1;
    loop {
        match tokio::fs::rename(&temp, path).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < RENAME_ATTEMPTS => {
                warn!(path = %path.display(), attempt, error = %e, "Rename failed, retrying");
                tokio::time::sleep(RENAME_BACKOFF * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(EtlError::write(format!(
                    "cannot rename {} to {}: {e}",
                    temp.display(),
                    path.display()
                )));
            }
        }
    }
}

/// Hex SHA-256 of a file, read in [`CHECKSUM_CHUNK`] pieces.
///
/// # Errors
///
/// Returns `WRITE_ERROR` if the file cannot be read.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let read_err = |e: std::io::Error| EtlError::write(format!("cannot checksum {}: {e}", path.display()));
    let mut file = tokio::fs::File::open(path).await.map_err(read_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHECKSUM_CHUNK];
    loop {
        let n = file.read(&mut buffer).await.map_err(read_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Renders `table` as CSV with a header, in `columns` order; nulls are empty.
///
/// # Errors
///
/// Returns a CSV error if serialization fails.
pub fn render_csv(table: &Table, columns: &[String]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in table.rows() {
        writer.write_record(columns.iter().map(|c| {
            row.get(c).and_then(crate::record::Value::to_cell).unwrap_or_default()
        }))?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::write(format!("cannot finish CSV buffer: {e}")))
}

/// Writes tables in one format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableWriter {
    format: OutputFormat,
}

impl TableWriter {
    /// Creates a writer for `format`.
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Output file for `entity` under `dir`.
    #[must_use]
    pub fn output_file(&self, dir: &Path, entity: &str) -> PathBuf {
        dir.join(format!("{entity}.{}", self.format.extension()))
    }

    /// Projects `table` onto `columns`, writes it atomically and checksums it.
    /// Parquet columns take their physical type from the declared dtype.
    ///
    /// # Errors
    ///
    /// Returns `WRITE_ERROR` on IO failures, or `CONFIG_VALIDATION` when the
    /// format is unavailable in this build.
    pub async fn write(&self, table: &Table, columns: &[(String, DataType)], path: &Path) -> Result<WriteResult> {
        let started = Instant::now();
        let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
        let projected = table.project(&names);
        let bytes = match self.format {
            OutputFormat::Csv => render_csv(&projected, &names)?,
            OutputFormat::Parquet => render_parquet(&projected, columns)?,
        };
        debug!(path = %path.display(), bytes = bytes.len(), "Writing output");
        atomic_write(path, &bytes).await?;
        let checksum = sha256_file(path).await?;

        let result = WriteResult {
            path: path.to_path_buf(),
            row_count: projected.len(),
            duration_sec: started.elapsed().as_secs_f64(),
            checksum,
        };
        info!(
            path = %result.path.display(),
            rows = result.row_count,
            checksum = %result.checksum,
            "Output written"
        );
        Ok(result)
    }
}

#[cfg(feature = "parquet")]
fn render_parquet(table: &Table, columns: &[(String, DataType)]) -> Result<Vec<u8>> {
    super::parquet_file::render(table, columns)
}

#[cfg(not(feature = "parquet"))]
fn render_parquet(_table: &Table, _columns: &[(String, DataType)]) -> Result<Vec<u8>> {
    Err(EtlError::config(
        "output_format parquet requires building with the `parquet` feature",
    ))
}
