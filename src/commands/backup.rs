//! Timestamped zip backups of the source tree with rotation.

use super::{CommandHandler, collect_files, run_blocking};
use crate::error::CommandExecutionError;
use crate::intent::CommandId;
use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const BACKUP_PREFIX: &str = "fala-backup-";
const BACKUP_EXT: &str = ".zip";

/// Result of one backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSummary {
    pub path: PathBuf,
    pub files: usize,
    /// Old archives removed by rotation.
    pub rotated: usize,
}

fn zip_error(e: zip::result::ZipError) -> CommandExecutionError {
    CommandExecutionError::Failed(format!("erro ao gravar zip: {e}"))
}

/// Archive every file under `source_root` into a new zip in `backup_dir`.
///
/// The archive is named `fala-backup-YYYYMMDD-HHMMSS.zip`, with a `-N`
/// sequence suffix when that name is taken. Files already inside
/// `backup_dir` are never archived.
///
/// # Errors
///
/// Returns an error if the source root is missing or the archive cannot be
/// written.
pub fn create_backup(
    source_root: &Path,
    backup_dir: &Path,
) -> Result<(PathBuf, usize), CommandExecutionError> {
    let excluded = backup_dir.to_path_buf();
    let files = collect_files(source_root, &|p: &Path| !p.starts_with(&excluded))?;
    fs::create_dir_all(backup_dir)?;

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let mut zip_path = backup_dir.join(format!("{BACKUP_PREFIX}{timestamp}{BACKUP_EXT}"));
    let mut sequence = 1;
    while zip_path.exists() {
        zip_path = backup_dir.join(format!("{BACKUP_PREFIX}{timestamp}-{sequence}{BACKUP_EXT}"));
        sequence += 1;
    }

    write_archive(source_root, &files, &zip_path)?;
    info!(path = %zip_path.display(), files = files.len(), "backup created");
    Ok((zip_path, files.len()))
}

/// Zip `files` into a temp file next to `zip_path`, then move it into place.
///
/// Nothing appears at `zip_path` unless every file was archived.
fn write_archive(
    source_root: &Path,
    files: &[PathBuf],
    zip_path: &Path,
) -> Result<(), CommandExecutionError> {
    let dir = zip_path.parent().unwrap_or(Path::new("."));
    let mut zip = ZipWriter::new(tempfile::NamedTempFile::new_in(dir)?);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for path in files {
        let relative = path.strip_prefix(source_root).unwrap_or(path);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(name, options).map_err(zip_error)?;
        zip.write_all(&fs::read(path)?)?;
    }
    let tmp = zip.finish().map_err(zip_error)?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(zip_path).map_err(|e| e.error)?;
    Ok(())
}

/// Sort key for a backup file name: timestamp, then collision sequence.
fn backup_order(name: &str) -> Option<(String, u32)> {
    let stem = name.strip_prefix(BACKUP_PREFIX)?.strip_suffix(BACKUP_EXT)?;
    let (stamp, sequence) = match stem.get(16..) {
        Some(rest) if stem.as_bytes().get(15) == Some(&b'-') => (&stem[..15], rest.parse().ok()?),
        _ => (stem, 0),
    };
    Some((stamp.to_owned(), sequence))
}

/// Delete all but the `keep` newest backups in `backup_dir`.
///
/// Returns the number of archives deleted.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be listed.
pub fn rotate_backups(backup_dir: &Path, keep: usize) -> Result<usize, CommandExecutionError> {
    if !backup_dir.exists() {
        return Ok(0);
    }
    let mut backups: Vec<((String, u32), PathBuf)> = fs::read_dir(backup_dir)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let order = backup_order(&entry.file_name().to_string_lossy())?;
            Some((order, entry.path()))
        })
        .collect();

    // Newest first.
    backups.sort_by(|a, b| b.0.cmp(&a.0));

    let mut deleted = 0;
    for (_, old) in backups.iter().skip(keep) {
        match fs::remove_file(old) {
            Ok(()) => deleted += 1,
            Err(e) => warn!(path = %old.display(), error = %e, "failed to delete old backup"),
        }
    }
    Ok(deleted)
}

/// Handler for `create_backup`.
pub struct BackupHandler {
    source_root: PathBuf,
    backup_dir: PathBuf,
    keep: usize,
}

impl BackupHandler {
    pub fn new(source_root: &Path, backup_dir: &Path, keep: usize) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            backup_dir: backup_dir.to_path_buf(),
            keep: keep.max(1),
        }
    }

    /// # Errors
    ///
    /// See [`create_backup`] and [`rotate_backups`].
    pub async fn run(&self) -> Result<BackupSummary, CommandExecutionError> {
        let source_root = self.source_root.clone();
        let backup_dir = self.backup_dir.clone();
        let keep = self.keep;
        run_blocking(move || {
            let (path, files) = create_backup(&source_root, &backup_dir)?;
            let rotated = rotate_backups(&backup_dir, keep)?;
            Ok(BackupSummary {
                path,
                files,
                rotated,
            })
        })
        .await
    }
}

#[async_trait]
impl CommandHandler for BackupHandler {
    fn command(&self) -> CommandId {
        CommandId::CreateBackup
    }

    fn announcement(&self) -> Option<&str> {
        Some("Criando um backup agora.")
    }

    async fn execute(&self, _utterance: &str) -> Result<String, CommandExecutionError> {
        let summary = self.run().await?;
        Ok(format!(
            "💾 Backup criado com {} arquivos em {}.",
            summary.files,
            summary.path.display()
        ))
    }
}
