use crate::config::{format_bytes, EngineConfig};
use crate::models::ArchiveError;
use crate::services::workspace::Workspace;
use bytes::Bytes;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

const MACOS_RESOURCE_DIR: &str = "__MACOSX";

/// An uploaded archive, either already on disk or held in memory.
#[derive(Debug, Clone)]
pub enum ArchiveInput {
    Path(PathBuf),
    Bytes(Bytes),
}

impl From<PathBuf> for ArchiveInput {
    fn from(path: PathBuf) -> Self {
        ArchiveInput::Path(path)
    }
}

impl From<&Path> for ArchiveInput {
    fn from(path: &Path) -> Self {
        ArchiveInput::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ArchiveInput {
    fn from(bytes: Vec<u8>) -> Self {
        ArchiveInput::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for ArchiveInput {
    fn from(bytes: Bytes) -> Self {
        ArchiveInput::Bytes(bytes)
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveInspector {
    max_extracted_bytes: u64,
    max_entries: usize,
}

impl ArchiveInspector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_extracted_bytes: config.max_extracted_bytes,
            max_entries: config.max_entries,
        }
    }

    /// Extracts every member into `workspace` and returns the extracted file
    /// paths relative to the workspace root, in archive order.
    pub fn extract(
        &self,
        input: &ArchiveInput,
        workspace: &Workspace,
    ) -> Result<Vec<PathBuf>, ArchiveError> {
        match input {
            ArchiveInput::Path(path) => {
                let file = File::open(path).map_err(|e| {
                    ArchiveError::InvalidArchive(format!(
                        "Unable to read {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                self.extract_from(BufReader::new(file), workspace)
            }
            ArchiveInput::Bytes(bytes) => self.extract_from(Cursor::new(bytes.as_ref()), workspace),
        }
    }

    fn extract_from<R: Read + Seek>(
        &self,
        reader: R,
        workspace: &Workspace,
    ) -> Result<Vec<PathBuf>, ArchiveError> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;

        if archive.len() == 0 {
            return Err(ArchiveError::EmptyArchive);
        }

        if archive.len() > self.max_entries {
            return Err(ArchiveError::TooLarge(format!(
                "{} members exceeds the limit of {}",
                archive.len(),
                self.max_entries
            )));
        }

        // Vet every name and the declared sizes before anything touches disk.
        let mut plan = Vec::with_capacity(archive.len());
        let mut declared: u64 = 0;
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;
            let relative = sanitize_member_path(entry.name())?;
            declared = declared.saturating_add(entry.size());
            plan.push((relative, entry.is_dir()));
        }

        if declared > self.max_extracted_bytes {
            return Err(ArchiveError::TooLarge(format!(
                "declared uncompressed size {} exceeds the limit of {}",
                declared,
                format_bytes(self.max_extracted_bytes)
            )));
        }

        let mut written: u64 = 0;
        let mut files = Vec::new();
        for (index, (relative, is_dir)) in plan.into_iter().enumerate() {
            let Some(relative) = relative else {
                continue;
            };
            let target = workspace.resolve(&relative);

            if is_dir {
                create_member_dir(&target, &relative)?;
                continue;
            }

            if let Some(parent) = target.parent() {
                create_member_dir(parent, &relative)?;
            }

            let mut out = match OpenOptions::new().write(true).create_new(true).open(&target) {
                Ok(file) => file,
                Err(_) if target.is_dir() => return Err(member_conflict(&relative)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!("Skipping duplicate archive member {}", relative.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let mut entry = archive
                .by_index(index)
                .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;
            let remaining = self.max_extracted_bytes - written;
            let mut limited = entry.by_ref().take(remaining.saturating_add(1));
            let copied = io::copy(&mut limited, &mut out).map_err(|e| {
                ArchiveError::InvalidArchive(format!(
                    "Failed to extract {}: {}",
                    relative.display(),
                    e
                ))
            })?;

            if copied > remaining {
                return Err(ArchiveError::TooLarge(format!(
                    "extracted content exceeds the limit of {}",
                    format_bytes(self.max_extracted_bytes)
                )));
            }

            written += copied;
            debug!("Extracted {} ({} bytes)", relative.display(), copied);
            files.push(relative);
        }

        if files.is_empty() {
            return Err(ArchiveError::NoFiles);
        }

        info!("Extracted {} file(s), {} bytes", files.len(), written);
        Ok(files)
    }
}

/// Creates `dir` for `relative`, failing as an invalid archive when an
/// earlier member already holds one of its components as a file.
fn create_member_dir(dir: &Path, relative: &Path) -> Result<(), ArchiveError> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(_) if dir.ancestors().any(Path::is_file) => Err(member_conflict(relative)),
        Err(e) => Err(e.into()),
    }
}

fn member_conflict(relative: &Path) -> ArchiveError {
    ArchiveError::InvalidArchive(format!(
        "member {} conflicts with another member",
        relative.display()
    ))
}

/// Normalizes a member name into a workspace-relative path.
///
/// Returns `Ok(None)` for members that are skipped as noise and
/// `UnsafePath` for anything that could land outside the workspace.
pub fn sanitize_member_path(name: &str) -> Result<Option<PathBuf>, ArchiveError> {
    if name.contains('\0') {
        return Err(ArchiveError::UnsafePath(name.replace('\0', "\\0")));
    }

    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(ArchiveError::UnsafePath(name.to_string()));
    }

    let mut segments = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(ArchiveError::UnsafePath(name.to_string())),
            s if segments.is_empty() && is_drive_prefix(s) => {
                return Err(ArchiveError::UnsafePath(name.to_string()))
            }
            s => segments.push(s),
        }
    }

    match segments.first() {
        None => Ok(None),
        Some(&MACOS_RESOURCE_DIR) => Ok(None),
        Some(_) => Ok(Some(segments.iter().collect())),
    }
}

/// `C:` style prefixes, which would make the member absolute on Windows.
fn is_drive_prefix(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}
