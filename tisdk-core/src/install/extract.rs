// Path: tisdk-core/src/install/extract.rs
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
#[cfg(unix)]
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};

use tisdk_common::error::{Result, TiError};
use tracing::{debug, error, warn};
use zip::read::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const DEFAULT_FILE_MODE: u32 = 0o644;
const DOS_DIRECTORY: u32 = 0x10;
const CENTRAL_HEADER_SIGNATURE: [u8; 4] = *b"PK\x01\x02";
const CENTRAL_HEADER_ATTRS_OFFSET: usize = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl EntryKind {
    /// Classifies an entry from its POSIX mode bits.
    ///
    /// Entries without file-type bits fall back to the name, where a trailing `/` marks a
    /// directory, and then to the MS-DOS directory attribute of an empty entry.
    pub fn classify(name: &str, mode: u32, attributes: u32, size: u64) -> Self {
        match mode & S_IFMT {
            S_IFLNK => EntryKind::Symlink,
            S_IFDIR => EntryKind::Directory,
            S_IFREG => EntryKind::File,
            _ if name.ends_with('/') || name.ends_with('\\') => EntryKind::Directory,
            _ if attributes & DOS_DIRECTORY != 0 && size == 0 => EntryKind::Directory,
            _ => EntryKind::File,
        }
    }
}

/// One logical file, directory or symlink inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Name as stored in the archive, always `/`-separated.
    pub name: String,
    /// Sanitized relative path the entry is written to.
    pub path: PathBuf,
    pub mode: u32,
    /// Raw external attributes, read only for entries that carry no file-type bits.
    pub attributes: u32,
    pub kind: EntryKind,
}

impl ArchiveEntry {
    pub fn permissions(&self) -> u32 {
        match self.mode & 0o7777 {
            0 => DEFAULT_FILE_MODE,
            perms => perms,
        }
    }
}

/// Callback invoked before each entry is written, with the 1-based index and the total
/// entry count. Returning an error aborts extraction with that error.
pub type EntryCallback<'a> = dyn FnMut(&ArchiveEntry, usize, usize) -> Result<()> + 'a;

/// Extracts every entry of the zip archive at `archive_path` into `target_dir`.
///
/// Entries are read one at a time in archive order. Symlinks are recreated as links to
/// their literal target and regular files keep their permission bits. Entries that would
/// land outside `target_dir` are rejected.
pub fn extract_zip(
    archive_path: &Path,
    target_dir: &Path,
    mut on_entry: Option<&mut EntryCallback<'_>>,
) -> Result<()> {
    debug!(
        "Extracting {} => {}",
        archive_path.display(),
        target_dir.display()
    );

    if !archive_path.exists() {
        return Err(TiError::NotFound(format!(
            "The specified zip file does not exist: {}",
            archive_path.display()
        )));
    }
    if !archive_path.is_file() {
        return Err(TiError::Validation(format!(
            "The specified zip file is not a file: {}",
            archive_path.display()
        )));
    }

    let file = File::open(archive_path)?;
    let mut headers = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| TiError::InvalidZip(e.to_string()))?;

    fs::create_dir_all(target_dir).map_err(|e| {
        TiError::IoError(format!(
            "Failed to create target directory {}: {}",
            target_dir.display(),
            e
        ))
    })?;
    let target_root = target_dir.canonicalize()?;

    let total = archive.len();
    for i in 0..total {
        let mut zip_entry = archive.by_index(i).map_err(|e| {
            TiError::Archive(format!(
                "Error reading entry {} in {}: {}",
                i,
                archive_path.display(),
                e
            ))
        })?;

        let name = zip_entry.name().to_string();
        let mode = zip_entry.unix_mode().unwrap_or(0);
        let path = zip_entry.enclosed_name().ok_or_else(|| {
            error!("Unsafe entry name {} in {}", name, archive_path.display());
            TiError::Archive(format!(
                "Unsafe path '{}' in {}",
                name,
                archive_path.display()
            ))
        })?;
        let attributes = if mode & S_IFMT == 0 && zip_entry.size() == 0 {
            external_attributes(&mut headers, zip_entry.central_header_start())?
        } else {
            0
        };
        let entry = ArchiveEntry {
            kind: EntryKind::classify(&name, mode, attributes, zip_entry.size()),
            name,
            path,
            mode,
            attributes,
        };

        if let Some(cb) = on_entry.as_mut() {
            cb(&entry, i + 1, total)?;
        }

        let out_path = target_root.join(&entry.path);
        match entry.kind {
            EntryKind::Directory => {
                create_parent(&target_root, &out_path)?;
                if !out_path.is_dir() {
                    fs::create_dir_all(&out_path)?;
                }
                ensure_within(&target_root, &out_path, &out_path)?;
            }
            EntryKind::Symlink => {
                let mut target = String::new();
                zip_entry.read_to_string(&mut target).map_err(|e| {
                    TiError::Archive(format!("Failed to read link target of {}: {}", entry.name, e))
                })?;
                create_parent(&target_root, &out_path)?;
                write_symlink(&target, &out_path)?;
            }
            EntryKind::File => {
                create_parent(&target_root, &out_path)?;
                write_file(&mut zip_entry, &out_path, entry.permissions())?;
            }
        }
    }

    debug!("Finished extracting {}", archive_path.display());
    Ok(())
}

/// Reads the external attributes from the central directory record at `offset`.
/// Anything that is not a central directory record yields no attributes.
fn external_attributes(headers: &mut File, offset: u64) -> Result<u32> {
    let mut record = [0u8; CENTRAL_HEADER_ATTRS_OFFSET + 4];
    headers.seek(SeekFrom::Start(offset))?;
    if let Err(e) = headers.read_exact(&mut record) {
        warn!("Failed to read central directory record at {}: {}", offset, e);
        return Ok(0);
    }
    if record[..4] != CENTRAL_HEADER_SIGNATURE {
        return Ok(0);
    }
    let mut attrs = [0u8; 4];
    attrs.copy_from_slice(&record[CENTRAL_HEADER_ATTRS_OFFSET..]);
    Ok(u32::from_le_bytes(attrs))
}

/// Creates the parent directories of `out_path`, refusing to follow a symlinked parent
/// out of `root`.
fn create_parent(root: &Path, out_path: &Path) -> Result<()> {
    let Some(parent) = out_path.parent() else {
        return Ok(());
    };
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| {
            TiError::IoError(format!("Failed create dir {}: {}", parent.display(), e))
        })?;
    }
    ensure_within(root, out_path, parent)
}

/// Fails unless `dir` resolves to a location inside `root`.
fn ensure_within(root: &Path, out_path: &Path, dir: &Path) -> Result<()> {
    let resolved = dir.canonicalize()?;
    if !resolved.starts_with(root) {
        error!(
            "Path traversal {} -> {} detected",
            out_path.display(),
            resolved.display()
        );
        return Err(TiError::Archive(format!(
            "Entry {} resolves outside the extraction directory",
            out_path.display()
        )));
    }
    Ok(())
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(unix)]
fn write_symlink(target: &str, link: &Path) -> Result<()> {
    remove_existing(link)?;
    unix_fs::symlink(target, link).map_err(|e| {
        error!(
            "Failed to create symlink {} -> {}: {}",
            link.display(),
            target,
            e
        );
        TiError::from(e)
    })
}

#[cfg(not(unix))]
fn write_symlink(target: &str, link: &Path) -> Result<()> {
    warn!(
        "Cannot create symlink on this platform, writing link target as file: {} -> {}",
        link.display(),
        target
    );
    remove_existing(link)?;
    fs::write(link, target.as_bytes())?;
    Ok(())
}

fn write_file<R: Read>(reader: &mut R, out_path: &Path, perms: u32) -> Result<()> {
    if fs::symlink_metadata(out_path).is_ok_and(|m| !m.is_file()) {
        remove_existing(out_path)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(perms);
    }

    let mut out_file = options.open(out_path).map_err(|e| {
        TiError::IoError(format!("Failed create file {}: {}", out_path.display(), e))
    })?;
    io::copy(reader, &mut out_file).map_err(|e| {
        TiError::IoError(format!("Failed to write {}: {}", out_path.display(), e))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(out_path, fs::Permissions::from_mode(perms)) {
            warn!(
                "Failed to set permissions {:o} on {}: {}",
                perms,
                out_path.display(),
                e
            );
        }
    }
    #[cfg(not(unix))]
    let _ = perms;

    Ok(())
}
