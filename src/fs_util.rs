use std::fs;
use std::io;
use std::path::Path;

use camino::Utf8PathBuf;
use zip::ZipArchive;

use crate::error::VaultError;

/// Extract a dataset archive, returning the extracted file paths.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<Vec<Utf8PathBuf>, VaultError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| VaultError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| VaultError::Filesystem(err.to_string()))?;

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| VaultError::Filesystem(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(VaultError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| VaultError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| VaultError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| VaultError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| VaultError::Filesystem(err.to_string()))?;
        extracted.push(
            Utf8PathBuf::from_path_buf(entry_path)
                .map_err(|_| VaultError::Filesystem("non-utf8 path in archive".to_string()))?,
        );
    }
    Ok(extracted)
}

/// Walk every entry once to confirm the archive is readable before unpacking.
pub fn validate_zip(zip_path: &Path) -> Result<(), VaultError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| VaultError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| VaultError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| VaultError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| VaultError::Filesystem(err.to_string()))?;
    }
    Ok(())
}
