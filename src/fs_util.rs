use std::fs;
use std::io;
use std::path::Path;

use camino::{Utf8Component, Utf8Path};
use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::RetrievalError;

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), RetrievalError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        RetrievalError::Filesystem(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| RetrievalError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(RetrievalError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

/// Decompresses a gzip file next to itself, dropping the `.gz` suffix.
pub fn gunzip(gz_path: &Path, target_path: &Path) -> Result<(), RetrievalError> {
    let file = fs::File::open(gz_path).map_err(|err| {
        RetrievalError::Filesystem(format!("open gzip {}: {err}", gz_path.display()))
    })?;
    let parent = target_path
        .parent()
        .ok_or_else(|| RetrievalError::Filesystem("invalid gzip target".to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".gunzip")
        .tempfile_in(parent)
        .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
    let mut decoder = GzDecoder::new(file);
    io::copy(&mut decoder, temp.as_file_mut())
        .map_err(|err| RetrievalError::Filesystem(format!("gunzip {}: {err}", gz_path.display())))?;
    temp.persist(target_path)
        .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
    Ok(())
}

/// True for relative paths that stay inside the directory they are joined to.
pub fn is_contained_relative(path: &Utf8Path) -> bool {
    !path.as_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Utf8Component::Normal(_) | Utf8Component::CurDir))
}
