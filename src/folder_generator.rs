//! Folder generator: creates a directory tree from a CSV listing.
//!
//! The first column of every non-empty row is a folder path relative to the
//! target directory. There is no header row.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

/// Read folder paths from a CSV file
pub fn read_folder_list(csv_path: &Path) -> Result<Vec<String>> {
    let file = fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file: {}", csv_path.display()))?;
    parse_folder_list(file).with_context(|| format!("Failed to read CSV file: {}", csv_path.display()))
}

/// Parse folder paths from CSV data; rows with an empty first field are skipped
pub fn parse_folder_list<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut folders = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        match record.get(0).map(str::trim) {
            Some(first) if !first.is_empty() => folders.push(first.to_string()),
            _ => {}
        }
    }
    Ok(folders)
}

/// Create every folder under `target`. Existing folders are fine.
///
/// Entries must stay inside `target`: absolute paths and `..` are rejected
/// before anything is created. Returns the full paths in input order.
pub fn create_folders(target: &Path, folders: &[String]) -> Result<Vec<PathBuf>> {
    if target.as_os_str().is_empty() {
        bail!("Please select a target path first.");
    }

    for folder in folders {
        let escapes = Path::new(folder)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            bail!("Folder '{}' is not a path inside the target directory", folder);
        }
    }

    let mut created = Vec::with_capacity(folders.len());
    for folder in folders {
        let full_path = target.join(folder);
        fs::create_dir_all(&full_path)
            .with_context(|| format!("Failed to create folder: {}", full_path.display()))?;
        debug!(path = %full_path.display(), "Folder ready");
        created.push(full_path);
    }

    info!(
        target = %target.display(),
        count = created.len(),
        "Folders created"
    );
    Ok(created)
}

/// Read a CSV listing and create its folders under `target`
pub fn generate_from_csv(csv_path: &Path, target: &Path) -> Result<Vec<PathBuf>> {
    let folders = read_folder_list(csv_path)?;
    info!(csv = %csv_path.display(), count = folders.len(), "Folder list loaded");
    create_folders(target, &folders)
}
