use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::UserDirs;
use tracing::{info, warn};

/// The user's download directory, falling back to the home directory.
pub fn default_download_dir() -> Option<PathBuf> {
    let dirs = UserDirs::new()?;
    Some(
        dirs.download_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dirs.home_dir().to_path_buf()),
    )
}

/// Writes `bytes` into `dir` under `file_name`, never replacing an existing file.
pub fn save_download(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create download directory {:?}", dir))?;
    let target = unique_path(dir, &sanitize(file_name));
    let tmp = target.with_extension("part");

    persist(&tmp, &target, bytes)?;
    info!(path = ?target, len = bytes.len(), "document downloaded");
    Ok(target)
}

/// Writes through `tmp` and moves it onto `target`; a failed attempt
/// leaves no `.part` file behind.
fn persist(tmp: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let result = write_then_rename(tmp, target, bytes);
    if result.is_err() && tmp.exists() {
        if let Err(remove_err) = fs::remove_file(tmp) {
            warn!(path = ?tmp, %remove_err, "failed to remove partial download");
        }
    }
    result
}

fn write_then_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut file =
        File::create(tmp).with_context(|| format!("failed to create temp file {:?}", tmp))?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .with_context(|| format!("failed to write {:?}", tmp))?;
    drop(file);
    fs::rename(tmp, target)
        .with_context(|| format!("failed to move download into {:?}", target))
}

fn sanitize(file_name: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

// "name.pdf", "name (1).pdf", "name (2).pdf", ...
fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    (1..)
        .map(|n| match &extension {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn saves_without_clobbering_existing_files() {
        let dir = tempdir().unwrap();
        let first = save_download(dir.path(), "deck.pptx", b"one").unwrap();
        let second = save_download(dir.path(), "deck.pptx", b"two").unwrap();

        assert_eq!(first.file_name().unwrap(), "deck.pptx");
        assert_eq!(second.file_name().unwrap(), "deck (1).pptx");
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
        assert!(!dir.path().join("deck (1).part").exists());
    }

    #[test]
    fn unsafe_names_are_sanitized() {
        let dir = tempdir().unwrap();
        let saved = save_download(dir.path(), "../etc/passwd", b"x").unwrap();
        assert_eq!(saved.parent().unwrap(), dir.path());
        assert_eq!(saved.file_name().unwrap(), "_etc_passwd");

        let blank = save_download(dir.path(), "  ", b"x").unwrap();
        assert_eq!(blank.file_name().unwrap(), "document");
    }

    #[test]
    fn failed_save_leaves_no_partial_file() {
        let dir = tempdir().unwrap();
        let tmp = dir.path().join("report.part");
        let target = dir.path().join("report.pdf");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        let err = persist(&tmp, &target, b"%PDF").unwrap_err();
        assert!(err.to_string().contains("failed to move download"));
        assert!(!tmp.exists());
        assert!(target.join("keep").exists());
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("Downloads").join("kb");
        let saved = save_download(&nested, "notes.txt", b"hello").unwrap();
        assert!(saved.starts_with(&nested));
    }
}
