use crate::error::{Result, ReviewError};
use globset::{Glob, GlobMatcher};
use log::info;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Compiles a file glob (`*`, `?`, `[...]`) into a name matcher.
fn glob_matcher(pattern: &str) -> Result<GlobMatcher> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| ReviewError::Config(format!("bad file pattern: {}", e)))
}

/// List review workbooks
///
/// Returns the sorted names of regular files in `dir` matching `pattern`.
///
/// # Errors
/// * `ReviewError::NoWorkbooks` if nothing matches
/// * `ReviewError::Io` if the directory cannot be read
pub fn list_workbooks(dir: &Path, pattern: &str) -> Result<Vec<String>> {
    let matcher = glob_matcher(pattern)?;
    let mut names: Vec<String> = fs::read_dir(dir)?
        .flatten()
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        // Skip the lock files spreadsheet apps leave next to open workbooks
        .filter(|name| !name.starts_with("~$") && matcher.is_match(name))
        .collect();
    names.sort();

    if names.is_empty() {
        return Err(ReviewError::NoWorkbooks {
            dir: dir.display().to_string(),
            pattern: pattern.to_string(),
        });
    }
    Ok(names)
}

/// Resolves a picked file name to its path, accepting only names that the
/// listing would return.
pub fn resolve_workbook(dir: &Path, pattern: &str, name: &str) -> Result<PathBuf> {
    let available = list_workbooks(dir, pattern)?;
    if available.iter().any(|n| n == name) {
        Ok(dir.join(name))
    } else {
        Err(ReviewError::Format(format!(
            "'{}' is not an available workbook",
            name
        )))
    }
}

/// Replaces the file at `path` with `bytes` through a temp file in the same
/// directory, so readers never see a half-written workbook.
pub fn save_in_place(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ReviewError::Io(e.error))?;
    info!("Saved {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: &str = "High_Confidence_Review_ICH_C_Spine_*.xlsx";

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn lists_matching_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "High_Confidence_Review_ICH_C_Spine_b.xlsx");
        touch(dir.path(), "High_Confidence_Review_ICH_C_Spine_a.xlsx");
        touch(dir.path(), "~$High_Confidence_Review_ICH_C_Spine_a.xlsx");
        touch(dir.path(), "notes.xlsx");
        touch(dir.path(), "High_Confidence_Review_ICH_C_Spine_a.xlsx.bak");
        fs::create_dir(dir.path().join("High_Confidence_Review_ICH_C_Spine_dir.xlsx")).unwrap();

        let names = list_workbooks(dir.path(), PATTERN).unwrap();
        assert_eq!(
            names,
            vec![
                "High_Confidence_Review_ICH_C_Spine_a.xlsx",
                "High_Confidence_Review_ICH_C_Spine_b.xlsx"
            ]
        );
    }

    #[test]
    fn no_match_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "other.xlsx");
        let err = list_workbooks(dir.path(), PATTERN).unwrap_err();
        assert!(matches!(err, ReviewError::NoWorkbooks { .. }));
    }

    #[test]
    fn pattern_metacharacters_are_literal() {
        let matcher = glob_matcher("cases (v1).xlsx").unwrap();
        assert!(matcher.is_match("cases (v1).xlsx"));
        assert!(!matcher.is_match("cases v1.xlsx"));
        assert!(glob_matcher("batch_?.xlsx").unwrap().is_match("batch_7.xlsx"));
        assert!(!glob_matcher("batch_?.xlsx").unwrap().is_match("batch_10.xlsx"));
    }

    #[test]
    fn malformed_pattern_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "batch_1.xlsx");
        let err = list_workbooks(dir.path(), "batch_[.xlsx").unwrap_err();
        assert!(matches!(err, ReviewError::Config(_)));
    }

    #[test]
    fn resolve_rejects_unlisted_names() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "batch_1.xlsx");
        assert!(resolve_workbook(dir.path(), "batch_*.xlsx", "batch_1.xlsx").is_ok());
        assert!(resolve_workbook(dir.path(), "batch_*.xlsx", "../batch_1.xlsx").is_err());
    }

    #[test]
    fn save_in_place_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch_1.xlsx");
        fs::write(&path, b"old").unwrap();
        save_in_place(&path, b"new content").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new content");
        // Only the target file remains
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
