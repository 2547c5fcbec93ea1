//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::{glob, Pattern};

/// Copy `src` to `dst` unless `dst` already exists.
///
/// Returns `true` if a copy was made.
pub fn copy_if_missing(src: &Path, dst: &Path) -> Result<bool> {
    if dst.exists() {
        return Ok(false);
    }

    fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(true)
}

/// Find files matching glob patterns relative to a base directory.
///
/// Results are sorted and deduplicated.
pub fn glob_files(base: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();

    for pattern in patterns {
        let full_pattern = escaped_pattern(base, pattern);

        for entry in glob(&full_pattern)
            .with_context(|| format!("invalid glob pattern: {}", pattern))?
        {
            match entry {
                Ok(path) => {
                    if path.is_file() {
                        results.push(path);
                    }
                }
                Err(e) => {
                    tracing::warn!("glob error: {}", e);
                }
            }
        }
    }

    results.sort();
    results.dedup();
    Ok(results)
}

/// Join `pattern` onto `base`, escaping glob metacharacters in `base`.
pub fn escaped_pattern(base: &Path, pattern: &str) -> String {
    let base = Pattern::escape(&base.to_string_lossy());
    let base = base.trim_end_matches(std::path::MAIN_SEPARATOR);
    format!("{}{}{}", base, std::path::MAIN_SEPARATOR, pattern)
}

/// Canonicalize a path, but don't fail if it doesn't exist yet.
/// Returns the path as-is if canonicalization fails.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

/// Render a path with `/` separators on every platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_glob_files() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("index.ts"), "export {}").unwrap();
        fs::write(src.join("nested/util.ts"), "export {}").unwrap();
        fs::write(src.join("readme.md"), "readme").unwrap();

        let files = glob_files(tmp.path(), &["src/**/*.ts".to_string()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("index.ts"));
    }

    #[test]
    fn test_glob_files_under_bracketed_base() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("proj[1]");
        fs::create_dir_all(base.join("src")).unwrap();
        fs::write(base.join("src/index.ts"), "export {}").unwrap();

        let files = glob_files(&base, &["src/**/*.ts".to_string()]).unwrap();
        assert_eq!(files, vec![base.join("src/index.ts")]);
    }

    #[test]
    fn test_copy_if_missing() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("LICENSE");
        let dst = tmp.path().join("copy");
        fs::write(&src, "MIT").unwrap();

        assert!(copy_if_missing(&src, &dst).unwrap());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "MIT");

        fs::write(&dst, "custom").unwrap();
        assert!(!copy_if_missing(&src, &dst).unwrap());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "custom");
    }

    #[test]
    fn test_to_slash() {
        let path = Path::new("packages").join("core").join("src");
        assert_eq!(to_slash(&path), "packages/core/src");
    }
}
