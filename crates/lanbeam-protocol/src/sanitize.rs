//! Receiver-side filename sanitisation.
//!
//! The sender's `fileName` is a relative path in its own filesystem
//! vocabulary. The receiver keeps only the basename, normalises
//! separators, and rejects any `..` component outright.

use std::path::{Path, PathBuf};

use lanbeam_core::{Error, Result};

/// Reduce a sender-supplied file name to a safe basename.
pub fn sanitized_basename(file_name: &str) -> Result<String> {
    let normalized = file_name.replace('\\', "/");
    let mut basename = "";
    for component in normalized.split('/') {
        if component == ".." {
            return Err(Error::InvalidPath(format!(
                "path traversal in file name: {file_name}"
            )));
        }
        if !component.is_empty() && component != "." {
            basename = component;
        }
    }
    if basename.is_empty() {
        return Err(Error::InvalidPath(format!("empty file name: {file_name}")));
    }
    Ok(basename.to_string())
}

/// Destination path for a descriptor's file under the save directory.
/// Collisions overwrite; the caller creates the save directory itself.
pub fn resolve_destination(save_dir: &Path, file_name: &str) -> Result<PathBuf> {
    Ok(save_dir.join(sanitized_basename(file_name)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_plain_names() {
        assert_eq!(sanitized_basename("report.pdf").unwrap(), "report.pdf");
    }

    #[test]
    fn strips_directories_from_both_separator_styles() {
        assert_eq!(sanitized_basename("photos/2026/img.jpg").unwrap(), "img.jpg");
        assert_eq!(sanitized_basename("photos\\2026\\img.jpg").unwrap(), "img.jpg");
    }

    #[test]
    fn absolute_paths_reduce_to_their_basename() {
        assert_eq!(sanitized_basename("/etc/passwd").unwrap(), "passwd");
    }

    #[test]
    fn rejects_parent_components() {
        assert!(sanitized_basename("../escape.txt").is_err());
        assert!(sanitized_basename("a/../../b.txt").is_err());
        assert!(sanitized_basename("..\\windows\\escape").is_err());
    }

    #[test]
    fn rejects_names_with_no_usable_component() {
        assert!(sanitized_basename("").is_err());
        assert!(sanitized_basename("///").is_err());
        assert!(sanitized_basename("./.").is_err());
    }

    #[test]
    fn destination_stays_inside_the_save_directory() {
        let dest = resolve_destination(Path::new("/srv/received"), "a/b/c.bin").unwrap();
        assert_eq!(dest, Path::new("/srv/received/c.bin"));
        assert!(dest.starts_with("/srv/received"));
    }
}
