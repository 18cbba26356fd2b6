//! Loading documentation files from a directory tree.

use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

/// Read one file into a [`Document`] whose `source` is `path` relative to `root`.
///
/// # Errors
///
/// Returns [`RagError::LoadError`] if the file cannot be read as UTF-8 text.
pub fn load_document(root: &Path, path: &Path) -> Result<Document> {
    let text = std::fs::read_to_string(path).map_err(|e| RagError::LoadError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(Document::new(source_id(root, path), text))
}

/// Source identifier: the path relative to `root`, with `/` separators.
fn source_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
}

/// Recursively load every file under `root` whose extension is in `extensions`.
///
/// Paths are visited in sorted order so the result is deterministic. A missing
/// directory yields no documents. Files and directory entries that cannot be
/// read are logged and skipped.
pub fn load_documents(root: &Path, extensions: &[String]) -> Vec<Document> {
    if !root.exists() {
        warn!(docs_dir = %root.display(), "documentation directory does not exist");
        return Vec::new();
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }
        match load_document(root, entry.path()) {
            Ok(document) => {
                debug!(document.source = %document.source, bytes = document.text.len(), "loaded document");
                documents.push(document);
            }
            Err(e) => warn!(error = %e, "skipping document"),
        }
    }
    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn md() -> Vec<String> {
        vec!["md".to_string()]
    }

    #[test]
    fn loads_markdown_recursively_with_relative_sources() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("adr/nested")).unwrap();
        fs::write(root.join("readme.md"), "top").unwrap();
        fs::write(root.join("adr/nested/0001-db.md"), "Use PostgreSQL").unwrap();
        fs::write(root.join("adr/notes.txt"), "ignore").unwrap();

        let docs = load_documents(root, &md());
        let sources: Vec<_> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["adr/nested/0001-db.md", "readme.md"]);
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let temp = tempfile::tempdir().unwrap();
        assert!(load_documents(&temp.path().join("nope"), &md()).is_empty());
    }

    #[test]
    fn non_utf8_file_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("bad.md"), [0xff, 0xfe, 0xfd]).unwrap();
        fs::write(root.join("good.md"), "fine").unwrap();

        let docs = load_documents(root, &md());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "good.md");
    }

    #[test]
    fn extension_match_ignores_case() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("UPPER.MD"), "x").unwrap();
        assert_eq!(load_documents(temp.path(), &md()).len(), 1);
    }
}
