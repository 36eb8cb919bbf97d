//! Asset resolution under the served root.
//!
//! Request paths are percent-decoded and mapped onto the root component by
//! component. Any path that would leave the root, lexically or through a
//! symlink, is rejected.

use std::io;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::error::AssetError;

/// File served for directory requests.
pub const INDEX_FILE: &str = "index.html";

/// A file read from the root.
#[derive(Debug)]
pub struct Asset {
    /// Canonical path of the file.
    pub path: PathBuf,
    /// File contents.
    pub content: Vec<u8>,
    /// Content type guessed from the extension.
    pub mime: String,
}

/// Map a request path onto `root` without touching the filesystem.
///
/// # Errors
///
/// Returns [`AssetError::InvalidPath`] if the path cannot be decoded or
/// contains a component that escapes the root.
pub fn resolve(root: &Path, request_path: &str) -> Result<PathBuf, AssetError> {
    let decoded = percent_decode_str(request_path)
        .decode_utf8()
        .map_err(|_| AssetError::InvalidPath(request_path.to_owned()))?;

    if decoded.contains('\0') {
        return Err(AssetError::InvalidPath(request_path.to_owned()));
    }

    let mut resolved = root.to_path_buf();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(segment) => resolved.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AssetError::InvalidPath(request_path.to_owned()));
            }
        }
    }

    Ok(resolved)
}

/// Read the asset for `request_path` from `root`.
///
/// `root` must be canonical. Directories are served through their
/// [`INDEX_FILE`].
///
/// # Errors
///
/// Returns [`AssetError::NotFound`] for missing files,
/// [`AssetError::InvalidPath`] for paths outside the root, and
/// [`AssetError::Io`] when an existing file cannot be read.
pub async fn load(root: &Path, request_path: &str) -> Result<Asset, AssetError> {
    let mut path = resolve(root, request_path)?;

    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| not_found_or_io(e, request_path))?;
    if metadata.is_dir() {
        path.push(INDEX_FILE);
    }

    let canonical = tokio::fs::canonicalize(&path)
        .await
        .map_err(|e| not_found_or_io(e, request_path))?;
    if !canonical.starts_with(root) {
        return Err(AssetError::InvalidPath(request_path.to_owned()));
    }

    let content = tokio::fs::read(&canonical)
        .await
        .map_err(|e| not_found_or_io(e, request_path))?;
    let mime = mime_for(&canonical);

    Ok(Asset {
        path: canonical,
        content,
        mime,
    })
}

/// Content type for a file path, `application/octet-stream` when unknown.
#[must_use]
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

fn not_found_or_io(err: io::Error, request_path: &str) -> AssetError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => {
            AssetError::NotFound(request_path.to_owned())
        }
        _ => AssetError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn root() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        (dir, canonical)
    }

    #[test]
    fn test_resolve_nested_path() {
        let root = Path::new("/srv/dist");
        assert_eq!(
            resolve(root, "/assets/app.js").unwrap(),
            PathBuf::from("/srv/dist/assets/app.js")
        );
    }

    #[test]
    fn test_resolve_decodes_percent_escapes() {
        let root = Path::new("/srv/dist");
        assert_eq!(
            resolve(root, "/my%20page.html").unwrap(),
            PathBuf::from("/srv/dist/my page.html")
        );
    }

    #[test]
    fn test_resolve_skips_current_dir() {
        let root = Path::new("/srv/dist");
        assert_eq!(
            resolve(root, "/./css/./site.css").unwrap(),
            PathBuf::from("/srv/dist/css/site.css")
        );
    }

    #[test]
    fn test_resolve_rejects_parent_dir() {
        let root = Path::new("/srv/dist");
        for path in [
            "/../secret",
            "/assets/../../secret",
            "/%2e%2e/secret",
            "/%2E%2E%2Fsecret",
            "/assets/%2e%2e/%2e%2e/secret",
        ] {
            assert!(
                matches!(resolve(root, path), Err(AssetError::InvalidPath(_))),
                "{path} was not rejected"
            );
        }
    }

    #[test]
    fn test_resolve_keeps_encoded_slashes_under_root() {
        let root = Path::new("/srv/dist");
        assert_eq!(
            resolve(root, "/%2Fetc/passwd").unwrap(),
            PathBuf::from("/srv/dist/etc/passwd")
        );
    }

    #[test]
    fn test_resolve_rejects_nul_and_invalid_utf8() {
        let root = Path::new("/srv/dist");
        assert!(matches!(resolve(root, "/a%00b"), Err(AssetError::InvalidPath(_))));
        assert!(matches!(resolve(root, "/%ff"), Err(AssetError::InvalidPath(_))));
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("index.html")), "text/html");
        assert_eq!(mime_for(Path::new("site.css")), "text/css");
        assert_eq!(mime_for(Path::new("module.wasm")), "application/wasm");
        assert_eq!(mime_for(Path::new("blob")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_load_reads_exact_bytes() {
        let (_dir, root) = root();
        std::fs::write(root.join("index.html"), b"<h1>hi</h1>").unwrap();

        let asset = load(&root, "/index.html").await.unwrap();

        assert_eq!(asset.content, b"<h1>hi</h1>");
        assert_eq!(asset.mime, "text/html");
    }

    #[tokio::test]
    async fn test_load_directory_serves_index() {
        let (_dir, root) = root();
        std::fs::create_dir(root.join("docs")).unwrap();
        std::fs::write(root.join("docs/index.html"), "docs").unwrap();

        let asset = load(&root, "/docs/").await.unwrap();

        assert_eq!(asset.content, b"docs");
        assert_eq!(asset.path, root.join("docs/index.html"));
    }

    #[tokio::test]
    async fn test_load_root_serves_index() {
        let (_dir, root) = root();
        std::fs::write(root.join("index.html"), "home").unwrap();

        let asset = load(&root, "/").await.unwrap();

        assert_eq!(asset.content, b"home");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let (_dir, root) = root();
        assert!(matches!(
            load(&root, "/missing.js").await,
            Err(AssetError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_directory_without_index() {
        let (_dir, root) = root();
        std::fs::create_dir(root.join("empty")).unwrap();

        assert!(matches!(
            load(&root, "/empty").await,
            Err(AssetError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_file_as_directory() {
        let (_dir, root) = root();
        std::fs::write(root.join("app.js"), "x").unwrap();

        assert!(matches!(
            load(&root, "/app.js/nested").await,
            Err(AssetError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_load_rejects_symlink_outside_root() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        let (_dir, root) = root();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), root.join("leak.txt"))
            .unwrap();

        assert!(matches!(
            load(&root, "/leak.txt").await,
            Err(AssetError::InvalidPath(_))
        ));
    }
}
