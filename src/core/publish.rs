//! Artifact publication to the object store.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::provider::ObjectStore;

/// Upload a single file. No retry; failures propagate to the caller.
pub fn publish_file(
    store: &dyn ObjectStore,
    local_path: &Path,
    bucket: &str,
    key: &str,
) -> Result<()> {
    store.put_object(local_path, bucket, key)
}

/// Upload every file under a directory tree.
///
/// The remote key is the file's path relative to `local_root`, joined with
/// forward slashes. The first failed upload aborts the remaining walk.
pub fn publish_directory(store: &dyn ObjectStore, local_root: &Path, bucket: &str) -> Result<()> {
    publish_tree(store, local_root, local_root, bucket)
}

fn publish_tree(
    store: &dyn ObjectStore,
    root: &Path,
    dir: &Path,
    bucket: &str,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            publish_tree(store, root, &path, bucket)?;
        } else {
            let key = object_key(root, &path)?;
            log_status!(
                "publish",
                "Uploading '{}' to '{}/{}'",
                path.display(),
                bucket,
                key
            );
            store.put_object(&path, bucket, &key)?;
        }
    }
    Ok(())
}

fn object_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::Other(format!(
            "'{}' is outside upload root '{}'",
            path.display(),
            root.display()
        ))
    })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingStore {
        uploads: RefCell<Vec<(PathBuf, String, String)>>,
        fail_on_key: Option<String>,
    }

    impl ObjectStore for RecordingStore {
        fn put_object(&self, local_path: &Path, bucket: &str, key: &str) -> Result<()> {
            if self.fail_on_key.as_deref() == Some(key) {
                return Err(Error::Provider(format!("upload of '{}' refused", key)));
            }
            self.uploads.borrow_mut().push((
                local_path.to_path_buf(),
                bucket.to_string(),
                key.to_string(),
            ));
            Ok(())
        }
    }

    fn write_file(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn directory_upload_uses_relative_forward_slash_keys() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("site");
        write_file(&root.join("index.html"), "<html>");
        write_file(&root.join("css/main.css"), "body {}");
        write_file(&root.join("img/icons/logo.svg"), "<svg>");

        let store = RecordingStore::default();
        publish_directory(&store, &root, "assets").unwrap();

        let keys: BTreeSet<String> = store
            .uploads
            .borrow()
            .iter()
            .map(|(_, _, key)| key.clone())
            .collect();
        let expected: BTreeSet<String> = ["index.html", "css/main.css", "img/icons/logo.svg"]
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, expected);
        assert!(store.uploads.borrow().iter().all(|(_, b, _)| b == "assets"));
    }

    #[test]
    fn failed_upload_aborts_the_walk() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("site");
        write_file(&root.join("a/file.txt"), "a");
        write_file(&root.join("b/file.txt"), "b");
        write_file(&root.join("c/file.txt"), "c");

        let store = RecordingStore {
            fail_on_key: Some("b/file.txt".to_string()),
            ..Default::default()
        };
        let err = publish_directory(&store, &root, "assets").unwrap_err();
        assert_eq!(err.code(), "PROVIDER_ERROR");
        // Only entries walked before the failure were uploaded.
        assert!(store.uploads.borrow().len() < 3);
    }

    #[test]
    fn single_file_upload_passes_through() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("app.zip");
        write_file(&file, "archive");

        let store = RecordingStore::default();
        publish_file(&store, &file, "source-bucket", "releases/app.zip").unwrap();

        let uploads = store.uploads.borrow();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, "source-bucket");
        assert_eq!(uploads[0].2, "releases/app.zip");
    }
}
