//! Source package archives.
//!
//! Builds one zip archive per package spec from a source tree, then merges
//! dependency archives from a library directory into it. Merging is
//! append-only: entries already in the target are never rewritten, and
//! duplicate paths are allowed (extraction order decides which one wins).

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// Directory names excluded from every package, regardless of spec.
pub const ALWAYS_EXCLUDED_DIRS: &[&str] = &["tests", "__pycache__"];

pub const BYTECODE_EXTENSION: &str = ".pyc";
pub const ROOT_MARKER_FILENAME: &str = "__init__.py";
pub const LIBRARY_ARCHIVE_EXTENSION: &str = ".zip";

/// Build a package archive from a source tree.
///
/// Files under an always-excluded or spec-excluded directory, and compiled
/// bytecode files, are left out; everything else lands at its path relative
/// to `source_root`. With `add_root_marker`, an empty marker file is written
/// at archive root when the source tree lacks one.
pub fn build_package(
    archive_path: &Path,
    source_root: &Path,
    exclude_dirs: &[String],
    add_root_marker: bool,
) -> Result<()> {
    let file = File::create(archive_path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    add_tree(&mut writer, source_root, source_root, exclude_dirs, options)?;

    if add_root_marker && !source_root.join(ROOT_MARKER_FILENAME).exists() {
        writer.start_file(ROOT_MARKER_FILENAME, options)?;
    }

    writer.finish()?;
    Ok(())
}

fn add_tree(
    writer: &mut ZipWriter<File>,
    root: &Path,
    dir: &Path,
    exclude_dirs: &[String],
    options: FileOptions,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if path.is_dir() {
            if is_excluded_dir(&name, exclude_dirs) {
                continue;
            }
            add_tree(writer, root, &path, exclude_dirs, options)?;
        } else {
            if name.ends_with(BYTECODE_EXTENSION) {
                continue;
            }
            writer.start_file(entry_name(root, &path)?, options)?;
            let mut source = File::open(&path)?;
            io::copy(&mut source, writer)?;
        }
    }
    Ok(())
}

fn is_excluded_dir(name: &str, exclude_dirs: &[String]) -> bool {
    ALWAYS_EXCLUDED_DIRS.contains(&name) || exclude_dirs.iter().any(|d| d == name)
}

/// Archive entry name for a file: its root-relative path with `/` separators.
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::Other(format!(
            "'{}' is outside source root '{}'",
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

/// Merge dependency archives found under `library_root` into the target.
///
/// A library archive is skipped when the include list is non-empty and does
/// not name it, or when the exclude list does.
pub fn merge_library_archives(
    target: &Path,
    library_root: &Path,
    exclude_libs: &[String],
    include_libs: &[String],
) -> Result<()> {
    merge_tree(target, library_root, exclude_libs, include_libs)
}

fn merge_tree(
    target: &Path,
    dir: &Path,
    exclude_libs: &[String],
    include_libs: &[String],
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            merge_tree(target, &path, exclude_libs, include_libs)?;
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(LIBRARY_ARCHIVE_EXTENSION) {
            continue;
        }
        if (!include_libs.is_empty() && !include_libs.iter().any(|l| l == &name))
            || exclude_libs.iter().any(|l| l == &name)
        {
            log_status!("package", "Skipped library '{}'", name);
            continue;
        }

        log_status!(
            "package",
            "Adding library '{}' to '{}'",
            path.display(),
            target.display()
        );
        append_archive(target, &path)?;
    }
    Ok(())
}

/// Append every entry of `source` to the `target` archive.
///
/// Entries are rewritten deflated with fully open unix permissions so the
/// merged archive extracts identically across platforms. Existing target
/// entries are never touched; a path present in both archives appears twice.
pub fn append_archive(target: &Path, source: &Path) -> Result<()> {
    let target_file = OpenOptions::new().read(true).write(true).open(target)?;
    let mut writer = ZipWriter::new_append(target_file)?;
    let mut archive = ZipArchive::new(File::open(source)?)?;

    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o777);

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        writer.start_file(name, options)?;
        io::copy(&mut entry, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}
