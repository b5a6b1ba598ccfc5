use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, info, warn};

use crate::source::SourceError;

/// Expand `zip_path` into `dest`, recreating directory entries. Entries whose
/// names would escape `dest` are skipped. Returns the number of files written.
pub(crate) fn extract_zip(zip_path: &Path, dest: &Path) -> Result<usize, SourceError> {
    let file = File::open(zip_path)
        .map_err(|error| SourceError::io_with_path("failed to open zip file", zip_path, &error))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| SourceError::zip("failed to read zip archive", error))?;

    info!("Unzipping {} entries into {}", archive.len(), dest.display());

    let mut written = 0;
    let mut skipped = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| SourceError::zip("failed to read zip entry", error))?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path: {}", entry.name());
            skipped += 1;
            continue;
        };

        let out_path = dest.join(relative);
        let is_dir = entry.is_dir();
        let mode = entry.unix_mode();
        if unpack_entry(&mut entry, is_dir, mode, &out_path)? {
            written += 1;
        }
    }

    debug!("Extracted {written} files, skipped {skipped} unsafe entries");
    Ok(written)
}

/// Write one archive entry to `out_path`. Returns `true` for files and
/// `false` for directory entries.
fn unpack_entry(
    entry: &mut impl Read,
    is_dir: bool,
    mode: Option<u32>,
    out_path: &Path,
) -> Result<bool, SourceError> {
    let dir = if is_dir {
        Some(out_path)
    } else {
        out_path.parent()
    };
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir).map_err(|error| {
            SourceError::io_with_path("failed to create extraction directory", dir, &error)
        })?;
    }
    if is_dir {
        return Ok(false);
    }

    let mut outfile = File::create(out_path).map_err(|error| {
        SourceError::io_with_path("failed to create extracted file", out_path, &error)
    })?;
    std::io::copy(entry, &mut outfile).map_err(|error| {
        SourceError::io_with_path("failed to extract archive entry", out_path, &error)
    })?;

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        if let Err(error) = outfile.set_permissions(std::fs::Permissions::from_mode(mode)) {
            debug!("Failed to apply mode {mode:o} to {}: {error}", out_path.display());
        }
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::extract_zip;
    use crate::source::SourceError;

    #[test]
    fn extract_zip_expands_files_and_directories() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("update.zip");

        let zip_file = std::fs::File::create(&zip_path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(zip_file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        writer
            .add_directory("Weaviate.app/Contents/MacOS/", options)
            .expect("directory entry should be written");
        writer
            .start_file("Weaviate.app/Contents/MacOS/weaviate-desktop", options)
            .expect("file entry should be started");
        writer
            .write_all(b"binary-content")
            .expect("file entry should be written");
        writer
            .add_directory("empty/", options)
            .expect("empty directory entry should be written");
        writer.finish().expect("zip archive should be finalized");

        let written = extract_zip(&zip_path, temp.path()).expect("zip should extract");

        assert_eq!(written, 1);
        let extracted =
            std::fs::read(temp.path().join("Weaviate.app/Contents/MacOS/weaviate-desktop"))
                .expect("extracted file should exist and be readable");
        assert_eq!(extracted, b"binary-content");
        assert!(temp.path().join("empty").is_dir());
    }

    #[test]
    fn extract_zip_skips_unsafe_paths() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("unsafe.zip");
        let extract_dir = temp.path().join("extract");

        let zip_file = std::fs::File::create(&zip_path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(zip_file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        writer
            .start_file("../outside.txt", options)
            .expect("unsafe file entry should be started");
        writer
            .write_all(b"should not be extracted")
            .expect("unsafe file entry should be written");
        writer.finish().expect("zip archive should be finalized");

        extract_zip(&zip_path, &extract_dir).expect("zip extraction should not fail");

        assert!(
            !temp.path().join("outside.txt").exists(),
            "unsafe path should not be extracted outside destination"
        );
    }

    #[test]
    fn extract_zip_keeps_bundle_and_drops_escaping_sibling() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("bundle.zip");
        let extract_dir = temp.path().join("download");

        let zip_file = std::fs::File::create(&zip_path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(zip_file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        writer
            .start_file("Weaviate.app/Contents/Info.plist", options)
            .expect("plist entry should be started");
        writer.write_all(b"<plist/>").expect("plist should be written");
        writer
            .start_file("Weaviate.app/Contents/MacOS/weaviate-desktop", options)
            .expect("binary entry should be started");
        writer.write_all(b"binary").expect("binary should be written");
        writer
            .start_file("Weaviate.app/../../escaped.txt", options)
            .expect("escaping entry should be started");
        writer
            .write_all(b"should not be extracted")
            .expect("escaping entry should be written");
        writer.finish().expect("zip archive should be finalized");

        let written = extract_zip(&zip_path, &extract_dir).expect("zip should extract");

        assert_eq!(written, 2);
        assert!(extract_dir.join("Weaviate.app/Contents/Info.plist").is_file());
        assert_eq!(
            std::fs::read(extract_dir.join("Weaviate.app/Contents/MacOS/weaviate-desktop"))
                .expect("bundle binary should be extracted"),
            b"binary"
        );
        assert!(!temp.path().join("escaped.txt").exists());
        assert!(!extract_dir.join("escaped.txt").exists());
    }

    #[test]
    fn extract_zip_rejects_corrupt_archive() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("corrupt.zip");
        std::fs::write(&zip_path, b"definitely not a zip").expect("file should be written");

        let result = extract_zip(&zip_path, temp.path());

        assert!(matches!(result, Err(SourceError::Zip { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn extract_zip_applies_archived_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("mode.zip");

        let zip_file = std::fs::File::create(&zip_path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(zip_file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        writer
            .start_file("weaviate-desktop", options)
            .expect("file entry should be started");
        writer.write_all(b"#!").expect("file entry should be written");
        writer.finish().expect("zip archive should be finalized");

        extract_zip(&zip_path, temp.path()).expect("zip should extract");

        let mode = std::fs::metadata(temp.path().join("weaviate-desktop"))
            .expect("extracted file should exist")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
