use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DUPLICATE: &str = "Duplicate content A";
pub const UNIQUE: &str = "Unique content B";

/// Write `content` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// The four-file layout: three identical files and one unique file.
pub fn duplicate_tree(root: &Path) {
    write_file(root, "original.txt", DUPLICATE);
    write_file(root, "dup1.txt", DUPLICATE);
    write_file(root, "sub/dup2.txt", DUPLICATE);
    write_file(root, "unique.txt", UNIQUE);
}

/// Write a zip archive with the given members.
pub fn write_zip(path: &Path, members: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in members {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}
