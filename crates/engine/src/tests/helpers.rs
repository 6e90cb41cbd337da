use std::fs;
use std::path::Path;

/// Counts the `*.data` files directly inside `dir`.
pub fn datafile_count(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| datafile::parse_id(name).is_some())
                .unwrap_or(false)
        })
        .count()
}

/// Copies a database directory byte-for-byte, simulating the on-disk state
/// a crashed process would leave behind (no close, no index checkpoint).
pub fn crash_image(src: &Path, dst: &Path) {
    fs::create_dir_all(dst).unwrap();
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            crash_image(&from, &to);
        } else {
            fs::copy(&from, &to).unwrap();
        }
    }
}
