//! Where extracted entries land on disk.

use std::path::{Component, Path, PathBuf};

/// Map an entry name to its output path under `dest` (or the current
/// directory).
///
/// Returns `None` for names that would escape the destination: absolute
/// paths, drive prefixes and `..` components. With `junk_paths` only the
/// final name component is kept.
pub fn output_path(entry_name: &str, dest: Option<&Path>, junk_paths: bool) -> Option<PathBuf> {
    let name = Path::new(entry_name);

    let relative: PathBuf = if junk_paths {
        PathBuf::from(name.file_name()?)
    } else {
        let mut rel = PathBuf::new();
        for component in name.components() {
            match component {
                Component::Normal(part) => rel.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        rel
    };

    if relative.as_os_str().is_empty() {
        return None;
    }

    Some(match dest {
        Some(dir) => dir.join(relative),
        None => relative,
    })
}
