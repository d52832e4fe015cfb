//! `unzip -l` style listing.

use std::fmt::Write;

use crate::zip::Catalog;

const HEADER: &str = "  Length      Date    Time    Name";
const SEPARATOR: &str = "---------  ---------- -----   ----";
const FOOTER: &str = "---------                     ----";

/// Render the listing of `catalog`, one line per entry in directory order,
/// each line newline-terminated.
pub fn render(archive_name: &str, catalog: &Catalog) -> String {
    let mut out = String::new();
    let mut total = 0u64;

    // Writing into a String cannot fail.
    let _ = writeln!(out, "Archive:  {archive_name}");
    let _ = writeln!(out, "{HEADER}");
    let _ = writeln!(out, "{SEPARATOR}");
    for entry in catalog {
        total += entry.uncompressed_size;
        let _ = writeln!(
            out,
            "{:9}  {}   {}",
            entry.uncompressed_size,
            entry.modified.to_minutes(),
            entry.name
        );
    }
    let _ = writeln!(out, "{FOOTER}");
    let _ = writeln!(out, "{total:9}                     {} files", catalog.len());

    out
}
