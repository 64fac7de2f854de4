//! Object key helpers
//!
//! Object stores have flat keys; folders are simulated with a delimiter. These
//! helpers build and take apart keys without touching a backend.

use std::collections::HashSet;

/// Path separator used by every supported backend
pub const DEFAULT_DELIMITER: &str = "/";

/// Split on either separator, keeping empty segments
pub fn split_path(path: &str) -> Vec<&str> {
    path.trim().split(['\\', '/']).collect()
}

/// Join a base key and local path fragments into an object key
///
/// Empty segments of `base` are dropped, those of the parts are kept, so a
/// trailing separator on the last part survives as a folder marker key.
pub fn build_cloud_path(base: &str, parts: &[&str]) -> String {
    let mut segments: Vec<&str> = split_path(base).into_iter().filter(|s| !s.is_empty()).collect();
    for part in parts {
        segments.extend(split_path(part));
    }
    segments.join(DEFAULT_DELIMITER)
}

/// Last non-empty segment of a key or local path
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim();
    let separator = if trimmed.contains('/') { '/' } else { '\\' };
    trimmed
        .rsplit(separator)
        .find(|segment| !segment.trim().is_empty())
        .unwrap_or("")
}

/// Upper-cased extension of a file name, `None` when it has none
pub fn file_extension(name: &str) -> Option<String> {
    let name = file_name(name);
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => Some(name[idx + 1..].to_uppercase()),
        _ => None,
    }
}

/// Replace the last occurrence of `search` in `s`
pub fn replace_from_end(s: &str, search: &str, replace: &str) -> String {
    match s.rfind(search) {
        Some(idx) if !search.is_empty() => {
            format!("{}{}{}", &s[..idx], replace, &s[idx + search.len()..])
        }
        _ => s.to_string(),
    }
}

/// Append the delimiter when missing
pub fn ensure_folder_path(path: &str) -> String {
    if path.is_empty() || path.ends_with(DEFAULT_DELIMITER) {
        path.to_string()
    } else {
        format!("{}{}", path, DEFAULT_DELIMITER)
    }
}

/// Key of the parent folder ("" for top-level keys)
pub fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches(DEFAULT_DELIMITER);
    match trimmed.rfind(DEFAULT_DELIMITER) {
        Some(idx) => trimmed[..=idx].to_string(),
        None => String::new(),
    }
}

/// Strip `prefix` from `key`, `None` when `key` is not below it
pub fn relative_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(prefix)
}

fn split_stem(name: &str) -> (&str, Option<String>) {
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => (&name[..idx], Some(name[idx + 1..].to_lowercase())),
        _ => (name, None),
    }
}

fn with_extension(stem: &str, extension: &Option<String>) -> String {
    match extension {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.to_string(),
    }
}

/// Name for a clone of `name` that does not collide with `existing`
///
/// `report.pdf` becomes `report-Copy.pdf`, then `report-Copy(1).pdf`, and so on.
pub fn clone_file_name<'a>(existing: impl IntoIterator<Item = &'a str>, name: &str) -> String {
    let taken: HashSet<&str> = existing.into_iter().collect();
    let name = file_name(name);
    let (stem, extension) = split_stem(name);
    let base = format!("{}-Copy", stem);

    let mut output = with_extension(&base, &extension);
    let mut index = 1;
    while taken.contains(output.as_str()) {
        output = with_extension(&format!("{}({})", base, index), &extension);
        index += 1;
    }
    output
}

/// `name` itself, or `name-1`, `name-2`, ... whichever is free in `existing`
pub fn unique_file_name<'a>(existing: impl IntoIterator<Item = &'a str>, name: &str) -> String {
    let taken: HashSet<&str> = existing.into_iter().collect();
    let name = file_name(name);
    let (stem, extension) = split_stem(name);

    let mut output = with_extension(stem, &extension);
    let mut index = 1;
    while taken.contains(output.as_str()) {
        output = with_extension(&format!("{}-{}", stem, index), &extension);
        index += 1;
    }
    output
}

/// Format a byte count for display ("1.5 MB")
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut exponent = 0;
    while exponent + 1 < UNITS.len() && bytes >= 1u64 << (10 * (exponent + 1)) {
        exponent += 1;
    }
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exponent])
}
