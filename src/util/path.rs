//! Path handling for Respawn archives.
//!
//! Respawn ships localized dir archives whose filenames carry a language
//! prefix (`englishclient_...pak000_dir.vpk`) while the side archives keep
//! the unprefixed name (`client_...pak000_000.vpk`), so archive lookup has
//! to be able to strip the prefix and retry.

use std::path::{Path, PathBuf};

/// Language prefixes used by Respawn dir archive filenames.
///
/// `portugese` is how the games actually spell it on disk.
pub const LOCALE_PREFIXES: [&str; 12] = [
    "english",
    "french",
    "german",
    "italian",
    "japanese",
    "korean",
    "polish",
    "portugese",
    "russian",
    "spanish",
    "tchinese",
    "schinese",
];

/// Case-insensitive suffix comparison.
#[must_use]
pub fn suffix_eq_ci(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s
            .get(s.len() - suffix.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
}

/// Lowercased extension of `path` without the leading dot, or an empty
/// string when there is none.
#[must_use]
pub fn extension_lower(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Normalizes a user-supplied entry path to the archive's internal form:
/// forward slashes, no duplicate slashes, no leading `./` or `/`, lowercase.
#[must_use]
pub fn clean_entry_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.trim().chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    if let Some(rest) = out.strip_prefix("./") {
        out = rest.to_string();
    }
    if let Some(rest) = out.strip_prefix('/') {
        out = rest.to_string();
    }
    out.to_lowercase()
}

/// If the filename component of `path` begins (case-insensitively) with one
/// of [`LOCALE_PREFIXES`], returns `path` with that prefix removed from the
/// filename; otherwise returns `path` unchanged.
#[must_use]
pub fn strip_locale_filename_prefix(path: &Path) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_path_buf();
    };

    let name_lower = name.to_ascii_lowercase();
    for lang in LOCALE_PREFIXES {
        if name_lower.starts_with(lang) {
            return path.with_file_name(&name[lang.len()..]);
        }
    }
    path.to_path_buf()
}

/// Derives the side archive path for `archive_index` from a dir archive
/// path, without touching the filesystem.
///
/// `..._dir.vpk` becomes `..._NNN.vpk`; a Titanfall 2 style `..._DDD.vpk`
/// dir path has just its digit triplet replaced. Anything else is returned
/// unchanged.
#[must_use]
pub fn side_archive_path(dir_vpk_path: &Path, archive_index: u16) -> PathBuf {
    let s = dir_vpk_path.to_string_lossy();

    if suffix_eq_ci(&s, "_dir.vpk") {
        let replaced = format!("{}_{:03}.vpk", &s[..s.len() - "_dir.vpk".len()], archive_index);
        return PathBuf::from(replaced);
    }

    // Titanfall 2 stores the directory in `..._000.vpk`.
    if s.len() >= 8 && suffix_eq_ci(&s, ".vpk") {
        if let Some(tail) = s.get(s.len() - 8..) {
            if tail.starts_with('_') && tail[1..4].bytes().all(|b| b.is_ascii_digit()) {
                let replaced = format!("{}{:03}.vpk", &s[..s.len() - 7], archive_index);
                return PathBuf::from(replaced);
            }
        }
    }

    dir_vpk_path.to_path_buf()
}

/// Resolves the side archive path for reading.
///
/// Tries the direct derivation first; when that file does not exist, tries
/// again after stripping the locale prefix from the dir archive filename
/// (`englishclient_...pak000_dir.vpk` side archives are named
/// `client_...pak000_000.vpk`). When neither exists, the direct candidate is
/// returned so the caller's error names the expected path.
#[must_use]
pub fn find_side_archive_path(dir_vpk_path: &Path, archive_index: u16) -> PathBuf {
    let candidate = side_archive_path(dir_vpk_path, archive_index);
    if candidate.is_file() {
        return candidate;
    }

    let stripped = side_archive_path(&strip_locale_filename_prefix(dir_vpk_path), archive_index);
    if stripped.is_file() {
        return stripped;
    }

    candidate
}
