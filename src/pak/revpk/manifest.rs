//! Build manifest support.
//!
//! A manifest is a KV1 text file (`<parent>/manifest/<stem>.txt`, root block
//! `BuildManifest`) recording per-entry flags and packing knobs, so that an
//! unpack/repack round-trip preserves metadata the archive bytes alone
//! cannot express. Keys are archive-relative paths, written with backslash
//! separators; both slash directions are accepted on read.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::pak::revpk::format::{LOAD_CACHE, LOAD_VISIBLE};
use crate::pak::{Error, Result};
use crate::util::path::LOCALE_PREFIXES;

/// Per-entry settings stored in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestEntry {
    pub preload_size: u16,
    pub load_flags: u32,
    pub texture_flags: u16,
    pub use_compression: bool,
    pub de_duplicate: bool,
}

impl Default for ManifestEntry {
    fn default() -> Self {
        Self {
            preload_size: 0,
            load_flags: LOAD_VISIBLE | LOAD_CACHE,
            texture_flags: 0,
            use_compression: true,
            de_duplicate: true,
        }
    }
}

/// Manifest entries keyed by [`normalize_manifest_key`] form.
pub type ManifestMap = HashMap<String, ManifestEntry>;

/// One entry of a manifest about to be written.
#[derive(Debug, Clone)]
pub struct ManifestWriteItem {
    /// Archive-relative path with forward slashes.
    pub path: String,
    pub values: ManifestEntry,
}

/// Normalizes a manifest key for lookup: forward slashes, no duplicate
/// slashes, no leading `./`, lowercase. Applied on both the read and the
/// lookup side so either slash direction resolves.
#[must_use]
pub fn normalize_manifest_key(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    if let Some(rest) = out.strip_prefix("./") {
        out = rest.to_string();
    }
    out.to_lowercase()
}

fn strip_locale_prefix(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    for lang in LOCALE_PREFIXES {
        if lower.starts_with(lang) {
            return &name[lang.len()..];
        }
    }
    name
}

/// Candidate manifest paths for a dir archive: `<parent>/manifest/<stem>.txt`
/// and, when different, the locale-stripped stem variant.
#[must_use]
pub fn manifest_candidate_paths(dir_vpk_path: &Path) -> Vec<PathBuf> {
    let parent = dir_vpk_path.parent().unwrap_or_else(|| Path::new(""));
    let stem = dir_vpk_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stripped = strip_locale_prefix(&stem);

    let mut out = Vec::with_capacity(2);
    out.push(parent.join("manifest").join(format!("{stem}.txt")));
    if !stripped.eq_ignore_ascii_case(&stem) {
        out.push(parent.join("manifest").join(format!("{stripped}.txt")));
    }
    out
}

/// Locates and parses the manifest associated with a dir archive path.
///
/// Returns `Ok(None)` when no candidate file exists; defaults apply in that
/// case.
///
/// # Errors
/// When a candidate file exists but cannot be read or parsed.
pub fn read_manifest(dir_vpk_path: &Path) -> Result<Option<ManifestMap>> {
    let mut first_err = None;

    for candidate in manifest_candidate_paths(dir_vpk_path) {
        if !candidate.is_file() {
            continue;
        }

        let parsed = fs::read_to_string(&candidate)
            .map_err(Error::Io)
            .and_then(|text| parse_manifest(&text));

        match parsed {
            Ok(map) => {
                log::debug!(
                    "loaded manifest {} ({} entries)",
                    candidate.display(),
                    map.len()
                );
                return Ok(Some(map));
            }
            Err(e) => {
                log::warn!("skipping unreadable manifest {}: {e}", candidate.display());
                first_err.get_or_insert(e);
            }
        }
    }

    // A candidate existed but none parsed: that is an error, not "missing".
    match first_err {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

/// Writes the manifest for a dir archive path, sorted by entry path, to
/// every candidate location (so either lookup name resolves later).
///
/// # Errors
/// When the manifest directory cannot be created or a file write fails.
pub fn write_manifest(dir_vpk_path: &Path, items: &[ManifestWriteItem]) -> Result<()> {
    let mut sorted: Vec<&ManifestWriteItem> = items.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut text = String::new();
    text.push_str("\"BuildManifest\"\n{\n");
    for item in &sorted {
        let key = item.path.replace('/', "\\");
        text.push_str(&format!("\t\"{key}\"\n\t{{\n"));
        text.push_str(&format!(
            "\t\t\"preloadSize\" \"{}\"\n",
            item.values.preload_size
        ));
        text.push_str(&format!("\t\t\"loadFlags\" \"{}\"\n", item.values.load_flags));
        text.push_str(&format!(
            "\t\t\"textureFlags\" \"{}\"\n",
            item.values.texture_flags
        ));
        text.push_str(&format!(
            "\t\t\"useCompression\" \"{}\"\n",
            u8::from(item.values.use_compression)
        ));
        text.push_str(&format!(
            "\t\t\"deDuplicate\" \"{}\"\n",
            u8::from(item.values.de_duplicate)
        ));
        text.push_str("\t}\n");
    }
    text.push_str("}\n");

    for candidate in manifest_candidate_paths(dir_vpk_path) {
        if let Some(parent) = candidate.parent() {
            fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        fs::write(&candidate, &text).map_err(Error::Io)?;
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Str(String),
    Open,
    Close,
}

/// Tokenizes the KV1 subset the manifest uses: quoted and bare tokens,
/// braces, `//` line comments. Backslash is NOT an escape character inside
/// quoted strings; manifest keys rely on raw backslashes.
fn tokenize(text: &str) -> Result<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'{' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b'}' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b'"' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end] != b'"' {
                    end += 1;
                }
                if end >= bytes.len() {
                    return Err(Error::ManifestParse(
                        "unterminated quoted string".to_string(),
                    ));
                }
                tokens.push(Token::Str(text[start..end].to_string()));
                i = end + 1;
            }
            _ => {
                let start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && bytes[i] != b'{'
                    && bytes[i] != b'}'
                    && bytes[i] != b'"'
                {
                    i += 1;
                }
                tokens.push(Token::Str(text[start..i].to_string()));
            }
        }
    }

    Ok(tokens)
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_int(value: &str) -> i64 {
    value.parse::<i64>().unwrap_or(0)
}

/// Skips one balanced `{ ... }` block; `pos` points at the opening brace.
fn skip_block(tokens: &[Token], mut pos: usize) -> Result<usize> {
    let mut depth = 0usize;
    while let Some(token) = tokens.get(pos) {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                if depth <= 1 {
                    return Ok(pos + 1);
                }
                depth -= 1;
            }
            Token::Str(_) => {}
        }
        pos += 1;
    }
    Err(Error::ManifestParse("unbalanced block".to_string()))
}

fn parse_manifest(text: &str) -> Result<ManifestMap> {
    let tokens = tokenize(text)?;
    let mut pos = 0;

    // Scan top-level blocks for the BuildManifest root.
    while pos < tokens.len() {
        let Token::Str(key) = &tokens[pos] else {
            return Err(Error::ManifestParse(
                "expected a key at the top level".to_string(),
            ));
        };
        if tokens.get(pos + 1) != Some(&Token::Open) {
            return Err(Error::ManifestParse(format!(
                "expected a block after top-level key {key:?}"
            )));
        }

        if key.eq_ignore_ascii_case("BuildManifest") {
            return parse_entries(&tokens, pos + 2);
        }
        pos = skip_block(&tokens, pos + 1)?;
    }

    Err(Error::ManifestParse(
        "no BuildManifest root block".to_string(),
    ))
}

fn parse_entries(tokens: &[Token], mut pos: usize) -> Result<ManifestMap> {
    let mut out = ManifestMap::new();

    loop {
        match tokens.get(pos) {
            Some(Token::Close) => return Ok(out),
            Some(Token::Str(path)) => {
                if tokens.get(pos + 1) != Some(&Token::Open) {
                    return Err(Error::ManifestParse(format!(
                        "expected a block after entry key {path:?}"
                    )));
                }
                pos += 2;

                let mut entry = ManifestEntry::default();
                let mut seen_any = false;

                loop {
                    match tokens.get(pos) {
                        Some(Token::Close) => {
                            pos += 1;
                            break;
                        }
                        Some(Token::Str(k)) => {
                            let Some(Token::Str(v)) = tokens.get(pos + 1) else {
                                return Err(Error::ManifestParse(format!(
                                    "expected a value after key {k:?}"
                                )));
                            };
                            pos += 2;

                            if k.eq_ignore_ascii_case("preloadSize") {
                                entry.preload_size = parse_int(v) as u16;
                                seen_any = true;
                            } else if k.eq_ignore_ascii_case("loadFlags") {
                                entry.load_flags = parse_int(v) as u32;
                                seen_any = true;
                            } else if k.eq_ignore_ascii_case("textureFlags") {
                                entry.texture_flags = parse_int(v) as u16;
                                seen_any = true;
                            } else if k.eq_ignore_ascii_case("useCompression") {
                                entry.use_compression = parse_bool(v);
                                seen_any = true;
                            } else if k.eq_ignore_ascii_case("deDuplicate") {
                                entry.de_duplicate = parse_bool(v);
                                seen_any = true;
                            } else {
                                log::warn!("ignoring unknown manifest key {k:?}");
                            }
                        }
                        _ => {
                            return Err(Error::ManifestParse(
                                "unterminated entry block".to_string(),
                            ));
                        }
                    }
                }

                let key = normalize_manifest_key(path);
                if seen_any && !key.is_empty() {
                    out.insert(key, entry);
                }
            }
            _ => {
                return Err(Error::ManifestParse(
                    "unterminated BuildManifest block".to_string(),
                ));
            }
        }
    }
}
