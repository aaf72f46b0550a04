//! Mapping request paths onto the output directory

use std::path::{Path, PathBuf};

/// Outcome of resolving a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// An existing file under the root
    File(PathBuf),
    /// Unknown route answered with the index document
    Fallback(PathBuf),
    /// Unknown route and no index document
    NotFound,
    /// The path tried to leave the root
    Forbidden,
    /// The root itself is missing, e.g. between the two renames of a commit
    Unavailable,
}

/// Decode `%XX` escapes. Malformed escapes are kept verbatim.
pub fn percent_decode(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(hex) = path.get(i + 1..i + 3)
            && hex.bytes().all(|b| b.is_ascii_hexdigit())
            && let Ok(byte) = u8::from_str_radix(hex, 16)
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Resolve a request path (without query) against `root`
pub async fn resolve(root: &Path, index: &str, request_path: &str) -> Resolved {
    let decoded = percent_decode(request_path);

    let mut relative = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Resolved::Forbidden,
            s if s.contains('\\') || s.contains('\0') => return Resolved::Forbidden,
            s => relative.push(s),
        }
    }

    if !tokio::fs::try_exists(root).await.unwrap_or(false) {
        return Resolved::Unavailable;
    }

    let candidate = root.join(&relative);
    match tokio::fs::metadata(&candidate).await {
        Ok(meta) if meta.is_file() => return Resolved::File(candidate),
        Ok(meta) if meta.is_dir() => {
            let nested_index = candidate.join(index);
            if is_file(&nested_index).await {
                return Resolved::File(nested_index);
            }
        }
        _ => {}
    }

    let fallback = root.join(index);
    if is_file(&fallback).await {
        Resolved::Fallback(fallback)
    } else {
        Resolved::NotFound
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
