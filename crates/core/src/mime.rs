//! Mimetype detection from a path and its content.

/// Fallback type when nothing better is known.
pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Leading byte signatures recognized when the extension gives no answer.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b", "application/gzip"),
];

/// Detect a mimetype, preferring the path extension and falling back to
/// sniffing the content.
pub fn detect(path: &str, content: &[u8]) -> String {
    from_path(path).unwrap_or_else(|| from_content(content).to_string())
}

/// Mimetype implied by the path extension, if any.
pub fn from_path(path: &str) -> Option<String> {
    mime_guess::from_path(path)
        .first_raw()
        .map(|mime| mime.to_string())
}

/// Mimetype implied by the content alone.
pub fn from_content(content: &[u8]) -> &'static str {
    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| content.starts_with(sig)) {
        return mime;
    }
    if !content.is_empty() && !content.contains(&0) && std::str::from_utf8(content).is_ok() {
        return "text/plain";
    }
    DEFAULT_MIMETYPE
}
