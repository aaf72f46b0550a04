use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;

/// Gzip-encode a response body
pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Whether an `Accept-Encoding` header value allows gzip.
///
/// An explicit `gzip` entry wins over the `*` wildcard.
pub fn accepts_gzip(header: &str) -> bool {
    let mut wildcard = None;
    for part in header.split(',') {
        let mut params = part.split(';');
        let coding = params.next().unwrap_or_default().trim();
        // q=0 means "not acceptable"
        let acceptable = !params.any(|param| {
            param
                .trim()
                .strip_prefix("q=")
                .and_then(|q| q.trim().parse::<f32>().ok())
                .is_some_and(|q| q <= 0.0)
        });
        if coding.eq_ignore_ascii_case("gzip") {
            return acceptable;
        }
        if coding == "*" {
            wildcard = Some(acceptable);
        }
    }
    wildcard.unwrap_or(false)
}
