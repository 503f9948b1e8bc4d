//! Location abstraction (C5): a uniform handle to a file, local or
//! remote, offering size/read/write/resize/hash capabilities. Remote
//! operations are implemented over the HTTP client adapter (C8) against
//! the endpoints the server (C7) exposes.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::client::{self, encode_query_value};
use crate::error::{Error, Result};
use crate::fileio;
use crate::hash::Algorithm;
use crate::hashmap::{self, HashMapResult};

/// The remote half of a [`Location`]: an HTTP host/port and the absolute
/// path of the file on that host.
#[derive(Debug, Clone)]
pub struct RemoteAddress {
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// What a [`Location`] names: a local path, or a remote file served by
/// this crate's own HTTP server.
pub enum Kind {
    Local(PathBuf),
    Remote(RemoteAddress),
}

/// A handle naming either a local path or a remote file. Immutable after
/// construction except for a lazily computed `file_info` cache (today
/// just the size), invalidated on explicit [`Location::clear_cache`].
pub struct Location {
    kind: Kind,
    /// `None` = not yet computed. `Some(None)` = computed, file absent.
    size_cache: Mutex<Option<Option<u64>>>,
}

impl Location {
    /// Parses a Location expression. A value starting with `/` or
    /// lacking a URL scheme is local; `http://host[:port]/path` is
    /// remote; any other scheme is rejected.
    pub fn parse(expr: &str) -> Result<Self> {
        if let Some(rest) = expr.strip_prefix("http://") {
            return Self::parse_remote(rest);
        }
        if let Some(scheme_end) = expr.find("://") {
            return Err(Error::usage(format!(
                "unsupported URL scheme: {}",
                &expr[..scheme_end]
            )));
        }
        Ok(Kind::Local(PathBuf::from(expr)).into())
    }

    fn parse_remote(rest: &str) -> Result<Self> {
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(Error::usage("remote location is missing a host"));
        }
        let (host, port) = match authority.split_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| Error::usage(format!("invalid port in '{authority}'")))?;
                (host.to_string(), port)
            }
            None => (authority.to_string(), crate::config::DEFAULT_PORT),
        };
        Ok(Kind::Remote(RemoteAddress {
            host,
            port,
            path: path.to_string(),
        })
        .into())
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.kind, Kind::Remote(_))
    }

    /// `size(path) != absent` (local) or `GET /info` returns 200 (remote).
    pub fn exists(&self) -> Result<bool> {
        Ok(self.file_size()?.is_some())
    }

    /// The file's size, or `None` if it does not exist. Computed on
    /// first access and cached for the lifetime of this `Location`;
    /// call [`Location::clear_cache`] to force recomputation.
    pub fn file_size(&self) -> Result<Option<u64>> {
        if let Some(cached) = *self.size_cache.lock().unwrap() {
            return Ok(cached);
        }
        let size = self.file_size_uncached()?;
        *self.size_cache.lock().unwrap() = Some(size);
        Ok(size)
    }

    /// Drops the cached size so the next [`Location::file_size`] call
    /// recomputes it. Called internally after `resize` since a stale
    /// cached size would otherwise outlive a write that changes it.
    pub fn clear_cache(&self) {
        *self.size_cache.lock().unwrap() = None;
    }

    fn file_size_uncached(&self) -> Result<Option<u64>> {
        match &self.kind {
            Kind::Local(path) => fileio::size(path),
            Kind::Remote(addr) => {
                let query = format!("?filename={}", encode_query_value(&addr.path));
                let response =
                    client::request(&addr.host, addr.port, "GET", &format!("/info{query}"), None)?;
                if response.status == 404 {
                    return Ok(None);
                }
                response.ensure_success("GET /info")?;
                let body = response.read_body()?;
                let json: serde_json::Value = serde_json::from_slice(&body)
                    .map_err(|e| Error::remote(format!("parsing /info response: {e}")))?;
                let size = json
                    .get("size")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| Error::remote("/info response missing 'size'"))?;
                Ok(Some(size))
            }
        }
    }

    /// Builds the hash map for this file with `block_size`/`algorithm`,
    /// using up to `concurrency` workers. Local: runs C4 in-process.
    /// Remote: `GET /hashes`, stream-parsed line by line.
    pub fn get_hashes(
        &self,
        block_size: u64,
        algorithm: Algorithm,
        concurrency: usize,
    ) -> Result<HashMapResult> {
        match &self.kind {
            Kind::Local(path) => hashmap::build(path, block_size, algorithm, concurrency),
            Kind::Remote(addr) => {
                let query = format!(
                    "?filename={}&block_size={}&concurrency={}&method={}",
                    encode_query_value(&addr.path),
                    block_size,
                    concurrency,
                    algorithm
                );
                let response =
                    client::request(&addr.host, addr.port, "GET", &format!("/hashes{query}"), None)?;
                response.ensure_success("GET /hashes")?;
                let mut map = HashMapResult::new();
                let mut reader = response.reader;
                let mut line = String::new();
                loop {
                    line.clear();
                    let n = reader
                        .read_line(&mut line)
                        .map_err(|e| Error::remote(format!("reading hash stream: {e}")))?;
                    if n == 0 {
                        break;
                    }
                    let trimmed = line.trim_end_matches(['\r', '\n']);
                    if trimmed.is_empty() {
                        continue;
                    }
                    let (offset_str, digest) = trimmed
                        .split_once('\t')
                        .ok_or_else(|| Error::remote(format!("malformed hash line: {trimmed:?}")))?;
                    let offset: u64 = offset_str
                        .parse()
                        .map_err(|_| Error::remote(format!("malformed offset in hash line: {trimmed:?}")))?;
                    map.insert(offset, digest.to_string());
                }
                Ok(map)
            }
        }
    }

    /// Reads `size` bytes starting at `offset`.
    pub fn read_block(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        match &self.kind {
            Kind::Local(path) => fileio::read(path, offset, size),
            Kind::Remote(addr) => {
                let query = format!(
                    "?filename={}&offset={}&size={}",
                    encode_query_value(&addr.path),
                    offset,
                    size
                );
                let response =
                    client::request(&addr.host, addr.port, "GET", &format!("/blocks{query}"), None)?;
                response.ensure_success("GET /blocks")?;
                response.read_body()
            }
        }
    }

    /// Writes `data` at `offset`.
    pub fn write_block(&self, offset: u64, data: &[u8]) -> Result<()> {
        match &self.kind {
            Kind::Local(path) => fileio::write(path, offset, data),
            Kind::Remote(addr) => {
                let query = format!("?filename={}&offset={}", encode_query_value(&addr.path), offset);
                let response = client::request(
                    &addr.host,
                    addr.port,
                    "POST",
                    &format!("/blocks{query}"),
                    Some(data),
                )?;
                response.ensure_success("POST /blocks")
            }
        }
    }

    /// Creates or resizes the file to `size`.
    pub fn resize(&self, size: u64) -> Result<()> {
        let result = match &self.kind {
            Kind::Local(path) => fileio::resize(path, size),
            Kind::Remote(addr) => {
                let query = format!("?filename={}&size={}", encode_query_value(&addr.path), size);
                let response =
                    client::request(&addr.host, addr.port, "POST", &format!("/resize{query}"), None)?;
                response.ensure_success("POST /resize")
            }
        };
        self.clear_cache();
        result
    }

    /// A human-readable label for logging ("download"/"upload" framing
    /// is derived by the coordinator from which side is remote, not
    /// stored here).
    pub fn describe(&self) -> String {
        match &self.kind {
            Kind::Local(path) => path.display().to_string(),
            Kind::Remote(addr) => format!("http://{}:{}{}", addr.host, addr.port, addr.path),
        }
    }
}

impl From<Kind> for Location {
    fn from(kind: Kind) -> Self {
        Location {
            kind,
            size_cache: Mutex::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_path_is_local() {
        let loc = Location::parse("/a/b").unwrap();
        match loc.kind {
            Kind::Local(path) => assert_eq!(path, PathBuf::from("/a/b")),
            _ => panic!("expected local"),
        }
    }

    #[test]
    fn relative_path_is_local() {
        let loc = Location::parse("relative/file.bin").unwrap();
        match loc.kind {
            Kind::Local(path) => assert_eq!(path, PathBuf::from("relative/file.bin")),
            _ => panic!("expected local"),
        }
    }

    #[test]
    fn http_url_is_remote_with_port() {
        let loc = Location::parse("http://h:12345/a/b").unwrap();
        match loc.kind {
            Kind::Remote(addr) => {
                assert_eq!(addr.host, "h");
                assert_eq!(addr.port, 12345);
                assert_eq!(addr.path, "/a/b");
            }
            _ => panic!("expected remote"),
        }
    }

    #[test]
    fn http_url_without_port_defaults_to_8080() {
        let loc = Location::parse("http://example.com/file").unwrap();
        match loc.kind {
            Kind::Remote(addr) => {
                assert_eq!(addr.port, 8080);
                assert_eq!(addr.path, "/file");
            }
            _ => panic!("expected remote"),
        }
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(Location::parse("udp://h:1/a").is_err());
        assert!(Location::parse("ftp://h/a").is_err());
    }

    #[test]
    fn local_round_trip_through_fileio() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        let loc = Location::parse(path.to_str().unwrap()).unwrap();
        loc.resize(16).unwrap();
        assert_eq!(loc.file_size().unwrap(), Some(16));
        loc.write_block(0, b"hello").unwrap();
        assert_eq!(loc.read_block(0, 5).unwrap(), b"hello");
    }

    #[test]
    fn size_cache_reflects_resize() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        let loc = Location::parse(path.to_str().unwrap()).unwrap();
        loc.resize(16).unwrap();
        assert_eq!(loc.file_size().unwrap(), Some(16));
        loc.resize(32).unwrap();
        assert_eq!(loc.file_size().unwrap(), Some(32));
    }

    proptest::proptest! {
        // Property 6: location parsing totality — any bare path string is
        // always local, and any `http://host:port/path` is always parsed
        // back out to the same host/port/path, for arbitrary path shapes.
        #[test]
        fn bare_paths_are_always_local(segment in "[a-zA-Z0-9_/.-]{1,40}") {
            let loc = Location::parse(&segment).unwrap();
            proptest::prop_assert!(!loc.is_remote());
        }

        #[test]
        fn http_urls_always_round_trip_host_port_path(
            host in "[a-z][a-z0-9]{0,10}",
            port in 1u16..=65535,
            path_tail in "[a-zA-Z0-9_-]{1,20}",
        ) {
            let expr = format!("http://{host}:{port}/{path_tail}");
            let loc = Location::parse(&expr).unwrap();
            match loc.kind {
                Kind::Remote(addr) => {
                    proptest::prop_assert_eq!(addr.host, host);
                    proptest::prop_assert_eq!(addr.port, port);
                    proptest::prop_assert_eq!(addr.path, format!("/{path_tail}"));
                }
                Kind::Local(_) => proptest::prop_assert!(false, "expected remote"),
            }
        }
    }
}
