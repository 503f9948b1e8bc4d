//! HTTP server endpoints (C7).
//!
//! A single stateless HTTP service exposing exactly `info`, `hashes`,
//! `blocks` (GET/POST), and `resize`. Speaks raw sockets rather than
//! embedding a framework — the core does not prescribe one — and runs a
//! fixed pool of `concurrency` pre-spawned worker threads, each calling
//! the blocking `accept()` on the shared listener directly; there is no
//! per-request timeout, since hashing or transferring blocks of a huge
//! file can run far longer than a typical HTTP client timeout.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};

use crate::config::ListenAddress;
use crate::error::Result;
use crate::fileio;
use crate::hash::Algorithm;
use crate::hashmap;

/// Starts the server and blocks forever, servicing requests on
/// `concurrency` pre-spawned worker threads.
pub fn run(listen: ListenAddress, concurrency: usize) -> Result<()> {
    let bind_host = if listen.host.is_empty() {
        "0.0.0.0"
    } else {
        &listen.host
    };
    let bind_addr = format!("{bind_host}:{}", listen.port);
    let listener = TcpListener::bind(&bind_addr)?;
    info!(address = %bind_addr, workers = concurrency, "server listening");

    let listener = Arc::new(listener);
    let mut handles = Vec::with_capacity(concurrency.max(1));
    for worker_id in 0..concurrency.max(1) {
        let listener = Arc::clone(&listener);
        handles.push(thread::spawn(move || worker_loop(worker_id, listener)));
    }
    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

fn worker_loop(worker_id: usize, listener: Arc<TcpListener>) {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(worker_id, %peer, "accepted connection");
                if let Err(e) = handle_connection(stream) {
                    warn!(worker_id, %peer, error = %e, "connection error");
                }
            }
            Err(e) => error!(worker_id, error = %e, "accept failed"),
        }
    }
}

struct Request {
    method: String,
    path: String,
    query: HashMap<String, String>,
    content_length: usize,
}

fn handle_connection(stream: TcpStream) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Ok(());
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("").to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            if key.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let (path, query) = parse_target(&target);
    let request = Request {
        method,
        path,
        query,
        content_length,
    };

    route(&request, &mut reader, &mut writer)
}

fn parse_target(target: &str) -> (String, HashMap<String, String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), parse_query_string(query)),
        None => (target.to_string(), HashMap::new()),
    }
}

fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        map.insert(url_decode(key), url_decode(value));
    }
    map
}

fn url_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(
                    std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""),
                    16,
                ) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn route(request: &Request, reader: &mut BufReader<TcpStream>, writer: &mut TcpStream) -> Result<()> {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/info") => info_endpoint(request, writer),
        ("GET", "/hashes") => hashes_endpoint(request, writer),
        ("GET", "/blocks") => blocks_get_endpoint(request, writer),
        ("POST", "/blocks") => blocks_post_endpoint(request, reader, writer),
        ("POST", "/resize") => resize_endpoint(request, writer),
        _ => send_status(writer, 404, "Not Found", b""),
    }
}

fn info_endpoint(request: &Request, writer: &mut TcpStream) -> Result<()> {
    let filename = match request.query.get("filename") {
        Some(f) => PathBuf::from(f),
        None => return send_status(writer, 400, "Bad Request", b""),
    };
    match fileio::size(&filename)? {
        Some(size) => {
            let body = serde_json::json!({ "size": size }).to_string();
            send_json(writer, 200, "OK", &body)
        }
        None => send_status(writer, 404, "Not Found", b""),
    }
}

fn hashes_endpoint(request: &Request, writer: &mut TcpStream) -> Result<()> {
    let filename = match request.query.get("filename") {
        Some(f) => PathBuf::from(f),
        None => return send_status(writer, 400, "Bad Request", b""),
    };
    let block_size: u64 = request
        .query
        .get("block_size")
        .and_then(|v| v.parse().ok())
        .unwrap_or(crate::config::DEFAULT_BLOCK_SIZE);
    let concurrency: usize = request
        .query
        .get("concurrency")
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(crate::config::default_concurrency);
    let algorithm = match request.query.get("method") {
        Some(name) => Algorithm::parse(name)?,
        None => Algorithm::default(),
    };

    let head = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n";
    writer.write_all(head.as_bytes())?;

    for item in hashmap::hash_stream(filename, block_size, algorithm, concurrency)? {
        let (offset, digest) = item?;
        writer.write_all(format!("{offset}\t{digest}\n").as_bytes())?;
    }
    Ok(())
}

fn blocks_get_endpoint(request: &Request, writer: &mut TcpStream) -> Result<()> {
    let filename = match request.query.get("filename") {
        Some(f) => PathBuf::from(f),
        None => return send_status(writer, 400, "Bad Request", b""),
    };
    let offset: u64 = request.query.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let size: u64 = request.query.get("size").and_then(|v| v.parse().ok()).unwrap_or(0);

    let data = fileio::read(&filename, offset, size)?;
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        data.len()
    );
    writer.write_all(head.as_bytes())?;
    writer.write_all(&data)?;
    Ok(())
}

fn blocks_post_endpoint(
    request: &Request,
    reader: &mut BufReader<TcpStream>,
    writer: &mut TcpStream,
) -> Result<()> {
    let filename = match request.query.get("filename") {
        Some(f) => PathBuf::from(f),
        None => return send_status(writer, 400, "Bad Request", b""),
    };
    let offset: u64 = request.query.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);

    let mut data = vec![0u8; request.content_length];
    reader.read_exact(&mut data)?;
    fileio::write(&filename, offset, &data)?;
    send_status(writer, 200, "OK", b"")
}

fn resize_endpoint(request: &Request, writer: &mut TcpStream) -> Result<()> {
    let filename = match request.query.get("filename") {
        Some(f) => PathBuf::from(f),
        None => return send_status(writer, 400, "Bad Request", b""),
    };
    let size: u64 = match request.query.get("size").and_then(|v| v.parse().ok()) {
        Some(size) => size,
        None => return send_status(writer, 400, "Bad Request", b""),
    };
    fileio::resize(&filename, size)?;
    send_status(writer, 200, "OK", b"")
}

fn send_status(writer: &mut TcpStream, status: u16, text: &str, body: &[u8]) -> Result<()> {
    let head = format!(
        "HTTP/1.1 {status} {text}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    writer.write_all(head.as_bytes())?;
    writer.write_all(body)?;
    Ok(())
}

fn send_json(writer: &mut TcpStream, status: u16, text: &str, body: &str) -> Result<()> {
    let head = format!(
        "HTTP/1.1 {status} {text}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    writer.write_all(head.as_bytes())?;
    writer.write_all(body.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_string_handles_multiple_pairs() {
        let query = parse_query_string("filename=%2Ftmp%2Ff.bin&offset=10&size=20");
        assert_eq!(query.get("filename").unwrap(), "/tmp/f.bin");
        assert_eq!(query.get("offset").unwrap(), "10");
        assert_eq!(query.get("size").unwrap(), "20");
    }

    #[test]
    fn url_decode_handles_percent_and_plus() {
        assert_eq!(url_decode("a%20b+c"), "a b c");
        assert_eq!(url_decode("%2Ftmp%2Ffile"), "/tmp/file");
    }

    #[test]
    fn parse_target_splits_path_and_query() {
        let (path, query) = parse_target("/blocks?filename=f&offset=0");
        assert_eq!(path, "/blocks");
        assert_eq!(query.get("filename").unwrap(), "f");
    }

    // Spawns a server on an ephemeral port and returns it. The accept loop
    // thread is intentionally never joined: it dies with the test process.
    fn spawn_test_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let _ = handle_connection(stream);
            }
        });
        port
    }

    // S2: server-to-client sync of two independent random 10 MiB files
    // with delta transfer on ends byte-equal, using a real HTTP round trip.
    #[test]
    fn s2_remote_sync_of_differing_files_converges() {
        use crate::config::Config;
        use crate::coordinator;
        use crate::hash::Algorithm;
        use crate::location::Location;
        use std::fs;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let source_path = dir.path().join("source.bin");
        let target_path = dir.path().join("target.bin");
        let source_data: Vec<u8> = (0..10 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let target_data: Vec<u8> = (0..10 * 1024 * 1024).map(|i| ((i + 1) % 251) as u8).collect();
        fs::write(&source_path, &source_data).unwrap();
        fs::write(&target_path, &target_data).unwrap();

        let port = spawn_test_server();

        let source = Location::parse(source_path.to_str().unwrap()).unwrap();
        let target = Location::parse(&format!(
            "http://127.0.0.1:{port}{}",
            target_path.display()
        ))
        .unwrap();
        let config = Config {
            block_size: 1024 * 1024,
            algorithm: Algorithm::Sha1,
            delta_transfer: true,
            concurrency: 4,
            dry_run: false,
        };
        let report = coordinator::synchronize(source, target, &config).unwrap();
        assert!(report.transferred_blocks > 0);
        assert_eq!(fs::read(&source_path).unwrap(), fs::read(&target_path).unwrap());
    }

    // Property 5: direction symmetry — syncing local-to-remote and
    // remote-to-local for the same pair of files converges to the same
    // byte-for-byte result either way.
    #[test]
    fn direction_symmetry_local_to_remote_and_back() {
        use crate::config::Config;
        use crate::coordinator;
        use crate::hash::Algorithm;
        use crate::location::Location;
        use std::fs;
        use tempfile::TempDir;

        let config = Config {
            block_size: 1024 * 1024,
            algorithm: Algorithm::Sha1,
            delta_transfer: true,
            concurrency: 4,
            dry_run: false,
        };

        // local -> remote
        let dir_a = TempDir::new().unwrap();
        let a_source = dir_a.path().join("source.bin");
        let a_target = dir_a.path().join("target.bin");
        let data: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 233) as u8).collect();
        fs::write(&a_source, &data).unwrap();
        let port_a = spawn_test_server();
        coordinator::synchronize(
            Location::parse(a_source.to_str().unwrap()).unwrap(),
            Location::parse(&format!("http://127.0.0.1:{port_a}{}", a_target.display())).unwrap(),
            &config,
        )
        .unwrap();

        // remote -> local, same starting data, opposite direction
        let dir_b = TempDir::new().unwrap();
        let b_source = dir_b.path().join("source.bin");
        let b_target = dir_b.path().join("target.bin");
        fs::write(&b_source, &data).unwrap();
        let port_b = spawn_test_server();
        coordinator::synchronize(
            Location::parse(&format!("http://127.0.0.1:{port_b}{}", b_source.display())).unwrap(),
            Location::parse(b_target.to_str().unwrap()).unwrap(),
            &config,
        )
        .unwrap();

        assert_eq!(fs::read(&a_target).unwrap(), fs::read(&b_target).unwrap());
    }
}
