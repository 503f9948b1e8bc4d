//! Configuration & CLI (C10).
//!
//! One binary serves both roles: two positional arguments (`SOURCE
//! TARGET`) run the client, zero positional arguments start the server.

use clap::Parser;

use crate::error::{Error, Result};
use crate::hash::Algorithm;

/// Default block size for hashing and transfer: 1 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// `prog [OPTIONS] [SOURCE TARGET]` — copy a single large file between
/// two hosts, minimizing bytes transferred by hashing fixed-size blocks
/// in parallel and sending only the ones that differ.
///
/// Invoking with no positional arguments starts the server instead.
#[derive(Parser, Debug)]
#[command(name = "blockcopy", version, about, long_about = None)]
pub struct CliArgs {
    /// Source location: a local path, or `http://host[:port]/path`.
    pub source: Option<String>,

    /// Target location: a local path, or `http://host[:port]/path`.
    pub target: Option<String>,

    /// Block size for hashing and transfer. Accepts a plain integer
    /// (bytes) or a suffixed expression such as `5K`, `1MiB`.
    #[arg(short = 'b', long = "block-size", value_parser = parse_size)]
    pub block_size: Option<u64>,

    /// Hash method used for block digests.
    #[arg(short = 'm', long = "hash-method")]
    pub hash_method: Option<String>,

    /// Disable the delta transfer algorithm: hash nothing, copy every
    /// block unconditionally.
    #[arg(short = 'W', long = "whole-file")]
    pub whole_file: bool,

    /// Parallelism for hashing, transfer, and (when starting a server)
    /// the server's worker count.
    #[arg(short = 'c', long = "concurrency")]
    pub concurrency: Option<usize>,

    /// Scan for differences and report the similarity index without
    /// writing any changed blocks to the target.
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Server bind address: `PORT`, `HOST:PORT`, or `HOST`.
    #[arg(short = 'l', long = "listen")]
    pub listen: Option<String>,

    /// Increase logging verbosity.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Decrease logging verbosity.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

/// The resolved, defaulted configuration shared by the client and server
/// code paths. `--concurrency` is deliberately the single knob that
/// drives client-side hashing/transfer parallelism and server-side
/// worker count alike, rather than conflating them silently: this struct
/// is where that single value is read from.
#[derive(Debug, Clone)]
pub struct Config {
    pub block_size: u64,
    pub algorithm: Algorithm,
    pub delta_transfer: bool,
    pub concurrency: usize,
    pub dry_run: bool,
}

impl Config {
    /// Builds a `Config` from parsed CLI arguments, applying every
    /// documented default.
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let algorithm = match &args.hash_method {
            Some(name) => Algorithm::parse(name)?,
            None => Algorithm::default(),
        };
        Ok(Self {
            block_size: args.block_size.unwrap_or(DEFAULT_BLOCK_SIZE),
            algorithm,
            delta_transfer: !args.whole_file,
            concurrency: args.concurrency.unwrap_or_else(default_concurrency),
            dry_run: args.dry_run,
        })
    }
}

/// `max(2, cores / 3)` — the default parallelism for hashing, transfer,
/// and server workers when `-c`/`--concurrency` is not given.
pub fn default_concurrency() -> usize {
    (num_cpus::get() / 3).max(2)
}

/// Parses a block-size expression: a plain integer number of bytes, or a
/// suffixed expression (`5K`, `1MiB`, `2G`, ...). Suffixes are
/// case-insensitive; `B`/`iB`-style binary suffixes and plain SI
/// suffixes are both accepted.
pub fn parse_size(expr: &str) -> std::result::Result<u64, String> {
    let trimmed = expr.trim();
    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split_at);
    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid size expression: '{expr}'"))?;
    let multiplier: f64 = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1.0,
        "k" | "kb" | "kib" => 1024.0,
        "m" | "mb" | "mib" => 1024.0 * 1024.0,
        "g" | "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        "t" | "tb" | "tib" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        other => return Err(format!("unrecognized size suffix: '{other}'")),
    };
    Ok((number * multiplier).round() as u64)
}

/// A resolved server bind address: host (possibly empty, meaning "all
/// interfaces") and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddress {
    pub host: String,
    pub port: u16,
}

/// Parses `-l`/`--listen`: `PORT`, `HOST:PORT`, or bare `HOST` (in which
/// case the default port is used). An empty value defaults to binding
/// every interface on the default port.
pub fn parse_listen_address(expr: &str) -> Result<ListenAddress> {
    if expr.is_empty() {
        return Ok(ListenAddress {
            host: String::new(),
            port: DEFAULT_PORT,
        });
    }
    if let Ok(port) = expr.parse::<u16>() {
        return Ok(ListenAddress {
            host: String::new(),
            port,
        });
    }
    match expr.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| Error::usage(format!("invalid listen address: '{expr}'")))?;
            Ok(ListenAddress {
                host: host.to_string(),
                port,
            })
        }
        None => Ok(ListenAddress {
            host: expr.to_string(),
            port: DEFAULT_PORT,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_accepts_plain_bytes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
    }

    #[test]
    fn parse_size_accepts_binary_suffixes() {
        assert_eq!(parse_size("1MiB").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("5K").unwrap(), 5 * 1024);
        assert_eq!(parse_size("2GiB").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("lots").is_err());
        assert!(parse_size("5XB").is_err());
    }

    #[test]
    fn default_concurrency_is_at_least_two() {
        assert!(default_concurrency() >= 2);
    }

    #[test]
    fn parse_listen_address_variants() {
        assert_eq!(
            parse_listen_address("9090").unwrap(),
            ListenAddress { host: String::new(), port: 9090 }
        );
        assert_eq!(
            parse_listen_address("0.0.0.0:9090").unwrap(),
            ListenAddress { host: "0.0.0.0".to_string(), port: 9090 }
        );
        assert_eq!(
            parse_listen_address("myhost").unwrap(),
            ListenAddress { host: "myhost".to_string(), port: DEFAULT_PORT }
        );
        assert_eq!(
            parse_listen_address("").unwrap(),
            ListenAddress { host: String::new(), port: DEFAULT_PORT }
        );
    }

    #[test]
    fn config_from_cli_applies_defaults() {
        let args = CliArgs {
            source: None,
            target: None,
            block_size: None,
            hash_method: None,
            whole_file: false,
            concurrency: None,
            dry_run: false,
            listen: None,
            verbose: false,
            quiet: false,
        };
        let config = Config::from_cli(&args).unwrap();
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.algorithm, Algorithm::Sha1);
        assert!(config.delta_transfer);
    }
}
