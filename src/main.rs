//! blockcopy CLI: two positional arguments runs the client, none starts
//! the server.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use blockcopy::config::{self, CliArgs, Config};
use blockcopy::coordinator;
use blockcopy::error::{Error, Result};
use blockcopy::location::Location;

fn main() {
    let args = CliArgs::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args) {
        eprintln!("blockcopy: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(args: CliArgs) -> Result<()> {
    match (&args.source, &args.target) {
        (Some(source), Some(target)) => run_client(&args, source, target),
        (None, None) => run_server(&args),
        _ => Err(Error::usage(
            "expected either no positional arguments (server mode) or both SOURCE and TARGET (client mode)",
        )),
    }
}

fn run_client(args: &CliArgs, source: &str, target: &str) -> Result<()> {
    let config = Config::from_cli(args)?;
    let source = Location::parse(source)?;
    let target = Location::parse(target)?;

    if source.is_remote() && target.is_remote() {
        return Err(Error::usage(
            "at most one of SOURCE and TARGET may be remote",
        ));
    }
    if !source.is_remote() && !target.is_remote() {
        return Err(Error::usage(
            "exactly one of SOURCE and TARGET must be remote (http://host[:port]/path)",
        ));
    }

    let report = coordinator::synchronize(source, target, &config)?;
    if !args.quiet {
        report.print_summary();
    }
    Ok(())
}

fn run_server(args: &CliArgs) -> Result<()> {
    let listen = config::parse_listen_address(args.listen.as_deref().unwrap_or(""))?;
    let concurrency = args.concurrency.unwrap_or_else(config::default_concurrency);
    blockcopy::server::run(listen, concurrency)
}
