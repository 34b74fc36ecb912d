//! songev -- verify-only companion to `songe`
//!
//! Same verify flow as `songe verify`, with no command that touches
//! the key-wrap code path: there is no passphrase prompt anywhere in
//! this binary, because verification never needs the signing key.
//!
//! ```bash
//! songev ./dist/app.tar.gz
//! ```

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use songe::{Facade, SongeConfig, SongeError, Verdict};

#[derive(Parser)]
#[command(name = "songev")]
#[command(about = "Verify a songe signature")]
#[command(version)]
struct Cli {
    file: PathBuf,
}

fn run(cli: Cli) -> Result<(), SongeError> {
    let facade = Facade::open(SongeConfig::default())?;
    let (outcome, warnings) = facade.verify(&cli.file)?;

    for w in &warnings {
        eprintln!("warning: {w:?}");
    }
    match outcome.verdict {
        Verdict::GoodTrusted => eprintln!("GOOD (trusted: {})", outcome.verify_key_encoded),
        Verdict::GoodUntrusted => eprintln!("GOOD (untrusted: {})", outcome.verify_key_encoded),
    }
    if let Some(data) = outcome.recovered_data {
        io::stdout().write_all(&data)?;
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(match e {
            SongeError::BadSignature | SongeError::NoData | SongeError::Io(_) => 1,
            _ => 2,
        });
    }
}
