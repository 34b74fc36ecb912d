//! songe -- per-project file-signing CLI
//!
//! Thin dispatcher over `songe::facade::Facade`. This binary owns the
//! interactive surface the library deliberately stays out of:
//! argument parsing, passphrase collection, and rendering results to
//! the terminal.
//!
//! ```bash
//! songe generate
//! songe sign --comment "release v1" ./dist/app.tar.gz
//! songe verify ./dist/app.tar.gz
//! songe trust-add P...
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use songe::{Facade, SongeConfig, SongeError, Verdict};

#[derive(Parser)]
#[command(name = "songe")]
#[command(about = "Per-project file-signing utility")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new signing key pair for this project
    Generate,
    /// Import an existing signing key (K-prefixed EncodedKey string)
    Import { key: String },
    /// Unwrap under the old passphrase, rewrap under a new one
    ChangePassphrase,
    /// Print the signing key (requires the passphrase)
    ShowSigningKey,
    /// Print the verify key (no passphrase required)
    ShowVerifyKey,
    /// Sign a file, writing `<file>.sgsig`
    Sign {
        file: PathBuf,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        embedded: bool,
    },
    /// Verify `<file>.sgsig` against `<file>`
    Verify { file: PathBuf },
    /// List trusted verify keys, optionally filtered
    TrustList { substring: Option<String> },
    /// Add a verify key to the trust list
    TrustAdd { key: String },
    /// Remove a verify key by value or 1-based index
    TrustRemove { selector: String },
}

fn read_passphrase(prompt: &str) -> io::Result<String> {
    eprint!("{prompt}: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs() as i64
}

fn run(cli: Cli) -> Result<(), SongeError> {
    let config = SongeConfig::default();

    match cli.command {
        Commands::Generate => {
            let facade = Facade::open_for_write(config)?;
            let passphrase = read_passphrase("New passphrase")?;
            let identity = facade.generate(&passphrase)?;
            println!("{}", identity.verify_key_encoded);
        }
        Commands::Import { key } => {
            let facade = Facade::open_for_write(config)?;
            let (raw, tag) = songe::codec::decode_key_tagged(&key)?;
            if tag != songe::codec::SIGNING_TAG {
                return Err(SongeError::BadKeyfile(
                    "import expects a K-prefixed signing key, not a verify key".to_string(),
                ));
            }
            let passphrase = read_passphrase("New passphrase")?;
            let identity = facade.import(&raw, &passphrase)?;
            println!("{}", identity.verify_key_encoded);
        }
        Commands::ChangePassphrase => {
            let facade = Facade::open(config)?;
            let old = read_passphrase("Current passphrase")?;
            let new = read_passphrase("New passphrase")?;
            facade.change_passphrase(&old, &new)?;
            eprintln!("passphrase changed");
        }
        Commands::ShowSigningKey => {
            let facade = Facade::open(config)?;
            let passphrase = read_passphrase("Passphrase")?;
            println!("{}", facade.show_signing_key(&passphrase)?);
        }
        Commands::ShowVerifyKey => {
            let facade = Facade::open(config)?;
            println!("{}", facade.show_verify_key()?);
        }
        Commands::Sign {
            file,
            comment,
            embedded,
        } => {
            let facade = Facade::open(config)?;
            let passphrase = read_passphrase("Passphrase")?;
            facade.sign(&passphrase, &file, comment, embedded, now_unix())?;
            eprintln!("wrote {}.sgsig", file.display());
        }
        Commands::Verify { file } => {
            let facade = Facade::open(config)?;
            let (outcome, warnings) = facade.verify(&file)?;
            for w in &warnings {
                eprintln!("warning: {w:?}");
            }
            match outcome.verdict {
                Verdict::GoodTrusted => eprintln!("GOOD (trusted: {})", outcome.verify_key_encoded),
                Verdict::GoodUntrusted => {
                    eprintln!("GOOD (untrusted: {})", outcome.verify_key_encoded)
                }
            }
            if let Some(data) = outcome.recovered_data {
                io::stdout().write_all(&data)?;
            }
        }
        Commands::TrustList { substring } => {
            let facade = Facade::open(config)?;
            for (index, key) in facade.trust_list(substring.as_deref())? {
                println!("{index}\t{key}");
            }
        }
        Commands::TrustAdd { key } => {
            let facade = Facade::open(config)?;
            let passphrase = read_passphrase("Passphrase")?;
            facade.trust_add(&passphrase, &key)?;
            eprintln!("added {key}");
        }
        Commands::TrustRemove { selector } => {
            let facade = Facade::open(config)?;
            let passphrase = read_passphrase("Passphrase")?;
            facade.trust_remove(&passphrase, &selector)?;
            eprintln!("removed {selector}");
        }
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
            SongeError::BadPassphrase
            | SongeError::BadSignature
            | SongeError::BadChecksum
            | SongeError::BadEncoding(_)
            | SongeError::NoData
            | SongeError::Io(_) => 1,
            SongeError::BadKeyfile(_) | SongeError::MemoryLockFailed(_) => 2,
        });
    }
}
