use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use clap::{Parser, Subcommand};
use suitcase::crypto::parse_identities;
use suitcase::pack::{pack_all, pack_suitcase, DEFAULT_PREFIX};
use suitcase::validate::list_entries;
use suitcase::{
    validate_with_identities, ArchiveOptions, ErrorPolicy, FillProgress, Format, HashAlgorithm, Inventory,
    ManifestEncoding,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "suitcase", about = "Pack file inventories into compressed, optionally encrypted tar suitcases")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the supported suitcase formats
    Formats,
    /// Pack an inventory into one suitcase per index
    Create {
        /// JSON inventory of file assignments
        #[arg(short, long)]
        inventory: PathBuf,
        /// JSON archive options; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        format: Option<Format>,
        #[arg(short, long)]
        destination: Option<PathBuf>,
        #[arg(long, default_value = DEFAULT_PREFIX)]
        prefix: String,
        /// Only build this suitcase index
        #[arg(long)]
        index: Option<usize>,
        /// age public key (repeatable)
        #[arg(short, long = "recipient")]
        recipients: Vec<String>,
        /// Encrypt each file instead of the whole archive
        #[arg(long)]
        encrypt_inner: bool,
        #[arg(long)]
        hash_inner: bool,
        #[arg(long)]
        hash_outer: bool,
        #[arg(long)]
        hash_algorithm: Option<HashAlgorithm>,
        /// Write manifest digests as base64 instead of hex
        #[arg(long)]
        base64_manifest: bool,
        /// Skip unreadable files instead of aborting
        #[arg(long)]
        keep_going: bool,
        /// Advisory suitcase size in bytes
        #[arg(long)]
        max_size: Option<u64>,
        #[arg(long)]
        post_process: Option<PathBuf>,
    },
    /// Check that a suitcase holds every file assigned to its index
    Validate {
        archive: PathBuf,
        #[arg(short, long)]
        inventory: PathBuf,
        #[arg(long, default_value = "1")]
        index: usize,
        /// age identity file for outer-encrypted suitcases
        #[arg(long)]
        identity: Option<PathBuf>,
    },
    /// List suitcase entries
    List {
        archive: PathBuf,
        #[arg(long)]
        identity: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Formats ──────────────────────────────────────────────────────────
        Commands::Formats => {
            for f in Format::ALL {
                let layers = match (f.codec().name(), f.is_encrypted()) {
                    ("none", false) => "tar".to_string(),
                    ("none", true)  => "cipher → tar".to_string(),
                    (c, false)      => format!("{c} → tar"),
                    (c, true)       => format!("cipher → {c} → tar"),
                };
                println!("{:<12} {}", f.as_str(), layers);
            }
        }

        // ── Create ───────────────────────────────────────────────────────────
        Commands::Create {
            inventory, config, format, destination, prefix, index, recipients,
            encrypt_inner, hash_inner, hash_outer, hash_algorithm, base64_manifest,
            keep_going, max_size, post_process,
        } => {
            let inventory = Inventory::from_json_file(&inventory)?;
            let mut opts = match &config {
                Some(path) => ArchiveOptions::from_json_file(path)?,
                None => ArchiveOptions::default(),
            };
            if format.is_some()       { opts.format = format; }
            if let Some(d) = destination { opts.destination = d; }
            if !recipients.is_empty() { opts.encrypt_to = recipients; }
            if let Some(a) = hash_algorithm { opts.hash_algorithm = a; }
            if let Some(m) = max_size { opts.max_size = Some(m); }
            if post_process.is_some() { opts.post_process = post_process; }
            opts.encrypt_inner |= encrypt_inner;
            opts.hash_inner    |= hash_inner;
            opts.hash_outer    |= hash_outer;
            if base64_manifest { opts.manifest_encoding = ManifestEncoding::Base64; }
            if keep_going      { opts.error_policy = ErrorPolicy::Continue; }
            if opts.destination.as_os_str().is_empty() {
                opts.destination = PathBuf::from(".");
            }

            let (tx, rx) = mpsc::channel::<FillProgress>();
            let printer = thread::spawn(move || {
                for p in rx {
                    if p.completed {
                        eprintln!("  suitcase {:>2}  done     {}/{} files", p.index, p.current, p.total);
                    } else {
                        eprintln!("  suitcase {:>2}  {:>5.1}%  {}/{}", p.index, p.percent, p.current, p.total);
                    }
                }
            });

            let packed = match index {
                Some(i) => pack_suitcase(&opts, &inventory, &prefix, i, Some(&tx)).map(|p| vec![p]),
                None    => pack_all(&opts, &inventory, &prefix, Some(&tx)),
            };
            drop(tx);
            join_printer(printer);

            for p in packed? {
                let state = if p.reused { "kept" } else { "created" };
                println!("{:<8} {}", state, p.path.display());
                if let Some(h) = &p.outer_hash {
                    println!("         {} {}", opts.hash_algorithm, h);
                }
            }
        }

        // ── Validate ─────────────────────────────────────────────────────────
        Commands::Validate { archive, inventory, index, identity } => {
            let inventory = Inventory::from_json_file(&inventory)?;
            let identities = load_identities(identity.as_deref())?;
            if validate_with_identities(&archive, &inventory.files, index, &identities) {
                println!("valid    {}", archive.display());
            } else {
                println!("invalid  {}", archive.display());
                std::process::exit(1);
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { archive, identity } => {
            let identities = load_identities(identity.as_deref())?;
            for name in list_entries(&archive, &identities)? {
                println!("{name}");
            }
        }
    }

    Ok(())
}

/// Wait for the progress printer.  A panic there is logged, not returned.
fn join_printer(printer: thread::JoinHandle<()>) -> bool {
    match printer.join() {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::warn!(%reason, "progress printer panicked");
            false
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_identities(path: Option<&Path>) -> Result<Vec<age::x25519::Identity>, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(parse_identities(&std::fs::read_to_string(p)?)?),
        None    => Ok(Vec::new()),
    }
}
