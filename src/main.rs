use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;

use sbtree::{FileStorage, SbTree, SbTreeConfig};

/// Fixed value width for the demo binary; the library itself is generic
/// over this via `SbTree`'s const generic parameter.
const VALUE_SIZE: usize = 16;

#[derive(Parser)]
#[command(about = "Explore a sbtree data file: put, get, and scan fixed-size records")]
struct Cli {
    /// Path to the page file backing the tree.
    db_path: PathBuf,

    /// Optional TOML file overriding the default page/pool sizing.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Insert a record. Keys must arrive in non-decreasing order.
    Put { key: u32, value: String },
    /// Look up a single key.
    Get { key: u32 },
    /// Print every record with key in [min, max] (either bound optional).
    Scan {
        #[arg(long)]
        min: Option<u32>,
        #[arg(long)]
        max: Option<u32>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<SbTreeConfig> {
    match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("reading config file {}", p.display()))?;
            Ok(toml::from_str(&text)?)
        }
        None => Ok(SbTreeConfig {
            page_size: 4096,
            key_size: 4,
            data_size: VALUE_SIZE as u8,
            pool_frames: 16,
        }),
    }
}

fn encode_value(s: &str) -> [u8; VALUE_SIZE] {
    let mut buf = [0u8; VALUE_SIZE];
    let bytes = s.as_bytes();
    let n = bytes.len().min(VALUE_SIZE);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

fn display_value(buf: &[u8; VALUE_SIZE]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(VALUE_SIZE);
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let storage = FileStorage::open(&cli.db_path)
        .with_context(|| format!("opening {}", cli.db_path.display()))?;
    let mut tree: SbTree<u32, VALUE_SIZE, _> =
        SbTree::open_or_create(storage, config).context("opening tree")?;

    match cli.command {
        Command::Put { key, value } => {
            tree.put(key, &encode_value(&value))?;
            tree.flush()?;
        }
        Command::Get { key } => {
            let mut out = [0u8; VALUE_SIZE];
            match tree.get(key, &mut out) {
                Ok(()) => println!("{}", display_value(&out)),
                Err(sbtree::Error::NotFound) => bail!("key {key} not found"),
                Err(e) => return Err(e.into()),
            }
        }
        Command::Scan { min, max } => {
            for record in tree.iter(min, max) {
                let (key, value) = record?;
                println!("{key}\t{}", display_value(&value));
            }
        }
    }

    tree.close()?;
    Ok(())
}
