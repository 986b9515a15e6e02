use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use log::info;

use evstore::config::{StoreConfig, load_config};
use evstore::csum::algo::{ChecksumAlgorithm, compute_csums, verify_fetch};
use evstore::{EvtEntry, Extent, Iod, VersionedStore, csum_count};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "EVSTORE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Number of checksum chunks covering an extent
    Count {
        #[arg(long)]
        lo: u64,
        #[arg(long)]
        hi: u64,
        #[arg(long)]
        inob: u32,
        #[arg(long)]
        chunk_size: u32,
    },
    /// Align a selected extent to checksum chunks within a stored extent
    Align {
        #[arg(long)]
        lo: u64,
        #[arg(long)]
        hi: u64,
        #[arg(long)]
        ext_lo: u64,
        #[arg(long)]
        ext_hi: u64,
        #[arg(long)]
        inob: u32,
        #[arg(long)]
        chunk_size: u32,
    },
    /// Write a sample array, fetch part of it and verify the checksums
    Demo,
}

fn extent(lo: u64, hi: u64) -> Result<Extent> {
    Extent::from_raw(lo, hi).with_context(|| format!("invalid extent [{lo}, {hi}]"))
}

fn demo(cfg: &StoreConfig) -> Result<()> {
    let alg = cfg.algorithm;
    let inob = cfg.record_size;
    let chunk_records = (cfg.chunk_size / inob).max(1) as u64;
    let store = VersionedStore::new();

    // three writes at increasing epochs, the last one overlapping the first
    let writes = [
        (1u64, 0u64, chunk_records * 2, b'a'),
        (1, chunk_records * 3, chunk_records, b'b'),
        (2, chunk_records / 2, chunk_records, b'c'),
    ];
    for (epoch, lo, nr, fill) in writes {
        let ext = Extent::from_recx(lo, nr).context("empty demo extent")?;
        let data = vec![fill; (nr * inob as u64) as usize];
        let csum = compute_csums(&alg, &ext, inob, cfg.chunk_size, &data)?;
        let iod = Iod::array("demo", inob).with_recx(lo, nr).with_csum(csum);
        store
            .update(epoch, &iod, Bytes::from(data))
            .with_context(|| format!("update {ext} at epoch {epoch}"))?;
    }

    let iod = Iod::array("demo", inob).with_recx(1, chunk_records * 4 - 2);
    let fh = store.fetch_begin(2, &iod).context("fetch")?;
    for biov in fh.biovs() {
        println!(
            "{:<24} prefix {:>8} suffix {:>8}{}",
            biov.ext.to_string(),
            biov.prefix_len,
            biov.suffix_len,
            if biov.is_hole { " hole" } else { "" }
        );
    }
    let rc = verify_fetch(&fh, &alg);
    let chunks: u32 = fh.csums().iter().map(|c| c.chunk_count).sum();
    fh.end(rc).context("verify")?;
    info!("verified {chunks} chunks of {} byte digests", alg.digest_len());
    println!("demo: OK");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("Failed to load config from {path}"))?,
        None => StoreConfig::default(),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cfg.log_level))
        .format_timestamp_secs()
        .init();

    match args.command {
        Command::Count {
            lo,
            hi,
            inob,
            chunk_size,
        } => {
            println!("{}", csum_count(&extent(lo, hi)?, chunk_size, inob));
        }
        Command::Align {
            lo,
            hi,
            ext_lo,
            ext_hi,
            inob,
            chunk_size,
        } => {
            let entry =
                EvtEntry::new(extent(ext_lo, ext_hi)?, extent(lo, hi)?).with_chunk_size(chunk_size);
            println!("{}", entry.align_to_csum_chunk(inob));
        }
        Command::Demo => demo(&cfg)?,
    }
    Ok(())
}
