//! Interactive shell over an in-memory blockfs volume.
//!
//! Usage:
//!   blockfs                          # indexed volume, commands from stdin
//!   blockfs --backend chained        # linked-block volume
//!   blockfs -b 2 -n 64 -s 16 run.txt # run a script on a small chained volume

use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;

use blockfs::{Backend, SuperBlock};
use clap::Parser;
use log::info;

#[derive(Parser)]
#[command(name = "blockfs")]
#[command(about = "Compare indexed and chained block allocation on an in-memory volume")]
struct Args {
    /// Block layout: indexed (1) or chained (2)
    #[arg(short, long, default_value = "indexed")]
    backend: Backend,

    /// Number of blocks on the volume
    #[arg(short = 'n', long, default_value_t = blockfs::DEFAULT_BLOCKS_COUNT)]
    blocks: usize,

    /// Bytes per block
    #[arg(short = 's', long, default_value_t = blockfs::DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Inode table capacity (indexed volumes only)
    #[arg(short, long, default_value_t = blockfs::DEFAULT_INODES_COUNT)]
    inodes: usize,

    /// Read commands from this file instead of stdin
    script: Option<PathBuf>,
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let sb = SuperBlock::new(args.blocks, args.block_size).with_inodes(args.inodes);
    let mut fs = blockfs::create(args.backend, &sb)?;
    info!(
        "{} volume: {} blocks of {} bytes",
        args.backend, sb.blocks_count, sb.block_size
    );

    let stdout = io::stdout();
    match args.script {
        Some(path) => {
            let script = BufReader::new(File::open(&path)?);
            blockfs::run_session(fs.as_mut(), script, stdout.lock(), false)?;
        }
        None => {
            let stdin = io::stdin();
            blockfs::run_session(fs.as_mut(), stdin.lock(), stdout.lock(), true)?;
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("blockfs: {}", e);
        process::exit(1);
    }
}
