//! Convert a relatedness matrix between on-disk formats.
//!
//! phenoharm pack-grm --input grm.mtx --output grm.phrm

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use phenoharm_data::relatedness::{read_relatedness, write_relatedness};

#[derive(Args)]
pub struct PackGrmArgs {
    /// Input matrix (.mtx with .sampleIDs.txt, .phrm, or dense text)
    #[arg(long)]
    input: String,

    /// Output path; the extension picks the format (.phrm for the binary object)
    #[arg(long)]
    output: String,
}

pub fn run(args: PackGrmArgs) -> Result<()> {
    let grm = read_relatedness(Path::new(&args.input))?;
    info!("Read {} x {} relatedness matrix", grm.n_samples(), grm.n_samples());
    write_relatedness(&grm, Path::new(&args.output))?;
    println!("Wrote {} samples to {}", grm.n_samples(), args.output);
    Ok(())
}
