use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Input;
use log::info;

use daeconv::{conversion, format::collada::ImportOptions};

/// Converts skinned and animated COLLADA characters into baked .skm files.
#[derive(Parser, Debug)]
#[command(name = "daeconv", version)]
struct Args {
    /// The .dae or .skm files to convert.
    files: Vec<PathBuf>,

    /// The directory the converted files are written to.
    #[arg(short, long, default_value = "out")]
    out: PathBuf,

    /// Keep COLLADA's bottom left texture origin instead of flipping V.
    #[arg(long)]
    keep_uv_origin: bool,

    /// The deepest joint hierarchy accepted.
    #[arg(long, default_value_t = 128)]
    max_joint_depth: usize,

    /// Overrides the animation duration, in seconds.
    #[arg(long)]
    duration: Option<f32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let options = ImportOptions {
        flip_uv_v: !args.keep_uv_origin,
        max_joint_depth: args.max_joint_depth,
        duration: args.duration,
    };

    let files = if args.files.is_empty() {
        let path: String = Input::new()
            .with_prompt("Path of the file to convert")
            .interact_text()
            .context("Failed to read the file path")?;
        vec![PathBuf::from(path.trim())]
    } else {
        args.files
    };

    for converter in conversion::converters(&options) {
        info!("Converting {} file(s) into {}", files.len(), converter.name);
        let written = converter.convert(&files, &args.out);
        info!("Wrote {} file(s) to \"{}\"", written, args.out.display());
    }

    Ok(())
}
