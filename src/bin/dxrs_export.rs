// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use descriptor_export_rs as dxrs;
use dxrs::config::Config;
use dxrs::core::distortion_map::DistortionMap;
use dxrs::core::export::{Exporter, MissingFramePolicy};
use dxrs::core::frame::FrameSource;
use dxrs::core::undistort::Undistorter;
use dxrs::dataset::nclt;
use dxrs::model;

/// Export one descriptor per frame of an NCLT sequence.
#[derive(Parser, Debug)]
#[command(name = "dxrs_export", version, about)]
struct Args {
    /// YAML experiment configuration.
    config: PathBuf,

    /// Name of the export, used for the output directory.
    export_name: String,

    /// Root of the datasets and weights.
    #[arg(long, env = "DXRS_DATA_PATH")]
    data_path: PathBuf,

    /// Root of the experiment outputs.
    #[arg(long, env = "DXRS_EXPER_PATH")]
    exper_path: PathBuf,

    /// Undistort and crop frames, whatever the configuration says.
    #[arg(long)]
    undistort: bool,

    /// Skip frames whose image is missing instead of aborting.
    #[arg(long)]
    skip_missing: bool,

    /// Do not display a progress bar.
    #[arg(long)]
    no_progress: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(error) = run(&args) {
        log::error!("{}", error);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> dxrs::Result<()> {
    let mut config = Config::from_file(&args.config)?;
    if args.undistort {
        config.data.undistort = true;
    }
    if args.skip_missing {
        config.data.missing_frames = MissingFramePolicy::Skip;
    }
    let paths = config.paths(&args.data_path, &args.exper_path, &args.export_name)?;

    // Everything that can be invalid is loaded before writing anything.
    let records = nclt::load_sequence(&paths.pose_file)?;
    log::info!("{} frames in {}", records.len(), paths.pose_file.display());

    let mut source = FrameSource::new(&paths.image_dir, &config.data.image_extension);
    if config.data.undistort {
        let map = DistortionMap::from_file(&paths.distortion_map, config.data.width, config.data.height)?;
        let undistorter = Undistorter::new(&map, config.data.interpolation, config.data.mask_erosion)?;
        log::info!(
            "undistorting with {}, valid region {:?}",
            paths.distortion_map.display(),
            undistorter.region()
        );
        source = source.with_undistortion(undistorter);
    }

    let mut net = model::from_config(&config.model)?;
    model::load_weights(net.as_mut(), paths.weights.as_deref())?;

    let exporter = Exporter::new(&paths.output_dir)
        .with_undistortion(config.data.undistort)
        .with_missing_frames(config.data.missing_frames);
    let progress = progress_bar(records.len() as u64, args.no_progress);
    let summary = exporter.run(&records, &source, net.as_mut(), |_| progress.inc(1))?;
    progress.finish_and_clear();

    if !summary.skipped.is_empty() {
        log::warn!("{} frames were missing: {:?}", summary.skipped.len(), summary.skipped);
    }
    log::info!(
        "{} descriptors written to {}",
        summary.exported,
        paths.output_dir.display()
    );
    Ok(())
}

fn progress_bar(len: u64, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}<{eta_precise}]")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}
