mod cli;

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    let _logger = Logger::try_with_env_or_str(&args.verbosity)?
        .log_to_stdout()
        .start()?;

    let config = match &args.config {
        Some(path) => read_config_file(path)?,
        None       => Config::default(),
    };
    let threads = args.threads.or(config.threads);
    log::debug!("{config:?}");

    // Before starting the potentially long computation, make sure that we can
    // write the result to the requested destination.
    if let Some(dir) = args.output.parent() {
        if !dir.as_os_str().is_empty() { std::fs::create_dir_all(dir)?; }
    }

    let mut progress = Progress::new();
    // --- Input -----------------------------------------------------------------------
    let source = Hdf5Acquisition::open(&args.input, config.axis_order)?;
    let scan_path = scan_group(&source)?;
    let scan = source.volume(scan_path)?;
    let (n_sinograms, n_projections, width) = (scan.n_sinograms(), scan.n_projections(), scan.detector_width());
    if n_sinograms == 0 || n_projections == 0 {
        log::error!("No projections found. Process will end.");
        return Err(format!("`{scan_path}` in {} holds no projections", args.input.display()).into())
    }
    log::info!("{}: {} sinograms of {} projections x {} columns",
               args.input.display(), group_digits(n_sinograms), group_digits(n_projections), width);

    // --- Correction plan -------------------------------------------------------------
    progress.start("Resolving flat and dark references");
    let mut status: Box<dyn StatusLog> = match &args.log {
        Some(path) => Box::new(LogFile::append(path)?),
        None       => Box::new(LogOnly),
    };
    let key = plan_key(&std::fs::canonicalize(&args.input)?, config.flat_end, config.axis_order);
    let mut cache = args.cache.as_deref().map(DirPlanCache::new);
    let plan = resolve_plan(&source, &key, cache.as_mut().map(|c| c as &mut dyn PlanCache),
                            config.flat_end, status.as_mut())?;
    progress.done();

    // --- Eigen flat fields -----------------------------------------------------------
    if config.dynamic.is_some() { progress.start("Building eigen flat fields"); }
    let corrector = build_corrector(&source, &plan, config.dynamic)?;
    if config.dynamic.is_some() { progress.done(); }

    // --- Output ----------------------------------------------------------------------
    let file = hdf5::File::create(&args.output)?;
    let mut output = create_volume(&file.create_group("exchange")?, "data", config.axis_order,
                                   width, n_sinograms, n_projections)?;
    println!("Writing corrected sinograms to {}", args.output.display());

    // --- Process sinograms in batches ------------------------------------------------
    let wanted = clamp_bounds(&args.sinograms, n_sinograms);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads.unwrap_or(0)).build()?;
    let bar = ProgressBar::new(wanted.len() as u64);
    bar.set_style(ProgressStyle::default_bar()
                  .template("Sinograms: [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta_precise})")?);
    progress.startln("Correcting sinograms");
    for batch in &wanted.clone().chunks(config.batch) {
        // HDF5 access is serialized anyway: read and write on this thread
        let sinograms = batch
            .map(|idx| Ok((idx, scan.read_sinogram(idx)?)))
            .collect::<Result<Vec<_>, AccessError>>()?;
        let corrected = pool.install(|| sinograms
            .into_par_iter()
            .map(|(idx, sino)| Ok((idx, corrector.correct(sino.view(), idx, &plan, config.air)?)))
            .collect::<Result<Vec<_>, AccessError>>())?;
        bar.inc(corrected.len() as u64);
        for (idx, sino) in corrected {
            output.write_sinogram(idx, sino.view())?;
        }
    }
    bar.finish();
    progress.done_with_message(&format!("Corrected {} sinograms", group_digits(wanted.len())));
    Ok(())
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::error::Error;
use clap::Parser;
use flexi_logger::Logger;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use rayon::prelude::*;
use tomoprep::{
    AccessError,
    config::preprocess::{read_config_file, Config},
    extract::{scan_group, Acquisition, Hdf5Acquisition},
    pipeline::{build_corrector, plan_key, resolve_plan},
    plan::{DirPlanCache, PlanCache},
    status::{LogFile, LogOnly, StatusLog},
    utils::{clamp_bounds, group_digits, timing::Progress},
    volume::hdf5::create_volume,
};
use cli::Cli;
