use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{info, warn};

use mobistrip::cli::{self, Command, DecryptArgs};
use mobistrip::{batch, config, drm::MobiBook, logging, pid, report, util};

fn main() -> Result<ExitCode> {
    logging::init_logging();

    let cli_opts = cli::parse();
    match cli_opts.command {
        Command::Decrypt(args) => decrypt(args),
        Command::Pid { serial } => {
            println!("{}", pid::kindle_pid(&serial)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Info { input } => {
            print_info(&input)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn decrypt(args: DecryptArgs) -> Result<ExitCode> {
    let loaded = config::load_config(args.config_path.as_deref())?;
    let cfg = loaded.config;
    let pids = cfg.candidate_pids(&args.pids, &args.serials);
    if pids.is_empty() {
        warn!("no PIDs supplied; only books with default encryption will open");
    }

    let tool_version = env!("CARGO_PKG_VERSION");
    util::ensure_output_dir(&args.output)?;
    let sink = report::build_sink(
        util::backend_from_cli(args.report),
        tool_version,
        &loaded.config_hash,
        &args.output,
    )
    .context("creating report sink")?;

    let cancel_flag = Arc::new(AtomicBool::new(false));
    {
        let flag = cancel_flag.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        }) {
            warn!("failed to install ctrl-c handler: {err}");
        }
    }

    info!(
        "starting run_id={} books={} output={} workers={} pids={}",
        cfg.run_id,
        args.inputs.len(),
        args.output.display(),
        args.workers,
        pids.len()
    );

    let opts = batch::BatchOptions {
        run_id: cfg.run_id.clone(),
        output_dir: args.output.clone(),
        output_suffix: cfg.output_suffix.clone(),
        pids,
        workers: args.workers,
        sanitize_exth: cfg.sanitize_exth && !args.keep_restrictions,
        overwrite: cfg.overwrite || args.overwrite,
    };
    let outcome = batch::run_batch(&args.inputs, &opts, sink, cancel_flag)?;
    if outcome.report_errors > 0 {
        warn!("{} report write errors", outcome.report_errors);
    }

    info!("mobistrip run finished");
    Ok(if outcome.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_info(input: &Path) -> Result<()> {
    let raw = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let book = MobiBook::open(&raw)?;
    let header = book.header();

    println!("title:        {}", book.title());
    println!("sections:     {}", book.table().len());
    println!("text records: {}", header.records);
    println!("compression:  {}", header.compression);
    println!("mobi version: {}", header.version);
    println!("header len:   {:#x}", header.mobi_length);
    println!("codepage:     {}", header.codepage);
    println!("extra flags:  {:#06x}", header.extra_data_flags);
    println!("encryption:   {} ({})", book.crypto_type().raw(), book.crypto_type());
    match header.drm {
        Some(drm) => println!(
            "drm:          offset={:#x} count={} size={:#x} flags={:#x}",
            drm.ptr, drm.count, drm.size, drm.flags
        ),
        None => println!("drm:          none"),
    }
    println!("exth records: {}", book.exth().records().len());
    if let Some(expiry) = book.exth().rental_expiry() {
        println!("rental:       expires {expiry}");
    }
    Ok(())
}
