//! Retromirror - handheld save backup
//!
//! Pulls every configured emulator's saves and config over FTP into a clean
//! local mirror, then pushes the mirror to a new timestamped archive over SFTP.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::LevelFilter;
use std::sync::Arc;

use retromirror::cli::Args;
use retromirror::config::MirrorConfig;
use retromirror::ftp_session::FtpConnector;
use retromirror::logger::{Logger, NoopLogger, TextLogger};
use retromirror::orchestrator::{Orchestrator, RunReport};
use retromirror::sftp_session::SftpConnector;

fn main() -> Result<()> {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let args = Args::parse();

    let default_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    let mut config = MirrorConfig::load(args.config.as_deref(), &|key: &str| std::env::var(key).ok())?;
    args.apply(&mut config);

    if args.list_profiles {
        print_profiles(&config);
        return Ok(());
    }
    config.validate(args.mode)?;

    // Choose logger once; NoopLogger unless a run log was asked for
    let logger: Arc<dyn Logger> = match args.log_file {
        Some(ref p) => Arc::new(TextLogger::new(p)?),
        None => Arc::new(NoopLogger),
    };

    let orchestrator = Orchestrator::new(&config, FtpConnector, SftpConnector, &*logger);
    let report = orchestrator.run(args.mode, &Local::now());
    print_summary(&report);

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_profiles(config: &MirrorConfig) {
    for profile in &config.profiles {
        println!("{}", profile.name);
        println!("  saves:  {}", profile.saves);
        for path in &profile.config {
            println!("  config: {}", path);
        }
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!("=== Run {} ({}) ===", report.run_id, report.mode);
    if report.mode.downloads() {
        println!(
            "Downloaded: {} files ({:.2} MB), {} errors",
            report.download.files,
            report.download.bytes as f64 / 1_048_576.0,
            report.download.errors.len()
        );
    }
    if let Some(archive) = &report.archive {
        println!(
            "Archived:   {} files ({:.2} MB) to {}, {} errors",
            report.upload.files,
            report.upload.bytes as f64 / 1_048_576.0,
            archive,
            report.upload.errors.len()
        );
    }
    match &report.failure {
        Some(failure) => println!("Failed:     {}", failure),
        None => println!("Done."),
    }
}
