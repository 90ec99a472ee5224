use anyhow::{Context, Result};
use colored::*;
use tracing::info;

use urdf2usd_core::{ConversionReport, Converter};

mod cli;

use cli::{Cli, Commands, ConvertArgs};

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run_command(cli.command) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Convert(args) => run_convert(&args),
    }
}

fn run_convert(args: &ConvertArgs) -> Result<()> {
    let options = args.options().context("invalid options")?;
    info!("Policy: {}", options.policy);

    let report = Converter::new(options).convert(&args.source, &args.destination)?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &ConversionReport) {
    println!(
        "{} {}",
        "Wrote".green().bold(),
        report.asset_path.display()
    );
    println!(
        "  {} links, {} joints, {} meshes decoded, {} authored, {} textures",
        report.links,
        report.joints,
        report.meshes_decoded,
        report.meshes_authored,
        report.textures_copied
    );
    if report.has_warnings() {
        println!(
            "{} {} warning(s)",
            "Warning:".yellow().bold(),
            report.warnings.len()
        );
        for warning in &report.warnings {
            println!("  {} {}", "-".yellow(), warning);
        }
    }
}
