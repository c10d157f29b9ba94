use std::process;

use anyhow::Result;
use clap::Parser;

use tdx_measurements::blob::BlobStorage;
use tdx_measurements::session::{compute_mrtd, MeasurementConfig};
use tdx_measurements::td_params::TdParams;
use tdx_measurements::verify::VerifyOutcome;
use tdx_measurements::MeasurementReport;

mod command_line;

use command_line::*;

fn build_config(args: &Args) -> Result<MeasurementConfig> {
    let mut params = TdParams::default();
    for filename in &args.config {
        params.load_config(filename)?;
    }
    params.update(&args.td)?;
    log::debug!("TD parameters: {params:?}");
    Ok(params.to_config()?)
}

fn measure(args: &MeasureArgs, config: &MeasurementConfig) -> Result<()> {
    let mut binary = BlobStorage::from_file(&args.binary);
    let result = compute_mrtd(config, &mut binary)?;

    println!("MRTD: {}", result.dump(args.print_b64));
    println!("Pages: {}", result.pages_measured);

    if let Some(output) = &args.output {
        MeasurementReport::new(&args.binary, config, &result).write(output)?;
        log::info!("Report written to {output}");
    }
    Ok(())
}

fn verify(args: &VerifyArgs, config: &MeasurementConfig) -> Result<bool> {
    let expected = match (&args.expected, &args.report) {
        (Some(expected), _) => expected.clone(),
        (None, Some(report)) => MeasurementReport::from_file(report)?.mrtd,
        (None, None) => anyhow::bail!("no expected measurement"),
    };

    let mut binary = BlobStorage::from_file(&args.binary);
    let result = compute_mrtd(config, &mut binary)?;
    let outcome = VerifyOutcome::new(&result, &expected);

    println!("Expected MRTD:   {}", outcome.expected);
    println!("Calculated MRTD: {}", outcome.computed);
    println!("Match: {}", if outcome.matches { "yes" } else { "no" });
    Ok(outcome.matches)
}

fn main() {
    let args = Args::parse();

    if let Err(e) = stderrlog::new()
        .verbosity(1 + args.verbose as usize)
        .init()
    {
        eprintln!("Cannot initialize logging: {e}");
    }

    let config = build_config(&args).unwrap_or_else(|e| {
        log::error!("Cannot build parameters: {e:#}");
        process::exit(1);
    });

    let status = match &args.command {
        Command::Measure(m) => measure(m, &config).map(|_| 0),
        Command::Verify(v) => verify(v, &config).map(|matches| if matches { 0 } else { 2 }),
    };

    match status {
        Ok(code) => process::exit(code),
        Err(e) => {
            log::error!("Failed to compute measurement: {e:#}");
            process::exit(1);
        }
    }
}
