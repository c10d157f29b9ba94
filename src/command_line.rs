/// Parse the main command-line
///
use clap::{Args as ClapArgs, Parser, Subcommand};

use tdx_measurements::td_params::TdParams;

// This is the help blurb:
/// Compute the initial measurement (MRTD) of a Trust Domain running a given
/// binary, and compare it with an expected value.
#[derive(Debug, Parser)]
#[command(version, long_about, verbatim_doc_comment)]
pub struct Args {
    /// Display more information (use multiple times to increase verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file. Can be specified multiple times to provide overlays.
    /// For example: -c platform.conf -c workload.conf
    #[arg(short, long, verbatim_doc_comment, value_name = "file", global = true)]
    pub config: Vec<String>,

    #[command(flatten)]
    pub td: TdParams,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute the MRTD of a binary
    Measure(MeasureArgs),
    /// Compute the MRTD of a binary and compare it with an expected value
    Verify(VerifyArgs),
}

#[derive(ClapArgs, Debug)]
pub struct MeasureArgs {
    /// Binary loaded into the TD
    #[arg(value_name = "file")]
    pub binary: String,

    /// Output file for the JSON report
    #[arg(short, long, value_name = "file")]
    pub output: Option<String>,

    /// Display measurement encoded in base64, instead of raw hex
    #[arg(long)]
    pub print_b64: bool,
}

#[derive(ClapArgs, Debug)]
pub struct VerifyArgs {
    /// Binary loaded into the TD
    #[arg(value_name = "file")]
    pub binary: String,

    /// Expected MRTD in hex
    #[arg(required_unless_present = "report")]
    pub expected: Option<String>,

    /// Take the expected MRTD from a JSON report
    #[arg(long, value_name = "file", conflicts_with = "expected")]
    pub report: Option<String>,
}
