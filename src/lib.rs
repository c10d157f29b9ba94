//! Compute and verify the initial measurement of a Trust Domain.
//!
//! A Trust Domain (TD) is a confidential VM whose initial state is measured
//! before it runs. Remote attestation uses that measurement, the MRTD, to prove
//! that the TD booted with exactly the expected code and configuration. This
//! project computes the reference MRTD of a binary offline, so that a verifier
//! can be provisioned with it, and compares it with an expected value.
//!
//! Example
//! ```bash
//! td-measurements
//!     -c configs/td.conf              # TD configuration
//!     --max-vcpus 2                   # Overrides the config file
//!     measure server.bin              # The binary loaded into the TD
//!     --output mrtd.json              # JSON report
//!
//! td-measurements verify server.bin 55d668b689c35c60...
//! ```
//!
//! # About the MRTD
//!
//! The MRTD is a SHA-384 digest extended with, in order:
//!
//! 1. The TD configuration record (attributes, XFAM, number of vCPUs).
//! 2. A boot page at address 0, filled with the `BOOT` tag.
//! 3. The binary, one 4KiB page at a time in ascending address order, starting
//!    at the load address. The last page is zero-padded.
//! 4. Zero-filled stack pages, then zero-filled heap pages.
//!
//! Each page contributes a 12-byte descriptor (address and page type) followed
//! by its 4096 bytes of content. The order of every extension is part of the
//! measurement: any change to the order, addresses or constants yields a
//! different MRTD.

#![warn(missing_docs)]
/// Binary sources
pub mod blob;
/// Running measurement and its result
pub mod measurement;
/// Fixed measurement order
pub mod session;
/// Measure the TD, one operation at a time
pub mod td;
/// TD parameters from config files and command-line
pub mod td_params;
/// Compare measurements
pub mod verify;

mod report;
mod utils;

pub use report::{MeasurementReport, ReportConfig};
