//! JSON summary of one measurement: the inputs that determine it, and the
//! resulting MRTD. A report can be read back to verify another binary against
//! it.

use std::fs;

use serde::{Deserialize, Serialize};

use crate::measurement::{MeasurementResult, MEASUREMENT_HEX_LEN};
use crate::session::MeasurementConfig;
use crate::td::TdError;

type Result<T> = core::result::Result<T, TdError>;

/// Parameters of the measurement, as plain integers
#[derive(Clone, Deserialize, Serialize, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct ReportConfig {
    pub attributes: u64,
    pub xfam: u64,
    pub max_vcpus: u64,
    pub load_address: u64,
    pub stack_pages: u64,
    pub heap_pages: u64,
}

impl From<&MeasurementConfig> for ReportConfig {
    fn from(config: &MeasurementConfig) -> Self {
        ReportConfig {
            attributes: config.td.attributes,
            xfam: config.td.xfam,
            max_vcpus: config.td.max_vcpus,
            load_address: config.load_address,
            stack_pages: config.stack_pages,
            heap_pages: config.heap_pages,
        }
    }
}

/// Summary of a measurement
#[derive(Clone, Deserialize, Serialize, Debug, Default, PartialEq)]
#[allow(missing_docs)]
pub struct MeasurementReport {
    pub binary: String,
    pub mrtd: String,
    pub config: ReportConfig,
    pub full_hash: String,
    pub pages_measured: u64,
}

impl MeasurementReport {
    /// Create the report of @result, computed on @binary with @config
    pub fn new(binary: &str, config: &MeasurementConfig, result: &MeasurementResult) -> Self {
        let mrtd = result.hex.get(..MEASUREMENT_HEX_LEN).unwrap_or(&result.hex);
        MeasurementReport {
            binary: binary.to_string(),
            mrtd: mrtd.to_string(),
            config: config.into(),
            full_hash: result.hex.clone(),
            pages_measured: result.pages_measured,
        }
    }

    /// Read a report written by [MeasurementReport::write]
    pub fn from_file(filename: &str) -> Result<Self> {
        let content = fs::read_to_string(filename).map_err(|e| TdError::File {
            filename: filename.to_string(),
            e,
        })?;
        serde_json::from_str(&content)
            .map_err(|e| TdError::Config(format!("cannot parse {filename}: {e}")))
    }

    /// Encode as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TdError::Config(format!("cannot encode report: {e}")))
    }

    /// Write the JSON report to @filename
    pub fn write(&self, filename: &str) -> Result<()> {
        let json_output = self.to_json()?;
        fs::write(filename, json_output + "\n").map_err(|e| TdError::File {
            filename: filename.to_string(),
            e,
        })
    }
}
