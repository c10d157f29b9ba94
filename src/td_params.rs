use std::fs;

use clap::Parser;
use serde::{Deserialize, Deserializer};

use crate::session::MeasurementConfig;
use crate::td::{TdConfig, TdError};
use crate::utils::parse_int;

type Result<T> = core::result::Result<T, TdError>;

/// Default TD attributes: no debug
pub const DEFAULT_ATTRIBUTES: u64 = 0;
/// Default XFAM: x87, SSE, AVX, AVX-512 and PT state
pub const DEFAULT_XFAM: u64 = 0x1e7;
/// Default number of vCPUs
pub const DEFAULT_MAX_VCPUS: u64 = 1;
/// Default guest address of the binary
pub const DEFAULT_LOAD_ADDRESS: u64 = 0x400000;
/// Default number of stack pages
pub const DEFAULT_STACK_PAGES: u64 = 16;
/// Default number of heap pages
pub const DEFAULT_HEAP_PAGES: u64 = 32;

fn check_max_vcpus(v: u64) -> Result<u64> {
    if v == 0 || v > u32::MAX as u64 {
        return Err(TdError::Parameter(format!("max_vcpus '{v}'")));
    }
    Ok(v)
}

fn check_num_pages(name: &str, v: u64) -> Result<u64> {
    if v > u32::MAX as u64 {
        return Err(TdError::Parameter(format!("{name} '{v}'")));
    }
    Ok(v)
}

// TOML integers are signed 64-bit, so large values can also be given as a
// string, with the same syntax as the command-line.
fn deserialize_int<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> core::result::Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(u64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(v) => Ok(Some(v)),
        IntOrString::Str(s) => parse_int(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parameters of the measured TD. Each one can be given in a config file or on
/// the command-line, before or after the command. Unset parameters take their
/// default value.
#[derive(Clone, Debug, Parser, Default, Deserialize, PartialEq)]
#[command(next_help_heading = "TD configuration")]
#[serde(deny_unknown_fields)]
pub struct TdParams {
    /// TD attributes [default: 0]
    #[arg(long, value_name = "N", value_parser = parse_int, global = true)]
    #[serde(default, deserialize_with = "deserialize_int")]
    pub attributes: Option<u64>,

    /// Extended features available mask [default: 0x1e7]
    #[arg(long, value_name = "N", value_parser = parse_int, global = true)]
    #[serde(default, deserialize_with = "deserialize_int")]
    pub xfam: Option<u64>,

    /// Maximum number of vCPUs [default: 1]
    #[arg(long, value_name = "N", value_parser = parse_int, global = true)]
    #[serde(default, deserialize_with = "deserialize_int")]
    pub max_vcpus: Option<u64>,

    /// Guest physical address of the binary [default: 0x400000]
    #[arg(long, value_name = "ADDR", value_parser = parse_int, global = true)]
    #[serde(default, deserialize_with = "deserialize_int")]
    pub load_address: Option<u64>,

    /// Number of stack pages [default: 16]
    #[arg(long, value_name = "N", value_parser = parse_int, global = true)]
    #[serde(default, deserialize_with = "deserialize_int")]
    pub stack_pages: Option<u64>,

    /// Number of heap pages [default: 32]
    #[arg(long, value_name = "N", value_parser = parse_int, global = true)]
    #[serde(default, deserialize_with = "deserialize_int")]
    pub heap_pages: Option<u64>,
}

impl TdParams {
    /// Set the TD attributes.
    pub fn set_attributes(&mut self, v: u64) {
        self.attributes = Some(v);
    }

    /// Set the XFAM.
    pub fn set_xfam(&mut self, v: u64) {
        self.xfam = Some(v);
    }

    /// Set the maximum number of vCPUs.
    pub fn set_max_vcpus(&mut self, v: u64) -> Result<()> {
        self.max_vcpus = Some(check_max_vcpus(v)?);
        Ok(())
    }

    /// Set the guest address of the binary.
    pub fn set_load_address(&mut self, v: u64) {
        self.load_address = Some(v);
    }

    /// Set the number of stack pages.
    pub fn set_stack_pages(&mut self, v: u64) -> Result<()> {
        self.stack_pages = Some(check_num_pages("stack_pages", v)?);
        Ok(())
    }

    /// Set the number of heap pages.
    pub fn set_heap_pages(&mut self, v: u64) -> Result<()> {
        self.heap_pages = Some(check_num_pages("heap_pages", v)?);
        Ok(())
    }

    /// Update our parameters with the given configuration. Throw an error for
    /// any invalid value.
    pub fn update(&mut self, other: &TdParams) -> Result<()> {
        if let Some(v) = other.attributes {
            self.set_attributes(v);
        }
        if let Some(v) = other.xfam {
            self.set_xfam(v);
        }
        if let Some(v) = other.max_vcpus {
            self.set_max_vcpus(v)?;
        }
        if let Some(v) = other.load_address {
            self.set_load_address(v);
        }
        if let Some(v) = other.stack_pages {
            self.set_stack_pages(v)?;
        }
        if let Some(v) = other.heap_pages {
            self.set_heap_pages(v)?;
        }
        Ok(())
    }

    /// Override our parameters with the content of a TOML config file.
    pub fn load_config(&mut self, filename: &str) -> Result<()> {
        let content = fs::read_to_string(filename).map_err(|e| TdError::File {
            filename: filename.to_string(),
            e,
        })?;
        let params: TdParams = toml::from_str(&content)
            .map_err(|e| TdError::Config(format!("cannot parse {filename}: {e}")))?;

        self.update(&params)
    }

    /// Build the configuration of one measurement, using defaults for the
    /// parameters that are not set.
    pub fn to_config(&self) -> Result<MeasurementConfig> {
        let td = TdConfig {
            attributes: self.attributes.unwrap_or(DEFAULT_ATTRIBUTES),
            xfam: self.xfam.unwrap_or(DEFAULT_XFAM),
            max_vcpus: check_max_vcpus(self.max_vcpus.unwrap_or(DEFAULT_MAX_VCPUS))?,
        };
        Ok(MeasurementConfig {
            td,
            load_address: self.load_address.unwrap_or(DEFAULT_LOAD_ADDRESS),
            stack_pages: check_num_pages(
                "stack_pages",
                self.stack_pages.unwrap_or(DEFAULT_STACK_PAGES),
            )?,
            heap_pages: check_num_pages(
                "heap_pages",
                self.heap_pages.unwrap_or(DEFAULT_HEAP_PAGES),
            )?,
        })
    }
}
