use std::borrow::Cow;

use crate::blob::BlobError;
use crate::measurement::{MeasurementAccumulator, MeasurementResult};
use crate::session::SessionState;
use crate::td_params::{DEFAULT_ATTRIBUTES, DEFAULT_MAX_VCPUS, DEFAULT_XFAM};
use crate::utils::*;
use tdx::{
    TdAttributes, TdConfigRecord, TdPageDescriptor, TdxError, TdxPageType, Xfam,
    TDX_PAGE_SIZE,
};

const PAGE_SIZE: usize = TDX_PAGE_SIZE as usize;

static ZERO_PAGE: [u8; PAGE_SIZE] = [0; PAGE_SIZE];

#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum TdError {
    #[error("cannot read {filename}: {e}")]
    Input { filename: String, e: std::io::Error },

    #[error("encoding error: {0}")]
    Encoding(#[from] TdxError),

    #[error("cannot measure {phase} in state {state:?}")]
    Sequence {
        phase: &'static str,
        state: SessionState,
    },

    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),

    #[error("invalid parameter: {0}")]
    Parameter(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file {filename} error: {e}")]
    File { filename: String, e: std::io::Error },
}
type Result<T> = core::result::Result<T, TdError>;

impl From<BlobError> for TdError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::File { e, filename } => TdError::Input { filename, e },
            BlobError::IO(e) => TdError::IO(e),
        }
    }
}

/// Configuration of the TD, measured before any page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TdConfig {
    /// TD attributes
    pub attributes: u64,
    /// Extended features enabled in the TD
    pub xfam: u64,
    /// Maximum number of vCPUs. Encoded on 32 bits.
    pub max_vcpus: u64,
}

impl Default for TdConfig {
    fn default() -> Self {
        TdConfig {
            attributes: DEFAULT_ATTRIBUTES,
            xfam: DEFAULT_XFAM,
            max_vcpus: DEFAULT_MAX_VCPUS,
        }
    }
}

impl TdConfig {
    /// Decoded attributes
    pub fn attributes(&self) -> TdAttributes {
        TdAttributes::from_bits_retain(self.attributes)
    }

    /// Decoded XFAM
    pub fn xfam(&self) -> Xfam {
        Xfam::from_bits_retain(self.xfam)
    }

    /// Encode the configuration into the 24-byte record that is measured
    pub fn encode(&self) -> Result<Vec<u8>> {
        let record = TdConfigRecord::new(self.attributes(), self.xfam(), self.max_vcpus)?;
        Ok(record.to_bytes()?)
    }
}

/// Return the page content that is measured for @data: truncated to one page,
/// or zero-padded on the right.
pub fn normalize_page(data: &[u8]) -> Cow<'_, [u8]> {
    if data.len() >= PAGE_SIZE {
        return Cow::Borrowed(&data[..PAGE_SIZE]);
    }
    let mut page = Vec::with_capacity(PAGE_SIZE);
    page.extend_from_slice(data);
    page.resize(PAGE_SIZE, 0);
    Cow::Owned(page)
}

/// Low-level TD state: the running measurement and the number of pages added
/// to it. Operations are measured in the order they are called.
#[derive(Debug, Default)]
pub struct Td {
    accumulator: MeasurementAccumulator,
    pages_measured: u64,
}

impl Td {
    /// Create a TD with an empty measurement
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages measured so far
    pub fn pages_measured(&self) -> u64 {
        self.pages_measured
    }

    /// Add the TD configuration record to the measurement
    pub fn measure_td_config(&mut self, config: &TdConfig) -> Result<()> {
        let bytes = config.encode()?;

        log::debug!(
            "Measuring TD config: attributes {:#018x} {:?}, xfam {:#018x} {:?}, max_vcpus {}",
            config.attributes,
            config.attributes(),
            config.xfam,
            config.xfam(),
            config.max_vcpus
        );
        self.accumulator.extend(&bytes);
        Ok(())
    }

    /// Add one page to the measurement: its descriptor, then its content
    /// normalized to the page size.
    pub fn measure_page(&mut self, gpa: u64, data: &[u8], page_type: TdxPageType) -> Result<()> {
        let desc = TdPageDescriptor::new(gpa, page_type).to_bytes()?;
        let content = normalize_page(data);

        self.accumulator.extend(&desc);
        self.accumulator.extend(&content);
        self.pages_measured += 1;

        log::trace!("Measured {page_type:?} page 0x{gpa:x}");
        Ok(())
    }

    /// Measure a binary loaded at @load_address, one page at a time in
    /// ascending address order. The last chunk may be shorter than a page.
    /// Return the number of pages measured.
    pub fn measure_binary(&mut self, content: &[u8], load_address: u64) -> Result<u64> {
        if content.is_empty() {
            log::debug!("Empty binary at 0x{load_address:x}");
            return Ok(0);
        }

        let last = load_address
            .checked_add(content.len() as u64 - 1)
            .ok_or_else(|| {
                TdError::Parameter(format!(
                    "binary of {} bytes does not fit at 0x{load_address:x}",
                    content.len()
                ))
            })?;

        if !is_aligned(load_address, TDX_PAGE_SIZE) {
            log::warn!("load address 0x{load_address:x} is not page aligned");
        }
        log::debug!(
            "Measuring binary 0x{load_address:x} - 0x{last:x}, {} pages",
            num_pages(content.len() as u64, TDX_PAGE_SIZE)
        );

        let mut pages = 0;
        for (off, chunk) in (0u64..)
            .step_by(PAGE_SIZE)
            .zip(content.chunks(PAGE_SIZE))
        {
            self.measure_page(load_address + off, chunk, TdxPageType::Normal)?;
            pages += 1;
        }
        Ok(pages)
    }

    /// Measure @count consecutive zero-filled pages starting at @base.
    pub fn measure_zero_pages(&mut self, base: u64, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }

        let last = (count - 1)
            .checked_mul(TDX_PAGE_SIZE)
            .and_then(|off| base.checked_add(off))
            .and_then(|start| start.checked_add(TDX_PAGE_SIZE - 1))
            .ok_or_else(|| {
                TdError::Parameter(format!("{count} pages do not fit at 0x{base:x}"))
            })?;

        log::debug!("Measuring {count} zero pages 0x{base:x} - 0x{last:x}");
        for i in 0..count {
            self.measure_page(base + i * TDX_PAGE_SIZE, &ZERO_PAGE, TdxPageType::Normal)?;
        }
        Ok(())
    }

    /// Return the final measurement
    pub fn finalize(self) -> MeasurementResult {
        log::debug!(
            "Finalizing after {} pages, {} bytes",
            self.pages_measured,
            self.accumulator.extended()
        );
        MeasurementResult::new(self.accumulator.finalize(), self.pages_measured)
    }
}
