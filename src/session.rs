//! Drive a measurement of the TD in the fixed order that reference values are
//! computed with. A little more high-level than the Td state.
use std::mem;

use crate::blob::BlobStorage;
use crate::measurement::MeasurementResult;
use crate::td::{Td, TdConfig, TdError};
use crate::td_params::{DEFAULT_HEAP_PAGES, DEFAULT_LOAD_ADDRESS, DEFAULT_STACK_PAGES};
use tdx::{TdxPageType, TDX_PAGE_SIZE};

type Result<T> = core::result::Result<T, TdError>;

/// Guest address of the boot page
pub const BOOT_PAGE_GPA: u64 = 0;
/// Tag repeated over the whole boot page
pub const BOOT_PAGE_TAG: &[u8; 4] = b"BOOT";
/// Guest address of the first stack page
pub const STACK_BASE: u64 = 0x7ff0_0000;
/// Guest address of the first heap page
pub const HEAP_BASE: u64 = 0x1000_0000;

/// Content of the boot page
pub fn boot_page() -> Vec<u8> {
    BOOT_PAGE_TAG.repeat(TDX_PAGE_SIZE as usize / BOOT_PAGE_TAG.len())
}

/// Progress of a measurement session. Phases only move forward, one at a
/// time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing measured
    Created,
    /// TD configuration measured
    ConfigMeasured,
    /// Boot page measured
    BootMeasured,
    /// Binary measured
    BinaryMeasured,
    /// Stack and heap measured
    StackHeapMeasured,
    /// Measurement returned
    Finalized,
    /// A phase failed, the measurement is unusable
    Failed,
}

/// Everything that determines the measurement apart from the binary content.
/// Built once per measurement and never modified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeasurementConfig {
    /// The TD configuration record
    pub td: TdConfig,
    /// Guest address of the binary
    pub load_address: u64,
    /// Number of zero-filled stack pages
    pub stack_pages: u64,
    /// Number of zero-filled heap pages
    pub heap_pages: u64,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        MeasurementConfig {
            td: TdConfig::default(),
            load_address: DEFAULT_LOAD_ADDRESS,
            stack_pages: DEFAULT_STACK_PAGES,
            heap_pages: DEFAULT_HEAP_PAGES,
        }
    }
}

/// One measurement of a TD. Each phase must be called once, in order:
/// [measure_config](Self::measure_config),
/// [measure_boot_page](Self::measure_boot_page),
/// [measure_binary](Self::measure_binary),
/// [measure_stack_heap](Self::measure_stack_heap), then
/// [finalize](Self::finalize). Anything else fails with a sequence error.
#[derive(Debug)]
pub struct MeasurementSession {
    config: MeasurementConfig,
    td: Td,
    state: SessionState,
}

impl MeasurementSession {
    /// Create a session with a fresh measurement
    pub fn new(config: MeasurementConfig) -> Self {
        MeasurementSession {
            config,
            td: Td::new(),
            state: SessionState::Created,
        }
    }

    /// Current phase
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configuration of this session
    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    /// Number of pages measured so far
    pub fn pages_measured(&self) -> u64 {
        self.td.pages_measured()
    }

    // Run @f if the session is in state @from, and move to state @to. A failed
    // phase leaves a partial measurement, so the session cannot continue.
    fn advance<T>(
        &mut self,
        phase: &'static str,
        from: SessionState,
        to: SessionState,
        f: impl FnOnce(&mut Td, &MeasurementConfig) -> Result<T>,
    ) -> Result<T> {
        if self.state != from {
            return Err(TdError::Sequence {
                phase,
                state: self.state,
            });
        }

        match f(&mut self.td, &self.config) {
            Ok(v) => {
                self.state = to;
                Ok(v)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Measure the TD configuration
    pub fn measure_config(&mut self) -> Result<()> {
        self.advance(
            "TD config",
            SessionState::Created,
            SessionState::ConfigMeasured,
            |td, config| td.measure_td_config(&config.td),
        )
    }

    /// Measure the boot page
    pub fn measure_boot_page(&mut self) -> Result<()> {
        self.advance(
            "boot page",
            SessionState::ConfigMeasured,
            SessionState::BootMeasured,
            |td, _| {
                log::debug!("Measuring boot page 0x{BOOT_PAGE_GPA:x}");
                td.measure_page(BOOT_PAGE_GPA, &boot_page(), TdxPageType::Normal)
            },
        )
    }

    /// Measure the binary at the configured load address. Return the number of
    /// pages it occupies.
    pub fn measure_binary(&mut self, content: &[u8]) -> Result<u64> {
        self.advance(
            "binary",
            SessionState::BootMeasured,
            SessionState::BinaryMeasured,
            |td, config| td.measure_binary(content, config.load_address),
        )
    }

    /// Measure the zero-filled stack pages, then heap pages
    pub fn measure_stack_heap(&mut self) -> Result<()> {
        self.advance(
            "stack and heap",
            SessionState::BinaryMeasured,
            SessionState::StackHeapMeasured,
            |td, config| {
                td.measure_zero_pages(STACK_BASE, config.stack_pages)?;
                td.measure_zero_pages(HEAP_BASE, config.heap_pages)
            },
        )
    }

    /// Return the final measurement. The session cannot be used afterwards.
    pub fn finalize(&mut self) -> Result<MeasurementResult> {
        self.advance(
            "final value",
            SessionState::StackHeapMeasured,
            SessionState::Finalized,
            |td, _| Ok(mem::take(td).finalize()),
        )
    }
}

/// Compute the MRTD of a TD running @binary, using a predefined order: the TD
/// configuration, the boot page, the binary in ascending address order, the
/// stack pages and finally the heap pages.
pub fn compute_mrtd(
    config: &MeasurementConfig,
    binary: &mut BlobStorage,
) -> Result<MeasurementResult> {
    let name = binary.name();
    let content = binary.read()?;
    log::debug!("Measuring {name} ({} bytes)", content.len());

    let mut session = MeasurementSession::new(*config);
    session.measure_config()?;
    session.measure_boot_page()?;
    session.measure_binary(content)?;
    session.measure_stack_heap()?;
    let result = session.finalize()?;

    log::info!("MRTD: {}", result.hex);
    Ok(result)
}
