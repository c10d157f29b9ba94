//! Structures and values fed into a Trust Domain measurement
//!
//! This library provides the fixed-width records hashed into the Trust Domain
//! measurement register (MRTD). For the moment it only provides the
//! definitions needed for the initial measurement calculation: the TD
//! configuration record and the descriptor that precedes each measured page.
//!
//! All records are encoded in little-endian with no implicit padding. The
//! layouts below are the wire format; changing any offset, width or constant
//! changes every digest computed with them.
#![warn(missing_docs)]
use bitflags::bitflags;
use core::mem;

use serde::Serialize;

/// Size of one TD measurement, in bytes (SHA-384)
pub const TDX_MEASUREMENT_WIDTH: usize = 48;
/// One TD measurement
pub type TdxMeasurement = [u8; TDX_MEASUREMENT_WIDTH];

/// Size of a TD page
pub const TDX_PAGE_SIZE: u64 = 0x1000;

bitflags! {
/// TD attributes provided by the host when initializing the TD
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TdAttributes: u64 {
    /// Off-TD debug is enabled
    const DEBUG = 1 << 0;
    /// EPT violations are not converted to #VE
    const SEPT_VE_DISABLE = 1 << 28;
    /// Protection keys for supervisor mode
    const PKS = 1 << 30;
    /// Key Locker
    const KL = 1 << 31;
    /// Performance monitoring
    const PERFMON = 1 << 63;
}
}

bitflags! {
/// Extended Features Available Mask: the XSAVE features enabled in the TD
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Xfam: u64 {
    /// x87 FPU state
    const X87 = 1 << 0;
    /// SSE state
    const SSE = 1 << 1;
    /// AVX state
    const AVX = 1 << 2;
    /// MPX bound registers
    const MPX_BNDREGS = 1 << 3;
    /// MPX bound configuration
    const MPX_BNDCSR = 1 << 4;
    /// AVX-512 opmask registers
    const AVX512_KMASK = 1 << 5;
    /// Upper halves of ZMM0-15
    const AVX512_ZMM_HI256 = 1 << 6;
    /// ZMM16-31
    const AVX512_HI16_ZMM = 1 << 7;
    /// Processor trace
    const PT = 1 << 8;
    /// Protection keys for user mode
    const PKRU = 1 << 9;
    /// CET user state
    const CET_U = 1 << 11;
    /// CET supervisor state
    const CET_S = 1 << 12;
    /// AMX tile configuration
    const AMX_XTILECFG = 1 << 17;
    /// AMX tile data
    const AMX_XTILEDATA = 1 << 18;
}
}

/// Error from the TDX library
#[derive(Debug, thiserror::Error)]
pub enum TdxError {
    /// Error while encoding into binary
    #[error("encoding error")]
    EncodeError(#[from] bincode::Error),

    /// A field does not fit in its encoded width
    #[error("{field} {value:#x} does not fit in {bits} bits")]
    FieldWidth {
        /// Name of the field
        field: &'static str,
        /// The rejected value
        value: u64,
        /// Width of the field in the record
        bits: u32,
    },
}
type Result<T> = core::result::Result<T, TdxError>;

/// Return @value if it can be encoded in @bits bits.
pub fn check_width(field: &'static str, value: u64, bits: u32) -> Result<u64> {
    if bits < u64::BITS && (value >> bits) != 0 {
        return Err(TdxError::FieldWidth { field, value, bits });
    }
    Ok(value)
}

/// Type of a page added to the TD
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum TdxPageType {
    /// Regular private memory
    #[default]
    Normal = 0,
    /// Secure EPT page
    Sept = 1,
    /// TD VMCS page
    TdVmcs = 2,
    /// Reserved
    Reserved = 3,
}

/// TD configuration record, measured first.
///
/// | offset | width | field       |
/// |--------|-------|-------------|
/// | 0x00   | 8     | attributes  |
/// | 0x08   | 8     | xfam        |
/// | 0x10   | 4     | max_vcpus   |
/// | 0x14   | 4     | reserved, 0 |
#[derive(Clone, Debug, Serialize, PartialEq, Default)]
#[repr(C, packed)]
pub struct TdConfigRecord {
    attributes: u64,
    xfam: u64,
    max_vcpus: u32,
    _reserved: u32,
}
/// Size of the encoded [TdConfigRecord]
pub const TD_CONFIG_RECORD_SIZE: usize = 24;

impl TdConfigRecord {
    /// Create a new TdConfigRecord instance. Fails if @max_vcpus doesn't fit
    /// in its 32-bit field.
    pub fn new(attributes: TdAttributes, xfam: Xfam, max_vcpus: u64) -> Result<TdConfigRecord> {
        let max_vcpus = check_width("max_vcpus", max_vcpus, u32::BITS)? as u32;
        Ok(TdConfigRecord {
            attributes: attributes.bits(),
            xfam: xfam.bits(),
            max_vcpus,
            ..Default::default()
        })
    }

    /// Convert the packed struct to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(self)?;
        assert!(bytes.len() == mem::size_of::<TdConfigRecord>());
        assert!(bytes.len() == TD_CONFIG_RECORD_SIZE);
        Ok(bytes)
    }
}

/// Descriptor measured before the content of each page.
///
/// | offset | width | field     |
/// |--------|-------|-----------|
/// | 0x00   | 8     | gpa       |
/// | 0x08   | 4     | page type |
#[derive(Clone, Debug, Serialize, PartialEq)]
#[repr(C, packed)]
pub struct TdPageDescriptor {
    gpa: u64,
    page_type: u32,
}
/// Size of the encoded [TdPageDescriptor]
pub const TD_PAGE_DESCRIPTOR_SIZE: usize = 12;

impl TdPageDescriptor {
    /// Create a new instance of TdPageDescriptor
    pub fn new(gpa: u64, page_type: TdxPageType) -> TdPageDescriptor {
        TdPageDescriptor {
            gpa,
            page_type: page_type as u32,
        }
    }

    /// Convert the packed structure to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(self)?;
        assert!(bytes.len() == mem::size_of::<TdPageDescriptor>());
        assert!(bytes.len() == TD_PAGE_DESCRIPTOR_SIZE);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize() {
        let a = 0x12345678u32.to_le();
        let bytes = bincode::serialize(&a).unwrap();

        // By default, bincode encodes in litte-endian. Make sure of it, since
        // we rely on that for TD records
        assert!(bytes[0] == 0x78);
    }

    #[test]
    fn test_page_type() {
        assert_eq!(TdxPageType::default(), TdxPageType::Normal);
        assert_eq!(TdxPageType::Sept as u32, 1);
        assert_eq!(TdxPageType::TdVmcs as u32, 2);
        assert_eq!(TdxPageType::Reserved as u32, 3);
    }

    #[test]
    fn test_config_record() {
        let rec = TdConfigRecord::new(
            TdAttributes::empty(),
            Xfam::from_bits_retain(0x1e7),
            1,
        )
        .unwrap();
        assert_eq!(
            rec.to_bytes().unwrap(),
            [
                0, 0, 0, 0, 0, 0, 0, 0, // attributes
                0xe7, 0x01, 0, 0, 0, 0, 0, 0, // xfam
                1, 0, 0, 0, // max_vcpus
                0, 0, 0, 0, // reserved
            ]
        );

        // Unknown bits are retained
        let rec = TdConfigRecord::new(
            TdAttributes::from_bits_retain(0x8000_0000_0000_0401),
            Xfam::from_bits_retain(u64::MAX),
            u32::MAX as u64,
        )
        .unwrap();
        let bytes = rec.to_bytes().unwrap();
        assert_eq!(bytes[..8], [0x01, 0x04, 0, 0, 0, 0, 0, 0x80]);
        assert_eq!(bytes[8..16], [0xff; 8]);
        assert_eq!(bytes[16..20], [0xff; 4]);
        assert_eq!(bytes[20..], [0; 4]);
    }

    #[test]
    fn test_field_width() {
        let e = TdConfigRecord::new(TdAttributes::empty(), Xfam::empty(), 1 << 32);
        let Err(TdxError::FieldWidth { field, value, bits }) = e else {
            panic!("expected width error, got {e:?}");
        };
        assert_eq!(field, "max_vcpus");
        assert_eq!(value, 1 << 32);
        assert_eq!(bits, 32);

        assert_eq!(check_width("x", u64::MAX, 64).unwrap(), u64::MAX);
        assert_eq!(check_width("x", 0xff, 8).unwrap(), 0xff);
        assert!(check_width("x", 0x100, 8).is_err());
    }

    #[test]
    fn test_page_descriptor() {
        let desc = TdPageDescriptor::new(0x400000, TdxPageType::Normal);
        assert_eq!(
            desc.to_bytes().unwrap(),
            [0, 0, 0x40, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        let desc = TdPageDescriptor::new(0x1122_3344_5566_7788, TdxPageType::TdVmcs);
        assert_eq!(
            desc.to_bytes().unwrap(),
            [0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 2, 0, 0, 0]
        );
    }

    #[test]
    fn test_flags() {
        let xfam = Xfam::from_bits_retain(0x1e7);
        assert!(xfam.contains(Xfam::X87 | Xfam::SSE | Xfam::AVX | Xfam::PT));
        assert!(!xfam.contains(Xfam::MPX_BNDREGS));
        assert!(TdAttributes::from_bits_retain(1).contains(TdAttributes::DEBUG));
    }
}
