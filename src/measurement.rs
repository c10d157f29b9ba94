use std::fmt;

use base64::{engine::general_purpose::STANDARD as base64_standard, Engine as _};
use openssl::sha::Sha384;

use crate::utils::buf_to_hex_str;
use tdx::{TdxMeasurement, TDX_MEASUREMENT_WIDTH};

/// Number of hex characters in a rendered measurement
pub const MEASUREMENT_HEX_LEN: usize = 2 * TDX_MEASUREMENT_WIDTH;

/// A running SHA-384 measurement. Data can only be appended, and the final
/// digest depends on the order of every extension.
///
/// An accumulator belongs to a single measurement and is consumed when
/// finalized.
pub struct MeasurementAccumulator {
    hasher: Sha384,
    extended: u64,
}

impl Default for MeasurementAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MeasurementAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementAccumulator")
            .field("extended", &self.extended)
            .finish_non_exhaustive()
    }
}

impl MeasurementAccumulator {
    /// Create an empty measurement
    pub fn new() -> Self {
        MeasurementAccumulator {
            hasher: Sha384::new(),
            extended: 0,
        }
    }

    /// Append @data to the measurement
    pub fn extend(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.extended += data.len() as u64;
    }

    /// Number of bytes appended so far
    pub fn extended(&self) -> u64 {
        self.extended
    }

    /// Return the measurement of everything appended so far.
    pub fn finalize(self) -> TdxMeasurement {
        let hash = self.hasher.finish();
        // MRTD is the first 48 bytes of the SHA-384 digest
        let mut measurement = [0; TDX_MEASUREMENT_WIDTH];
        measurement.copy_from_slice(&hash[..TDX_MEASUREMENT_WIDTH]);
        measurement
    }
}

/// The result of a complete TD measurement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeasurementResult {
    /// Raw MRTD
    pub digest: TdxMeasurement,
    /// MRTD as lowercase hex
    pub hex: String,
    /// Number of pages added to the measurement
    pub pages_measured: u64,
}

impl MeasurementResult {
    /// Create a result from the final digest
    pub fn new(digest: TdxMeasurement, pages_measured: u64) -> Self {
        MeasurementResult {
            digest,
            hex: buf_to_hex_str(&digest),
            pages_measured,
        }
    }

    /// The digest, encoded in base64
    pub fn as_base64(&self) -> String {
        base64_standard.encode(self.digest)
    }

    /// Display the digest in hex, or in base64 if @b64 is true
    pub fn dump(&self, b64: bool) -> String {
        if b64 {
            self.as_base64()
        } else {
            self.hex.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let acc = MeasurementAccumulator::new();
        assert_eq!(acc.extended(), 0);
        let m = MeasurementResult::new(acc.finalize(), 0);
        assert_eq!(
            m.hex,
            "38b060a751ac96384cd9327eb1b1e36a21fdb71114be07434c0cc7bf63f6e1da274edebfe76f65fbd51ad2f14898b95b"
        );
        assert_eq!(m.hex.len(), MEASUREMENT_HEX_LEN);
    }

    #[test]
    fn test_extend() {
        // Extensions concatenate: the split doesn't matter, the order does.
        let mut a = MeasurementAccumulator::new();
        a.extend(b"BOOT");
        a.extend(b"DATA");
        assert_eq!(a.extended(), 8);

        let mut b = MeasurementAccumulator::new();
        b.extend(b"BOOTDATA");

        let mut c = MeasurementAccumulator::new();
        c.extend(b"DATA");
        c.extend(b"BOOT");

        let a = a.finalize();
        assert_eq!(a, b.finalize());
        assert_ne!(a, c.finalize());
    }

    #[test]
    fn test_dump() {
        let m = MeasurementResult::new([0xff; TDX_MEASUREMENT_WIDTH], 3);
        assert_eq!(m.dump(false), "ff".repeat(TDX_MEASUREMENT_WIDTH));
        assert_eq!(m.dump(true), "/".repeat(64));
        assert_eq!(m.pages_measured, 3);
    }
}
