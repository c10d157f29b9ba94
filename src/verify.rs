use crate::measurement::{MeasurementResult, MEASUREMENT_HEX_LEN};
use crate::utils::buf_to_hex_str;
use tdx::TdxMeasurement;

// The first 96 characters, or None if the string is shorter
fn prefix(s: &str) -> Option<&str> {
    s.get(..MEASUREMENT_HEX_LEN)
}

/// Compare two hex measurements. Only the first 96 characters of each are
/// compared, ignoring case. Anything shorter never matches.
pub fn verify_hex(computed: &str, expected: &str) -> bool {
    match (prefix(computed), prefix(expected)) {
        (Some(c), Some(e)) => c.eq_ignore_ascii_case(e),
        _ => false,
    }
}

/// Compare a computed measurement with an expected hex value
pub fn verify(computed: &TdxMeasurement, expected: &str) -> bool {
    verify_hex(&buf_to_hex_str(computed), expected)
}

/// Outcome of a verification, with the values that were compared
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// The expected value, truncated to the compared length
    pub expected: String,
    /// The computed value
    pub computed: String,
    /// True if both values match
    pub matches: bool,
}

impl VerifyOutcome {
    /// Compare @result with @expected
    pub fn new(result: &MeasurementResult, expected: &str) -> Self {
        VerifyOutcome {
            expected: prefix(expected).unwrap_or(expected).to_string(),
            computed: result.hex.clone(),
            matches: verify(&result.digest, expected),
        }
    }
}
