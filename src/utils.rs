use anyhow::{anyhow, Result};

/// Return true if @n is aligned on @align
pub fn is_aligned(n: u64, align: u64) -> bool {
    (n & (align - 1)) == 0
}

/// Number of @page_size pages needed to hold @len bytes
pub fn num_pages(len: u64, page_size: u64) -> u64 {
    len.div_ceil(page_size)
}

/// Parse an unsigned integer. Accepts decimal, or hexadecimal, octal and
/// binary with a `0x`, `0o` or `0b` prefix. Underscores separate digits.
pub fn parse_int(s: &str) -> Result<u64> {
    let s = s.trim().replace('_', "");
    let (digits, radix) = if let Some(ns) = s.strip_prefix("0x").or(s.strip_prefix("0X")) {
        (ns, 16)
    } else if let Some(ns) = s.strip_prefix("0o") {
        (ns, 8)
    } else if let Some(ns) = s.strip_prefix("0b") {
        (ns, 2)
    } else {
        (s.as_str(), 10)
    };

    // u64::from_str_radix() accepts '+', we don't.
    if digits.is_empty() || digits.starts_with('+') {
        return Err(anyhow!("invalid integer '{s}'"));
    }
    u64::from_str_radix(digits, radix).map_err(|e| anyhow!("invalid integer '{s}': {e}"))
}

/// Encode @b as lowercase hex
pub fn buf_to_hex_str(b: &[u8]) -> String {
    b.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<String>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align() {
        assert!(is_aligned(0x400000, 0x1000));
        assert!(!is_aligned(0x400001, 0x1000));

        assert_eq!(num_pages(0, 0x1000), 0);
        assert_eq!(num_pages(1, 0x1000), 1);
        assert_eq!(num_pages(4096, 0x1000), 1);
        assert_eq!(num_pages(5000, 0x1000), 2);
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("0").unwrap(), 0);
        assert_eq!(parse_int("16").unwrap(), 16);
        assert_eq!(parse_int("0x1E7").unwrap(), 0x1e7);
        assert_eq!(parse_int("0x1e7").unwrap(), 0x1e7);
        assert_eq!(parse_int("0X40_0000").unwrap(), 0x400000);
        assert_eq!(parse_int("0o17").unwrap(), 0o17);
        assert_eq!(parse_int("0b101").unwrap(), 5);
        assert_eq!(parse_int("0xffffffffffffffff").unwrap(), u64::MAX);

        assert!(parse_int("").is_err());
        assert!(parse_int("0x").is_err());
        assert!(parse_int("+2").is_err());
        assert!(parse_int("0x+2").is_err());
        assert!(parse_int("-1").is_err());
        assert!(parse_int("hello").is_err());
        assert!(parse_int("0x1_0000_0000_0000_0000").is_err());
    }

    #[test]
    fn test_hex() {
        assert_eq!(buf_to_hex_str(&[]), "");
        assert_eq!(buf_to_hex_str(&[0, 0xab, 0x1]), "00ab01");
    }
}
