use x509_parser::num_bigint::BigUint;

/// Minimum number of hex digits a formatted serial number is padded to.
pub const SERIAL_HEX_WIDTH: usize = 36;

/// Insert a colon after every two characters: "46a891" -> "46:a8:91".
/// An odd trailing character is kept on its own.
pub fn colon_pairs(hex: &str) -> String {
    hex.as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair))
        .collect::<Vec<_>>()
        .join(":")
}

/// Format a certificate serial number as zero padded, colon separated lowercase hex.
///
/// An absent serial number stays absent rather than becoming a formatted zero.
pub fn format_serial_number(serial: Option<&BigUint>) -> Option<String> {
    serial.map(|n| colon_pairs(&format!("{n:0width$x}", width = SERIAL_HEX_WIDTH)))
}

/// Render bytes as colon delimited lowercase hex pairs, e.g. "ab:cd:01".
pub fn format_byte_string(bytes: &[u8]) -> String {
    colon_pairs(&hex::encode(bytes))
}
