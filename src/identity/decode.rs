//! Decoding of raw inventory buffers

use lazy_static::lazy_static;
use regex::Regex;

use crate::platform::RawBuffer;

lazy_static! {
    // UID token inside a device instance path: `...&UID4353_0`
    static ref UID_TOKEN: Regex = Regex::new(r"UID(\d+)").expect("valid UID regex");
}

/// Decode a zero-padded buffer, stopping at the first NUL
pub fn decode_buffer(raw: &RawBuffer) -> String {
    let text = match raw {
        RawBuffer::Wide(units) => {
            let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
            String::from_utf16_lossy(&units[..end])
        }
        RawBuffer::Bytes(bytes) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
    };
    text.trim().to_string()
}

/// Extract the hardware UID from a device instance path
pub fn extract_uid(instance_path: &str) -> Option<u32> {
    UID_TOKEN
        .captures(instance_path)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}
