//! Run identifier generation (spec §6: "five hex groups from 16 random bytes").

use rand::RngCore;

/// Generate a run identifier formatted as five hyphen-separated hex groups
/// (`XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`) derived from 16 random bytes.
///
/// Falls back to a nanosecond timestamp-derived identifier if the system
/// random source is unavailable, per spec §4.2 run lifecycle step 2.
#[must_use]
pub fn generate_run_id() -> String {
    let mut bytes = [0u8; 16];
    match try_fill_random(&mut bytes) {
        Ok(()) => format_groups(&bytes),
        Err(_) => fallback_run_id(),
    }
}

fn try_fill_random(bytes: &mut [u8; 16]) -> Result<(), rand::Error> {
    rand::rng().try_fill_bytes(bytes)
}

fn format_groups(bytes: &[u8; 16]) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

fn fallback_run_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let bytes = (nanos as u128).to_be_bytes();
    let mut arr = [0u8; 16];
    arr.copy_from_slice(&bytes[0..16]);
    format_groups(&arr)
}
