use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const TICKET_ID_PREFIX: &str = "TK-";
const MAX_ATTEMPTS: usize = 64;

/// Draws `TK-` plus six digits, skipping candidates `exists` reports as taken.
///
/// Returns `None` once every attempt collided; the six-digit space is small
/// enough that a crowded store can exhaust it.
pub fn generate_ticket_id<F>(mut exists: F) -> Option<String>
where
    F: FnMut(&str) -> bool,
{
    for _ in 0..MAX_ATTEMPTS {
        let candidate = format!("{}{}", TICKET_ID_PREFIX, random_six_digits());
        if !exists(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn random_six_digits() -> u32 {
    let seed = Uuid::now_v7();
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    let digest = hasher.finalize();
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    100_000 + value % 900_000
}

#[cfg(test)]
pub fn is_ticket_id(raw: &str) -> bool {
    raw.strip_prefix(TICKET_ID_PREFIX)
        .is_some_and(|digits| digits.len() == 6 && digits.bytes().all(|b| b.is_ascii_digit()))
}
