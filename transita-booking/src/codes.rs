use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

/// Human-readable ticket code: date stamp plus a random suffix,
/// e.g. `TKT-20260830-X4K2JD`.
pub fn ticket_code(now: DateTime<Utc>) -> String {
    format!("TKT-{}-{}", now.format("%Y%m%d"), random_suffix())
}

pub fn payment_code(now: DateTime<Utc>) -> String {
    format!("PAY-{}-{}", now.format("%Y%m%d"), random_suffix())
}

/// QR payload: SHA-256 over the ticket code and the purchase instant,
/// hex-encoded for display and scanning.
pub fn qr_payload(ticket_code: &str, now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ticket_code.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_code_format() {
        let now = Utc::now();
        let code = ticket_code(now);
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TKT");
        assert_eq!(parts[1], now.format("%Y%m%d").to_string());
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn test_codes_are_random() {
        let now = Utc::now();
        assert_ne!(ticket_code(now), ticket_code(now));
        assert_ne!(payment_code(now), payment_code(now));
    }

    #[test]
    fn test_qr_payload_is_hex_digest() {
        let now = Utc::now();
        let qr = qr_payload("TKT-20260830-ABCDEF", now);
        assert_eq!(qr.len(), 64);
        assert!(qr.chars().all(|c| c.is_ascii_hexdigit()));
        // Deterministic for the same inputs
        assert_eq!(qr, qr_payload("TKT-20260830-ABCDEF", now));
        // Different code, different payload
        assert_ne!(qr, qr_payload("TKT-20260830-FEDCBA", now));
    }
}
