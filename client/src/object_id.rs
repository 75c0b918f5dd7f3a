use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Errors raised when client identity has not been configured before use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No device fingerprint was supplied, so object ids cannot be generated
    #[error("missing device fingerprint: object id generation requires a configured client identity")]
    MissingFingerprint,
}

const MACHINE_MASK: u32 = 0xFF_FFFF;
const COUNTER_MASK: u32 = 0xFF_FFFF;

/// Stable per-installation identity baked into every generated object id.
///
/// The machine identifier is derived once from a device fingerprint string;
/// the process identifier and counter seed are randomized at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    machine_id: u32,
    process_id: u16,
    counter: u32,
}

impl Fingerprint {
    /// Reduce a device fingerprint string to a 24-bit machine identifier and
    /// seed the process/counter fields randomly.
    pub fn from_device(fingerprint: &str) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            machine_id: (xxh3_64(fingerprint.as_bytes()) as u32) & MACHINE_MASK,
            process_id: rng.gen::<u16>(),
            counter: rng.gen::<u32>() & COUNTER_MASK,
        }
    }

    /// Build an identity from explicit parts. Out-of-range bits are masked.
    pub fn from_parts(machine_id: u32, process_id: u16, counter: u32) -> Self {
        Self {
            machine_id: machine_id & MACHINE_MASK,
            process_id,
            counter: counter & COUNTER_MASK,
        }
    }
}

/// Produces globally-orderable 24-hex-character object identifiers.
///
/// Encoding, big-endian: bytes 0..=3 are Unix seconds, 4..=6 the machine
/// identifier, 7..=8 the process identifier, 9..=11 a wrapping counter.
/// Generation itself never fails; identity must be configured first.
pub struct ObjectIdGenerator {
    identity: Fingerprint,
}

impl ObjectIdGenerator {
    pub fn new(identity: Fingerprint) -> Self {
        Self { identity }
    }

    /// Generate the next id using the current wall clock.
    pub fn next(&mut self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        self.next_at(now)
    }

    /// Generate the next id for an explicit timestamp (seconds since epoch).
    pub fn next_at(&mut self, now_seconds: u32) -> String {
        self.identity.counter = self.identity.counter.wrapping_add(1) & COUNTER_MASK;

        let mut buffer = [0u8; 12];
        buffer[0..4].copy_from_slice(&now_seconds.to_be_bytes());
        buffer[4..7].copy_from_slice(&self.identity.machine_id.to_be_bytes()[1..4]);
        buffer[7..9].copy_from_slice(&self.identity.process_id.to_be_bytes());
        buffer[9..12].copy_from_slice(&self.identity.counter.to_be_bytes()[1..4]);

        let mut out = String::with_capacity(24);
        for byte in buffer {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}
