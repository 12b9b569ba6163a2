//! Memory accounting for published textures.
//!
//! Every published texture adds its byte size here and every disposal
//! subtracts it again, so the totals always reflect live textures only.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals of resident texture memory
#[derive(Debug, Default)]
pub struct MemoryAccounting {
    resident_bytes: AtomicU64,
    texture_count: AtomicU64,
    peak_bytes: AtomicU64,
}

/// Point-in-time copy of [`MemoryAccounting`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemorySnapshot {
    pub resident_bytes: u64,
    pub texture_count: u64,
    pub peak_bytes: u64,
}

impl MemoryAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly published texture
    pub fn add(&self, bytes: u64) {
        let now = self.resident_bytes.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.texture_count.fetch_add(1, Ordering::AcqRel);
        self.peak_bytes.fetch_max(now, Ordering::AcqRel);
    }

    /// Record a released texture
    pub fn remove(&self, bytes: u64) {
        let prev = self
            .resident_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(bytes)))
            .unwrap_or(0);
        if prev < bytes {
            log::warn!(
                "Memory accounting underflow: releasing {} bytes with {} resident",
                bytes,
                prev
            );
        }
        let _ = self
            .texture_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(1)));
    }

    pub fn resident_bytes(&self) -> u64 {
        self.resident_bytes.load(Ordering::Acquire)
    }

    pub fn texture_count(&self) -> u64 {
        self.texture_count.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            resident_bytes: self.resident_bytes(),
            texture_count: self.texture_count(),
            peak_bytes: self.peak_bytes.load(Ordering::Acquire),
        }
    }

    /// Bytes to free so that residency drops under `limit`, scaled by
    /// `hysteresis` so the next frames do not immediately cross it again
    pub fn excess_over(&self, limit: u64, hysteresis: f64) -> Option<u64> {
        let resident = self.resident_bytes();
        if resident <= limit {
            return None;
        }
        let excess = (resident - limit) as f64 * hysteresis.max(1.0);
        Some((excess.ceil() as u64).min(resident))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove() {
        let mem = MemoryAccounting::new();
        mem.add(100);
        mem.add(50);
        assert_eq!(mem.resident_bytes(), 150);
        assert_eq!(mem.texture_count(), 2);
        mem.remove(100);
        assert_eq!(mem.snapshot(), MemorySnapshot {
            resident_bytes: 50,
            texture_count: 1,
            peak_bytes: 150,
        });
    }

    #[test]
    fn test_remove_saturates() {
        let mem = MemoryAccounting::new();
        mem.add(10);
        mem.remove(20);
        mem.remove(20);
        assert_eq!(mem.resident_bytes(), 0);
        assert_eq!(mem.texture_count(), 0);
    }

    #[test]
    fn test_excess_over() {
        let mem = MemoryAccounting::new();
        mem.add(1000);
        assert_eq!(mem.excess_over(2000, 1.25), None);
        assert_eq!(mem.excess_over(800, 1.0), Some(200));
        assert_eq!(mem.excess_over(800, 1.5), Some(300));
        assert_eq!(mem.excess_over(0, 4.0), Some(1000));
    }
}
