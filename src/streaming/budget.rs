//! Memory budget for streamed geometry
//!
//! Tracks resident plus in-flight bytes against a single pool ceiling and
//! provides pressure metrics to guide load admission and release
//! decisions.

/// Streamed-memory budget manager
pub struct StreamBudget {
    /// Maximum resident + in-flight bytes
    ceiling_bytes: usize,
    /// Currently committed bytes
    used_bytes: usize,
}

impl StreamBudget {
    pub fn new(ceiling_bytes: usize) -> Self {
        Self {
            ceiling_bytes,
            used_bytes: 0,
        }
    }

    /// Commit bytes for an asset that is resident or being loaded
    pub fn add(&mut self, bytes: usize) {
        self.used_bytes = self.used_bytes.saturating_add(bytes);
    }

    /// Return bytes after an asset is released
    pub fn remove(&mut self, bytes: usize) {
        self.used_bytes = self.used_bytes.saturating_sub(bytes);
    }

    pub fn used(&self) -> usize {
        self.used_bytes
    }

    pub fn available(&self) -> usize {
        self.ceiling_bytes.saturating_sub(self.used_bytes)
    }

    /// True when `bytes` more can be committed without crossing the ceiling
    pub fn can_admit(&self, bytes: usize) -> bool {
        self.used_bytes.saturating_add(bytes) <= self.ceiling_bytes
    }

    /// Usage as a fraction of the ceiling (0.0 to 1.0+)
    ///
    /// Values above 0.9 indicate high pressure, above 1.0 over-budget.
    pub fn pressure(&self) -> f32 {
        if self.ceiling_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f32 / self.ceiling_bytes as f32
    }

    /// True when pressure is high enough that releases should start
    pub fn should_release(&self) -> bool {
        self.pressure() > 0.9
    }
}
