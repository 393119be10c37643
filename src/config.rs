// ============================================================================
// spark-observe - Configuration
// Dirty-check settings, view cache sizing and the runtime bundle
// ============================================================================

use std::str::FromStr;

use crate::core::error::{Error, Result};

/// Scheduler ticks between two dirty-check passes
pub const DEFAULT_FRAMES_PER_CHECK: u32 = 6;

/// Capacity used for an unbounded (`"*"`) view cache
pub const MAX_VIEW_CACHE_SIZE: usize = 0xFFFF;

// =============================================================================
// DIRTY CHECK SETTINGS
// =============================================================================

/// Process-wide dirty-checking behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyCheckSettings {
    /// Ticks between two checks
    pub frames_per_check: u32,
    /// Skip checking altogether
    pub disabled: bool,
    /// Log a warning whenever a property falls back to dirty checking
    pub warn: bool,
    /// Refuse to dirty check: observer creation fails instead
    pub throw: bool,
}

impl DirtyCheckSettings {
    pub fn with_frames_per_check(mut self, frames: u32) -> Result<Self> {
        if frames == 0 {
            return Err(Error::InvalidFramesPerCheck);
        }
        self.frames_per_check = frames;
        Ok(self)
    }

    /// Restore every setting to its default.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Default for DirtyCheckSettings {
    fn default() -> Self {
        Self {
            frames_per_check: DEFAULT_FRAMES_PER_CHECK,
            disabled: false,
            warn: true,
            throw: false,
        }
    }
}

// =============================================================================
// VIEW CACHE SIZE
// =============================================================================

/// Requested capacity of a view factory cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCacheSize {
    /// `"*"`: as many views as [`MAX_VIEW_CACHE_SIZE`]
    Unbounded,
    Fixed(usize),
}

impl ViewCacheSize {
    /// Effective capacity. Zero disables caching.
    pub fn capacity(self) -> usize {
        match self {
            ViewCacheSize::Unbounded => MAX_VIEW_CACHE_SIZE,
            ViewCacheSize::Fixed(size) => size,
        }
    }
}

impl FromStr for ViewCacheSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed == "*" {
            return Ok(ViewCacheSize::Unbounded);
        }
        trimmed
            .parse::<usize>()
            .map(ViewCacheSize::Fixed)
            .map_err(|_| Error::InvalidCacheSize(s.to_string()))
    }
}

impl From<usize> for ViewCacheSize {
    fn from(size: usize) -> Self {
        ViewCacheSize::Fixed(size)
    }
}

// =============================================================================
// RUNTIME CONFIG
// =============================================================================

/// Settings consumed when building observer locators and view factories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub dirty_check: DirtyCheckSettings,
    /// Cache size applied to view factories that did not set their own
    pub view_cache_size: Option<ViewCacheSize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = DirtyCheckSettings::default();
        assert_eq!(settings.frames_per_check, 6);
        assert!(!settings.disabled);
        assert!(!settings.throw);
    }

    #[test]
    fn frames_must_be_positive() {
        assert_eq!(
            DirtyCheckSettings::default().with_frames_per_check(0),
            Err(Error::InvalidFramesPerCheck)
        );
        let settings = DirtyCheckSettings::default().with_frames_per_check(2).unwrap();
        assert_eq!(settings.frames_per_check, 2);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut settings = DirtyCheckSettings { disabled: true, throw: true, ..Default::default() };
        settings.reset();
        assert_eq!(settings, DirtyCheckSettings::default());
    }

    #[test]
    fn cache_size_parsing() {
        assert_eq!("*".parse::<ViewCacheSize>(), Ok(ViewCacheSize::Unbounded));
        assert_eq!(" 3 ".parse::<ViewCacheSize>(), Ok(ViewCacheSize::Fixed(3)));
        assert_eq!(ViewCacheSize::Unbounded.capacity(), 0xFFFF);
        assert!(matches!("lots".parse::<ViewCacheSize>(), Err(Error::InvalidCacheSize(_))));
    }
}
