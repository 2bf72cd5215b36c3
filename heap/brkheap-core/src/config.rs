//! # Boot-time heap configuration
//!
//! The allocator is tuned by three values fixed before the first
//! allocation: the payload granularity, the OS growth quantum, and the fit
//! policy. They default to the classic 8/4096/first-fit combination; the
//! surface crate overrides them from the environment during init.

use crate::header::{HEADER_OVERHEAD, MIN_PAYLOAD};
use crate::heap::HeapError;

/// Default payload granularity in bytes.
pub const DEFAULT_MIN_ALLOCATION: usize = 8;

/// Default OS growth quantum in bytes.
pub const DEFAULT_ARENA_SIZE: usize = 4096;

/// Strategy for choosing a free block to satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitPolicy {
    /// First satisfying block from the list head.
    FirstFit,
    /// First satisfying block from a roaming cursor, wrapping once.
    NextFit,
    /// Smallest satisfying block; first-encountered wins ties.
    BestFit,
    /// Largest satisfying block; last-encountered wins ties.
    WorstFit,
}

impl FitPolicy {
    /// Maps the external selector encoding (1..=4) to a policy.
    ///
    /// Returns `None` for any other value; callers treat that as a fatal
    /// misconfiguration rather than guessing.
    #[must_use]
    pub const fn from_selector(selector: usize) -> Option<Self> {
        match selector {
            1 => Some(Self::FirstFit),
            2 => Some(Self::NextFit),
            3 => Some(Self::BestFit),
            4 => Some(Self::WorstFit),
            _ => None,
        }
    }

    /// The external selector encoding of this policy.
    #[must_use]
    pub const fn selector(self) -> usize {
        match self {
            Self::FirstFit => 1,
            Self::NextFit => 2,
            Self::BestFit => 3,
            Self::WorstFit => 4,
        }
    }
}

/// The three tunables, validated before the heap bootstraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Payload granularity; a power of two, at least
    /// [`DEFAULT_MIN_ALLOCATION`].
    pub min_allocation: usize,
    /// OS growth quantum; arenas are requested in multiples of this.
    pub arena_size: usize,
    /// Block-selection policy.
    pub fit: FitPolicy,
}

impl HeapConfig {
    pub const DEFAULT: Self = Self {
        min_allocation: DEFAULT_MIN_ALLOCATION,
        arena_size: DEFAULT_ARENA_SIZE,
        fit: FitPolicy::FirstFit,
    };

    /// Checks the tunables against the block-layout constraints.
    ///
    /// # Errors
    /// [`HeapError::InvalidConfig`] naming the offending constraint.
    pub const fn validate(&self) -> Result<(), HeapError> {
        if !self.min_allocation.is_power_of_two() || self.min_allocation < DEFAULT_MIN_ALLOCATION {
            return Err(HeapError::InvalidConfig(
                "min_allocation must be a power of two of at least 8 bytes",
            ));
        }
        if self.arena_size % self.min_allocation != 0 {
            return Err(HeapError::InvalidConfig(
                "arena_size must be a multiple of min_allocation",
            ));
        }
        // An arena must hold two fenceposts plus one usable block.
        if self.arena_size < 3 * HEADER_OVERHEAD + MIN_PAYLOAD {
            return Err(HeapError::InvalidConfig(
                "arena_size cannot hold a block between its fenceposts",
            ));
        }
        Ok(())
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
