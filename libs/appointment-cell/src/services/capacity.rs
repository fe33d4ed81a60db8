// libs/appointment-cell/src/services/capacity.rs
use tracing::debug;

use shared_config::{BookingConfig, CapacityGuard};

use crate::models::{BookingError, DoctorProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityDecision {
    Available { remaining: u64 },
    Full { current: u64, max: u32 },
}

impl CapacityDecision {
    pub fn into_result(self) -> Result<u64, BookingError> {
        match self {
            CapacityDecision::Available { remaining } => Ok(remaining),
            CapacityDecision::Full { current, max } => {
                Err(BookingError::CapacityExceeded { current, max })
            }
        }
    }
}

/// Per-doctor, per-date booking ceiling.
#[derive(Debug, Clone, Copy)]
pub struct CapacityPolicy {
    default_capacity: u32,
    guard: CapacityGuard,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self::from_config(&BookingConfig::default())
    }
}

impl CapacityPolicy {
    pub fn new(default_capacity: u32, guard: CapacityGuard) -> Self {
        Self { default_capacity, guard }
    }

    pub fn from_config(config: &BookingConfig) -> Self {
        Self::new(config.default_capacity, config.capacity_guard)
    }

    pub fn guard(&self) -> CapacityGuard {
        self.guard
    }

    pub fn max_for(&self, doctor: &DoctorProfile) -> u32 {
        doctor.patient_capacity.resolve(self.default_capacity)
    }

    pub fn check(&self, current: u64, max: u32) -> CapacityDecision {
        debug!("Capacity check: {} booked of {}", current, max);

        if current >= u64::from(max) {
            CapacityDecision::Full { current, max }
        } else {
            CapacityDecision::Available {
                remaining: u64::from(max) - current,
            }
        }
    }
}
