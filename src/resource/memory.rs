//! In-process memory budget.
//!
//! Memory-managed computations declare a ceiling in megabytes and reserve it
//! from a shared budget before dispatch. A reservation that cannot be granted
//! right away fails fast; the computation is never dispatched.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::types::{DispatchError, DispatchResult};

/// Shared pool of reservable megabytes.
#[derive(Debug, Clone)]
pub struct MemoryBudget {
    total_mb: u32,
    available: Arc<Semaphore>,
}

impl MemoryBudget {
    pub fn new(total_mb: u32) -> Self {
        Self { total_mb, available: Arc::new(Semaphore::new(total_mb as usize)) }
    }

    pub fn total_mb(&self) -> u32 {
        self.total_mb
    }

    pub fn available_mb(&self) -> u32 {
        self.available.available_permits() as u32
    }

    /// Reserve `ceiling_mb` or fail with `InsufficientMemory`.
    pub fn try_reserve(&self, ceiling_mb: u32) -> DispatchResult<MemoryReservation> {
        if ceiling_mb == 0 {
            return Err(DispatchError::InvalidConfig("memory ceiling must be at least 1 MB".into()));
        }
        match self.available.clone().try_acquire_many_owned(ceiling_mb) {
            Ok(permit) => Ok(MemoryReservation { mb: ceiling_mb, _permit: permit }),
            Err(_) => {
                let available_mb = self.available_mb();
                tracing::warn!(
                    requested_mb = ceiling_mb,
                    available_mb,
                    "Memory reservation refused"
                );
                Err(DispatchError::InsufficientMemory { requested_mb: ceiling_mb, available_mb })
            }
        }
    }
}

/// Reserved megabytes; returned to the budget on drop.
#[derive(Debug)]
pub struct MemoryReservation {
    mb: u32,
    _permit: OwnedSemaphorePermit,
}

impl MemoryReservation {
    pub fn mb(&self) -> u32 {
        self.mb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_return() {
        let budget = MemoryBudget::new(100);
        let a = budget.try_reserve(60).unwrap();
        assert_eq!(a.mb(), 60);
        assert_eq!(budget.available_mb(), 40);

        let err = budget.try_reserve(50).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InsufficientMemory { requested_mb: 50, available_mb: 40 }
        ));

        drop(a);
        assert!(budget.try_reserve(100).is_ok());
    }

    #[test]
    fn test_ceiling_above_total_always_refused() {
        let budget = MemoryBudget::new(10);
        assert!(matches!(budget.try_reserve(11), Err(DispatchError::InsufficientMemory { .. })));
        assert!(matches!(budget.try_reserve(0), Err(DispatchError::InvalidConfig(_))));
    }
}
