use super::pressure;
use super::stats;
use crate::sync::atomic::Ordering;

/// Point-in-time view of the process-wide buffer counters.
///
/// Counters are read one at a time, so fields may be mutually inconsistent
/// while other threads allocate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_live: usize,
    pub live_allocations: usize,
    pub memory_pressure: usize,
    pub heap_live: usize,
    pub private_heap_live: usize,
    pub virtual_live: usize,
    pub network_live: usize,
    pub com_live: usize,
    pub aligned_live: usize,
}

/// Entry point for process-wide memory accounting.
pub struct MemoryManager {}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager {
    #[must_use]
    pub fn new() -> Self {
        Self {}
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            total_live: stats::TOTAL_LIVE.load(Ordering::Relaxed),
            live_allocations: stats::LIVE_ALLOCATIONS.load(Ordering::Relaxed),
            memory_pressure: pressure::current(),
            heap_live: stats::HEAP_LIVE.load(Ordering::Relaxed),
            private_heap_live: stats::PRIVATE_HEAP_LIVE.load(Ordering::Relaxed),
            virtual_live: stats::VIRTUAL_LIVE.load(Ordering::Relaxed),
            network_live: stats::NETWORK_LIVE.load(Ordering::Relaxed),
            com_live: stats::COM_LIVE.load(Ordering::Relaxed),
            aligned_live: stats::ALIGNED_LIVE.load(Ordering::Relaxed),
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::memory::backend::Backend;
    use crate::SafePtr;

    #[test]
    fn test_memory_manager_snapshot() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let manager = MemoryManager::default();
        let _stats = manager.stats();
    }

    #[test]
    fn test_memory_stats_aggregation() {
        let _guard = crate::memory::TEST_MUTEX.write().unwrap();
        let manager = MemoryManager::new();
        let initial = manager.stats();

        // Scope to force drop
        {
            let mut com = SafePtr::new();
            com.alloc(300, Backend::Com).unwrap();
            let mut heap = SafePtr::new();
            heap.alloc(200, Backend::Heap).unwrap();

            let current = manager.stats();
            assert_eq!(current.com_live, initial.com_live + 300);
            assert_eq!(current.heap_live, initial.heap_live + 200);
            assert_eq!(current.total_live, initial.total_live + 500);
            assert_eq!(current.live_allocations, initial.live_allocations + 2);
            if crate::config::get().report_pressure {
                assert_eq!(current.memory_pressure, initial.memory_pressure + 500);
            }
        }

        // SafePtr releases on drop.
        assert_eq!(manager.stats(), initial);
    }
}
