//! Bounded buffer allocator for chunk data in flight.
//!
//! The reader thread allocates one block per chunk (compressed and
//! decompressed halves together) and hands it to a scan worker. The pool
//! tracks the total outstanding bytes; when the budget is exhausted,
//! allocation blocks the reader until workers drop their blocks, so
//! on-disk ingestion can only outrun scanning by the pool's byte budget.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};

struct PoolShared {
    capacity: usize,
    in_use: Mutex<usize>,
    freed: Condvar,
}

/// A bounded shared allocator.
pub struct BlockPool {
    shared: Arc<PoolShared>,
}

impl BlockPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                capacity,
                in_use: Mutex::new(0),
                freed: Condvar::new(),
            }),
        }
    }

    /// Allocate a zeroed block of `size` bytes.
    ///
    /// Returns `None` when the request can never be satisfied (larger
    /// than the pool's whole budget); otherwise blocks until enough
    /// outstanding bytes are returned.
    pub fn allocate(&self, size: usize) -> Option<Block> {
        if size > self.shared.capacity {
            return None;
        }

        let mut in_use = self.shared.in_use.lock().unwrap();
        while *in_use + size > self.shared.capacity {
            in_use = self.shared.freed.wait(in_use).unwrap();
        }
        *in_use += size;

        Some(Block {
            data: vec![0u8; size],
            shared: Arc::clone(&self.shared),
        })
    }
}

/// A block of pool-accounted bytes; returns its budget on drop.
pub struct Block {
    data: Vec<u8>,
    shared: Arc<PoolShared>,
}

impl Deref for Block {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        let mut in_use = self.shared.in_use.lock().unwrap();
        *in_use -= self.data.len();
        self.shared.freed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_allocate_within_budget() {
        let pool = BlockPool::new(100);
        let a = pool.allocate(60).unwrap();
        let b = pool.allocate(40).unwrap();
        assert_eq!(a.len(), 60);
        assert_eq!(b.len(), 40);
    }

    #[test]
    fn test_oversized_request_refused() {
        let pool = BlockPool::new(100);
        assert!(pool.allocate(101).is_none());
        assert!(pool.allocate(100).is_some());
    }

    #[test]
    fn test_allocation_blocks_until_freed() {
        let pool = Arc::new(BlockPool::new(100));
        let block = pool.allocate(80).unwrap();

        let pool2 = Arc::clone(&pool);
        let waiter = thread::spawn(move || {
            // Blocks until the 80-byte block is dropped.
            let block = pool2.allocate(50).unwrap();
            block.len()
        });

        // Give the waiter time to reach the wait.
        thread::sleep(Duration::from_millis(50));
        drop(block);

        assert_eq!(waiter.join().unwrap(), 50);
    }
}
