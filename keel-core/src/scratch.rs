//! Reusable scratch buffer pool.
//!
//! Any thread may reserve or release a buffer; the mutex protects only the
//! free-list scan and buffer resize. While a lease is held the bytes are
//! owned by the lease, not the pool, so buffer contents are never touched
//! under the lock.

use std::sync::{Mutex, PoisonError};
use tracing::{debug, trace};

const SHRINK_THRESHOLD: usize = 1024 * 1024;

struct Slot {
    /// Taken out of the slot (left empty) while the buffer is on lease.
    data: Vec<u8>,
    reserved: bool,
}

#[derive(Default)]
struct PoolState {
    slots: Vec<Slot>,
    /// Largest reservation seen since the last cleanup pass.
    max_request: usize,
}

/// Pool of reusable byte buffers for transient per-frame work.
#[derive(Default)]
pub struct ScratchBufferPool {
    state: Mutex<PoolState>,
}

/// A reserved scratch buffer. Returns its bytes to the pool on drop.
pub struct ScratchBuffer<'a> {
    pool: &'a ScratchBufferPool,
    index: usize,
    data: Vec<u8>,
    len: usize,
}

impl ScratchBufferPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves a buffer of at least `size` zeroed bytes.
    ///
    /// Reuses a free buffer that is large enough, else grows a free one,
    /// else allocates a new slot.
    pub fn reserve(&self, size: usize) -> ScratchBuffer<'_> {
        let mut state = self.lock();
        if size > state.max_request {
            state.max_request = size;
        }

        // A free buffer that is already large enough
        if let Some(index) = state
            .slots
            .iter()
            .position(|s| !s.reserved && s.data.len() >= size)
        {
            let slot = &mut state.slots[index];
            slot.reserved = true;
            let mut data = std::mem::take(&mut slot.data);
            data[..size].fill(0);
            return ScratchBuffer { pool: self, index, data, len: size };
        }

        // A free buffer that can be grown
        if let Some(index) = state.slots.iter().position(|s| !s.reserved) {
            let slot = &mut state.slots[index];
            slot.reserved = true;
            let mut data = std::mem::take(&mut slot.data);
            data.clear();
            data.resize(size, 0);
            return ScratchBuffer { pool: self, index, data, len: size };
        }

        // A new slot
        let index = state.slots.len();
        state.slots.push(Slot { data: Vec::new(), reserved: true });
        debug!(size, "allocated scratch buffer");
        ScratchBuffer {
            pool: self,
            index,
            data: vec![0; size],
            len: size,
        }
    }

    /// Shrinks oversized idle buffers and resets the high-water mark.
    ///
    /// A free buffer is shrunk when it exceeds twice the largest request
    /// seen since the previous cleanup and is at least 1MB.
    pub fn cleanup(&self) {
        let mut state = self.lock();
        let max_request = state.max_request;
        for slot in &mut state.slots {
            if !slot.reserved
                && slot.data.len() > max_request * 2
                && slot.data.len() >= SHRINK_THRESHOLD
            {
                slot.data = vec![0; max_request];
                trace!(size = max_request, "resized scratch buffer");
            }
        }
        state.max_request = 0;
    }

    /// Number of buffers currently held by the pool, leased or free.
    pub fn buffer_count(&self) -> usize {
        self.lock().slots.len()
    }
}

impl ScratchBuffer<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::ops::Deref for ScratchBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl std::ops::DerefMut for ScratchBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }
}

impl Drop for ScratchBuffer<'_> {
    fn drop(&mut self) {
        let mut state = self.pool.lock();
        let slot = &mut state.slots[self.index];
        slot.data = std::mem::take(&mut self.data);
        slot.reserved = false;
    }
}
