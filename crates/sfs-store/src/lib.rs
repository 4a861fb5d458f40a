#![forbid(unsafe_code)]
//! Block storage: extent allocation over in-process memory heaps.
//!
//! The [`BlockStore`] trait is the seam between the inode layer and the
//! backing memory. It is deliberately narrow — allocate, free, and copy
//! bytes against opaque `(node, addr, len)` extents — so the RAM baseline
//! ([`HeapStore`]) can later be swapped for a backend that keeps blocks on
//! other hosts without touching the inode layer.
//!
//! Allocation is two-phase: `reserve` claims space, `commit` makes it a live
//! extent, `cancel` returns it. A backend that has to talk to the network
//! can therefore be driven as reserve-under-lock / fulfill-unlocked /
//! commit-under-lock. The RAM baseline completes each phase immediately.

use parking_lot::Mutex;
use sfs_error::{FsError, Result};
use sfs_types::{NodeId, BLOCK_SIZE};

// ── Extents and reservations ────────────────────────────────────────────────

/// A contiguous allocated range of backing memory.
///
/// Owned exclusively by one position in one extent map. `len` is at most
/// [`BLOCK_SIZE`]; the slot behind it always occupies a whole block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub node: NodeId,
    pub addr: u64,
    pub len: u32,
}

/// Space claimed by `reserve` but not yet live.
///
/// Must be passed to exactly one of `commit` or `cancel`. Not `Clone`, so a
/// reservation cannot be spent twice.
#[derive(Debug)]
pub struct Reservation {
    node: NodeId,
    addr: u64,
    len: u32,
}

// ── BlockStore trait ────────────────────────────────────────────────────────

/// Backend contract for extent storage.
///
/// Implementations are internally synchronized; every method takes `&self`.
pub trait BlockStore: Send + Sync {
    /// Claim space for an extent of `len` bytes (`1..=BLOCK_SIZE`).
    ///
    /// Fails with `NoSpace` when the configured capacity is exhausted.
    fn reserve(&self, len: u32) -> Result<Reservation>;

    /// Turn a reservation into a live, zero-filled extent.
    fn commit(&self, reservation: Reservation) -> Extent;

    /// Return reserved space without ever making it live.
    fn cancel(&self, reservation: Reservation);

    /// Release a live extent.
    fn free(&self, extent: &Extent);

    /// Copy bytes out of an extent. `offset + out.len()` must stay within
    /// the extent.
    fn read(&self, extent: &Extent, offset: u32, out: &mut [u8]);

    /// Copy bytes into an extent. `offset + data.len()` must stay within
    /// the extent.
    fn write(&self, extent: &Extent, offset: u32, data: &[u8]);

    /// Total capacity in bytes across all heaps.
    fn total_bytes(&self) -> u64;

    /// Bytes currently held by live or reserved extents (whole slots).
    fn used_bytes(&self) -> u64;

    /// Reserve-then-commit in one step.
    fn alloc(&self, len: u32) -> Result<Extent> {
        let reservation = self.reserve(len)?;
        Ok(self.commit(reservation))
    }
}

// ── RAM baseline ────────────────────────────────────────────────────────────

struct Heap {
    /// Capacity in bytes, a multiple of `BLOCK_SIZE`.
    capacity: u64,
    /// Bump watermark; slots past it have never been handed out.
    next: u64,
    /// Bytes held by live or reserved slots.
    used: u64,
    /// Backing bytes, grown on demand and never shrunk.
    data: Vec<u8>,
    /// Addresses of freed slots available for reuse.
    free: Vec<u64>,
}

impl Heap {
    fn new(capacity: u64) -> Self {
        Self {
            capacity: capacity - capacity % u64::from(BLOCK_SIZE),
            next: 0,
            used: 0,
            data: Vec::new(),
            free: Vec::new(),
        }
    }

    fn take_slot(&mut self) -> Option<u64> {
        if let Some(addr) = self.free.pop() {
            self.used += u64::from(BLOCK_SIZE);
            return Some(addr);
        }
        if self.next + u64::from(BLOCK_SIZE) <= self.capacity {
            let addr = self.next;
            self.next += u64::from(BLOCK_SIZE);
            self.used += u64::from(BLOCK_SIZE);
            return Some(addr);
        }
        None
    }

    fn put_slot(&mut self, addr: u64) {
        self.free.push(addr);
        self.used -= u64::from(BLOCK_SIZE);
    }

    /// Grow the backing vector so `[addr, addr + BLOCK_SIZE)` is addressable,
    /// then zero that slot.
    fn zero_slot(&mut self, addr: u64) {
        let end = usize::try_from(addr + u64::from(BLOCK_SIZE)).expect("heap offset fits usize");
        if self.data.len() < end {
            self.data.resize(end, 0);
        } else {
            let start = usize::try_from(addr).expect("heap offset fits usize");
            self.data[start..end].fill(0);
        }
    }
}

/// In-process RAM store: one or more heaps behind a single internal mutex.
///
/// Placement is round-robin across heaps; within a heap, freed slots are
/// reused before the bump watermark advances.
pub struct HeapStore {
    state: Mutex<State>,
}

struct State {
    heaps: Vec<Heap>,
    cursor: usize,
}

impl HeapStore {
    /// Single-heap store with the given capacity (rounded down to a block
    /// multiple).
    #[must_use]
    pub fn new(capacity_bytes: u64) -> Self {
        Self::with_heaps(&[capacity_bytes])
    }

    /// Multi-heap store, one heap per capacity entry.
    #[must_use]
    pub fn with_heaps(capacities: &[u64]) -> Self {
        let heaps = capacities.iter().map(|&c| Heap::new(c)).collect();
        Self {
            state: Mutex::new(State { heaps, cursor: 0 }),
        }
    }
}

impl BlockStore for HeapStore {
    fn reserve(&self, len: u32) -> Result<Reservation> {
        if len == 0 || len > BLOCK_SIZE {
            return Err(FsError::InvalidArgument(format!(
                "extent length {len} outside 1..={BLOCK_SIZE}"
            )));
        }
        let mut state = self.state.lock();
        let heap_count = state.heaps.len();
        for probe in 0..heap_count {
            let idx = (state.cursor + probe) % heap_count;
            if let Some(addr) = state.heaps[idx].take_slot() {
                state.cursor = (idx + 1) % heap_count;
                #[allow(clippy::cast_possible_truncation)] // heap_count bounded by config
                return Ok(Reservation {
                    node: NodeId(idx as u32),
                    addr,
                    len,
                });
            }
        }
        Err(FsError::NoSpace)
    }

    fn commit(&self, reservation: Reservation) -> Extent {
        let mut state = self.state.lock();
        let heap = &mut state.heaps[reservation.node.0 as usize];
        heap.zero_slot(reservation.addr);
        Extent {
            node: reservation.node,
            addr: reservation.addr,
            len: reservation.len,
        }
    }

    fn cancel(&self, reservation: Reservation) {
        let mut state = self.state.lock();
        state.heaps[reservation.node.0 as usize].put_slot(reservation.addr);
    }

    fn free(&self, extent: &Extent) {
        let mut state = self.state.lock();
        state.heaps[extent.node.0 as usize].put_slot(extent.addr);
    }

    fn read(&self, extent: &Extent, offset: u32, out: &mut [u8]) {
        assert!(
            offset as usize + out.len() <= extent.len as usize,
            "read past extent end"
        );
        let state = self.state.lock();
        let heap = &state.heaps[extent.node.0 as usize];
        let start = usize::try_from(extent.addr).expect("heap offset fits usize") + offset as usize;
        out.copy_from_slice(&heap.data[start..start + out.len()]);
    }

    fn write(&self, extent: &Extent, offset: u32, data: &[u8]) {
        assert!(
            offset as usize + data.len() <= extent.len as usize,
            "write past extent end"
        );
        let mut state = self.state.lock();
        let heap = &mut state.heaps[extent.node.0 as usize];
        let start = usize::try_from(extent.addr).expect("heap offset fits usize") + offset as usize;
        heap.data[start..start + data.len()].copy_from_slice(data);
    }

    fn total_bytes(&self) -> u64 {
        self.state.lock().heaps.iter().map(|h| h.capacity).sum()
    }

    fn used_bytes(&self) -> u64 {
        self.state.lock().heaps.iter().map(|h| h.used).sum()
    }
}
