// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! DMA-capable memory shared between callers, the scheduler and the
//! hardware.
//!
//! Buffers are addressed by a bus address (`paddr`), exactly as hardware
//! descriptors address them. The [`MemoryMap`] hands out addresses, never
//! reuses them, and resolves any address inside a buffer back to the buffer
//! and offset. Backing memory comes from an [`Allocator`]: process memory by
//! default, or the Linux CMA DMA heap on target.

use dma_heap::{Heap, HeapKind};
use std::{
    collections::BTreeMap,
    io,
    os::fd::{AsRawFd, OwnedFd},
    ptr::null_mut,
    slice::{from_raw_parts, from_raw_parts_mut},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, warn};

/// First bus address handed out.
const BASE_ADDRESS: u64 = 0x1000_0000;

/// Allocations start on page boundaries.
const PAGE_SIZE: u64 = 4096;

#[derive(thiserror::Error, Debug)]
pub enum MemoryError {
    #[error("cannot allocate {size} bytes")]
    OutOfMemory { size: usize },
    #[error("address {0:#x} is not mapped")]
    Unmapped(u64),
    #[error("access of {len} bytes at {paddr:#x} overruns its buffer")]
    OutOfBounds { paddr: u64, len: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Memory behind one buffer.
pub enum Backing {
    Heap(Vec<u8>),
    Cma(CmaRegion),
}

impl Backing {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Heap(v) => v,
            Backing::Cma(r) => r.as_slice(),
        }
    }

    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        match self {
            Backing::Heap(v) => v,
            Backing::Cma(r) => r.as_slice_mut(),
        }
    }
}

/// Source of backing memory for the [`MemoryMap`].
pub trait Allocator: Send + Sync {
    fn allocate(&self, size: usize) -> Result<Backing, MemoryError>;
}

/// Process memory. Used by the software IPU and by tests.
#[derive(Debug, Default)]
pub struct HeapAllocator;

impl Allocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<Backing, MemoryError> {
        let mut v = Vec::new();
        v.try_reserve_exact(size)
            .map_err(|_| MemoryError::OutOfMemory { size })?;
        v.resize(size, 0);
        Ok(Backing::Heap(v))
    }
}

/// Contiguous memory from the Linux CMA DMA heap, mapped for CPU access.
#[derive(Debug, Default)]
pub struct CmaAllocator;

impl Allocator for CmaAllocator {
    fn allocate(&self, size: usize) -> Result<Backing, MemoryError> {
        let heap = Heap::new(HeapKind::Cma)
            .map_err(|e| MemoryError::Io(io::Error::other(format!("{e:?}"))))?;
        let fd = heap
            .allocate(size)
            .map_err(|_| MemoryError::OutOfMemory { size })?;
        Ok(Backing::Cma(CmaRegion::map(fd, size)?))
    }
}

/// CPU mapping of a DMA heap buffer. The mapping is released when dropped.
///
/// # Safety
///
/// The mapping is shared with the hardware. The scheduler only touches it
/// while no channel writing to it is enabled.
pub struct CmaRegion {
    fd: OwnedFd,
    mmap: *mut u8,
    len: usize,
}

// The raw mapping is only reached through the owning DmaBuffer's mutex.
unsafe impl Send for CmaRegion {}
unsafe impl Sync for CmaRegion {}

impl CmaRegion {
    fn map(fd: OwnedFd, len: usize) -> Result<Self, MemoryError> {
        let mmap = unsafe {
            libc::mmap(
                null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if mmap == libc::MAP_FAILED {
            return Err(MemoryError::Io(io::Error::last_os_error()));
        }
        Ok(CmaRegion {
            fd,
            mmap: mmap as *mut u8,
            len,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { from_raw_parts(self.mmap, self.len) }
    }

    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        unsafe { from_raw_parts_mut(self.mmap, self.len) }
    }
}

impl Drop for CmaRegion {
    fn drop(&mut self) {
        if unsafe { libc::munmap(self.mmap.cast::<libc::c_void>(), self.len) } != 0 {
            warn!(fd = self.fd.as_raw_fd(), "unmap failed!");
        }
    }
}

/// One DMA buffer.
pub struct DmaBuffer {
    paddr: u64,
    len: usize,
    backing: Mutex<Backing>,
}

impl DmaBuffer {
    pub fn paddr(&self) -> u64 {
        self.paddr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn lock(&self) -> MutexGuard<'_, Backing> {
        self.backing.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.lock().as_slice())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(self.lock().as_slice_mut())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.read(<[u8]>::to_vec)
    }

    pub fn fill(&self, value: u8) {
        self.write(|b| b.fill(value));
    }

    /// Copies `data` into the buffer starting at byte `offset`.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        self.write(|b| {
            let dst = b
                .get_mut(offset..offset + data.len())
                .ok_or(MemoryError::OutOfBounds {
                    paddr: self.paddr + offset as u64,
                    len: data.len(),
                })?;
            dst.copy_from_slice(data);
            Ok(())
        })
    }

    pub fn read_at(&self, offset: usize, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.read(|b| {
            b.get(offset..offset + len)
                .map(<[u8]>::to_vec)
                .ok_or(MemoryError::OutOfBounds {
                    paddr: self.paddr + offset as u64,
                    len,
                })
        })
    }
}

impl std::fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("paddr", &format_args!("{:#x}", self.paddr))
            .field("len", &self.len)
            .finish()
    }
}

struct Table {
    buffers: BTreeMap<u64, Arc<DmaBuffer>>,
    next: u64,
    in_use: usize,
}

/// Registry of every live DMA buffer, keyed by bus address.
pub struct MemoryMap {
    allocator: Box<dyn Allocator>,
    limit: Option<usize>,
    table: Mutex<Table>,
}

impl Default for MemoryMap {
    fn default() -> Self {
        MemoryMap::new()
    }
}

impl MemoryMap {
    pub fn new() -> Self {
        Self::with_allocator(Box::new(HeapAllocator))
    }

    pub fn with_allocator(allocator: Box<dyn Allocator>) -> Self {
        MemoryMap {
            allocator,
            limit: None,
            table: Mutex::new(Table {
                buffers: BTreeMap::new(),
                next: BASE_ADDRESS,
                in_use: 0,
            }),
        }
    }

    /// Caps the total bytes that may be allocated at once, like a CMA pool.
    pub fn with_limit(mut self, bytes: usize) -> Self {
        self.limit = Some(bytes);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn allocate(&self, size: usize) -> Result<Arc<DmaBuffer>, MemoryError> {
        if size == 0 {
            return Err(MemoryError::OutOfMemory { size });
        }
        // Reserve before allocating so concurrent callers cannot overrun the limit.
        {
            let mut table = self.lock();
            if self
                .limit
                .is_some_and(|limit| table.in_use.saturating_add(size) > limit)
            {
                return Err(MemoryError::OutOfMemory { size });
            }
            table.in_use += size;
        }
        let backing = match self.allocator.allocate(size) {
            Ok(backing) => backing,
            Err(e) => {
                self.lock().in_use -= size;
                return Err(e);
            }
        };

        let mut table = self.lock();
        let paddr = table.next;
        table.next += (size as u64).div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let buffer = Arc::new(DmaBuffer {
            paddr,
            len: size,
            backing: Mutex::new(backing),
        });
        table.buffers.insert(paddr, buffer.clone());
        debug!(paddr = format_args!("{paddr:#x}"), size, "DMA buffer allocated");
        Ok(buffer)
    }

    /// Unregisters the buffer at `paddr`. Its memory is released once the
    /// last holder drops it.
    pub fn free(&self, paddr: u64) -> Result<(), MemoryError> {
        let mut table = self.lock();
        let buffer = table
            .buffers
            .remove(&paddr)
            .ok_or(MemoryError::Unmapped(paddr))?;
        table.in_use -= buffer.len;
        debug!(paddr = format_args!("{paddr:#x}"), "DMA buffer freed");
        Ok(())
    }

    /// Finds the buffer containing `paddr` and the offset of `paddr` in it.
    pub fn resolve(&self, paddr: u64) -> Result<(Arc<DmaBuffer>, usize), MemoryError> {
        let table = self.lock();
        let (base, buffer) = table
            .buffers
            .range(..=paddr)
            .next_back()
            .ok_or(MemoryError::Unmapped(paddr))?;
        let offset = paddr - base;
        if offset >= buffer.len as u64 {
            return Err(MemoryError::Unmapped(paddr));
        }
        Ok((buffer.clone(), offset as usize))
    }

    pub fn read_at(&self, paddr: u64, len: usize) -> Result<Vec<u8>, MemoryError> {
        let (buffer, offset) = self.resolve(paddr)?;
        buffer.read_at(offset, len)
    }

    pub fn write_at(&self, paddr: u64, data: &[u8]) -> Result<(), MemoryError> {
        let (buffer, offset) = self.resolve(paddr)?;
        buffer.write_at(offset, data)
    }

    /// Bytes currently allocated.
    pub fn in_use(&self) -> usize {
        self.lock().in_use
    }

    pub fn allocations(&self) -> usize {
        self.lock().buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct Failing;

    impl Allocator for Failing {
        fn allocate(&self, size: usize) -> Result<Backing, MemoryError> {
            Err(MemoryError::OutOfMemory { size })
        }
    }

    #[test]
    fn limit_holds_under_concurrent_allocation() {
        let page = PAGE_SIZE as usize;
        let memory = Arc::new(MemoryMap::new().with_limit(4 * page));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let memory = memory.clone();
                thread::spawn(move || memory.allocate(page).is_ok())
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 4);
        assert_eq!(memory.in_use(), 4 * page);
        assert_eq!(memory.allocations(), 4);
    }

    #[test]
    fn failed_backing_releases_reservation() {
        let memory = MemoryMap::with_allocator(Box::new(Failing)).with_limit(8192);
        assert!(matches!(
            memory.allocate(4096),
            Err(MemoryError::OutOfMemory { size: 4096 })
        ));
        assert_eq!(memory.in_use(), 0);
        assert_eq!(memory.allocations(), 0);
    }

    #[test]
    fn freed_bytes_return_to_the_limit() {
        let memory = MemoryMap::new().with_limit(4096);
        let first = memory.allocate(4096).unwrap();
        assert!(memory.allocate(1).is_err());
        memory.free(first.paddr()).unwrap();
        assert!(memory.allocate(4096).is_ok());
    }
}
