//! CodeBuffer: one mmap'd region holding the constant table and the
//! generated kernels.
//!
//! Layout:
//!
//! ```text
//! +--------------------+ base (page aligned)
//! | ConstTable         |
//! | ... zero padding   |
//! +--------------------+ base + data_len (page aligned)
//! | expf_v code        |
//! | logf_v code        | (16-byte aligned)
//! | ... unused         |
//! +--------------------+ base + len
//! ```
//!
//! The region is `PROT_READ | PROT_WRITE` until [`CodeBuffer::finalize`],
//! then `PROT_READ | PROT_EXEC` for the rest of its life. `Drop` restores
//! write access before `munmap`, whether or not `finalize` ran.

use std::ptr::NonNull;

use crate::compiler::codegen::math_approx::ConstTable;
use crate::config::MAX_CODE_CAPACITY;
use crate::types::{FmathError, FmathResult, Protection};

pub struct CodeBuffer {
    ptr: NonNull<u8>,
    /// Total mapped length, a page multiple.
    len: usize,
    /// Table region length, a page multiple.
    data_len: usize,
    /// Next free byte, relative to `ptr`.
    cursor: usize,
    state: Protection,
}

// SAFETY: CodeBuffer owns its mapping exclusively. All mutation goes through
// `&mut self` while Writable; once ExecutableReadable the memory is immutable.
unsafe impl Send for CodeBuffer {}
unsafe impl Sync for CodeBuffer {}

impl CodeBuffer {
    /// Map a writable, non-executable region: the table rounded up to a page,
    /// plus `capacity_hint` bytes of code rounded up to a page.
    ///
    /// Hints above [`MAX_CODE_CAPACITY`] are rejected before any mapping.
    pub fn acquire(capacity_hint: usize) -> FmathResult<Self> {
        let too_large = FmathError::CodeOverflow {
            needed: capacity_hint,
            capacity: MAX_CODE_CAPACITY,
        };
        if capacity_hint > MAX_CODE_CAPACITY {
            return Err(too_large);
        }
        let page = page_size();
        let layout = round_up(ConstTable::size(), page)
            .zip(round_up(capacity_hint.max(1), page))
            .and_then(|(data_len, code_len)| Some((data_len, data_len.checked_add(code_len)?)));
        let Some((data_len, len)) = layout else {
            return Err(too_large);
        };

        // SAFETY: anonymous private mapping, no fd. MAP_FAILED is checked below.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(FmathError::MemoryMap(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        let ptr = NonNull::new(raw as *mut u8)
            .ok_or_else(|| FmathError::MemoryMap("mmap returned null".into()))?;

        Ok(CodeBuffer {
            ptr,
            len,
            data_len,
            cursor: data_len,
            state: Protection::Writable,
        })
    }

    /// Write the constant table at the start of the region and return its address.
    pub fn write_table(&mut self, table: ConstTable) -> FmathResult<u64> {
        self.require(Protection::Writable)?;
        // SAFETY: the mapping is page aligned, writable, and at least
        // `data_len >= size_of::<ConstTable>()` bytes long.
        unsafe {
            std::ptr::write(self.ptr.as_ptr() as *mut ConstTable, table);
        }
        Ok(self.table_addr())
    }

    /// The table as currently stored in the buffer.
    pub fn table(&self) -> ConstTable {
        // SAFETY: in bounds, aligned, and readable in both protection states.
        // An unwritten table reads as zeros, which is a valid ConstTable.
        unsafe { std::ptr::read(self.ptr.as_ptr() as *const ConstTable) }
    }

    pub fn table_addr(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    /// Address the next appended byte will land at.
    pub fn next_ip(&self) -> u64 {
        self.table_addr() + self.cursor as u64
    }

    /// Pad with `int3` up to a multiple of `align` bytes.
    pub fn align(&mut self, align: usize) -> FmathResult<()> {
        let target = round_up(self.cursor, align).ok_or(FmathError::CodeOverflow {
            needed: usize::MAX,
            capacity: self.code_capacity(),
        })?;
        let pad = vec![0xCCu8; target - self.cursor];
        self.append(&pad).map(|_| ())
    }

    /// Copy machine code into the buffer. Returns its offset from the base.
    pub fn append(&mut self, code: &[u8]) -> FmathResult<usize> {
        self.require(Protection::Writable)?;
        let offset = self.cursor;
        let end = match offset.checked_add(code.len()) {
            Some(end) if end <= self.len => end,
            _ => {
                return Err(FmathError::CodeOverflow {
                    needed: self.code_len().saturating_add(code.len()),
                    capacity: self.code_capacity(),
                })
            }
        };
        // SAFETY: `offset..end` is inside the writable mapping and `code`
        // cannot alias it (the caller holds no reference into the buffer).
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), self.ptr.as_ptr().add(offset), code.len());
        }
        self.cursor = end;
        Ok(offset)
    }

    /// Switch the whole region to read + execute. One-way.
    pub fn finalize(&mut self) -> FmathResult<()> {
        self.require(Protection::Writable)?;
        self.protect(libc::PROT_READ | libc::PROT_EXEC)?;
        self.state = Protection::ExecutableReadable;
        Ok(())
    }

    pub fn protection(&self) -> Protection {
        self.state
    }

    /// Pointer to `offset` bytes past the base, only once executable.
    pub fn code_ptr(&self, offset: usize) -> FmathResult<*const u8> {
        self.require(Protection::ExecutableReadable)?;
        debug_assert!(offset >= self.data_len && offset < self.cursor);
        // SAFETY: offset is within the mapping.
        Ok(unsafe { self.ptr.as_ptr().add(offset) as *const u8 })
    }

    /// Bytes of code emitted so far.
    pub fn code_len(&self) -> usize {
        self.cursor - self.data_len
    }

    pub fn code_capacity(&self) -> usize {
        self.len - self.data_len
    }

    /// Emitted bytes in `offset..offset + len`, readable in either state.
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        let end = (offset + len).min(self.cursor);
        let start = offset.min(end);
        // SAFETY: `start..end` lies within the initialized part of the mapping,
        // which is never written again once a shared borrow exists.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(start), end - start) }
    }

    fn require(&self, expected: Protection) -> FmathResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(FmathError::WrongProtection { expected, actual: self.state })
        }
    }

    fn protect(&self, prot: libc::c_int) -> FmathResult<()> {
        // SAFETY: ptr/len describe exactly the mapping created in `acquire`.
        let ret = unsafe { libc::mprotect(self.ptr.as_ptr() as *mut libc::c_void, self.len, prot) };
        if ret != 0 {
            return Err(FmathError::Protect(std::io::Error::last_os_error().to_string()));
        }
        Ok(())
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        if self.state == Protection::ExecutableReadable {
            if let Err(err) = self.protect(libc::PROT_READ | libc::PROT_WRITE) {
                log::warn!("code buffer teardown: {err}");
            }
            self.state = Protection::Writable;
        }
        // SAFETY: unmapping the region mapped in `acquire`; no kernel entry
        // point outlives the buffer that owns it.
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

impl std::fmt::Debug for CodeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeBuffer")
            .field("base", &self.ptr)
            .field("len", &self.len)
            .field("data_len", &self.data_len)
            .field("code_len", &self.code_len())
            .field("state", &self.state)
            .finish()
    }
}

pub(crate) fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// `None` when the rounded value does not fit in `usize`.
fn round_up(value: usize, align: usize) -> Option<usize> {
    Some(value.checked_add(align - 1)? & !(align - 1))
}
