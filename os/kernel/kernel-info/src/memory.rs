//! # Physical Memory Parameters

/// Size of a physical frame (one 4 KiB page).
pub const PAGE_SIZE: usize = 4096;

/// log2([`PAGE_SIZE`]).
pub const PAGE_SHIFT: u32 = 12;

/// Byte written over a frame's contents when it is handed out.
///
/// Readers that forget to initialize a fresh frame see this pattern
/// instead of stale data.
pub const ALLOC_POISON: u8 = 0x05;

/// Byte written over a frame's contents when it returns to the free list.
///
/// Use-after-free readers see this pattern instead of the old payload.
pub const FREE_POISON: u8 = 0x01;

/// Round `addr` up to the next frame boundary.
#[inline]
#[must_use]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(ALLOC_POISON != FREE_POISON);
    assert!(ALLOC_POISON != 0 && FREE_POISON != 0);
};
