//! Utility functions.

/// Size of a huge page on every supported platform.
pub const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Aligns an address or size up to the next multiple of `align`.
/// `align` must be a power of two. Returns `None` on overflow.
pub fn align_up(addr: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    addr.checked_add(align - 1).map(|a| a & !(align - 1))
}

/// Aligns an address down to the previous multiple of `align`.
pub fn align_down(addr: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    addr & !(align - 1)
}
