use std::hint;
use std::thread;

/// Smallest capacity a bitset is ever created or resized to.
pub const MIN_CAPACITY: u64 = 2;

/// Ceiling of the base-2 logarithm of `n`.
///
/// ```text
/// 0 -> 0, 1 -> 0, 2 -> 1, 3 -> 2, 4 -> 2, 5 -> 3
/// ```
pub fn log2_ceil(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        64 - (n - 1).leading_zeros()
    }
}

/// Number of bytes required to hold `n` bits.
pub fn bits_to_bytes(n: u64) -> u64 {
    n.div_ceil(8)
}

/// Number of bits that fit into `n` bytes.
pub fn bytes_to_bits(n: u64) -> u64 {
    n * 8
}

/// Greatest value in `values`, or `None` for an empty slice.
pub fn highest(values: &[u64]) -> Option<u64> {
    values.iter().copied().max()
}

/// Capacity (in bits) able to address index `n`: the next power of two
/// strictly greater than `n`, but never below [`MIN_CAPACITY`].
///
/// ```text
/// 0 -> 2, 1 -> 2, 2 -> 4, 5 -> 8, 7 -> 8, 8 -> 16
/// ```
///
/// Returns `None` when the result does not fit into `u64`.
pub fn capacity_for(n: u64) -> Option<u64> {
    let bits = log2_ceil(n.checked_add(1)?);
    let capacity = 1u64.checked_shl(bits)?;
    Some(capacity.max(MIN_CAPACITY))
}

/// Number of busy spins before a waiter starts yielding its time slice.
pub(crate) const SPINS_BEFORE_YIELD: u32 = 128;

/// One step of a spin-then-yield wait loop; `spins` starts at zero.
pub(crate) fn backoff(spins: &mut u32) {
    if *spins < SPINS_BEFORE_YIELD {
        *spins += 1;
        hint::spin_loop();
    } else {
        thread::yield_now();
    }
}
