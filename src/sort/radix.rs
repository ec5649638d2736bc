//! LSD radix sort of key/value pairs
//!
//! Four bits per pass: histogram the digit, exclusive prefix sum over the bins, then a
//! stable scatter into the partner buffer. Passes where every key lands in one bin move
//! nothing and are skipped, so the result sits in whichever buffer was written last and
//! is copied back only when that is the scratch buffer.

use super::{BITS_PER_PASS, NUM_BINS};

/// Per-bin counts of the digit at `shift`, restricted to `mask`
pub fn histogram(keys: &[u32], shift: u32, mask: u32) -> [u32; NUM_BINS] {
    let mut counts = [0u32; NUM_BINS];
    for &key in keys {
        counts[((key >> shift) & mask) as usize] += 1;
    }
    counts
}

/// Exclusive prefix sum over the bins
pub fn exclusive_prefix(counts: &[u32; NUM_BINS]) -> [u32; NUM_BINS] {
    let mut offsets = [0u32; NUM_BINS];
    let mut running = 0;
    for (offset, &count) in offsets.iter_mut().zip(counts) {
        *offset = running;
        running += count;
    }
    offsets
}

/// Digit mask of the pass starting at bit `shift` when only the low `bits` bits count
pub fn pass_mask(shift: u32, bits: u32) -> u32 {
    let width = bits.saturating_sub(shift).min(BITS_PER_PASS);
    (1u32 << width) - 1
}

/// Sort `keys`/`values` by the low `bits` bits of the key, ping-ponging through the
/// scratch slices. Returns the number of passes that scattered.
///
/// All four slices must have the same length.
pub fn radix_sort_pairs_with(
    keys: &mut [u32],
    values: &mut [u32],
    scratch_keys: &mut [u32],
    scratch_values: &mut [u32],
    bits: u32,
) -> u32 {
    let n = keys.len();
    debug_assert!(values.len() == n && scratch_keys.len() == n && scratch_values.len() == n);

    let mut in_primary = true;
    let mut scattered = 0;
    for pass in 0..bits.min(32).div_ceil(BITS_PER_PASS) {
        let shift = pass * BITS_PER_PASS;
        let mask = pass_mask(shift, bits);

        let (src_keys, src_values, dst_keys, dst_values) = if in_primary {
            (&*keys, &*values, &mut *scratch_keys, &mut *scratch_values)
        } else {
            (&*scratch_keys, &*scratch_values, &mut *keys, &mut *values)
        };

        let counts = histogram(src_keys, shift, mask);
        if counts.iter().any(|&c| c as usize == n) {
            continue;
        }

        let mut offsets = exclusive_prefix(&counts);
        for (&key, &value) in src_keys.iter().zip(src_values.iter()) {
            let bin = ((key >> shift) & mask) as usize;
            let dst = offsets[bin] as usize;
            dst_keys[dst] = key;
            dst_values[dst] = value;
            offsets[bin] += 1;
        }
        in_primary = !in_primary;
        scattered += 1;
    }

    if !in_primary {
        keys.copy_from_slice(scratch_keys);
        values.copy_from_slice(scratch_values);
    }
    scattered
}

/// Stable ascending sort of `keys`, carrying `values` along
pub fn radix_sort_pairs(keys: &mut [u32], values: &mut [u32]) {
    let mut scratch_keys = vec![0; keys.len()];
    let mut scratch_values = vec![0; values.len()];
    radix_sort_pairs_with(keys, values, &mut scratch_keys, &mut scratch_values, 32);
}
