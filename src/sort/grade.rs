//! Grade and select
//!
//! `grade` is an argsort: the radix sort applied to index tags instead of payloads.
//! Equal keys keep their original index order. `select` gathers through the result.

use super::radix::radix_sort_pairs_with;

/// Permutation that sorts `keys` ascending
pub fn grade(keys: &[u32]) -> Vec<u32> {
    grade_nbits(keys, 32)
}

/// Like [`grade`], ordering on the low `bits` bits of each key only
pub fn grade_nbits(keys: &[u32], bits: u32) -> Vec<u32> {
    let n = keys.len();
    let mut work = keys.to_vec();
    let mut tags: Vec<u32> = (0..n as u32).collect();
    let mut scratch_keys = vec![0; n];
    let mut scratch_tags = vec![0; n];
    radix_sort_pairs_with(&mut work, &mut tags, &mut scratch_keys, &mut scratch_tags, bits);
    tags
}

/// Gather: `output[i] = haystack[indexes[i]]`
pub fn select<T: Copy>(haystack: &[T], indexes: &[u32]) -> Vec<T> {
    indexes.iter().map(|&i| haystack[i as usize]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_ties_keep_index_order() {
        let keys = [5, 1, 5, 0, 1];
        assert_eq!(grade(&keys), vec![3, 1, 4, 0, 2]);
    }

    #[test]
    fn test_select_after_grade_is_keyed_sort() {
        let mut rng = StdRng::seed_from_u64(2024);
        let keys: Vec<u32> = (0..500).map(|_| rng.gen_range(0..50)).collect();
        let haystack: Vec<u64> = (0..500).map(|_| rng.gen()).collect();

        let mut expected: Vec<(u32, u64)> = keys.iter().copied().zip(haystack.iter().copied()).collect();
        expected.sort_by_key(|&(k, _)| k);
        let expected: Vec<u64> = expected.into_iter().map(|(_, h)| h).collect();

        assert_eq!(select(&haystack, &grade(&keys)), expected);
    }

    #[test]
    fn test_nbits_ignores_high_bits() {
        let keys = [0xF0, 0x01, 0xE2, 0x00];
        assert_eq!(grade_nbits(&keys, 4), vec![0, 3, 1, 2]);
        assert_eq!(grade_nbits(&keys, 0), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_empty() {
        assert!(grade(&[]).is_empty());
        assert!(select::<u32>(&[], &[]).is_empty());
    }
}
