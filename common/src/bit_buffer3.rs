//! Bit-packed 3D buffer for voxel masks.
//!
//! Stores one bit per voxel in `u64` words, using the same
//! `z * height * width + y * width + x` layout as [`crate::Buffer3`].

use std::ops::Index;

const BITS_PER_WORD: usize = 64;

/// A 3D buffer of booleans packed as bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBuffer3 {
    /// Packed bits in LSB order. Bits past `len` are always zero.
    words: Vec<u64>,
    width: usize,
    height: usize,
    depth: usize,
    len: usize,
}

impl BitBuffer3 {
    /// Create a new bit buffer filled with the given value.
    pub fn new_filled(width: usize, height: usize, depth: usize, value: bool) -> Self {
        let len = width * height * depth;
        let mut buf = Self {
            words: vec![0u64; len.div_ceil(BITS_PER_WORD)],
            width,
            height,
            depth,
            len,
        };
        buf.fill(value);
        buf
    }

    /// Create a new bit buffer with all bits cleared.
    #[inline]
    pub fn new_default(width: usize, height: usize, depth: usize) -> Self {
        Self::new_filled(width, height, depth, false)
    }

    /// Create a bit buffer from a slice of booleans in linear order.
    pub fn from_slice(width: usize, height: usize, depth: usize, data: &[bool]) -> Self {
        let len = width * height * depth;
        assert_eq!(
            data.len(),
            len,
            "data length {} does not match dimensions {}x{}x{}={}",
            data.len(),
            width,
            height,
            depth,
            len
        );

        let mut words = vec![0u64; len.div_ceil(BITS_PER_WORD)];
        for (i, &value) in data.iter().enumerate() {
            if value {
                words[i / BITS_PER_WORD] |= 1u64 << (i % BITS_PER_WORD);
            }
        }

        Self {
            words,
            width,
            height,
            depth,
            len,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Linear index of voxel (x, y, z).
    #[inline]
    pub fn index_of(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len);
        (self.words[idx / BITS_PER_WORD] >> (idx % BITS_PER_WORD)) & 1 != 0
    }

    #[inline]
    pub fn set(&mut self, idx: usize, value: bool) {
        debug_assert!(idx < self.len);
        let bit = 1u64 << (idx % BITS_PER_WORD);
        let word = &mut self.words[idx / BITS_PER_WORD];
        if value {
            *word |= bit;
        } else {
            *word &= !bit;
        }
    }

    #[inline]
    pub fn get_xyz(&self, x: usize, y: usize, z: usize) -> bool {
        debug_assert!(x < self.width && y < self.height && z < self.depth);
        self.get(self.index_of(x, y, z))
    }

    #[inline]
    pub fn set_xyz(&mut self, x: usize, y: usize, z: usize, value: bool) {
        debug_assert!(x < self.width && y < self.height && z < self.depth);
        let idx = self.index_of(x, y, z);
        self.set(idx, value);
    }

    pub fn fill(&mut self, value: bool) {
        let fill = if value { !0u64 } else { 0u64 };
        self.words.fill(fill);
        self.clear_tail();
    }

    /// In-place union with another mask of the same shape.
    pub fn or_assign(&mut self, other: &Self) {
        self.assert_same_shape(other);
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
    }

    /// In-place intersection with another mask of the same shape.
    pub fn and_assign(&mut self, other: &Self) {
        self.assert_same_shape(other);
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= *b;
        }
    }

    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    #[inline]
    pub fn copy_from(&mut self, other: &Self) {
        self.assert_same_shape(other);
        self.words.copy_from_slice(&other.words);
    }

    #[inline]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[inline]
    pub fn iter(&self) -> BitIter<'_> {
        BitIter {
            buffer: self,
            idx: 0,
        }
    }

    /// Iterate over linear indices of set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(w * BITS_PER_WORD + tz)
            })
        })
    }

    fn assert_same_shape(&self, other: &Self) {
        assert_eq!(self.width, other.width, "width mismatch");
        assert_eq!(self.height, other.height, "height mismatch");
        assert_eq!(self.depth, other.depth, "depth mismatch");
    }

    fn clear_tail(&mut self) {
        let rem = self.len % BITS_PER_WORD;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

impl Index<usize> for BitBuffer3 {
    type Output = bool;

    #[inline]
    fn index(&self, idx: usize) -> &Self::Output {
        if self.get(idx) { &true } else { &false }
    }
}

impl Index<(usize, usize, usize)> for BitBuffer3 {
    type Output = bool;

    #[inline]
    fn index(&self, (x, y, z): (usize, usize, usize)) -> &Self::Output {
        if self.get_xyz(x, y, z) { &true } else { &false }
    }
}

impl From<&BitBuffer3> for Vec<bool> {
    #[inline]
    fn from(buf: &BitBuffer3) -> Self {
        buf.iter().collect()
    }
}

pub struct BitIter<'a> {
    buffer: &'a BitBuffer3,
    idx: usize,
}

impl Iterator for BitIter<'_> {
    type Item = bool;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx < self.buffer.len {
            let value = self.buffer.get(self.idx);
            self.idx += 1;
            Some(value)
        } else {
            None
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.buffer.len - self.idx;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BitIter<'_> {}
