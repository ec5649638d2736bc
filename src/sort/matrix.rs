//! Sorted-matrix operations
//!
//! A sorted matrix is non-decreasing along every row and every column. After the row
//! sort, a transpose and the column sort, the grid is one; each cell then finds its
//! rank by walking the staircase between smaller and larger cells.

use super::SortOrder;

/// The eight symmetries of a square, applied to a `rows × cols` grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SquareSymmetry {
    Identity,
    /// Clockwise quarter turn
    Rotate90,
    Rotate180,
    Rotate270,
    /// Mirror columns
    FlipHorizontal,
    /// Mirror rows
    FlipVertical,
    Transpose,
    AntiTranspose,
}

/// `dst = offset + row * row_stride + col * col_stride`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRemap {
    pub offset: i64,
    pub row_stride: i64,
    pub col_stride: i64,
}

impl IndexRemap {
    pub fn apply(&self, row: u32, col: u32) -> usize {
        (self.offset + row as i64 * self.row_stride + col as i64 * self.col_stride) as usize
    }
}

impl SquareSymmetry {
    pub const ALL: [SquareSymmetry; 8] = [
        SquareSymmetry::Identity,
        SquareSymmetry::Rotate90,
        SquareSymmetry::Rotate180,
        SquareSymmetry::Rotate270,
        SquareSymmetry::FlipHorizontal,
        SquareSymmetry::FlipVertical,
        SquareSymmetry::Transpose,
        SquareSymmetry::AntiTranspose,
    ];

    pub fn index(self) -> u32 {
        Self::ALL.iter().position(|&s| s == self).unwrap_or(0) as u32
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Whether rows and columns trade places
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            SquareSymmetry::Rotate90
                | SquareSymmetry::Rotate270
                | SquareSymmetry::Transpose
                | SquareSymmetry::AntiTranspose
        )
    }

    /// `(rows, cols)` of the output
    pub fn output_shape(self, rows: u32, cols: u32) -> (u32, u32) {
        if self.swaps_axes() {
            (cols, rows)
        } else {
            (rows, cols)
        }
    }

    /// Destination index of each source cell of a row-major `rows × cols` grid
    pub fn remap(self, rows: u32, cols: u32) -> IndexRemap {
        let (r, c) = (rows as i64, cols as i64);
        let (offset, row_stride, col_stride) = match self {
            SquareSymmetry::Identity => (0, c, 1),
            SquareSymmetry::Rotate90 => (r - 1, -1, r),
            SquareSymmetry::Rotate180 => (r * c - 1, -c, -1),
            SquareSymmetry::Rotate270 => ((c - 1) * r, 1, -r),
            SquareSymmetry::FlipHorizontal => (c - 1, c, -1),
            SquareSymmetry::FlipVertical => ((r - 1) * c, -c, 1),
            SquareSymmetry::Transpose => (0, 1, r),
            SquareSymmetry::AntiTranspose => (c * r - 1, -1, -r),
        };
        IndexRemap {
            offset,
            row_stride,
            col_stride,
        }
    }

    /// Apply to a whole grid
    pub fn apply<T: Copy + Default>(self, data: &[T], rows: u32, cols: u32) -> Vec<T> {
        let remap = self.remap(rows, cols);
        let mut out = vec![T::default(); data.len()];
        for row in 0..rows {
            for col in 0..cols {
                out[remap.apply(row, col)] = data[(row * cols + col) as usize];
            }
        }
        out
    }
}

/// Whether `keys` is a sorted matrix of shape `rows × cols`
pub fn is_sorted_matrix(keys: &[u32], rows: u32, cols: u32) -> bool {
    let at = |r: u32, c: u32| keys[(r * cols + c) as usize];
    (0..rows).all(|r| (1..cols).all(|c| at(r, c - 1) <= at(r, c)))
        && (0..cols).all(|c| (1..rows).all(|r| at(r - 1, c) <= at(r, c)))
}

/// Rank of cell `(row, col)` among all cells, ordered by `(key, row, col)`
///
/// Rows above contribute their cells `<= key`, rows below their cells `< key`, and the
/// cell's own row exactly `col` cells. Both walks only move one way, so the cost is
/// `O(rows + cols)`.
pub fn staircase_rank(keys: &[u32], rows: u32, cols: u32, row: u32, col: u32) -> u32 {
    let at = |r: u32, c: u32| keys[(r * cols + c) as usize];
    let key = at(row, col);
    let mut rank = col;

    // the cell above is <= key, so at least col + 1 cells of that row qualify
    let mut p = col + 1;
    for r in (0..row).rev() {
        while p < cols && at(r, p) <= key {
            p += 1;
        }
        rank += p;
    }

    // the cell below is >= key, so at most col cells of that row qualify
    let mut q = col;
    for r in row + 1..rows {
        while q > 0 && at(r, q - 1) >= key {
            q -= 1;
        }
        rank += q;
    }
    rank
}

/// Final placement: every cell with rank below `count` is written to its position
///
/// Returns `(keys, values)` of length `count` in the requested order.
pub fn place_sorted_matrix(
    keys: &[u32],
    values: &[u32],
    rows: u32,
    cols: u32,
    count: u32,
    order: SortOrder,
) -> (Vec<u32>, Vec<u32>) {
    let mut out_keys = vec![0; count as usize];
    let mut out_values = vec![0; count as usize];
    for row in 0..rows {
        for col in 0..cols {
            let rank = staircase_rank(keys, rows, cols, row, col);
            if rank < count {
                let pos = order.position(rank, count) as usize;
                let cell = (row * cols + col) as usize;
                out_keys[pos] = keys[cell];
                out_values[pos] = values[cell];
            }
        }
    }
    (out_keys, out_values)
}
