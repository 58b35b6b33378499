//! Dense row-major matrix of `f64`.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::partition::RowRange;
use crate::transform::apply_rows;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Fill every cell from a pure function of `(row, column)`.
    pub fn from_fn(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Matrix { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    fn check_range(&self, range: RowRange) -> Result<()> {
        if range.low > range.high || range.high > self.rows {
            return Err(Error::OutOfBounds {
                range,
                rows: self.rows,
            });
        }
        Ok(())
    }

    /// The contiguous values of rows `range`.
    pub fn row_slice(&self, range: RowRange) -> Result<&[f64]> {
        self.check_range(range)?;
        Ok(&self.data[range.elements(self.cols)])
    }

    pub fn row_slice_mut(&mut self, range: RowRange) -> Result<&mut [f64]> {
        self.check_range(range)?;
        let span = range.elements(self.cols);
        Ok(&mut self.data[span])
    }

    /// Copy `values` into rows `range`.
    pub fn write_rows(&mut self, range: RowRange, values: &[f64]) -> Result<()> {
        let expected = range.len().checked_mul(self.cols).ok_or(Error::OutOfBounds {
            range,
            rows: self.rows,
        })?;
        if values.len() != expected {
            return Err(Error::SliceLength {
                range,
                expected,
                actual: values.len(),
            });
        }
        self.row_slice_mut(range)?.copy_from_slice(values);
        Ok(())
    }

    /// Sequential reference: apply `f` to every cell.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Matrix {
        let mut out = Matrix::zeros(self.rows, self.cols);
        apply_rows(&self.data, &mut out.data, f);
        out
    }

    /// Apply `f` to every cell, one rayon task per row.
    pub fn par_map(&self, f: impl Fn(f64) -> f64 + Sync) -> Matrix {
        let mut out = Matrix::zeros(self.rows, self.cols);
        if self.cols == 0 {
            return out;
        }

        out.data
            .par_chunks_mut(self.cols)
            .zip(self.data.par_chunks(self.cols))
            .for_each(|(dst, src)| apply_rows(src, dst, &f));
        out
    }

    pub fn checksum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// First cell where `self` and `other` differ bit-for-bit, if any.
    pub fn first_difference(&self, other: &Matrix) -> Option<(usize, usize)> {
        if self.rows != other.rows || self.cols != other.cols {
            return Some((0, 0));
        }
        self.data
            .iter()
            .zip(&other.data)
            .position(|(a, b)| a.to_bits() != b.to_bits())
            .map(|idx| (idx / self.cols, idx % self.cols))
    }
}
