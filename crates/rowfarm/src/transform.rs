//! Input generators and elementwise transforms.

use std::fmt;

use clap::ValueEnum;

/// Deterministic input content, a pure function of `(row, column)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Generator {
    /// value(i, j) = i * j
    #[default]
    Product,
    /// value(i, j) = i + j
    Sum,
}

impl Generator {
    pub fn value(self, row: usize, col: usize) -> f64 {
        match self {
            Generator::Product => (row * col) as f64,
            Generator::Sum => (row + col) as f64,
        }
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generator::Product => write!(f, "i*j"),
            Generator::Sum => write!(f, "i+j"),
        }
    }
}

/// Side-effect-free scalar function applied to every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Transform {
    /// Square root
    #[default]
    Sqrt,
    /// Cube root
    Cbrt,
    /// x * x
    Square,
    /// Leave values unchanged
    Identity,
}

fn square(x: f64) -> f64 {
    x * x
}

fn identity(x: f64) -> f64 {
    x
}

impl Transform {
    pub fn function(self) -> fn(f64) -> f64 {
        match self {
            Transform::Sqrt => f64::sqrt,
            Transform::Cbrt => f64::cbrt,
            Transform::Square => square,
            Transform::Identity => identity,
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Sqrt => write!(f, "sqrt"),
            Transform::Cbrt => write!(f, "cbrt"),
            Transform::Square => write!(f, "square"),
            Transform::Identity => write!(f, "identity"),
        }
    }
}

/// Write `f(input[k])` into `output[k]` for every `k`.
///
/// Every code path (reference, master share, worker) goes through here, so
/// distributed and sequential runs produce bit-identical cells.
pub fn apply_rows(input: &[f64], output: &mut [f64], f: impl Fn(f64) -> f64) {
    debug_assert_eq!(input.len(), output.len());
    for (dst, &src) in output.iter_mut().zip(input) {
        *dst = f(src);
    }
}

/// In-place variant used by workers on the slice they own.
pub fn apply_in_place(values: &mut [f64], f: impl Fn(f64) -> f64) {
    for v in values.iter_mut() {
        *v = f(*v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generators() {
        assert_eq!(Generator::Product.value(3, 4), 12.0);
        assert_eq!(Generator::Sum.value(3, 4), 7.0);
        assert_eq!(Generator::Product.value(0, 8191), 0.0);
    }

    #[test]
    fn test_transforms() {
        assert_eq!(Transform::Sqrt.function()(16.0), 4.0);
        assert_eq!(Transform::Cbrt.function()(27.0), 3.0);
        assert_eq!(Transform::Square.function()(3.0), 9.0);
        assert_eq!(Transform::Identity.function()(2.5), 2.5);
    }

    #[test]
    fn test_in_place_matches_copying() {
        let input: Vec<f64> = (0..50).map(|x| x as f64 * 1.5).collect();
        let mut copied = vec![0.0; input.len()];
        apply_rows(&input, &mut copied, f64::sqrt);

        let mut in_place = input.clone();
        apply_in_place(&mut in_place, f64::sqrt);
        assert_eq!(copied, in_place);
    }
}
