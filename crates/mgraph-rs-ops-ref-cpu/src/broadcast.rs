//! Shape alignment and expansion for binary elementwise kernels.

use std::borrow::Cow;

use mgraph_rs::error::{Error, Result};

/// Both operands padded to the output rank, plus the output dims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPlan {
    pub out_dims: Vec<usize>,
    pub x_dims: Vec<usize>,
    pub y_dims: Vec<usize>,
}

impl BroadcastPlan {
    /// Aligns `x` and `y` and computes the broadcast shape.
    ///
    /// With `axis == -1` the operands are aligned on their trailing dimensions. Otherwise
    /// the lower-rank operand is placed so that its first dimension lines up with dimension
    /// `axis` of the higher-rank one. Equal ranks ignore `axis`. Aligned dimensions must be
    /// equal or one of them must be 1.
    pub fn new(x: &[usize], y: &[usize], axis: i64) -> Result<Self> {
        let rank = x.len().max(y.len());
        let x_dims = align(x, y, rank, axis)?;
        let y_dims = align(y, x, rank, axis)?;
        let out_dims = x_dims
            .iter()
            .zip(&y_dims)
            .map(|(&a, &b)| match (a, b) {
                _ if a == b => Ok(a),
                (1, _) => Ok(b),
                (_, 1) => Ok(a),
                _ => Err(Error::shape_mismatch(
                    x,
                    y,
                    format!("dimensions {a} and {b} are not broadcastable (axis {axis})"),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BroadcastPlan {
            out_dims,
            x_dims,
            y_dims,
        })
    }

    pub fn out_len(&self) -> usize {
        self.out_dims.iter().product()
    }

    /// Expands `input`, laid out with `in_dims` (one of this plan's aligned dims), to the
    /// output shape. Returns the input untouched when no expansion is needed.
    pub fn expand<'a, T: Copy + Default>(
        &self,
        input: &'a [T],
        in_dims: &[usize],
    ) -> Cow<'a, [T]> {
        if in_dims == self.out_dims.as_slice() {
            return Cow::Borrowed(input);
        }
        let out_len = self.out_len();
        let mut out = vec![T::default(); out_len];
        if out_len > 0 {
            let walk = Walk {
                out_dims: &self.out_dims,
                in_dims,
                out_strides: compute_strides(&self.out_dims),
                in_strides: compute_strides(in_dims),
            };
            walk.fill(&mut out, input, 0, 0, 0);
        }
        Cow::Owned(out)
    }
}

fn align(operand: &[usize], other: &[usize], rank: usize, axis: i64) -> Result<Vec<usize>> {
    if operand.len() == rank {
        return Ok(operand.to_vec());
    }
    let free = rank - operand.len();
    let start = if axis < 0 {
        free
    } else {
        let start = axis as usize;
        if start > free {
            return Err(Error::shape_mismatch(
                other,
                operand,
                format!("axis {axis} leaves no room for a rank-{} operand", operand.len()),
            ));
        }
        start
    };
    let mut aligned = vec![1usize; rank];
    aligned[start..start + operand.len()].copy_from_slice(operand);
    Ok(aligned)
}

fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; dims.len()];
    let mut acc = 1usize;
    for (i, dim) in dims.iter().enumerate().rev() {
        strides[i] = acc;
        acc *= *dim;
    }
    strides
}

struct Walk<'d> {
    out_dims: &'d [usize],
    in_dims: &'d [usize],
    out_strides: Vec<usize>,
    in_strides: Vec<usize>,
}

impl Walk<'_> {
    fn fill<T: Copy>(
        &self,
        out: &mut [T],
        input: &[T],
        axis: usize,
        out_offset: usize,
        in_offset: usize,
    ) {
        if axis >= self.out_dims.len() {
            out[out_offset] = input[in_offset];
            return;
        }
        let block_len: usize = self.out_dims[axis..].iter().product();
        if self.in_dims[axis..] == self.out_dims[axis..] {
            out[out_offset..out_offset + block_len]
                .copy_from_slice(&input[in_offset..in_offset + block_len]);
            return;
        }
        if self.in_dims[axis..].iter().all(|&dim| dim == 1) {
            out[out_offset..out_offset + block_len].fill(input[in_offset]);
            return;
        }
        let in_step = if self.in_dims[axis] == 1 {
            0
        } else {
            self.in_strides[axis]
        };
        for i in 0..self.out_dims[axis] {
            self.fill(
                out,
                input,
                axis + 1,
                out_offset + i * self.out_strides[axis],
                in_offset + i * in_step,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_alignment_by_default() {
        let plan = BroadcastPlan::new(&[2, 3, 4], &[4], -1).unwrap();
        assert_eq!(plan.out_dims, vec![2, 3, 4]);
        assert_eq!(plan.y_dims, vec![1, 1, 4]);
    }

    #[test]
    fn axis_places_lower_rank_operand() {
        let plan = BroadcastPlan::new(&[2, 3, 4], &[3], 1).unwrap();
        assert_eq!(plan.y_dims, vec![1, 3, 1]);

        let y = [10, 20, 30];
        let expanded = plan.expand(&y, &plan.y_dims);
        assert_eq!(&expanded[..4], &[10, 10, 10, 10]);
        assert_eq!(&expanded[4..8], &[20, 20, 20, 20]);
        assert_eq!(expanded.len(), 24);
    }

    #[test]
    fn both_operands_may_expand() {
        let plan = BroadcastPlan::new(&[3, 1], &[1, 2], -1).unwrap();
        assert_eq!(plan.out_dims, vec![3, 2]);
        let x = plan.expand(&[1, 2, 3], &plan.x_dims);
        let y = plan.expand(&[7, 8], &plan.y_dims);
        assert_eq!(&*x, &[1, 1, 2, 2, 3, 3]);
        assert_eq!(&*y, &[7, 8, 7, 8, 7, 8]);
    }

    #[test]
    fn incompatible_dims_are_rejected() {
        assert!(matches!(
            BroadcastPlan::new(&[2, 3], &[4], -1),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            BroadcastPlan::new(&[2, 3], &[3], 2),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn equal_shapes_borrow_input() {
        let plan = BroadcastPlan::new(&[1, 1, 6, 6], &[1, 1, 6, 6], -1).unwrap();
        let data = vec![0.5f32; 36];
        assert!(matches!(plan.expand(&data, &plan.x_dims), Cow::Borrowed(_)));
    }
}
