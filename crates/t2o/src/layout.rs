//! Tensor layout helpers.
//!
//! A [`Layout`] names the axis ordering a tensor is stored in (`source`) and
//! the ordering the emitted graph expects (`target`), e.g. `NHWC -> NCHW`.
//! Layouts are immutable values; the inverse conversion is described by a new
//! layout with both sides swapped.

use std::fmt;

use smallvec::SmallVec;

/// Compact representation of an axis permutation.
pub type Axes = SmallVec<[usize; 4]>;

/// Permutation between two orderings of the same axis labels.
///
/// `perm[i]` is the position in `source` of the `i`-th axis of `target`, so
/// the transformed shape is `[shape[perm[0]], shape[perm[1]], ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    source: SmallVec<[char; 5]>,
    target: SmallVec<[char; 5]>,
    perm: Axes,
}

impl Layout {
    /// Builds a layout from two axis-label strings such as `"NHWC"` and `"NCHW"`.
    ///
    /// Panics if the label sequences differ in length or are not permutations
    /// of each other.
    pub fn new(source: &str, target: &str) -> Self {
        Self::try_new(source, target).unwrap_or_else(|reason| panic!("{reason}"))
    }

    /// Fallible variant of [`Layout::new`] for labels that come from user input.
    pub fn try_new(source: &str, target: &str) -> Result<Self, String> {
        let source: SmallVec<[char; 5]> = source.chars().collect();
        let target: SmallVec<[char; 5]> = target.chars().collect();
        if source.len() != target.len() {
            return Err(format!("layout {source:?} -> {target:?} has mismatched ranks"));
        }
        let mut perm = Axes::with_capacity(target.len());
        for (pos, label) in target.iter().enumerate() {
            if target[..pos].contains(label) {
                return Err(format!("axis {label:?} repeated in layout target {target:?}"));
            }
            let axis = source
                .iter()
                .position(|candidate| candidate == label)
                .ok_or_else(|| format!("axis {label:?} missing from layout source {source:?}"))?;
            perm.push(axis);
        }
        Ok(Layout {
            source,
            target,
            perm,
        })
    }

    pub fn source(&self) -> String {
        self.source.iter().collect()
    }

    pub fn target(&self) -> String {
        self.target.iter().collect()
    }

    pub fn rank(&self) -> usize {
        self.perm.len()
    }

    /// Axis permutation from `source` ordering to `target` ordering.
    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    /// Returns `true` when the conversion is a no-op.
    pub fn is_match(&self) -> bool {
        self.source == self.target
    }

    /// Layout describing the opposite conversion (`target -> source`).
    pub fn inverse(&self) -> Layout {
        let mut perm = Axes::from_elem(0, self.perm.len());
        for (dst, &src) in self.perm.iter().enumerate() {
            perm[src] = dst;
        }
        Layout {
            source: self.target.clone(),
            target: self.source.clone(),
            perm,
        }
    }

    /// Reorders a shape-like sequence (dimensions, or the values of a shape tensor).
    pub fn transform<T: Copy>(&self, shape: &[T]) -> Vec<T> {
        assert_eq!(
            shape.len(),
            self.rank(),
            "cannot apply rank-{} layout {} to a rank-{} shape",
            self.rank(),
            self,
            shape.len()
        );
        self.perm.iter().map(|&axis| shape[axis]).collect()
    }

    /// Permutes a dense row-major buffer of the given `shape` into the target ordering.
    ///
    /// Equivalent to reshaping `data` to `shape`, transposing by [`Layout::perm`]
    /// and flattening the result.
    pub fn transform_data<T: Copy>(&self, data: &[T], shape: &[usize]) -> Vec<T> {
        let out_shape = self.transform(shape);
        let count: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            count,
            "buffer of {} elements does not match shape {:?}",
            data.len(),
            shape
        );
        if count == 0 {
            return Vec::new();
        }

        let strides = row_major_strides(shape);
        // Stride in the source buffer when stepping along each output axis.
        let out_strides: Vec<usize> = self.perm.iter().map(|&axis| strides[axis]).collect();

        let mut out = Vec::with_capacity(count);
        let mut index = vec![0usize; out_shape.len()];
        let mut offset = 0usize;
        for _ in 0..count {
            out.push(data[offset]);
            for axis in (0..out_shape.len()).rev() {
                index[axis] += 1;
                offset += out_strides[axis];
                if index[axis] < out_shape[axis] {
                    break;
                }
                offset -= out_strides[axis] * out_shape[axis];
                index[axis] = 0;
            }
        }
        out
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source(), self.target())
    }
}

fn row_major_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![0usize; dims.len()];
    let mut stride = 1usize;
    for axis in (0..dims.len()).rev() {
        strides[axis] = stride;
        stride *= dims[axis];
    }
    strides
}
