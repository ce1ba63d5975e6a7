//! Layout-conversion operator. Only ever synthesized by rewrites.

use crate::layout::Axes;
use crate::target::{AttributeValue, Node};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransposeAttrs {
    pub perm: Axes,
}

impl TransposeAttrs {
    pub fn new(perm: &[usize]) -> Self {
        TransposeAttrs {
            perm: perm.iter().copied().collect(),
        }
    }
}

pub(crate) fn attributes(attrs: &TransposeAttrs, node: Node) -> Node {
    let perm = attrs.perm.iter().map(|&axis| axis as i64).collect();
    node.with_attr("perm", AttributeValue::Ints(perm))
}
