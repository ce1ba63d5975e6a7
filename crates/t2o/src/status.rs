//! Lifecycle shared by tensors and operators.

/// Conversion progress of a tensor or operator.
///
/// Transitions only move forward: `Inited -> Parsed -> [Transformed] -> Converted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Status {
    #[default]
    Inited,
    Parsed,
    Transformed,
    Converted,
}

impl Status {
    pub fn is_parsed(self) -> bool {
        self >= Status::Parsed
    }

    pub fn is_transformed(self) -> bool {
        self >= Status::Transformed
    }

    pub fn is_converted(self) -> bool {
        self == Status::Converted
    }

    /// Moves to `next`, panicking on a backwards transition.
    pub(crate) fn advance(&mut self, next: Status) {
        assert!(
            next >= *self,
            "illegal lifecycle transition {:?} -> {:?}",
            self,
            next
        );
        *self = next;
    }
}
