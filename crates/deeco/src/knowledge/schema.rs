use core::fmt;

use crate::{
    ComponentType,
    knowledge::{Knowledge, Layout},
};

/// What a node knows about a record type without holding a value of it.
///
/// A node's table of schemas is usually a `static`:
///
/// ```rust
/// # deeco::knowledge! {
/// #     #[component_type(deeco::ComponentType(1))]
/// #     #[derive(Clone, Copy)]
/// #     pub struct Sensor { group { pub v: f32 } }
/// # }
/// use deeco::Schema;
///
/// static SCHEMAS: &[Schema] = &[Schema::of::<Sensor>()];
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub ty: ComponentType,
    pub size: usize,
    pub groups: &'static [usize],
}

/// Why a byte range may not be applied to a record.
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    Empty,
    OutOfBounds,
    StraddlesGroup,
}

/// Lookup of schemas by type.
pub trait Schemas {
    fn schema(&self, ty: ComponentType) -> Option<&Schema>;
}

// ---- impls ----

impl Schema {
    pub const fn of<K: Knowledge>() -> Self {
        Self {
            ty: K::TYPE,
            size: K::SIZE,
            groups: K::GROUPS,
        }
    }

    /// Check that `offset..offset + size` covers whole field groups only.
    ///
    /// The range may cover one group, several adjacent groups or the whole
    /// record, but must start and end on group boundaries.
    pub fn check(&self, offset: usize, size: usize) -> Result<(), RangeError> {
        if size == 0 {
            return Err(RangeError::Empty);
        }
        let end = offset.checked_add(size).ok_or(RangeError::OutOfBounds)?;
        if end > self.size {
            return Err(RangeError::OutOfBounds);
        }
        if self.is_boundary(offset) && self.is_boundary(end) {
            Ok(())
        } else {
            Err(RangeError::StraddlesGroup)
        }
    }

    /// Iterate `(offset, size)` of every field group.
    pub fn group_ranges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.groups.iter().scan(0usize, |at, &size| {
            let start = *at;
            *at += size;
            Some((start, size))
        })
    }

    fn is_boundary(&self, at: usize) -> bool {
        if at == 0 || at == self.size {
            return true;
        }
        self.group_ranges().any(|(start, _)| start == at)
    }
}

impl Schemas for [Schema] {
    fn schema(&self, ty: ComponentType) -> Option<&Schema> {
        self.iter().find(|s| s.ty == ty)
    }
}

impl<const N: usize> Schemas for [Schema; N] {
    fn schema(&self, ty: ComponentType) -> Option<&Schema> {
        self.as_slice().schema(ty)
    }
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::Empty => f.write_str("empty range"),
            RangeError::OutOfBounds => f.write_str("range past end of record"),
            RangeError::StraddlesGroup => f.write_str("range splits a field group"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{RangeError, Schema};
    use crate::ComponentType;

    // 64 bytes, one boundary at 32.
    const HALVES: Schema = Schema {
        ty: ComponentType(9),
        size: 64,
        groups: &[32, 32],
    };

    #[test]
    fn whole_groups_are_accepted() {
        assert_eq!(HALVES.check(0, 32), Ok(()));
        assert_eq!(HALVES.check(32, 32), Ok(()));
        assert_eq!(HALVES.check(0, 64), Ok(()));
    }

    #[test]
    fn straddling_and_partial_ranges_are_rejected() {
        assert_eq!(HALVES.check(16, 32), Err(RangeError::StraddlesGroup));
        assert_eq!(HALVES.check(0, 16), Err(RangeError::StraddlesGroup));
        assert_eq!(HALVES.check(40, 24), Err(RangeError::StraddlesGroup));
    }

    #[test]
    fn bounds_are_enforced() {
        assert_eq!(HALVES.check(32, 33), Err(RangeError::OutOfBounds));
        assert_eq!(HALVES.check(usize::MAX, 2), Err(RangeError::OutOfBounds));
        assert_eq!(HALVES.check(0, 0), Err(RangeError::Empty));
    }

    #[test]
    fn group_ranges_walk_the_record() {
        let s = Schema {
            ty: ComponentType(1),
            size: 13,
            groups: &[4, 8, 1],
        };
        let mut it = s.group_ranges();
        assert_eq!(it.next(), Some((0, 4)));
        assert_eq!(it.next(), Some((4, 8)));
        assert_eq!(it.next(), Some((12, 1)));
        assert_eq!(it.next(), None);
    }
}
