//! Knowledge records
//!
//! A knowledge record is the complete, authoritative state of one component.
//! Its type is static and shared by every node that holds it: same size, same
//! byte layout (see [`Layout`]), no versioning.
//!
//! Records are split into **field groups**: consecutive runs of fields that
//! must always change together. A remote node only ever applies whole groups
//! (one, several, or the full record), so it can never observe, say, a new
//! latitude paired with an old longitude. Groups are declared next to the
//! fields with the [`knowledge!`](crate::knowledge!) macro:
//!
//! ```rust
//! use deeco::{ComponentType, Knowledge, Layout};
//!
//! deeco::layout! {
//!     #[derive(Clone, Copy, Debug, Default, PartialEq)]
//!     pub struct Position {
//!         pub lat: f32,
//!         pub lon: f32,
//!     }
//! }
//!
//! deeco::knowledge! {
//!     #[component_type(ComponentType(0x0000_0001))]
//!     #[derive(Clone, Copy, Debug, Default, PartialEq)]
//!     pub struct Thermometer {
//!         group {
//!             pub temperature: f32,
//!             pub humidity: f32,
//!         }
//!         group {
//!             pub position: Position,
//!         }
//!     }
//! }
//!
//! assert_eq!(Thermometer::SIZE, 16);
//! assert_eq!(Thermometer::GROUPS, &[8, 8]);
//! ```

mod layout;
mod schema;

use core::fmt;

pub use layout::Layout;
pub use schema::{RangeError, Schema, Schemas};

use crate::ComponentType;

/// A component's state record.
pub trait Knowledge: Layout + Copy {
    /// The role this record describes. One record type per role.
    const TYPE: ComponentType;

    /// Byte size of each atomic field group, in field order.
    ///
    /// The groups partition the record, so they sum to [`Layout::SIZE`].
    const GROUPS: &'static [usize];

    /// The record's image in the wire layout.
    fn to_bytes<const S: usize>(&self) -> Option<[u8; S]> {
        if Self::SIZE > S {
            return None;
        }
        let mut out = [0u8; S];
        self.write_to(&mut out[..Self::SIZE]);
        Some(out)
    }
}

/// Names one field of a record of type `K`.
///
/// Tasks write their result through a `Field`, triggered tasks watch one, and
/// ensembles use them to address the coordinator's aggregate and the
/// member's mapped value. Build them with [`field!`](crate::field!).
pub struct Field<K, T> {
    get: fn(&K) -> &T,
    get_mut: fn(&mut K) -> &mut T,
}

impl<K, T> Field<K, T> {
    pub const fn new(get: fn(&K) -> &T, get_mut: fn(&mut K) -> &mut T) -> Self {
        Self { get, get_mut }
    }

    #[inline]
    pub fn get<'k>(&self, k: &'k K) -> &'k T {
        (self.get)(k)
    }

    #[inline]
    pub fn get_mut<'k>(&self, k: &'k mut K) -> &'k mut T {
        (self.get_mut)(k)
    }

    #[inline]
    pub fn set(&self, k: &mut K, value: T) {
        *(self.get_mut)(k) = value;
    }
}

impl<K, T> Clone for Field<K, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, T> Copy for Field<K, T> {}

impl<K, T> fmt::Debug for Field<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Field")
    }
}

/// Build a [`Field`] for `Record, path.to.field`.
///
/// ```rust
/// # deeco::layout! {
/// #     #[derive(Clone, Copy)]
/// #     pub struct Pos { pub x: i32, pub y: i32 }
/// # }
/// # deeco::knowledge! {
/// #     #[component_type(deeco::ComponentType(7))]
/// #     #[derive(Clone, Copy)]
/// #     pub struct Robot { group { pub pos: Pos } }
/// # }
/// let x = deeco::field!(Robot, pos.x);
/// let mut r = Robot { pos: Pos { x: 1, y: 2 } };
/// x.set(&mut r, 5);
/// assert_eq!(r.pos.x, 5);
/// ```
#[macro_export]
macro_rules! field {
    ($knowledge:ty, $($path:ident).+) => {
        $crate::knowledge::Field::<$knowledge, _>::new(
            |k: &$knowledge| &k.$($path).+,
            |k: &mut $knowledge| &mut k.$($path).+,
        )
    };
}

/// Declare a knowledge record as an ordered list of field groups.
///
/// See the [module docs](crate::knowledge) for an example.
#[macro_export]
macro_rules! knowledge {
    (
        #[component_type($ty:expr)]
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                group {
                    $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $fty:ty ),+ $(,)?
                }
            )+
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $( $(#[$fmeta])* $fvis $field: $fty, )+ )+
        }

        $crate::__layout_impl!($name { $( $($field : $fty),+ ),+ });

        impl $crate::knowledge::Knowledge for $name {
            const TYPE: $crate::ComponentType = $ty;
            const GROUPS: &'static [usize] = &[
                $( 0 $( + <$fty as $crate::knowledge::Layout>::SIZE )+ ),+
            ];
        }
    };
}
