//! Fixed byte layout of knowledge records.
//!
//! Every node holding a record of some type must agree on its bytes, so the
//! layout is spelled out here rather than left to the compiler: fields are
//! laid out in declaration order, without padding, multi-byte scalars in
//! little endian.

use crate::ComponentId;

/// A value with a fixed, platform independent byte image.
///
/// `write_to` and `read_from` are always handed a slice of exactly
/// [`Layout::SIZE`] bytes.
pub trait Layout: Sized {
    const SIZE: usize;

    fn write_to(&self, out: &mut [u8]);
    fn read_from(inp: &[u8]) -> Self;
}

macro_rules! scalar_layout {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Layout for $ty {
                const SIZE: usize = core::mem::size_of::<$ty>();

                #[inline]
                fn write_to(&self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_from(inp: &[u8]) -> Self {
                    let mut raw = [0u8; core::mem::size_of::<$ty>()];
                    raw.copy_from_slice(inp);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

scalar_layout!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Layout for bool {
    const SIZE: usize = 1;

    #[inline]
    fn write_to(&self, out: &mut [u8]) {
        out[0] = *self as u8;
    }

    // Any non-zero byte reads as `true`; a remote node is not trusted to
    // send canonical booleans.
    #[inline]
    fn read_from(inp: &[u8]) -> Self {
        inp[0] != 0
    }
}

impl Layout for ComponentId {
    const SIZE: usize = 4;

    #[inline]
    fn write_to(&self, out: &mut [u8]) {
        self.0.write_to(out)
    }

    #[inline]
    fn read_from(inp: &[u8]) -> Self {
        Self(u32::read_from(inp))
    }
}

impl<T: Layout, const N: usize> Layout for [T; N] {
    const SIZE: usize = T::SIZE * N;

    fn write_to(&self, out: &mut [u8]) {
        for (item, chunk) in self.iter().zip(out.chunks_exact_mut(T::SIZE.max(1))) {
            item.write_to(chunk);
        }
    }

    fn read_from(inp: &[u8]) -> Self {
        core::array::from_fn(|i| T::read_from(&inp[i * T::SIZE..(i + 1) * T::SIZE]))
    }
}

/// Declare a plain struct and derive its [`Layout`] from the field order.
///
/// ```rust
/// deeco::layout! {
///     #[derive(Clone, Copy, Debug, Default, PartialEq)]
///     pub struct Position {
///         pub lat: f32,
///         pub lon: f32,
///     }
/// }
///
/// use deeco::Layout;
/// assert_eq!(Position::SIZE, 8);
/// ```
#[macro_export]
macro_rules! layout {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $fty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $fty, )*
        }

        $crate::__layout_impl!($name { $($field : $fty),* });
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __layout_impl {
    ($name:ident { $($field:ident : $fty:ty),* }) => {
        impl $crate::knowledge::Layout for $name {
            const SIZE: usize = 0 $( + <$fty as $crate::knowledge::Layout>::SIZE )*;

            #[allow(unused_assignments, unused_variables, unused_mut)]
            fn write_to(&self, out: &mut [u8]) {
                let mut at = 0usize;
                $(
                    let end = at + <$fty as $crate::knowledge::Layout>::SIZE;
                    $crate::knowledge::Layout::write_to(&self.$field, &mut out[at..end]);
                    at = end;
                )*
            }

            #[allow(unused_assignments, unused_variables, unused_mut)]
            fn read_from(inp: &[u8]) -> Self {
                let mut at = 0usize;
                $(
                    let end = at + <$fty as $crate::knowledge::Layout>::SIZE;
                    let $field = <$fty as $crate::knowledge::Layout>::read_from(&inp[at..end]);
                    at = end;
                )*
                Self { $($field),* }
            }
        }
    };
}
