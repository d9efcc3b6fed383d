use core::{
    cmp::{Ordering, PartialEq, PartialOrd},
    ops::{Add, Div, Mul, Neg, Rem, Sub},
};
use num_traits::float::FloatCore;

macro_rules! impl_binop {
    ($for:ty, $is:ty, $op:ident, $func_name:ident) => {
        impl<T: Into<$for>> $op<T> for $for {
            type Output = Self;

            #[inline]
            fn $func_name(self, other: T) -> Self {
                Self(
                    $op::$func_name(<$is>::from_bits(self.0), <$is>::from_bits(other.into().0))
                        .to_bits(),
                )
            }
        }
    };
}

macro_rules! float {
    (
        $( #[$docs:meta] )*
        struct $for:ident($rep:ty as $is:ty, #sign = $sign_bit:expr, #canon = $canon_nan:expr, #payload = $payload_mask:expr);
    ) => {
        $(#[$docs])*
        #[derive(Copy, Clone)]
        pub struct $for($rep);

        impl_binop!($for, $is, Add, add);
        impl_binop!($for, $is, Sub, sub);
        impl_binop!($for, $is, Mul, mul);
        impl_binop!($for, $is, Div, div);
        impl_binop!($for, $is, Rem, rem);

        impl $for {
            #[inline]
            pub fn from_bits(other: $rep) -> Self {
                $for(other)
            }

            #[inline]
            pub fn to_bits(self) -> $rep {
                self.0
            }

            #[inline]
            pub fn from_float(fl: $is) -> Self {
                fl.into()
            }

            #[inline]
            pub fn to_float(self) -> $is {
                self.into()
            }

            #[inline]
            pub fn is_nan(self) -> bool {
                self.to_float().is_nan()
            }

            /// Whether this value is the single canonical NaN: sign bit either way,
            /// exponent all ones, and a payload of exactly the top mantissa bit set.
            #[inline]
            pub fn is_canonical_nan(self) -> bool {
                (self.0 & !$sign_bit) == $canon_nan
            }

            /// Whether this value is an arithmetic NaN: any NaN whose payload has the
            /// top (quiet) bit set. Every canonical NaN is also an arithmetic NaN.
            #[inline]
            pub fn is_arithmetic_nan(self) -> bool {
                self.is_nan() && (self.0 & $payload_mask) != 0
            }

            #[must_use]
            #[inline]
            pub fn abs(self) -> Self {
                $for(self.0 & !$sign_bit)
            }

            #[must_use]
            #[inline]
            pub fn fract(self) -> Self {
                FloatCore::fract(self.to_float()).into()
            }

            #[must_use]
            #[inline]
            pub fn min(self, other: Self) -> Self {
                Self::from(self.to_float().min(other.to_float()))
            }

            #[must_use]
            #[inline]
            pub fn max(self, other: Self) -> Self {
                Self::from(self.to_float().max(other.to_float()))
            }
        }

        impl From<$is> for $for {
            #[inline]
            fn from(other: $is) -> $for {
                $for(other.to_bits())
            }
        }

        impl From<$for> for $is {
            #[inline]
            fn from(other: $for) -> $is {
                <$is>::from_bits(other.0)
            }
        }

        impl Neg for $for {
            type Output = Self;

            #[inline]
            fn neg(self) -> Self {
                $for(self.0 ^ $sign_bit)
            }
        }

        // clippy would suggest deriving `Eq`/`Ord`, which is wrong for float bit patterns
        impl<T: Into<$for> + Copy> PartialEq<T> for $for {
            #[inline]
            fn eq(&self, other: &T) -> bool {
                <$is>::from(*self) == <$is>::from((*other).into())
            }
        }

        impl<T: Into<$for> + Copy> PartialOrd<T> for $for {
            #[inline]
            fn partial_cmp(&self, other: &T) -> Option<Ordering> {
                <$is>::from(*self).partial_cmp(&<$is>::from((*other).into()))
            }
        }

        impl ::core::fmt::Debug for $for {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                <$is>::from(*self).fmt(f)
            }
        }
    };
}

float! {
    /// A NaN preserving `f32` type.
    struct F32(u32 as f32, #sign = 1u32 << 31, #canon = 0x7fc0_0000u32, #payload = 1u32 << 22);
}

float! {
    /// A NaN preserving `f64` type.
    struct F64(u64 as f64, #sign = 1u64 << 63, #canon = 0x7ff8_0000_0000_0000u64, #payload = 1u64 << 51);
}

impl From<u32> for F32 {
    #[inline]
    fn from(other: u32) -> Self {
        Self::from_bits(other)
    }
}

impl From<F32> for u32 {
    #[inline]
    fn from(other: F32) -> Self {
        other.to_bits()
    }
}

impl From<u64> for F64 {
    #[inline]
    fn from(other: u64) -> Self {
        Self::from_bits(other)
    }
}

impl From<F64> for u64 {
    #[inline]
    fn from(other: F64) -> Self {
        other.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::{F32, F64};

    #[test]
    fn neg_nan_f32() {
        assert_eq!((-F32::from_bits(0xff80_3210)).to_bits(), 0x7f80_3210);
    }

    #[test]
    fn neg_nan_f64() {
        assert_eq!(
            (-F64::from_bits(0xff80_3210_0000_0000)).to_bits(),
            0x7f80_3210_0000_0000
        );
    }

    #[test]
    fn canonical_nan_f32_either_sign() {
        assert!(F32::from_bits(0x7fc0_0000).is_canonical_nan());
        assert!(F32::from_bits(0xffc0_0000).is_canonical_nan());
        assert!(!F32::from_bits(0x7fc0_0001).is_canonical_nan());
    }

    #[test]
    fn arithmetic_nan_f32_any_top_payload_bit() {
        assert!(F32::from_bits(0x7fc0_1234).is_arithmetic_nan());
        assert!(!F32::from_bits(0x7f80_1234).is_arithmetic_nan());
    }

    #[test]
    fn canonical_nan_f64() {
        assert!(F64::from_bits(0x7ff8_0000_0000_0000).is_canonical_nan());
        assert!(!F64::from_bits(0x7ff8_0000_0000_0001).is_canonical_nan());
    }
}
