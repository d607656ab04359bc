//! Deterministic hashing and equality helpers.
//!
//! These functions detect "no real change" recomputations of a reducer index.
//! The numeric model follows IEEE-754 doubles with 32-bit integer shifts so a
//! given key sequence always produces the same hash across runs and builds.
//!
//! # Example
//!
//! ```rust
//! use keyview_core::hash::{hash_string, index_hash};
//!
//! assert_eq!(hash_string("abc", 0), hash_string("abc", 0));
//! assert_ne!(hash_string("abc", 0), hash_string("abc", 1));
//!
//! let keys = [1u32, 2, 3];
//! assert_eq!(index_hash(Some(&keys[..])), Some(1_800_990_793));
//! assert_eq!(index_hash::<u32>(None), None);
//! ```

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::sync::Arc;

/// Golden ratio increment used by the index hash fold.
const GOLDEN_RATIO: f64 = 2_654_435_769.0;

const TWO_POW_32: f64 = 4_294_967_296.0;

/// Hashes a string with a two-lane multiply / xor-shift mix.
///
/// Each UTF-16 code unit is folded into two 32-bit accumulators seeded from
/// fixed odd constants. The lanes are finalized with an avalanche step and
/// combined into a 53-bit value: `2^32 * (h2 & 0x1FFFFF) + h1`.
pub fn hash_string(s: &str, seed: u32) -> u64 {
    let mut h1: u32 = 0xdead_beef ^ seed;
    let mut h2: u32 = 0x41c6_ce57 ^ seed;

    for ch in s.encode_utf16() {
        let ch = ch as u32;
        h1 = (h1 ^ ch).wrapping_mul(2_654_435_761);
        h2 = (h2 ^ ch).wrapping_mul(1_597_334_677);
    }

    h1 = (h1 ^ (h1 >> 16)).wrapping_mul(2_246_822_507)
        ^ (h2 ^ (h2 >> 13)).wrapping_mul(3_266_489_909);
    h2 = (h2 ^ (h2 >> 16)).wrapping_mul(2_246_822_507)
        ^ (h1 ^ (h1 >> 13)).wrapping_mul(3_266_489_909);

    (((h2 & 0x1f_ffff) as u64) << 32) | h1 as u64
}

/// Converts a value into its contribution to an index hash.
///
/// Booleans map to 0 / 1, numbers to themselves (0 when not finite) and
/// strings to [`hash_string`]. Types that keep the default method are treated
/// as opaque and contribute 0; they are never hashed structurally, so an
/// index keyed by them always falls back to the element-wise comparison.
pub trait HashUnknown {
    fn hash_unknown(&self) -> f64 {
        0.0
    }
}

/// Returns the hash contribution of `value`.
#[inline]
pub fn hash_unknown<T: HashUnknown + ?Sized>(value: &T) -> f64 {
    value.hash_unknown()
}

impl HashUnknown for bool {
    fn hash_unknown(&self) -> f64 {
        if *self {
            1.0
        } else {
            0.0
        }
    }
}

impl HashUnknown for f64 {
    fn hash_unknown(&self) -> f64 {
        if self.is_finite() {
            *self
        } else {
            0.0
        }
    }
}

impl HashUnknown for f32 {
    fn hash_unknown(&self) -> f64 {
        f64::from(*self).hash_unknown()
    }
}

macro_rules! hash_unknown_int {
    ($($ty:ty),*) => {
        $(
            impl HashUnknown for $ty {
                #[inline]
                fn hash_unknown(&self) -> f64 {
                    *self as f64
                }
            }
        )*
    };
}

hash_unknown_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl HashUnknown for str {
    fn hash_unknown(&self) -> f64 {
        hash_string(self, 0) as f64
    }
}

impl HashUnknown for String {
    fn hash_unknown(&self) -> f64 {
        self.as_str().hash_unknown()
    }
}

impl HashUnknown for Cow<'_, str> {
    fn hash_unknown(&self) -> f64 {
        self.as_ref().hash_unknown()
    }
}

impl HashUnknown for char {
    fn hash_unknown(&self) -> f64 {
        let mut buf = [0u8; 4];
        self.encode_utf8(&mut buf).hash_unknown()
    }
}

impl HashUnknown for () {}

impl<T: HashUnknown> HashUnknown for Option<T> {
    fn hash_unknown(&self) -> f64 {
        self.as_ref().map_or(0.0, HashUnknown::hash_unknown)
    }
}

impl<T: HashUnknown + ?Sized> HashUnknown for &T {
    fn hash_unknown(&self) -> f64 {
        (**self).hash_unknown()
    }
}

impl<T: HashUnknown + ?Sized> HashUnknown for Box<T> {
    fn hash_unknown(&self) -> f64 {
        (**self).hash_unknown()
    }
}

impl<T: HashUnknown + ?Sized> HashUnknown for Rc<T> {
    fn hash_unknown(&self) -> f64 {
        (**self).hash_unknown()
    }
}

impl<T: HashUnknown + ?Sized> HashUnknown for Arc<T> {
    fn hash_unknown(&self) -> f64 {
        (**self).hash_unknown()
    }
}

/// Compares two optional slices for equality.
///
/// Identical slices short-circuit, a single `None` is never equal, and the
/// element comparison walks from the end toward the start.
pub fn array_equals<T: PartialEq>(a: Option<&[T]>, b: Option<&[T]>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            if core::ptr::eq(a, b) {
                return true;
            }
            if a.len() != b.len() {
                return false;
            }
            a.iter().rev().zip(b.iter().rev()).all(|(x, y)| x == y)
        }
        _ => false,
    }
}

/// Folds a key sequence into a 32-bit hash, last key first.
///
/// Each step computes `hash ^= contribution + 0x9e3779b9 + (hash << 6) + (hash >> 2)`
/// with a double-precision sum truncated back to 32 bits. An absent or empty
/// sequence has no hash.
pub fn index_hash<K: HashUnknown>(keys: Option<&[K]>) -> Option<i32> {
    let mut hash: Option<i32> = None;
    for key in keys?.iter().rev() {
        let current = hash.unwrap_or(0);
        let sum = key.hash_unknown()
            + GOLDEN_RATIO
            + f64::from(current.wrapping_shl(6))
            + f64::from(current >> 2);
        hash = Some(current ^ to_int32(sum));
    }
    hash
}

/// Truncates a double to a wrapping 32-bit signed integer; non-finite is 0.
fn to_int32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    let mut modulo = libm::fmod(libm::trunc(value), TWO_POW_32);
    if modulo < 0.0 {
        modulo += TWO_POW_32;
    }
    modulo as u32 as i32
}
