//! Multi-limb fixed-point values with destination-shaped arithmetic.

use crate::error::{DomainError, RangeError};
use crate::types::SignalType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Number of 32-bit limbs of inline storage.
///
/// The limb count caps the supported word width at `MAX_LIMBS * 32` bits.
/// It is a compile-time constant; [`DynFix::new`] reports a
/// [`DomainError`] for widths beyond the cap.
pub const MAX_LIMBS: usize = 4;

/// A variable-width signed or unsigned two's-complement fixed-point value.
///
/// Storage is a fixed-capacity little-endian array of 32-bit limbs. The
/// value of the word is `mantissa * 2^(-fraction)` where the mantissa is
/// interpreted over `word_width` bits. Bits above the declared word width
/// always carry the correctly sign- or zero-extended value; every
/// arithmetic operation whose destination is narrower than the natural
/// result re-establishes this invariant through [`wrap_around`].
///
/// All operations are destination-shaped: the destination's word width and
/// fraction decide truncation and extension, while only the limbs are
/// written.
///
/// [`wrap_around`]: DynFix::wrap_around
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynFix {
    signed: bool,
    word_width: u16,
    fraction: i16,
    limbs: [u32; MAX_LIMBS],
}

impl Default for DynFix {
    fn default() -> Self {
        Self::uninitialised()
    }
}

impl DynFix {
    /// Creates the uninitialised value (word width 0).
    ///
    /// Used as the placeholder before a pin gets typed; most operations
    /// are meaningless on it.
    pub fn uninitialised() -> Self {
        Self {
            signed: false,
            word_width: 0,
            fraction: 0,
            limbs: [0; MAX_LIMBS],
        }
    }

    /// Creates a zero value of the given signedness, word width, and fraction.
    pub fn new(signed: bool, word_width: i32, fraction: i32) -> Result<Self, DomainError> {
        if word_width <= 0 {
            return Err(DomainError::WordWidthTooSmall(word_width));
        }
        if word_width > (MAX_LIMBS * 32) as i32 {
            return Err(DomainError::WordWidthTooLarge(word_width));
        }
        Ok(Self {
            signed,
            word_width: word_width as u16,
            fraction: fraction as i16,
            limbs: [0; MAX_LIMBS],
        })
    }

    /// Creates a zero value of the given fixed-point type.
    ///
    /// Returns the uninitialised value when `ty` is not fixed-point.
    pub fn zero_of(ty: &SignalType) -> Self {
        match ty {
            SignalType::Fixed {
                signed,
                word_width,
                fraction,
            } => Self {
                signed: *signed,
                word_width: *word_width,
                fraction: *fraction,
                limbs: [0; MAX_LIMBS],
            },
            _ => Self::uninitialised(),
        }
    }

    /// Creates the minimal representation of an integer.
    ///
    /// Trailing zero bits are folded into a negative fraction, so e.g. 12
    /// becomes `ufix<2,-2>` and −1 becomes `sfix<1,0>`.
    pub fn from_i64(value: i64) -> Self {
        let mut fraction: i32 = 0;
        let mut v = value;
        if v != 0 {
            while v % 2 == 0 {
                fraction -= 1;
                v /= 2;
            }
        }

        let mut limbs = [0u32; MAX_LIMBS];
        limbs[0] = (v & 0xffff_ffff) as u32;
        limbs[1] = ((v >> 32) & 0xffff_ffff) as u32;

        let signed;
        let word_width;
        if v >= 0 {
            signed = false;
            let mut width = 0u16;
            let mut t = v;
            loop {
                t /= 2;
                width += 1;
                if t <= 0 {
                    break;
                }
            }
            word_width = width;
        } else {
            limbs[2] = u32::MAX;
            limbs[3] = u32::MAX;
            signed = true;
            if v < -(1i64 << 62) {
                word_width = 64;
            } else {
                let mut t = -v - 1;
                let mut width = 1u16;
                while t > 0 {
                    t /= 2;
                    width += 1;
                }
                word_width = width;
            }
        }

        Self {
            signed,
            word_width,
            fraction: fraction as i16,
            limbs,
        }
    }

    /// Creates the minimal representation of a 32-bit integer.
    pub fn from_i32(value: i32) -> Self {
        Self::from_i64(value as i64)
    }

    /// Creates the minimal representation of a double.
    ///
    /// The mantissa is captured with 60 bits of precision; the binary
    /// point lands in the fraction.
    pub fn from_f64(value: f64) -> Self {
        let (mantissa, exp) = frexp(value);
        if mantissa == 0.0 {
            Self::from_i64(0)
        } else {
            let value64 = (mantissa * (1i64 << 60) as f64) as i64;
            let mut result = Self::from_i64(value64);
            result.fraction += (60 - exp) as i16;
            result
        }
    }

    /// Creates a value of the given shape from a double, aligning the
    /// binary point and wrapping into the destination width.
    pub fn from_f64_with(
        signed: bool,
        word_width: i32,
        fraction: i32,
        value: f64,
    ) -> Result<Self, DomainError> {
        let mut dest = Self::new(signed, word_width, fraction)?;
        dest.assign_aligned(&Self::from_f64(value));
        Ok(dest)
    }

    /// Creates a value of the given shape from an integer, aligning the
    /// binary point and wrapping into the destination width.
    pub fn from_i64_with(
        signed: bool,
        word_width: i32,
        fraction: i32,
        value: i64,
    ) -> Result<Self, DomainError> {
        let mut dest = Self::new(signed, word_width, fraction)?;
        dest.assign_aligned(&Self::from_i64(value));
        Ok(dest)
    }

    /// Returns `true` once the value has a non-zero word width.
    pub fn is_initialised(&self) -> bool {
        self.word_width != 0
    }

    /// Returns `true` for signed values.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Returns the declared word width in bits.
    pub fn word_width(&self) -> u16 {
        self.word_width
    }

    /// Returns the position of the binary point.
    pub fn fraction(&self) -> i16 {
        self.fraction
    }

    /// Returns the signal type describing this value.
    pub fn ty(&self) -> SignalType {
        if !self.is_initialised() {
            return SignalType::Unknown;
        }
        SignalType::Fixed {
            signed: self.signed,
            word_width: self.word_width,
            fraction: self.fraction,
        }
    }

    /// Returns the little-endian limb array.
    pub fn limbs(&self) -> &[u32; MAX_LIMBS] {
        &self.limbs
    }

    /// Overwrites the limb at the given index, without re-canonicalizing.
    ///
    /// Callers must follow up with [`wrap_around`](DynFix::wrap_around)
    /// before the value is observed.
    pub fn set_limb(&mut self, index: usize, value: u32) {
        self.limbs[index] = value;
    }

    /// Returns `true` if the value is negative.
    pub fn is_negative(&self) -> bool {
        self.signed && (self.limbs[MAX_LIMBS - 1] >> 31) != 0
    }

    /// Copies the limbs into the destination, keeping its shape.
    pub fn copy_limbs_to(&self, dest: &mut DynFix) {
        dest.limbs = self.limbs;
    }

    /// Two's-complement negation into the destination.
    ///
    /// The destination is typically one bit wider than the source so the
    /// most negative value remains representable.
    pub fn negate_into(&self, dest: &mut DynFix) {
        let mut carry = true;
        for i in 0..MAX_LIMBS {
            if carry {
                if self.limbs[i] == 0 {
                    dest.limbs[i] = 0;
                } else {
                    dest.limbs[i] = (!self.limbs[i]).wrapping_add(1);
                    carry = false;
                }
            } else {
                dest.limbs[i] = !self.limbs[i];
            }
        }
    }

    /// Bitwise complement into the destination.
    pub fn not_into(&self, dest: &mut DynFix) {
        for i in 0..MAX_LIMBS {
            dest.limbs[i] = !self.limbs[i];
        }
    }

    /// Shifts left by `amount` bits into the destination.
    ///
    /// Bits shifted beyond the limb capacity are lost; callers wrap the
    /// destination afterwards when its width is narrower.
    pub fn shift_left_into(&self, dest: &mut DynFix, amount: u32) {
        dest.limbs = self.limbs;

        let mut amount = amount as usize;
        while amount >= 32 {
            for i in (1..MAX_LIMBS).rev() {
                dest.limbs[i] = dest.limbs[i - 1];
            }
            dest.limbs[0] = 0;
            amount -= 32;
        }

        if amount > 0 {
            for i in (1..MAX_LIMBS).rev() {
                dest.limbs[i] = (dest.limbs[i] << amount) | (dest.limbs[i - 1] >> (32 - amount));
            }
            dest.limbs[0] <<= amount;
        }
    }

    /// Shifts right by `amount` bits into the destination.
    ///
    /// Arithmetic when the source is signed, logical otherwise.
    pub fn shift_right_into(&self, dest: &mut DynFix, amount: u32) {
        let block_shift = (amount / 32) as usize;
        let fine_shift = amount % 32;

        let extension: u32 = if self.is_negative() { u32::MAX } else { 0 };

        if (amount as usize) < MAX_LIMBS * 32 {
            for i in (MAX_LIMBS - block_shift..MAX_LIMBS).rev() {
                dest.limbs[i] = extension;
            }

            if fine_shift != 0 {
                let mut carry = extension << (32 - fine_shift);
                for i in (0..MAX_LIMBS - block_shift).rev() {
                    dest.limbs[i] = (self.limbs[i + block_shift] >> fine_shift) | carry;
                    carry = self.limbs[i + block_shift] << (32 - fine_shift);
                }
            } else {
                for i in (0..MAX_LIMBS - block_shift).rev() {
                    dest.limbs[i] = self.limbs[i + block_shift];
                }
            }
        } else {
            for limb in dest.limbs.iter_mut() {
                *limb = extension;
            }
        }
    }

    /// Adds `self << amount` into the accumulator with ripple carry.
    ///
    /// The core of the multi-summand adder block. `amount` must be below
    /// the limb capacity.
    pub fn accumulate_shift_left(&self, accumulator: &mut DynFix, amount: u32) {
        debug_assert!((amount as usize) < MAX_LIMBS * 32);

        let block_shift = (amount / 32) as usize;
        let fine_shift = amount % 32;

        let mut carry: u32 = 0;

        if fine_shift != 0 {
            let mask = !(u32::MAX << fine_shift);
            for i in block_shift..MAX_LIMBS {
                let rhs = self.limbs[i - block_shift];
                let rhs_shifted_out = (rhs >> (32 - fine_shift)) & mask;
                let rhs_shifted = rhs << fine_shift;

                let mut dest = accumulator.limbs[i].wrapping_add(carry);
                carry = u32::from(dest < carry);

                dest = dest.wrapping_add(rhs_shifted);
                carry += u32::from(dest < rhs_shifted) + rhs_shifted_out;

                accumulator.limbs[i] = dest;
            }
        } else {
            for i in block_shift..MAX_LIMBS {
                let rhs = self.limbs[i - block_shift];

                let mut dest = accumulator.limbs[i].wrapping_add(carry);
                carry = u32::from(dest < carry);

                dest = dest.wrapping_add(rhs);
                carry += u32::from(dest < rhs);

                accumulator.limbs[i] = dest;
            }
        }
    }

    /// Multiplies by an unsigned 32-bit factor into the destination.
    pub fn multiply_unsigned_into(&self, dest: &mut DynFix, m: u32) {
        let mut carry: u32 = 0;
        for i in 0..MAX_LIMBS {
            let y = (m as u64) * (self.limbs[i] as u64) + carry as u64;
            dest.limbs[i] = (y & 0xffff_ffff) as u32;
            carry = (y >> 32) as u32;
        }
    }

    /// Adds `self * m` into the destination at a limb offset, treating the
    /// factor as unsigned.
    pub fn accumulate_multiply_unsigned(&self, dest: &mut DynFix, m: u32, block: usize) {
        let mut carry: u32 = 0;
        for i in 0..MAX_LIMBS - block {
            let y = (m as u64) * (self.limbs[i] as u64) + carry as u64;
            let x = (y & 0xffff_ffff) as u32;

            let r = dest.limbs[i + block].wrapping_add(x);
            carry = u32::from(r < x) + (y >> 32) as u32;
            dest.limbs[i + block] = r;
        }
    }

    /// Adds `self * m` into the destination at a limb offset, treating the
    /// factor as signed.
    ///
    /// Used for the highest limb of a signed second operand in the
    /// schoolbook multiplier.
    pub fn accumulate_multiply_signed(&self, dest: &mut DynFix, m: i32, block: usize) {
        let mut carry: u32 = 0;
        for i in 0..MAX_LIMBS - block {
            let y = (m as i64)
                .wrapping_mul(self.limbs[i] as i64)
                .wrapping_add(carry as i64);
            let x = (y & 0xffff_ffff) as u32;

            let r = dest.limbs[i + block].wrapping_add(x);
            carry = u32::from(r < x).wrapping_add((y >> 32) as u32);
            dest.limbs[i + block] = r;
        }
    }

    /// Unsigned lexicographic comparison of the limb arrays.
    pub fn compare_unsigned(&self, rhs: &DynFix) -> Ordering {
        for i in (0..MAX_LIMBS).rev() {
            match self.limbs[i].cmp(&rhs.limbs[i]) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Signed comparison: the top limb compares as a two's-complement
    /// word, lower limbs as unsigned.
    pub fn compare_signed(&self, rhs: &DynFix) -> Ordering {
        let left = self.limbs[MAX_LIMBS - 1] as i32;
        let right = rhs.limbs[MAX_LIMBS - 1] as i32;
        match left.cmp(&right) {
            Ordering::Equal => {}
            other => return other,
        }

        for i in (0..MAX_LIMBS - 1).rev() {
            match self.limbs[i].cmp(&rhs.limbs[i]) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Limb-exact equality.
    pub fn compare_equal(&self, rhs: &DynFix) -> bool {
        self.limbs == rhs.limbs
    }

    /// Re-establishes the canonical form: clears or sign-extends every bit
    /// above the declared word width.
    pub fn wrap_around(&mut self) {
        let highest_index = self.word_width as usize - 1;
        let mut current_block = MAX_LIMBS - 1;
        let mut current_index = current_block * 32;

        let sign_set = self.signed && (self.limbs[highest_index / 32] >> (highest_index % 32)) & 1 != 0;

        if sign_set {
            while current_index > highest_index {
                self.limbs[current_block] = u32::MAX;
                current_index -= 32;
                current_block -= 1;
            }
            self.limbs[current_block] |= 0xffff_fffeu32.wrapping_shl((highest_index - current_index) as u32);
        } else {
            while current_index > highest_index {
                self.limbs[current_block] = 0;
                current_index -= 32;
                current_block -= 1;
            }
            self.limbs[current_block] &=
                !0xffff_fffeu32.wrapping_shl((highest_index - current_index) as u32);
        }
    }

    /// Returns the most negative (signed) or zero (unsigned) value of this
    /// value's type.
    pub fn min_value(&self) -> DynFix {
        let mut result = DynFix {
            limbs: [0; MAX_LIMBS],
            ..*self
        };
        if self.signed {
            let mut one = result;
            one.limbs[0] = 1;
            one.shift_left_into(&mut result, self.word_width as u32 - 1);
            result.wrap_around();
        }
        result
    }

    /// Returns the most positive value of this value's type.
    pub fn max_value(&self) -> DynFix {
        let mut result = DynFix {
            limbs: [0; MAX_LIMBS],
            ..*self
        };
        if self.signed {
            let min = self.min_value();
            min.not_into(&mut result);
        } else {
            result.limbs = [u32::MAX; MAX_LIMBS];
            result.wrap_around();
        }
        result
    }

    /// Aligns the source's binary point to this value's fraction, copies,
    /// and wraps. This is the floor-rounding assignment used by the value
    /// constructors and the floor cast.
    pub fn assign_aligned(&mut self, source: &DynFix) {
        let align = self.fraction as i32 - source.fraction as i32;
        if align >= 0 {
            source.shift_left_into(self, align as u32);
        } else {
            source.shift_right_into(self, (-align) as u32);
        }
        self.wrap_around();
    }

    /// Negation as a value: the result is signed and one bit wider.
    pub fn negated(&self) -> Result<DynFix, DomainError> {
        let mut result = DynFix::new(true, self.word_width as i32 + 1, self.fraction as i32)?;
        self.negate_into(&mut result);
        Ok(result)
    }

    /// Converts to a double.
    pub fn to_f64(&self) -> f64 {
        let mut value: f64;
        if self.is_negative() {
            value = 1.0;
            for i in 0..MAX_LIMBS {
                value += (!self.limbs[i]) as f64 * 2f64.powi(i as i32 * 32);
            }
            value = -value;
        } else {
            value = 0.0;
            for i in 0..MAX_LIMBS {
                value += self.limbs[i] as f64 * 2f64.powi(i as i32 * 32);
            }
        }
        value * 2f64.powi(-(self.fraction as i32))
    }

    /// Converts to a 64-bit integer.
    ///
    /// Fails when the value has a fractional part or does not fit.
    pub fn to_i64(&self) -> Result<i64, RangeError> {
        let fits = self.fraction == 0
            && ((self.signed && self.word_width <= 64) || (!self.signed && self.word_width <= 63));
        if fits {
            Ok((((self.limbs[1] as i32) as i64) << 32) | self.limbs[0] as i64)
        } else {
            Err(RangeError::NotAnInt64 {
                ty: self.ty().to_string(),
            })
        }
    }
}

impl fmt::Debug for DynFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DynFix({}, {:08x}_{:08x}_{:08x}_{:08x})",
            self.ty(),
            self.limbs[3],
            self.limbs[2],
            self.limbs[1],
            self.limbs[0]
        )
    }
}

impl fmt::Display for DynFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

/// Splits a double into mantissa in `[0.5, 1)` and a power-of-two exponent.
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let exp_field = ((bits >> 52) & 0x7ff) as i32;
    if exp_field == 0 {
        // Subnormal: scale into the normal range first.
        let (m, e) = frexp(x * 2f64.powi(64));
        (m, e - 64)
    } else {
        let mantissa = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
        (mantissa, exp_field - 1022)
    }
}
