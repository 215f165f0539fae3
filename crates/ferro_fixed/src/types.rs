//! Runtime signal type descriptors.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The runtime description of a signal's type.
///
/// Types carry no storage; they describe the value held by a pin. Equality
/// is structural and the type hashes, so types can key maps. The
/// [`Unknown`](SignalType::Unknown) value appears only on placeholder pins
/// before they are typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    /// No type assigned yet.
    Unknown,
    /// A single boolean signal.
    Bool,
    /// A 32-bit integer (simulation convenience).
    Int32,
    /// A 64-bit integer (simulation convenience).
    Int64,
    /// A double-precision float (simulation convenience, never emitted).
    Double,
    /// A fixed-point word.
    Fixed {
        /// Two's-complement signedness.
        signed: bool,
        /// Word width in bits, at least 1.
        word_width: u16,
        /// Binary point position; may be negative or exceed the width.
        fraction: i16,
    },
}

impl SignalType {
    /// A signed fixed-point type.
    pub fn sfix(word_width: u16, fraction: i16) -> Self {
        Self::Fixed {
            signed: true,
            word_width,
            fraction,
        }
    }

    /// An unsigned fixed-point type.
    pub fn ufix(word_width: u16, fraction: i16) -> Self {
        Self::Fixed {
            signed: false,
            word_width,
            fraction,
        }
    }

    /// Returns `true` unless the type is [`Unknown`](SignalType::Unknown).
    pub fn is_known(&self) -> bool {
        !matches!(self, SignalType::Unknown)
    }

    /// Returns `true` for fixed-point types.
    pub fn is_fixed(&self) -> bool {
        matches!(self, SignalType::Fixed { .. })
    }

    /// Signedness of a fixed-point type.
    pub fn is_signed(&self) -> Option<bool> {
        match self {
            SignalType::Fixed { signed, .. } => Some(*signed),
            _ => None,
        }
    }

    /// Word width of a fixed-point type.
    pub fn word_width(&self) -> Option<u16> {
        match self {
            SignalType::Fixed { word_width, .. } => Some(*word_width),
            _ => None,
        }
    }

    /// Fraction of a fixed-point type.
    pub fn fraction(&self) -> Option<i16> {
        match self {
            SignalType::Fixed { fraction, .. } => Some(*fraction),
            _ => None,
        }
    }

    /// The number of bits a signal of this type occupies in emitted code.
    ///
    /// `None` for types without a synthesizable width.
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            SignalType::Bool => Some(1),
            SignalType::Int32 => Some(32),
            SignalType::Int64 => Some(64),
            SignalType::Fixed { word_width, .. } => Some(*word_width as u32),
            _ => None,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::Unknown => write!(f, "<unknown>"),
            SignalType::Bool => write!(f, "bool"),
            SignalType::Int32 => write!(f, "int32"),
            SignalType::Int64 => write!(f, "int64"),
            SignalType::Double => write!(f, "double"),
            SignalType::Fixed {
                signed,
                word_width,
                fraction,
            } => {
                let prefix = if *signed { "sfix" } else { "ufix" };
                write!(f, "{prefix}<{word_width},{fraction}>")
            }
        }
    }
}

/// Computes the smallest fixed-point type that can losslessly hold any of
/// the given types.
///
/// The result is signed if any input is signed; its fraction is the
/// largest input fraction; its word width is the smallest that
/// accommodates every input once sign and fraction are aligned (unsigned
/// inputs gain one bit when the result is signed).
pub fn common_representation<'a, I>(types: I) -> Result<SignalType, DomainError>
where
    I: IntoIterator<Item = &'a SignalType>,
{
    let mut is_signed = false;
    let mut fraction: i32 = i32::MIN;
    let mut operands: Vec<(bool, i32, i32)> = Vec::new();

    for ty in types {
        if let SignalType::Fixed {
            signed,
            word_width,
            fraction: f,
        } = ty
        {
            is_signed |= *signed;
            fraction = fraction.max(*f as i32);
            operands.push((*signed, *word_width as i32, *f as i32));
        }
    }

    if operands.is_empty() {
        return Err(DomainError::WordWidthTooSmall(0));
    }

    let mut word_width = 0;
    for (signed, width, f) in operands {
        let adjusted = width + i32::from(is_signed && !signed) + (fraction - f);
        word_width = word_width.max(adjusted);
    }

    if word_width > (crate::dynfix::MAX_LIMBS * 32) as i32 {
        return Err(DomainError::WordWidthTooLarge(word_width));
    }

    Ok(SignalType::Fixed {
        signed: is_signed,
        word_width: word_width as u16,
        fraction: fraction as i16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn display_formats() {
        assert_eq!(SignalType::sfix(34, 33).to_string(), "sfix<34,33>");
        assert_eq!(SignalType::ufix(8, -2).to_string(), "ufix<8,-2>");
        assert_eq!(SignalType::Bool.to_string(), "bool");
        assert_eq!(SignalType::Unknown.to_string(), "<unknown>");
    }

    #[test]
    fn predicates() {
        let t = SignalType::sfix(12, 4);
        assert!(t.is_known());
        assert!(t.is_fixed());
        assert_eq!(t.is_signed(), Some(true));
        assert_eq!(t.word_width(), Some(12));
        assert_eq!(t.fraction(), Some(4));
        assert_eq!(SignalType::Bool.word_width(), None);
        assert!(!SignalType::Unknown.is_known());
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(SignalType::ufix(8, 0), SignalType::ufix(8, 0));
        assert_ne!(SignalType::ufix(8, 0), SignalType::sfix(8, 0));
        assert_ne!(SignalType::ufix(8, 0), SignalType::ufix(8, 1));
    }

    #[test]
    fn types_key_maps() {
        let mut map = HashMap::new();
        map.insert(SignalType::sfix(16, 8), "a");
        map.insert(SignalType::Bool, "b");
        assert_eq!(map[&SignalType::sfix(16, 8)], "a");
    }

    #[test]
    fn common_representation_same_signedness() {
        let a = SignalType::ufix(8, 2);
        let b = SignalType::ufix(6, 4);
        // Fraction 4; a needs 8 + (4 - 2) = 10 bits.
        assert_eq!(
            common_representation([&a, &b]).unwrap(),
            SignalType::ufix(10, 4)
        );
    }

    #[test]
    fn common_representation_mixed_signedness() {
        let a = SignalType::ufix(8, 0);
        let b = SignalType::sfix(4, 0);
        // Unsigned operand gains a sign bit.
        assert_eq!(
            common_representation([&a, &b]).unwrap(),
            SignalType::sfix(9, 0)
        );
    }

    #[test]
    fn common_representation_single() {
        let a = SignalType::sfix(20, 10);
        assert_eq!(common_representation([&a]).unwrap(), a);
    }

    #[test]
    fn common_representation_rejects_empty() {
        let empty: [&SignalType; 0] = [];
        assert!(common_representation(empty).is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let t = SignalType::sfix(48, 16);
        let json = serde_json::to_string(&t).unwrap();
        let back: SignalType = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
