//! Four-state multi-bit signal values.
//!
//! Every bit is one of `0`, `1`, floating (`x`) or error (`E`). A value is
//! stored as three bit masks plus a width; the masks are normalized on
//! construction so that derived equality is value equality:
//! error bits are never also unknown, and neither carries a value bit.

use std::fmt;

use super::types::BitWidth;

/// State of a single bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitState {
    Zero,
    One,
    Unknown,
    Error,
}

/// A multi-bit logic value of up to 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value {
    width: u8,
    error: u64,
    unknown: u64,
    value: u64,
}

fn mask(width: u8) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl Value {
    /// No value at all (zero width). Combining with NIL is the identity.
    pub const NIL: Value = Value {
        width: 0,
        error: 0,
        unknown: 0,
        value: 0,
    };
    /// Single floating bit.
    pub const UNKNOWN: Value = Value {
        width: 1,
        error: 0,
        unknown: 1,
        value: 0,
    };
    /// Single error bit.
    pub const ERROR: Value = Value {
        width: 1,
        error: 1,
        unknown: 0,
        value: 0,
    };
    /// Single logic 0.
    pub const FALSE: Value = Value {
        width: 1,
        error: 0,
        unknown: 0,
        value: 0,
    };
    /// Single logic 1.
    pub const TRUE: Value = Value {
        width: 1,
        error: 0,
        unknown: 0,
        value: 1,
    };

    /// Build a value from raw masks, normalizing them.
    pub fn create(width: u8, error: u64, unknown: u64, value: u64) -> Self {
        let width = width.min(BitWidth::MAX_BITS);
        if width == 0 {
            return Self::NIL;
        }
        let m = mask(width);
        let error = error & m;
        let unknown = unknown & m & !error;
        let value = value & m & !unknown & !error;
        Self {
            width,
            error,
            unknown,
            value,
        }
    }

    /// A fully defined value.
    pub fn known(width: BitWidth, value: u64) -> Self {
        Self::create(width.bits() as u8, 0, 0, value)
    }

    /// All bits floating.
    pub fn unknown(width: BitWidth) -> Self {
        Self::create(width.bits() as u8, 0, u64::MAX, 0)
    }

    /// All bits in error.
    pub fn error(width: BitWidth) -> Self {
        Self::create(width.bits() as u8, u64::MAX, 0, 0)
    }

    /// Single-bit value from a boolean.
    pub fn from_bool(b: bool) -> Self {
        if b {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    /// Assemble a value from single-bit values, index 0 being the LSB.
    ///
    /// Entries wider than one bit contribute their bit 0.
    pub fn from_bits(bits: &[Value]) -> Self {
        let width = bits.len().min(BitWidth::MAX_BITS as usize);
        let mut error = 0u64;
        let mut unknown = 0u64;
        let mut value = 0u64;
        for (i, bit) in bits.iter().take(width).enumerate() {
            match bit.bit_state(0) {
                BitState::Error => error |= 1 << i,
                BitState::Unknown => unknown |= 1 << i,
                BitState::One => value |= 1 << i,
                BitState::Zero => {}
            }
        }
        Self::create(width as u8, error, unknown, value)
    }

    /// Width of this value.
    pub fn width(&self) -> BitWidth {
        BitWidth::new(self.width)
    }

    pub fn is_nil(&self) -> bool {
        self.width == 0
    }

    /// True when every bit is 0 or 1.
    pub fn is_fully_defined(&self) -> bool {
        self.width > 0 && self.error == 0 && self.unknown == 0
    }

    /// True when every bit is floating.
    pub fn is_unknown(&self) -> bool {
        self.width > 0 && self.unknown == mask(self.width)
    }

    /// True when any bit is in error.
    pub fn is_error(&self) -> bool {
        self.error != 0
    }

    /// State of one bit. Out-of-range bits read as floating.
    pub fn bit_state(&self, bit: usize) -> BitState {
        if bit >= self.width as usize {
            return BitState::Unknown;
        }
        let m = 1u64 << bit;
        if self.error & m != 0 {
            BitState::Error
        } else if self.unknown & m != 0 {
            BitState::Unknown
        } else if self.value & m != 0 {
            BitState::One
        } else {
            BitState::Zero
        }
    }

    /// Extract one bit as a single-bit value.
    ///
    /// Reading past the width yields [`Value::ERROR`]: a narrower driver on a
    /// wider thread is a width mismatch.
    pub fn get(&self, bit: usize) -> Value {
        if bit >= self.width as usize {
            return Self::ERROR;
        }
        match self.bit_state(bit) {
            BitState::Error => Self::ERROR,
            BitState::Unknown => Self::UNKNOWN,
            BitState::One => Self::TRUE,
            BitState::Zero => Self::FALSE,
        }
    }

    /// The defined bits as an integer (floating and error bits read 0).
    pub fn to_u64(&self) -> u64 {
        self.value
    }

    /// Resolve two drivers of the same point.
    ///
    /// Floating bits yield to the other driver; drivers that disagree on a
    /// defined bit produce an error bit.
    pub fn combine(&self, other: &Value) -> Value {
        if self.is_nil() {
            return *other;
        }
        if other.is_nil() {
            return *self;
        }
        let disagree = (self.value ^ other.value) & !(self.unknown | other.unknown);
        Self::create(
            self.width.max(other.width),
            self.error | other.error | disagree,
            self.unknown & other.unknown,
            (self.value & !self.unknown) | (other.value & !other.unknown),
        )
    }

    /// Replace floating bits with the state of a 1-bit pull value.
    pub fn pull(&self, pull_to: &Value) -> Value {
        if self.is_fully_defined() || self.unknown == 0 {
            return *self;
        }
        match pull_to.bit_state(0) {
            BitState::Unknown => *self,
            BitState::Zero => Self::create(self.width, self.error, 0, self.value),
            BitState::One => Self::create(self.width, self.error, 0, self.value | self.unknown),
            BitState::Error => Self::create(self.width, self.error | self.unknown, 0, self.value),
        }
    }

    /// Truncate to a narrower width, or pad with floating bits.
    pub fn resize(&self, width: BitWidth) -> Value {
        let w = width.bits() as u8;
        let pad = mask(w) & !mask(self.width);
        Self::create(w, self.error, self.unknown | pad, self.value)
    }

    /// Treat floating bits as logic 0.
    pub fn floating_as_zero(&self) -> Value {
        Self::create(self.width, self.error, 0, self.value)
    }

    /// Bitwise NOT; floating and error bits become errors.
    pub fn not(&self) -> Value {
        Self::create(self.width, self.error | self.unknown, 0, !self.value)
    }

    /// Bitwise AND; a defined 0 dominates errors and floats.
    pub fn and(&self, other: &Value) -> Value {
        let false0 = !self.value & !self.error & !self.unknown;
        let false1 = !other.value & !other.error & !other.unknown;
        let falses = false0 | false1;
        Self::create(
            self.width.max(other.width),
            (self.error | other.error | self.unknown | other.unknown) & !falses,
            0,
            self.value & other.value,
        )
    }

    /// Bitwise OR; a defined 1 dominates errors and floats.
    pub fn or(&self, other: &Value) -> Value {
        let true0 = self.value & !self.error & !self.unknown;
        let true1 = other.value & !other.error & !other.unknown;
        let trues = true0 | true1;
        Self::create(
            self.width.max(other.width),
            (self.error | other.error | self.unknown | other.unknown) & !trues,
            0,
            self.value | other.value,
        )
    }

    /// Bitwise XOR; any undefined input bit yields an error bit.
    pub fn xor(&self, other: &Value) -> Value {
        Self::create(
            self.width.max(other.width),
            self.error | other.error | self.unknown | other.unknown,
            0,
            self.value ^ other.value,
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            return write!(f, "-");
        }
        for bit in (0..self.width as usize).rev() {
            let c = match self.bit_state(bit) {
                BitState::Zero => '0',
                BitState::One => '1',
                BitState::Unknown => 'x',
                BitState::Error => 'E',
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}
