//! Fixed-width value kinds a buffer can be read and written as.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Every scalar kind a buffer understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ScalarKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    I128,
    U128,
    F32,
    F64,
    Decimal,
    Guid,
    DateTicks,
}

impl ScalarKind {
    pub const ALL: [Self; 15] = [
        Self::I8,
        Self::U8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::I128,
        Self::U128,
        Self::F32,
        Self::F64,
        Self::Decimal,
        Self::Guid,
        Self::DateTicks,
    ];

    // Indexed by discriminant.
    const WIDTHS: [usize; 15] = [1, 1, 2, 2, 4, 4, 8, 8, 16, 16, 4, 8, 16, 16, 8];

    /// Width in bytes.
    #[inline]
    #[must_use]
    pub const fn width(self) -> usize {
        Self::WIDTHS[self as usize]
    }
}

/// A plain value that may be read from or written to any byte offset.
///
/// # Safety
///
/// Implementors must be `repr(C)`/primitive types without padding for which
/// every bit pattern is a valid value, and `size_of::<Self>()` must equal
/// `Self::KIND.width()`.
pub unsafe trait Scalar: Copy + 'static {
    const KIND: ScalarKind;
}

macro_rules! impl_scalar {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            // Safety: primitive or padding-free repr(C) type, width checked below.
            unsafe impl Scalar for $ty {
                const KIND: ScalarKind = ScalarKind::$kind;
            }
            const _: () = assert!(std::mem::size_of::<$ty>() == ScalarKind::$kind.width());
        )*
    };
}

impl_scalar! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    i128 => I128,
    u128 => U128,
    f32 => F32,
    f64 => F64,
    Decimal128 => Decimal,
    Guid => Guid,
    DateTicks => DateTicks,
}

/// 128-bit decimal: a 96-bit unsigned mantissa, a power-of-ten scale (0..=28)
/// and a sign, in the `flags, hi, lo` layout used by COM `DECIMAL` storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Decimal128 {
    /// Bits 16..24 scale, bit 31 sign.
    pub flags: u32,
    /// Upper 32 bits of the mantissa.
    pub hi: u32,
    /// Lower 64 bits of the mantissa.
    pub lo: u64,
}

impl Decimal128 {
    pub const MAX_SCALE: u8 = 28;
    const SIGN_BIT: u32 = 1 << 31;

    /// Build from a mantissa (only the low 96 bits are kept) and scale.
    #[must_use]
    pub fn new(mantissa: u128, scale: u8, negative: bool) -> Self {
        let scale = scale.min(Self::MAX_SCALE);
        let mut flags = u32::from(scale) << 16;
        if negative {
            flags |= Self::SIGN_BIT;
        }
        #[allow(clippy::cast_possible_truncation)]
        Self {
            flags,
            hi: (mantissa >> 64) as u32,
            lo: mantissa as u64,
        }
    }

    #[must_use]
    pub fn mantissa(self) -> u128 {
        (u128::from(self.hi) << 64) | u128::from(self.lo)
    }

    #[must_use]
    pub fn scale(self) -> u8 {
        ((self.flags >> 16) & 0xFF) as u8
    }

    #[must_use]
    pub fn is_negative(self) -> bool {
        self.flags & Self::SIGN_BIT != 0
    }
}

impl fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa().to_string();
        let scale = usize::from(self.scale());
        if self.is_negative() {
            f.write_str("-")?;
        }
        if scale == 0 {
            return f.write_str(&digits);
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int, frac) = padded.split_at(padded.len() - scale);
        write!(f, "{int}.{frac}")
    }
}

/// 16-byte globally unique identifier in the mixed-endian Windows layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

/// A date stored as an integer count of 100 ns ticks since 0001-01-01.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DateTicks(pub i64);

impl DateTicks {
    pub const TICKS_PER_SECOND: i64 = 10_000_000;
    /// Ticks at 1970-01-01T00:00:00Z.
    pub const UNIX_EPOCH: Self = Self(621_355_968_000_000_000);

    /// Convert a system time, saturating at the representable range.
    #[must_use]
    pub fn from_system_time(time: SystemTime) -> Self {
        let ticks = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self::duration_ticks(after),
            Err(before) => Self::duration_ticks(before.duration()).saturating_neg(),
        };
        Self(Self::UNIX_EPOCH.0.saturating_add(ticks))
    }

    /// Convert to a system time, `None` if outside the platform's range.
    #[must_use]
    pub fn to_system_time(self) -> Option<SystemTime> {
        let since_epoch = self.0.checked_sub(Self::UNIX_EPOCH.0)?;
        let magnitude = since_epoch.unsigned_abs();
        let duration = Duration::new(
            magnitude / Self::TICKS_PER_SECOND.unsigned_abs(),
            ((magnitude % Self::TICKS_PER_SECOND.unsigned_abs()) * 100) as u32,
        );
        if since_epoch >= 0 {
            UNIX_EPOCH.checked_add(duration)
        } else {
            UNIX_EPOCH.checked_sub(duration)
        }
    }

    fn duration_ticks(duration: Duration) -> i64 {
        let ticks = duration.as_nanos() / 100;
        i64::try_from(ticks).unwrap_or(i64::MAX)
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_width_table_matches_layout() {
        fn width_of<T: Scalar>() -> usize {
            T::KIND.width()
        }
        assert_eq!(width_of::<u8>(), 1);
        assert_eq!(width_of::<i32>(), 4);
        assert_eq!(width_of::<f64>(), 8);
        assert_eq!(width_of::<u128>(), 16);
        assert_eq!(width_of::<Decimal128>(), 16);
        assert_eq!(width_of::<Guid>(), 16);
        assert_eq!(width_of::<DateTicks>(), 8);
        assert_eq!(ScalarKind::ALL.len(), ScalarKind::WIDTHS.len());
        for (i, kind) in ScalarKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, i);
        }
    }

    #[test]
    fn test_decimal_parts() {
        let d = Decimal128::new(12345, 2, true);
        assert_eq!(d.mantissa(), 12345);
        assert_eq!(d.scale(), 2);
        assert!(d.is_negative());
        assert_eq!(d.to_string(), "-123.45");
        assert_eq!(Decimal128::new(5, 3, false).to_string(), "0.005");
        assert_eq!(Decimal128::new(u128::MAX, 0, false).mantissa(), (1u128 << 96) - 1);
    }

    #[test]
    fn test_guid_display() {
        let g = Guid {
            data1: 0x0002_0400,
            data2: 0,
            data3: 0,
            data4: [0xC0, 0, 0, 0, 0, 0, 0, 0x46],
        };
        assert_eq!(g.to_string(), "00020400-0000-0000-c000-000000000046");
    }

    #[test]
    fn test_date_ticks_epoch() {
        assert_eq!(DateTicks::from_system_time(UNIX_EPOCH), DateTicks::UNIX_EPOCH);
        let later = UNIX_EPOCH + Duration::from_secs(86_400);
        let ticks = DateTicks::from_system_time(later);
        assert_eq!(ticks.0 - DateTicks::UNIX_EPOCH.0, 86_400 * DateTicks::TICKS_PER_SECOND);
        assert_eq!(ticks.to_system_time(), Some(later));
    }
}
