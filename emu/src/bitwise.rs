use std::ops::RangeInclusive;

/// Bit manipulation helpers used all over the decoders.
///
/// Indexes go from lsb to msb (right to left), ranges are inclusive on both
/// ends, so `0b1100.get_bits(2..=3) == 0b11`.
pub trait Bits: Copy {
    const WIDTH: u8;

    fn get_bit(self, bit_idx: u8) -> bool;

    #[must_use]
    fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self;

    fn set_bit(&mut self, bit_idx: u8, value: bool);

    fn set_bit_on(&mut self, bit_idx: u8) {
        self.set_bit(bit_idx, true);
    }

    fn set_bit_off(&mut self, bit_idx: u8) {
        self.set_bit(bit_idx, false);
    }

    /// True only when every bit in the range is 1.
    fn are_bits_on(self, bits_range: RangeInclusive<u8>) -> bool {
        bits_range.into_iter().all(|idx| self.get_bit(idx))
    }

    fn get_byte(self, byte_nth: u8) -> u8;

    fn set_byte(&mut self, byte_nth: u8, value: u8);

    /// Returns a sign-extended copy of the value, treating it as a
    /// two's complement number `number_of_bits` wide.
    #[must_use]
    fn sign_extended(self, number_of_bits: u8) -> Self;
}

macro_rules! impl_bits {
    ($t:ty, $signed:ty) => {
        impl Bits for $t {
            const WIDTH: u8 = <$t>::BITS as u8;

            #[inline]
            fn get_bit(self, bit_idx: u8) -> bool {
                debug_assert!(bit_idx < Self::WIDTH);
                (self >> bit_idx) & 1 == 1
            }

            #[inline]
            fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self {
                let start = *bits_range.start();
                let end = *bits_range.end();
                debug_assert!(start <= end && end < Self::WIDTH);
                let length = u32::from(end - start + 1);
                let mask = <$t>::MAX.checked_shr(<$t>::BITS - length).unwrap_or(0);
                (self >> start) & mask
            }

            #[inline]
            fn set_bit(&mut self, bit_idx: u8, value: bool) {
                debug_assert!(bit_idx < Self::WIDTH);
                if value {
                    *self |= 1 << bit_idx;
                } else {
                    *self &= !(1 << bit_idx);
                }
            }

            #[inline]
            fn get_byte(self, byte_nth: u8) -> u8 {
                debug_assert!(byte_nth < Self::WIDTH / 8);
                (self >> (byte_nth * 8)) as u8
            }

            #[inline]
            fn set_byte(&mut self, byte_nth: u8, value: u8) {
                debug_assert!(byte_nth < Self::WIDTH / 8);
                let shift = byte_nth * 8;
                *self = (*self & !(0xFF << shift)) | (<$t>::from(value) << shift);
            }

            #[inline]
            fn sign_extended(self, number_of_bits: u8) -> Self {
                debug_assert!(number_of_bits > 0 && number_of_bits <= Self::WIDTH);
                let unused = Self::WIDTH - number_of_bits;
                (((self << unused) as $signed) >> unused) as $t
            }
        }
    };
}

impl_bits!(u8, i8);
impl_bits!(u16, i16);
impl_bits!(u32, i32);
impl_bits!(u64, i64);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::Rng;

    #[test]
    fn get_bit() {
        let b = 0b1011001110_u32;
        assert!(b.get_bit(1));
        assert!(!b.get_bit(0));
        assert!(b.get_bit(2));
        assert!(!b.get_bit(31));
    }

    #[test]
    fn set_bit() {
        let mut b = 0b1100110_u32;
        b.set_bit(0, true);
        b.set_bit(1, true);
        b.set_bit(2, false);
        b.set_bit(3, false);
        assert_eq!(b, 0b1100011);

        b.set_bit_on(31);
        assert_eq!(b, 0x8000_0063);
        b.set_bit_off(0);
        assert_eq!(b, 0x8000_0062);
    }

    #[test]
    fn get_bits() {
        let b = 0b1011001110_u32;
        assert_eq!(b.get_bits(0..=3), 0b1110);
        assert_eq!(b.get_bits(1..=1), 0b1);
        assert_eq!(b.get_bits(4..=7), 0b1100);
        assert_eq!(b.get_bits(8..=9), 0b10);
        assert_eq!(b.get_bits(0..=31), 0b10_1100_1110);
        assert_eq!(b.get_bits(28..=31), 0b0);
        assert_eq!(0xF000_u16.get_bits(12..=15), 0xF);
    }

    #[test]
    fn toggle_every_bit() {
        let original = rand::thread_rng().gen_range(1..=u32::MAX - 1);
        let mut fin = original;
        for i in 0..32 {
            let bit = fin.get_bit(i);
            fin.set_bit(i, !bit);
        }

        assert_eq!(!original, fin);
    }

    #[test]
    fn are_bits_on() {
        let b = 0b1011001110_u32;
        assert!(!b.are_bits_on(0..=3));
        assert!(b.are_bits_on(1..=3));
    }

    #[test]
    fn bytes() {
        let mut b: u32 = 0x0122_0448;
        assert_eq!(b.get_byte(0), 0x48);
        assert_eq!(b.get_byte(3), 0x01);

        b.set_byte(2, 0xAA);
        assert_eq!(b, 0x01AA_0448);

        let mut h = 0u16;
        h.set_byte(1, 0xBE);
        assert_eq!(h, 0xBE00);
    }

    #[test]
    fn sign_extended() {
        let a: u32 = 0b1001; // -7 in i4
        assert_eq!(a.sign_extended(4) as i32, -7);

        let positive: u32 = 0b0111;
        assert_eq!(positive.sign_extended(4), 7);

        let offset: u32 = 0x00FF_FFFE;
        assert_eq!(offset.sign_extended(24) as i32, -2);
    }
}
