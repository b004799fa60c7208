//! [`Encode`] and [`Decode`] implementations for wire scalars, strings, byte
//! arrays, and other building blocks.

use std::io::Write;

use anyhow::{ensure, Context};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use crate::var_int::VarInt;
use crate::{Bounded, Decode, Encode};

const DEFAULT_MAX_STRING_CHARS: usize = 32767;

// ==== Primitives ==== //

impl Encode for bool {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_u8(u8::from(*self))?)
    }
}

impl Decode<'_> for bool {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        // Any nonzero byte reads as true; only 0x01 is ever written.
        Ok(r.read_u8()? != 0)
    }
}

impl Encode for u8 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_u8(*self)?)
    }
}

impl Decode<'_> for u8 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_u8()?)
    }
}

impl Encode for i8 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_i8(*self)?)
    }
}

impl Decode<'_> for i8 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_i8()?)
    }
}

impl Encode for u16 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_u16::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for u16 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_u16::<BigEndian>()?)
    }
}

impl Encode for i16 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_i16::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for i16 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_i16::<BigEndian>()?)
    }
}

impl Encode for u32 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_u32::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for u32 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_u32::<BigEndian>()?)
    }
}

impl Encode for i32 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_i32::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for i32 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_i32::<BigEndian>()?)
    }
}

impl Encode for u64 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_u64::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for u64 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_u64::<BigEndian>()?)
    }
}

impl Encode for i64 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_i64::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for i64 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_i64::<BigEndian>()?)
    }
}

impl Encode for u128 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_u128::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for u128 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_u128::<BigEndian>()?)
    }
}

impl Encode for f32 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        ensure!(
            self.is_finite(),
            "attempt to encode non-finite f32 ({})",
            self
        );
        Ok(w.write_f32::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for f32 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_f32::<BigEndian>()?)
    }
}

impl Encode for f64 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        ensure!(
            self.is_finite(),
            "attempt to encode non-finite f64 ({})",
            self
        );
        Ok(w.write_f64::<BigEndian>(*self)?)
    }
}

impl Decode<'_> for f64 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(r.read_f64::<BigEndian>()?)
    }
}

// ==== Other ==== //

impl Encode for Uuid {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.as_u128().encode(w)
    }
}

impl<'a> Decode<'a> for Uuid {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        u128::decode(r).map(Uuid::from_u128)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        match self {
            Some(t) => {
                true.encode(&mut w)?;
                t.encode(w)
            }
            None => false.encode(w),
        }
    }
}

impl<'a, T: Decode<'a>> Decode<'a> for Option<T> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(if bool::decode(r)? {
            Some(T::decode(r)?)
        } else {
            None
        })
    }
}

// ==== Strings ==== //

impl Encode for str {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        Bounded::<_, DEFAULT_MAX_STRING_CHARS>(self).encode(w)
    }
}

impl<const MAX_CHARS: usize> Encode for Bounded<&'_ str, MAX_CHARS> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        let char_count = self.chars().count();

        ensure!(
            char_count <= MAX_CHARS,
            "char count of string exceeds maximum (expected <= {MAX_CHARS}, got {char_count})"
        );

        VarInt(self.len() as i32).encode(&mut w)?;
        Ok(w.write_all(self.as_bytes())?)
    }
}

impl<'a> Decode<'a> for &'a str {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Bounded::<_, DEFAULT_MAX_STRING_CHARS>::decode(r)?.0)
    }
}

impl<'a, const MAX_CHARS: usize> Decode<'a> for Bounded<&'a str, MAX_CHARS> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        let len = VarInt::decode(r)?.0;
        ensure!(len >= 0, "attempt to decode string with negative length");
        let len = len as usize;
        ensure!(
            len <= r.len(),
            "not enough data remaining to decode string of {len} bytes"
        );

        let (res, remaining) = r.split_at(len);
        let res = std::str::from_utf8(res).context("decoded string is not valid UTF-8")?;

        let char_count = res.chars().count();
        ensure!(
            char_count <= MAX_CHARS,
            "char count of string exceeds maximum (expected <= {MAX_CHARS}, got {char_count})"
        );

        *r = remaining;

        Ok(Bounded(res))
    }
}

impl Encode for String {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.as_str().encode(w)
    }
}

impl Decode<'_> for String {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(<&str>::decode(r)?.into())
    }
}

// ==== Byte arrays ==== //

impl Encode for &'_ [u8] {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        VarInt(self.len() as i32).encode(&mut w)?;
        Ok(w.write_all(self)?)
    }
}

impl<'a> Decode<'a> for &'a [u8] {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        let len = VarInt::decode(r)?.0;
        ensure!(len >= 0, "attempt to decode byte array with negative length");
        let len = len as usize;
        ensure!(
            len <= r.len(),
            "not enough data remaining to decode byte array of {len} bytes"
        );

        let (res, remaining) = r.split_at(len);
        *r = remaining;
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn round_trip<'a, T>(value: T, buf: &'a mut Vec<u8>) -> T
    where
        T: Encode + Decode<'a> + PartialEq + std::fmt::Debug,
    {
        value.encode(&mut *buf).unwrap();
        let mut slice = buf.as_slice();
        let decoded = T::decode(&mut slice).unwrap();
        assert!(slice.is_empty());
        decoded
    }

    #[test]
    fn scalar_round_trips() {
        let mut buf = vec![];
        assert_eq!(round_trip(0x1122_3344_5566_7788_u64, &mut buf), 0x1122_3344_5566_7788);
        buf.clear();
        assert_eq!(round_trip(-12345_i32, &mut buf), -12345);
        buf.clear();
        assert_eq!(round_trip(25565_u16, &mut buf), 25565);
        buf.clear();
        assert_eq!(round_trip(3.25_f64, &mut buf), 3.25);
    }

    #[test]
    fn scalars_are_big_endian() {
        let mut buf = vec![];
        0x1122_u16.encode(&mut buf).unwrap();
        0x3344_5566_u32.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    }

    #[test]
    fn bool_encoding() {
        let mut buf = vec![];
        true.encode(&mut buf).unwrap();
        false.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x01, 0x00]);

        // Reads accept any nonzero byte as true.
        let mut r: &[u8] = &[0x02];
        assert!(bool::decode(&mut r).unwrap());
    }

    #[test]
    fn uuid_round_trip() {
        let id = Uuid::from_u128(0x1234_5678_9abc_def0_0fed_cba9_8765_4321);
        let mut buf = vec![];
        id.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 16);
        assert_eq!(buf[0], 0x12);

        let mut slice = buf.as_slice();
        assert_eq!(Uuid::decode(&mut slice).unwrap(), id);
    }

    #[test]
    fn string_round_trip() {
        let mut buf = vec![];
        "localhost".encode(&mut buf).unwrap();
        assert_eq!(buf[0], 9);

        let mut slice = buf.as_slice();
        assert_eq!(<&str>::decode(&mut slice).unwrap(), "localhost");
    }

    #[test]
    fn string_char_bound_enforced() {
        let mut buf = vec![];
        assert!(Bounded::<_, 3>("four").encode(&mut buf).is_err());

        let mut buf = vec![];
        "four".encode(&mut buf).unwrap();
        let mut slice = buf.as_slice();
        assert!(Bounded::<&str, 3>::decode(&mut slice).is_err());
    }

    #[test]
    fn string_truncated_input_rejected() {
        let mut buf = vec![];
        "hello".encode(&mut buf).unwrap();
        buf.pop();
        let mut slice = buf.as_slice();
        assert!(<&str>::decode(&mut slice).is_err());
    }

    #[test]
    fn byte_array_round_trip() {
        let mut buf = vec![];
        let payload: &[u8] = &[0xde, 0xad, 0xbe, 0xef];
        payload.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x04, 0xde, 0xad, 0xbe, 0xef]);

        let mut slice = buf.as_slice();
        assert_eq!(<&[u8]>::decode(&mut slice).unwrap(), payload);
    }

    #[test]
    fn option_round_trip() {
        let mut buf = vec![];
        Some(7_i32).encode(&mut buf).unwrap();
        None::<i32>.encode(&mut buf).unwrap();

        let mut slice = buf.as_slice();
        assert_eq!(Option::<i32>::decode(&mut slice).unwrap(), Some(7));
        assert_eq!(Option::<i32>::decode(&mut slice).unwrap(), None);
        assert!(slice.is_empty());
    }
}
