//! Mirror of [`crate::updates::encoder`]: the compressed stream readers plus
//! `DecoderV1`/`DecoderV2`.

use crate::id::{ClientID, Clock, ID};
use lib0::any::Any;
use lib0::decoding::{Cursor, Read};
use lib0::error::Error as Lib0Error;

pub struct RleDecoder<'a, T> {
    cursor: Cursor<'a>,
    last: Option<T>,
    count: u64,
    read_value: fn(&mut Cursor<'a>) -> Result<T, Lib0Error>,
}

impl<'a, T: Copy> RleDecoder<'a, T> {
    pub fn new(buf: &'a [u8], read_value: fn(&mut Cursor<'a>) -> Result<T, Lib0Error>) -> Self {
        RleDecoder { cursor: Cursor::new(buf), last: None, count: 0, read_value }
    }

    pub fn read(&mut self) -> Result<T, Lib0Error> {
        if self.count == 0 {
            let value = (self.read_value)(&mut self.cursor)?;
            let run: u64 = self.cursor.read_var()?;
            self.count = run + 1;
            self.last = Some(value);
        }
        self.count -= 1;
        Ok(self.last.unwrap())
    }
}

pub struct UintOptRleDecoder<'a> {
    cursor: Cursor<'a>,
    last: u64,
    count: u64,
}

impl<'a> UintOptRleDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        UintOptRleDecoder { cursor: Cursor::new(buf), last: 0, count: 0 }
    }

    pub fn read(&mut self) -> Result<u64, Lib0Error> {
        if self.count == 0 {
            let v = self.cursor.read_ivar()?;
            if v < 0 {
                self.last = (-v) as u64;
                let run: u64 = self.cursor.read_var()?;
                self.count = run + 2;
            } else {
                self.last = v as u64;
                self.count = 1;
            }
        }
        self.count -= 1;
        Ok(self.last)
    }
}

pub struct IntDiffOptRleDecoder<'a> {
    cursor: Cursor<'a>,
    value: i64,
    diff: i64,
    count: u64,
}

impl<'a> IntDiffOptRleDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        IntDiffOptRleDecoder { cursor: Cursor::new(buf), value: 0, diff: 0, count: 0 }
    }

    pub fn read(&mut self) -> Result<i64, Lib0Error> {
        if self.count == 0 {
            let encoded = self.cursor.read_ivar()?;
            let more_than_one = encoded & 1 != 0;
            self.diff = encoded >> 1;
            self.count = if more_than_one {
                let run: u64 = self.cursor.read_var()?;
                run + 2
            } else {
                1
            };
        }
        self.value += self.diff;
        self.count -= 1;
        Ok(self.value)
    }
}

pub struct StringDecoder<'a> {
    lengths: UintOptRleDecoder<'a>,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> StringDecoder<'a> {
    pub fn new(len_buf: &'a [u8], str_buf: &'a [u8]) -> Self {
        StringDecoder { lengths: UintOptRleDecoder::new(len_buf), buf: str_buf, pos: 0 }
    }

    pub fn read(&mut self) -> Result<&'a str, Lib0Error> {
        let len = self.lengths.read()? as usize;
        let end = self.pos + len;
        let slice = self.buf.get(self.pos..end).ok_or(Lib0Error::UnexpectedEndOfInput)?;
        self.pos = end;
        std::str::from_utf8(slice).map_err(|_| Lib0Error::InvalidUtf8)
    }
}

/// Mirror of [`crate::updates::encoder::Encoder`].
pub trait Decoder<'a> {
    fn read_info(&mut self) -> Result<u8, Lib0Error>;
    fn read_client(&mut self) -> Result<ClientID, Lib0Error>;
    fn read_clock(&mut self) -> Result<Clock, Lib0Error>;
    fn read_len(&mut self) -> Result<u32, Lib0Error>;
    fn read_left_id(&mut self) -> Result<ID, Lib0Error>;
    fn read_right_id(&mut self) -> Result<ID, Lib0Error>;
    fn read_parent_info(&mut self) -> Result<bool, Lib0Error>;
    fn read_type_ref(&mut self) -> Result<u8, Lib0Error>;
    fn read_string(&mut self) -> Result<&'a str, Lib0Error>;
    fn read_buf(&mut self) -> Result<&'a [u8], Lib0Error>;
    fn read_any(&mut self) -> Result<Any, Lib0Error>;
    fn read_ds_clock(&mut self) -> Result<Clock, Lib0Error>;
    fn read_ds_len(&mut self) -> Result<u32, Lib0Error>;
}

pub struct DecoderV1<'a> {
    cursor: Cursor<'a>,
}

impl<'a> DecoderV1<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        DecoderV1 { cursor: Cursor::new(buf) }
    }

    pub fn has_content(&self) -> bool {
        self.cursor.has_content()
    }

    pub fn cursor_mut(&mut self) -> &mut Cursor<'a> {
        &mut self.cursor
    }
}

impl<'a> Decoder<'a> for DecoderV1<'a> {
    fn read_info(&mut self) -> Result<u8, Lib0Error> {
        self.cursor.read_u8()
    }

    fn read_client(&mut self) -> Result<ClientID, Lib0Error> {
        self.cursor.read_var()
    }

    fn read_clock(&mut self) -> Result<Clock, Lib0Error> {
        self.cursor.read_var()
    }

    fn read_len(&mut self) -> Result<u32, Lib0Error> {
        self.cursor.read_var()
    }

    fn read_left_id(&mut self) -> Result<ID, Lib0Error> {
        let client = self.cursor.read_var()?;
        let clock = self.cursor.read_var()?;
        Ok(ID::new(client, clock))
    }

    fn read_right_id(&mut self) -> Result<ID, Lib0Error> {
        self.read_left_id()
    }

    fn read_parent_info(&mut self) -> Result<bool, Lib0Error> {
        let v: u64 = self.cursor.read_var()?;
        Ok(v == 1)
    }

    fn read_type_ref(&mut self) -> Result<u8, Lib0Error> {
        self.cursor.read_u8()
    }

    fn read_string(&mut self) -> Result<&'a str, Lib0Error> {
        self.cursor.read_string()
    }

    fn read_buf(&mut self) -> Result<&'a [u8], Lib0Error> {
        self.cursor.read_buf()
    }

    fn read_any(&mut self) -> Result<Any, Lib0Error> {
        Any::decode(&mut self.cursor)
    }

    fn read_ds_clock(&mut self) -> Result<Clock, Lib0Error> {
        self.cursor.read_var()
    }

    fn read_ds_len(&mut self) -> Result<u32, Lib0Error> {
        self.cursor.read_var()
    }
}

/// Reads the 13 length-prefixed sub-streams `EncoderV2::to_vec` wrote, then
/// dispatches each field to its matching compressed-stream reader.
pub struct DecoderV2<'a> {
    info: RleDecoder<'a, u8>,
    client: UintOptRleDecoder<'a>,
    left_clock: IntDiffOptRleDecoder<'a>,
    right_clock: IntDiffOptRleDecoder<'a>,
    len: UintOptRleDecoder<'a>,
    parent_info: RleDecoder<'a, u8>,
    type_ref: RleDecoder<'a, u8>,
    strings: StringDecoder<'a>,
    buffers: Cursor<'a>,
    any_values: Cursor<'a>,
    ds_clock: IntDiffOptRleDecoder<'a>,
    ds_len: UintOptRleDecoder<'a>,
}

impl<'a> DecoderV2<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, Lib0Error> {
        let mut cursor = Cursor::new(buf);
        let mut next = || cursor.read_buf();
        let info = next()?;
        let client = next()?;
        let left_clock = next()?;
        let right_clock = next()?;
        let len = next()?;
        let parent_info = next()?;
        let type_ref = next()?;
        let str_lens = next()?;
        let str_buf = next()?;
        let buffers = next()?;
        let any_values = next()?;
        let ds_clock = next()?;
        let ds_len = next()?;
        Ok(DecoderV2 {
            info: RleDecoder::new(info, |c| c.read_u8()),
            client: UintOptRleDecoder::new(client),
            left_clock: IntDiffOptRleDecoder::new(left_clock),
            right_clock: IntDiffOptRleDecoder::new(right_clock),
            len: UintOptRleDecoder::new(len),
            parent_info: RleDecoder::new(parent_info, |c| c.read_u8()),
            type_ref: RleDecoder::new(type_ref, |c| c.read_u8()),
            strings: StringDecoder::new(str_lens, str_buf),
            buffers: Cursor::new(buffers),
            any_values: Cursor::new(any_values),
            ds_clock: IntDiffOptRleDecoder::new(ds_clock),
            ds_len: UintOptRleDecoder::new(ds_len),
        })
    }
}

impl<'a> Decoder<'a> for DecoderV2<'a> {
    fn read_info(&mut self) -> Result<u8, Lib0Error> {
        self.info.read()
    }

    fn read_client(&mut self) -> Result<ClientID, Lib0Error> {
        self.client.read()
    }

    fn read_clock(&mut self) -> Result<Clock, Lib0Error> {
        Ok(self.left_clock.read()? as Clock)
    }

    fn read_len(&mut self) -> Result<u32, Lib0Error> {
        Ok(self.len.read()? as u32)
    }

    fn read_left_id(&mut self) -> Result<ID, Lib0Error> {
        let client = self.client.read()?;
        let clock = self.left_clock.read()? as Clock;
        Ok(ID::new(client, clock))
    }

    fn read_right_id(&mut self) -> Result<ID, Lib0Error> {
        let client = self.client.read()?;
        let clock = self.right_clock.read()? as Clock;
        Ok(ID::new(client, clock))
    }

    fn read_parent_info(&mut self) -> Result<bool, Lib0Error> {
        Ok(self.parent_info.read()? == 1)
    }

    fn read_type_ref(&mut self) -> Result<u8, Lib0Error> {
        self.type_ref.read()
    }

    fn read_string(&mut self) -> Result<&'a str, Lib0Error> {
        self.strings.read()
    }

    fn read_buf(&mut self) -> Result<&'a [u8], Lib0Error> {
        self.buffers.read_buf()
    }

    fn read_any(&mut self) -> Result<Any, Lib0Error> {
        Any::decode(&mut self.any_values)
    }

    fn read_ds_clock(&mut self) -> Result<Clock, Lib0Error> {
        Ok(self.ds_clock.read()? as Clock)
    }

    fn read_ds_len(&mut self) -> Result<u32, Lib0Error> {
        Ok(self.ds_len.read()? as u32)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::updates::encoder::{Encoder, EncoderV2, IntDiffOptRleEncoder, UintOptRleEncoder};

    #[test]
    fn uint_opt_rle_roundtrips_runs_and_singles() {
        let mut enc = UintOptRleEncoder::new();
        for v in [5u64, 5, 5, 7, 9, 9] {
            enc.write(v);
        }
        let bytes = enc.finish();
        let mut dec = UintOptRleDecoder::new(&bytes);
        let mut out = Vec::new();
        for _ in 0..6 {
            out.push(dec.read().unwrap());
        }
        assert_eq!(out, vec![5, 5, 5, 7, 9, 9]);
    }

    #[test]
    fn int_diff_opt_rle_roundtrips() {
        let mut enc = IntDiffOptRleEncoder::new();
        for v in [10i64, 11, 12, 13, 20, 5] {
            enc.write(v);
        }
        let bytes = enc.finish();
        let mut dec = IntDiffOptRleDecoder::new(&bytes);
        let mut out = Vec::new();
        for _ in 0..6 {
            out.push(dec.read().unwrap());
        }
        assert_eq!(out, vec![10, 11, 12, 13, 20, 5]);
    }

    #[test]
    fn encoder_v2_stream_layout_roundtrips_info_bytes() {
        let mut enc: Box<dyn Encoder> = Box::new(EncoderV2::new());
        enc.write_info(4);
        enc.write_info(4);
        enc.write_info(6);
        let bytes = enc.to_vec();
        let dec = DecoderV2::new(&bytes).unwrap();
        let mut dec = dec;
        assert_eq!(dec.read_info().unwrap(), 4);
        assert_eq!(dec.read_info().unwrap(), 4);
        assert_eq!(dec.read_info().unwrap(), 6);
    }
}
