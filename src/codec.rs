//! Byte-level (de)serialization helpers shared by every on-disk layout
//! in the crate (columns, schemas, rows, table/index metadata), built
//! around a 32-bit length/count prefix for every variable-length part.

use std::convert::TryInto;
use std::io::{Cursor, Read, Write};
use std::mem::size_of;

pub trait Encodeable {
    fn encode_to(&self, out: &mut Vec<u8>);

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_to(&mut buf);
        buf
    }
}

pub trait Decodeable: Sized {
    fn decode_from<R: Read>(reader: &mut R) -> Self;
}

pub fn read_exact_bytes<R: Read>(reader: &mut R, count: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; count];
    reader
        .read_exact(&mut buffer)
        .unwrap_or_else(|e| panic!("corrupt page: expected {} bytes ({})", count, e));
    buffer
}

pub fn decode_bytes<T: Decodeable>(bytes: &[u8]) -> T {
    let mut cursor = Cursor::new(bytes);
    T::decode_from(&mut cursor)
}

macro_rules! impl_primitive_codec {
    (for $($t:ty),+) => {
        $(
            impl Encodeable for $t {
                fn encode_to(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }

            impl Decodeable for $t {
                fn decode_from<R: Read>(reader: &mut R) -> Self {
                    let bytes = read_exact_bytes(reader, size_of::<Self>());
                    Self::from_le_bytes(bytes.try_into().unwrap())
                }
            }
        )*
    }
}

impl_primitive_codec!(for u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// A raw byte slice, written without any length prefix — the reader
/// already knows how many bytes to expect (a fixed-width key, for
/// instance).
impl Encodeable for [u8] {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl Encodeable for bool {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
}

impl Decodeable for bool {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        u8::decode_from(reader) != 0
    }
}

/// Strings and opaque byte blobs always carry a 32-bit length prefix.
impl Encodeable for str {
    fn encode_to(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode_to(out);
        out.extend_from_slice(self.as_bytes());
    }
}

impl Encodeable for String {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.as_str().encode_to(out);
    }
}

impl Decodeable for String {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let len = u32::decode_from(reader) as usize;
        let bytes = read_exact_bytes(reader, len);
        String::from_utf8(bytes).expect("corrupt page: invalid utf8 string")
    }
}

pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write<T: Encodeable + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.encode_to(&mut self.buf);
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Pads (or errors, if already larger) to an exact page-sized slot.
    pub fn into_padded(self, size: usize) -> Vec<u8> {
        let mut buf = self.buf;
        assert!(
            buf.len() <= size,
            "serialized payload ({} bytes) exceeds slot size ({} bytes)",
            buf.len(),
            size
        );
        buf.resize(size, 0);
        buf
    }
}

impl Write for ByteWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
