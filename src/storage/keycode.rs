//! Order-preserving binary encoding for storage keys.
//!
//! Keys are serialized through serde so that the byte order of two encoded
//! keys matches the order of the values they were built from. Row keys of a
//! table therefore sort by row id, and every key of a table shares a prefix
//! that can be range-scanned.
//!
//! bool:    0x00 for false, 0x01 for true.
//! i64:     big-endian, with the sign bit flipped.
//! u64:     big-endian.
//! f64:     big-endian, sign bit flipped, all bits flipped if negative.
//! String:  bytes with 0x00 escaped as 0x00ff, terminated by 0x0000.
//! Enum:    the variant index as a single byte, followed by its fields.
//! Tuple:   concatenation of the elements.
//!
//! The encoding is one-way: keys are never decoded, values carry whatever
//! the reader needs.

use serde::{Serialize, ser};

use crate::error::{Error, Result};

/// Serializes a key to its ordered binary representation.
pub fn serialize_key<T: Serialize + ?Sized>(key: &T) -> Result<Vec<u8>> {
    let mut serializer = Serializer { output: Vec::new() };
    key.serialize(&mut serializer)?;
    Ok(serializer.output)
}

struct Serializer {
    output: Vec<u8>,
}

fn unsupported(kind: &str) -> Error {
    Error::Internal(format!("keycode does not support {}", kind))
}

impl<'a> ser::Serializer for &'a mut Serializer {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleVariant = Self;
    type SerializeTupleStruct = ser::Impossible<(), Error>;
    type SerializeMap = ser::Impossible<(), Error>;
    type SerializeStruct = ser::Impossible<(), Error>;
    type SerializeStructVariant = ser::Impossible<(), Error>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.output.push(v as u8);
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.serialize_i64(v.into())
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.serialize_i64(v.into())
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.serialize_i64(v.into())
    }

    // Flipping the sign bit orders negative numbers before positive ones.
    fn serialize_i64(self, v: i64) -> Result<()> {
        let mut bytes = v.to_be_bytes();
        bytes[0] ^= 1 << 7;
        self.output.extend(bytes);
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.output.push(v);
        Ok(())
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.serialize_u64(v.into())
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.serialize_u64(v.into())
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.output.extend(v.to_be_bytes());
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        self.serialize_f64(v.into())
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        let mut bytes = v.to_be_bytes();
        if bytes[0] & (1 << 7) == 0 {
            bytes[0] ^= 1 << 7;
        } else {
            bytes.iter_mut().for_each(|b| *b = !*b);
        }
        self.output.extend(bytes);
        Ok(())
    }

    fn serialize_char(self, v: char) -> Result<()> {
        self.serialize_str(v.encode_utf8(&mut [0; 4]))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.serialize_bytes(v.as_bytes())
    }

    // Length prefixes would break ordering, so use an escaped terminator.
    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        for b in v {
            match b {
                0x00 => self.output.extend([0x00, 0xff]),
                b => self.output.push(*b),
            }
        }
        self.output.extend([0x00, 0x00]);
        Ok(())
    }

    fn serialize_none(self) -> Result<()> {
        self.output.push(0x00);
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<()> {
        self.output.push(0x01);
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, index: u32, _: &'static str) -> Result<()> {
        self.output.push(u8::try_from(index)?);
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()> {
        self.serialize_unit_variant(name, index, variant)?;
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(unsupported("tuple structs"))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        self.serialize_unit_variant(name, index, variant)?;
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap> {
        Err(unsupported("maps"))
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self::SerializeStruct> {
        Err(unsupported("structs"))
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(unsupported("struct variants"))
    }
}

impl ser::SerializeSeq for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTuple for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for &mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::serialize_key;
    use crate::{error::Result, sql::types::Value};

    #[derive(Serialize)]
    enum Key {
        Table(String),
        Row(String, i64),
    }

    #[test]
    fn test_integer_order() -> Result<()> {
        let mut keys = Vec::new();
        for id in [-100i64, -1, 0, 1, 2, 255, 256, i64::MAX] {
            keys.push(serialize_key(&Key::Row("students".into(), id))?);
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        Ok(())
    }

    #[test]
    fn test_string_terminator() -> Result<()> {
        // "ab" must not be a prefix match for "a" rows
        let a = serialize_key(&Key::Row("a".into(), 1))?;
        let ab = serialize_key(&Key::Row("ab".into(), 0))?;
        let prefix = serialize_key(&Key::Table("a".into()))?;
        assert!(a < ab);
        assert_eq!(&prefix[1..], &a[1..prefix.len()]);
        assert!(!ab[1..].starts_with(&prefix[1..]));
        assert_eq!(serialize_key("a\0b")?, vec![b'a', 0x00, 0xff, b'b', 0x00, 0x00]);
        Ok(())
    }

    #[test]
    fn test_value_order() -> Result<()> {
        let values = [
            Value::Real(-2.5),
            Value::Real(-0.5),
            Value::Real(0.0),
            Value::Real(3.25),
        ];
        let keys = values.iter().map(serialize_key).collect::<Result<Vec<_>>>()?;
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        let text = serialize_key(&Value::Text("Alice".into()))?;
        assert_ne!(text, serialize_key(&Value::Text("Alicf".into()))?);
        Ok(())
    }
}
