//! Field-preserving protobuf messages
//!
//! Every field remembers the exact bytes it was read from. Encoding writes
//! those bytes back verbatim unless the field was replaced, so a message
//! that was only inspected re-encodes identically, unknown fields and
//! extensions included.

use super::MetadataDecodeError;

pub const WIRE_VARINT: u8 = 0;
pub const WIRE_FIXED64: u8 = 1;
pub const WIRE_LENGTH_DELIMITED: u8 = 2;
pub const WIRE_FIXED32: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Varint(u64),
    Fixed64([u8; 8]),
    Bytes(Vec<u8>),
    Fixed32([u8; 4]),
}

impl Value {
    fn wire_type(&self) -> u8 {
        match self {
            Value::Varint(_) => WIRE_VARINT,
            Value::Fixed64(_) => WIRE_FIXED64,
            Value::Bytes(_) => WIRE_LENGTH_DELIMITED,
            Value::Fixed32(_) => WIRE_FIXED32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub number: u32,
    pub value: Value,
    /// Original encoding, tag included; `None` once the field is replaced
    raw: Option<Vec<u8>>,
}

impl Field {
    pub fn new(number: u32, value: Value) -> Self {
        Self { number, value, raw: None }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        if let Some(raw) = &self.raw {
            out.extend_from_slice(raw);
            return;
        }
        write_varint(out, ((self.number as u64) << 3) | self.value.wire_type() as u64);
        match &self.value {
            Value::Varint(v) => write_varint(out, *v),
            Value::Fixed64(b) => out.extend_from_slice(b),
            Value::Fixed32(b) => out.extend_from_slice(b),
            Value::Bytes(b) => {
                write_varint(out, b.len() as u64);
                out.extend_from_slice(b);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub fields: Vec<Field>,
}

impl Message {
    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataDecodeError> {
        let mut fields = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let start = pos;
            let key = read_varint(bytes, &mut pos)?;
            let number = u32::try_from(key >> 3)
                .ok()
                .filter(|&n| n != 0)
                .ok_or_else(|| protobuf_error(start, "invalid field number"))?;
            let value = match (key & 0x7) as u8 {
                WIRE_VARINT => Value::Varint(read_varint(bytes, &mut pos)?),
                WIRE_FIXED64 => Value::Fixed64(take(bytes, &mut pos, 8)?.try_into().map_err(|_| protobuf_error(pos, "fixed64"))?),
                WIRE_LENGTH_DELIMITED => {
                    let len = read_varint(bytes, &mut pos)? as usize;
                    Value::Bytes(take(bytes, &mut pos, len)?.to_vec())
                }
                WIRE_FIXED32 => Value::Fixed32(take(bytes, &mut pos, 4)?.try_into().map_err(|_| protobuf_error(pos, "fixed32"))?),
                other => return Err(protobuf_error(start, &format!("unsupported wire type {}", other))),
            };
            fields.push(Field { number, value, raw: Some(bytes[start..pos].to_vec()) });
        }
        Ok(Self { fields })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in &self.fields {
            field.encode(&mut out);
        }
        out
    }

    /// Last occurrence wins, as in protobuf
    pub fn varint(&self, number: u32) -> Option<u64> {
        self.fields.iter().rev().find_map(|f| match (f.number == number, &f.value) {
            (true, Value::Varint(v)) => Some(*v),
            _ => None,
        })
    }

    pub fn bytes(&self, number: u32) -> Option<&[u8]> {
        self.fields.iter().rev().find_map(|f| match (f.number == number, &f.value) {
            (true, Value::Bytes(b)) => Some(b.as_slice()),
            _ => None,
        })
    }

    /// Indices into `fields` of every length-delimited occurrence of `number`
    pub fn positions(&self, number: u32) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.number == number && matches!(f.value, Value::Bytes(_)))
            .map(|(i, _)| i)
            .collect()
    }

    /// Packed or unpacked repeated varints
    pub fn repeated_varints(&self, number: u32) -> Result<Vec<u64>, MetadataDecodeError> {
        let mut values = Vec::new();
        for field in self.fields.iter().filter(|f| f.number == number) {
            match &field.value {
                Value::Varint(v) => values.push(*v),
                Value::Bytes(packed) => {
                    let mut pos = 0;
                    while pos < packed.len() {
                        values.push(read_varint(packed, &mut pos)?);
                    }
                }
                _ => return Err(protobuf_error(0, "unexpected wire type for repeated varint")),
            }
        }
        Ok(values)
    }

    /// Replace the value of the field at `index`
    pub fn replace(&mut self, index: usize, value: Value) {
        if let Some(field) = self.fields.get_mut(index) {
            if field.value != value {
                field.value = value;
                field.raw = None;
            }
        }
    }

    /// Overwrite the last occurrence of `number`, or insert it in field order
    pub fn set(&mut self, number: u32, value: Value) {
        match self.fields.iter().rposition(|f| f.number == number) {
            Some(index) => self.replace(index, value),
            None => self.insert(Field::new(number, value)),
        }
    }

    /// Insert before the first field with a higher number
    pub fn insert(&mut self, field: Field) {
        let at = self.fields.iter().position(|f| f.number > field.number).unwrap_or(self.fields.len());
        self.fields.insert(at, field);
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }
}

fn protobuf_error(offset: usize, message: &str) -> MetadataDecodeError {
    MetadataDecodeError::Protobuf(format!("{} at offset {}", message, offset))
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], MetadataDecodeError> {
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| protobuf_error(*pos, "truncated field"))?;
    let slice = &bytes[*pos..end];
    *pos = end;
    Ok(slice)
}

pub fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<u64, MetadataDecodeError> {
    let mut value = 0u64;
    for shift in (0..70).step_by(7) {
        let byte = *bytes.get(*pos).ok_or_else(|| protobuf_error(*pos, "truncated varint"))?;
        *pos += 1;
        if shift < 64 {
            value |= ((byte & 0x7F) as u64) << shift;
        }
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(protobuf_error(*pos, "varint longer than 10 bytes"))
}

pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Flags are `int32`; negative values are sign-extended to ten bytes
pub fn int32_value(value: i32) -> Value {
    Value::Varint(value as i64 as u64)
}
