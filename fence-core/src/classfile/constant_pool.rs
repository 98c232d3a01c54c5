//! Constant pool with append-only interning
//!
//! Entries keep their original bytes so an untouched pool serializes
//! exactly as it was read. New constants are only ever appended, which keeps
//! every existing index valid.

use std::collections::HashMap;

use super::mutf8;
use super::Reader;
use crate::error::{Error, Result};

pub const TAG_UTF8: u8 = 1;
pub const TAG_INTEGER: u8 = 3;
pub const TAG_FLOAT: u8 = 4;
pub const TAG_LONG: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_CLASS: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_FIELDREF: u8 = 9;
pub const TAG_METHODREF: u8 = 10;
pub const TAG_INTERFACE_METHODREF: u8 = 11;
pub const TAG_NAME_AND_TYPE: u8 = 12;
pub const TAG_METHOD_HANDLE: u8 = 15;
pub const TAG_METHOD_TYPE: u8 = 16;
pub const TAG_DYNAMIC: u8 = 17;
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
pub const TAG_MODULE: u8 = 19;
pub const TAG_PACKAGE: u8 = 20;

/// Highest usable index; `constant_pool_count` is a u2
const MAX_ENTRIES: usize = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub tag: u8,
    /// Body after the tag; for `Utf8` the modified UTF-8 bytes without the length
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// Slot 0 and the second slot of long/double entries are `None`
    entries: Vec<Option<Constant>>,
    utf8_index: HashMap<Vec<u8>, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self { entries: vec![None], utf8_index: HashMap::new() }
    }

    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.u2()? as usize;
        if count == 0 {
            return Err(Error::class_format("constant_pool_count is zero"));
        }
        let mut pool = Self::new();
        while pool.entries.len() < count {
            let tag = reader.u1()?;
            let data = match tag {
                TAG_UTF8 => {
                    let len = reader.u2()? as usize;
                    reader.bytes(len)?.to_vec()
                }
                TAG_CLASS | TAG_STRING | TAG_METHOD_TYPE | TAG_MODULE | TAG_PACKAGE => reader.bytes(2)?.to_vec(),
                TAG_METHOD_HANDLE => reader.bytes(3)?.to_vec(),
                TAG_INTEGER | TAG_FLOAT | TAG_FIELDREF | TAG_METHODREF | TAG_INTERFACE_METHODREF
                | TAG_NAME_AND_TYPE | TAG_DYNAMIC | TAG_INVOKE_DYNAMIC => reader.bytes(4)?.to_vec(),
                TAG_LONG | TAG_DOUBLE => reader.bytes(8)?.to_vec(),
                other => {
                    return Err(Error::class_format(format!(
                        "unknown constant tag {} at index {}",
                        other,
                        pool.entries.len()
                    )));
                }
            };
            let wide = matches!(tag, TAG_LONG | TAG_DOUBLE);
            if wide && pool.entries.len() + 1 >= count {
                return Err(Error::class_format("long/double constant overruns the pool"));
            }
            pool.push(Constant { tag, data });
            if wide {
                pool.entries.push(None);
            }
        }
        Ok(pool)
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for constant in self.entries.iter().flatten() {
            out.push(constant.tag);
            if constant.tag == TAG_UTF8 {
                out.extend_from_slice(&(constant.data.len() as u16).to_be_bytes());
            }
            out.extend_from_slice(&constant.data);
        }
    }

    fn push(&mut self, constant: Constant) -> u16 {
        let index = self.entries.len() as u16;
        if constant.tag == TAG_UTF8 {
            self.utf8_index.entry(constant.data.clone()).or_insert(index);
        }
        self.entries.push(Some(constant));
        index
    }

    fn append(&mut self, constant: Constant) -> Result<u16> {
        if self.entries.len() >= MAX_ENTRIES {
            return Err(Error::ConstantPoolOverflow);
        }
        Ok(self.push(constant))
    }

    /// Number of slots including the unused slot 0
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize)?.as_ref()
    }

    pub fn utf8(&self, index: u16) -> Option<String> {
        match self.get(index)? {
            Constant { tag: TAG_UTF8, data } => mutf8::decode(data),
            _ => None,
        }
    }

    /// Like [`Self::utf8`] but reports a malformed reference
    pub fn require_utf8(&self, index: u16) -> Result<String> {
        self.utf8(index)
            .ok_or_else(|| Error::class_format(format!("constant #{} is not a valid Utf8 entry", index)))
    }

    /// Name behind a `CONSTANT_Class` entry
    pub fn class_name(&self, index: u16) -> Option<String> {
        match self.get(index)? {
            Constant { tag: TAG_CLASS, data } => self.utf8(u16::from_be_bytes([data[0], data[1]])),
            _ => None,
        }
    }

    pub fn integer(&self, index: u16) -> Option<i32> {
        match self.get(index)? {
            Constant { tag: TAG_INTEGER, data } => Some(i32::from_be_bytes([data[0], data[1], data[2], data[3]])),
            _ => None,
        }
    }

    pub fn intern_utf8(&mut self, text: &str) -> Result<u16> {
        let bytes = mutf8::encode(text);
        if bytes.len() > u16::MAX as usize {
            return Err(Error::class_format("string constant longer than 65535 bytes"));
        }
        if let Some(&index) = self.utf8_index.get(&bytes) {
            return Ok(index);
        }
        self.append(Constant { tag: TAG_UTF8, data: bytes })
    }

    pub fn intern_integer(&mut self, value: i32) -> Result<u16> {
        let data = value.to_be_bytes().to_vec();
        self.intern(TAG_INTEGER, data)
    }

    pub fn intern_class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.intern_utf8(internal_name)?;
        self.intern(TAG_CLASS, name.to_be_bytes().to_vec())
    }

    fn intern(&mut self, tag: u8, data: Vec<u8>) -> Result<u16> {
        let existing = self
            .entries
            .iter()
            .position(|e| matches!(e, Some(c) if c.tag == tag && c.data == data));
        match existing {
            Some(index) => Ok(index as u16),
            None => self.append(Constant { tag, data }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes() -> Vec<u8> {
        let mut bytes = vec![0x00, 0x06];
        bytes.extend_from_slice(&[TAG_UTF8, 0x00, 0x03, b'F', b'o', b'o']);
        bytes.extend_from_slice(&[TAG_CLASS, 0x00, 0x01]);
        bytes.extend_from_slice(&[TAG_LONG, 0, 0, 0, 0, 0, 0, 0, 7]);
        bytes.extend_from_slice(&[TAG_INTEGER, 0xFF, 0xFF, 0xFF, 0xFE]);
        bytes
    }

    #[test]
    fn test_parse_and_write_identical() {
        let bytes = sample_bytes();
        let pool = ConstantPool::parse(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(pool.len(), 6);
        assert_eq!(pool.utf8(1).as_deref(), Some("Foo"));
        assert_eq!(pool.class_name(2).as_deref(), Some("Foo"));
        assert!(pool.get(4).is_none());
        assert_eq!(pool.integer(5), Some(-2));

        let mut out = Vec::new();
        pool.write(&mut out);
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_interning_reuses_and_appends() {
        let bytes = sample_bytes();
        let mut pool = ConstantPool::parse(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(pool.intern_utf8("Foo").unwrap(), 1);
        assert_eq!(pool.intern_class("Foo").unwrap(), 2);
        assert_eq!(pool.intern_integer(-2).unwrap(), 5);
        assert_eq!(pool.intern_utf8("Bar").unwrap(), 6);
        assert_eq!(pool.intern_utf8("Bar").unwrap(), 6);
        assert_eq!(pool.len(), 7);
    }

    #[test]
    fn test_overflow() {
        let mut pool = ConstantPool::new();
        for i in 1..MAX_ENTRIES {
            pool.intern_utf8(&format!("c{}", i)).unwrap();
        }
        assert_eq!(pool.len(), MAX_ENTRIES);
        assert!(matches!(pool.intern_utf8("one more"), Err(Error::ConstantPoolOverflow)));
        assert_eq!(pool.intern_utf8("c1").unwrap(), 1);
    }

    #[test]
    fn test_unknown_tag() {
        let bytes = [0x00, 0x02, 0x02, 0x00];
        assert!(ConstantPool::parse(&mut Reader::new(&bytes)).is_err());
    }
}
