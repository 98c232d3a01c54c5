//! JVM class file codec
//!
//! A class file is parsed into its tables with every attribute kept as raw
//! bytes. Serializing a parsed class that was not modified reproduces the
//! input byte for byte; modifications only touch the attributes they
//! rewrite and append to the constant pool.

pub mod annotation;
pub mod builder;
pub mod constant_pool;
pub mod descriptor;
pub mod mutf8;

use crate::error::{Error, Result};
use crate::keep::MemberKind;

pub use builder::ClassFileBuilder;
pub use constant_pool::ConstantPool;

/// Magic number: `CAFEBABE`
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Access flags of classes, fields and methods
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SUPER: u16 = 0x0020;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const VOLATILE: u16 = 0x0040;
    pub const BRIDGE: u16 = 0x0040;
    pub const TRANSIENT: u16 = 0x0080;
    pub const VARARGS: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const STRICT: u16 = 0x0800;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;
}

/// Big-endian cursor over class file bytes
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| Error::class_format(format!("truncated at offset {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u1(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u2(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u4(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl Attribute {
    fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let name_index = reader.u2()?;
        let len = reader.u4()? as usize;
        Ok(Self { name_index, info: reader.bytes(len)?.to_vec() })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.name_index.to_be_bytes());
        out.extend_from_slice(&(self.info.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.info);
    }
}

fn parse_attributes(reader: &mut Reader<'_>) -> Result<Vec<Attribute>> {
    let count = reader.u2()?;
    (0..count).map(|_| Attribute::parse(reader)).collect()
}

fn write_attributes(attributes: &[Attribute], out: &mut Vec<u8>) {
    out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
    for attribute in attributes {
        attribute.write(out);
    }
}

/// A `field_info` or `method_info` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            access_flags: reader.u2()?,
            name_index: reader.u2()?,
            descriptor_index: reader.u2()?,
            attributes: parse_attributes(reader)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&self.name_index.to_be_bytes());
        out.extend_from_slice(&self.descriptor_index.to_be_bytes());
        write_attributes(&self.attributes, out);
    }
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.u4()?;
        if magic != CLASS_MAGIC {
            return Err(Error::class_format(format!(
                "invalid magic: expected 0x{:08X}, got 0x{:08X}",
                CLASS_MAGIC, magic
            )));
        }
        let minor_version = reader.u2()?;
        let major_version = reader.u2()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;
        let access_flags = reader.u2()?;
        let this_class = reader.u2()?;
        let super_class = reader.u2()?;

        let interface_count = reader.u2()?;
        let interfaces = (0..interface_count).map(|_| reader.u2()).collect::<Result<Vec<_>>>()?;
        let field_count = reader.u2()?;
        let fields = (0..field_count).map(|_| MemberInfo::parse(&mut reader)).collect::<Result<Vec<_>>>()?;
        let method_count = reader.u2()?;
        let methods = (0..method_count).map(|_| MemberInfo::parse(&mut reader)).collect::<Result<Vec<_>>>()?;
        let attributes = parse_attributes(&mut reader)?;

        if !reader.is_empty() {
            return Err(Error::class_format("trailing bytes after class attributes"));
        }

        let class = Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        class.class_name()?;
        Ok(class)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
        out.extend_from_slice(&self.minor_version.to_be_bytes());
        out.extend_from_slice(&self.major_version.to_be_bytes());
        self.constant_pool.write(&mut out);
        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }
        out.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for field in &self.fields {
            field.write(&mut out);
        }
        out.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            method.write(&mut out);
        }
        write_attributes(&self.attributes, &mut out);
        out
    }

    /// Internal name of this class (`com/example/Foo`)
    pub fn class_name(&self) -> Result<String> {
        self.constant_pool
            .class_name(self.this_class)
            .ok_or_else(|| Error::class_format("this_class is not a valid Class constant"))
    }

    pub fn super_name(&self) -> Option<String> {
        self.constant_pool.class_name(self.super_class)
    }

    pub fn interface_names(&self) -> Vec<String> {
        self.interfaces.iter().filter_map(|&i| self.constant_pool.class_name(i)).collect()
    }

    pub fn member_name(&self, member: &MemberInfo) -> Result<String> {
        self.constant_pool.require_utf8(member.name_index)
    }

    pub fn member_descriptor(&self, member: &MemberInfo) -> Result<String> {
        self.constant_pool.require_utf8(member.descriptor_index)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access::INTERFACE != 0
    }

    /// Declaration-level view used by the matcher
    pub fn declaration_container(&self) -> Result<DeclarationContainer> {
        let pool = &self.constant_pool;
        let mut members = Vec::with_capacity(self.fields.len() + self.methods.len());
        for (kind, list) in [(MemberKind::Field, &self.fields), (MemberKind::Method, &self.methods)] {
            for member in list {
                members.push(MemberDeclaration {
                    kind,
                    name: self.member_name(member)?,
                    descriptor: self.member_descriptor(member)?,
                    access_flags: member.access_flags,
                    deprecated: annotation::has_deprecation_annotation(pool, &member.attributes),
                });
            }
        }
        Ok(DeclarationContainer {
            binary_name: self.class_name()?,
            access_flags: self.access_flags,
            super_name: self.super_name(),
            interfaces: self.interface_names(),
            members,
            deprecated: annotation::has_deprecation_annotation(pool, &self.attributes),
        })
    }
}

/// One field or method of a [`DeclarationContainer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDeclaration {
    pub kind: MemberKind,
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    /// Already carries a `kotlin.Deprecated` annotation
    pub deprecated: bool,
}

/// In-memory projection of one compiled type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationContainer {
    pub binary_name: String,
    pub access_flags: u16,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    /// Fields first, then methods, each in declaration order
    pub members: Vec<MemberDeclaration>,
    /// Already carries a `kotlin.Deprecated` annotation
    pub deprecated: bool,
}

impl DeclarationContainer {
    pub fn methods(&self) -> impl Iterator<Item = &MemberDeclaration> {
        self.members.iter().filter(|m| m.kind == MemberKind::Method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        ClassFileBuilder::new("com/x/Y")
            .access(access::PUBLIC | access::SUPER)
            .interface("java/io/Serializable")
            .field(access::PRIVATE, "count", "I")
            .method(access::PUBLIC, "foo", "()V")
            .method(access::PRIVATE | access::STATIC, "bar", "(Ljava/lang/String;)I")
            .build()
            .unwrap()
            .to_bytes()
    }

    #[test]
    fn test_roundtrip_identical() {
        let bytes = sample();
        let class = ClassFile::from_bytes(&bytes).unwrap();
        assert_eq!(class.to_bytes(), bytes);
    }

    #[test]
    fn test_declaration_container() {
        let class = ClassFile::from_bytes(&sample()).unwrap();
        let container = class.declaration_container().unwrap();
        assert_eq!(container.binary_name, "com/x/Y");
        assert_eq!(container.super_name.as_deref(), Some("java/lang/Object"));
        assert_eq!(container.interfaces, vec!["java/io/Serializable".to_string()]);
        assert_eq!(container.members.iter().filter(|m| m.kind == MemberKind::Field).count(), 1);

        let names: Vec<_> = container.methods().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["foo", "bar"]);
        assert!(!container.deprecated);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = sample();
        bytes[0] = 0;
        let err = ClassFile::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("invalid magic"));
    }

    #[test]
    fn test_truncated() {
        let bytes = sample();
        for len in [3, 10, bytes.len() - 1] {
            assert!(matches!(ClassFile::from_bytes(&bytes[..len]), Err(Error::ClassFormat(_))));
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample();
        bytes.push(0);
        assert!(ClassFile::from_bytes(&bytes).is_err());
    }
}
