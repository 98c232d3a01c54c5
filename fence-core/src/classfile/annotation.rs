//! `RuntimeVisibleAnnotations` reader and writer

use super::constant_pool::ConstantPool;
use super::{Attribute, Reader};
use crate::error::{Error, Result};

pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
pub const DEPRECATED_ATTRIBUTE: &str = "Deprecated";
pub const DEPRECATED_DESC: &str = "Lkotlin/Deprecated;";
pub const METADATA_DESC: &str = "Lkotlin/Metadata;";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// `B C D F I J S Z s`: constant pool reference
    Const { tag: u8, index: u16 },
    Enum { type_name: u16, const_name: u16 },
    Class(u16),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let tag = reader.u1()?;
        Ok(match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
                ElementValue::Const { tag, index: reader.u2()? }
            }
            b'e' => ElementValue::Enum { type_name: reader.u2()?, const_name: reader.u2()? },
            b'c' => ElementValue::Class(reader.u2()?),
            b'@' => ElementValue::Annotation(Annotation::parse(reader)?),
            b'[' => {
                let count = reader.u2()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(ElementValue::parse(reader)?);
                }
                ElementValue::Array(values)
            }
            other => {
                return Err(Error::class_format(format!("unknown element_value tag 0x{:02X}", other)));
            }
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            ElementValue::Const { tag, index } => {
                out.push(*tag);
                out.extend_from_slice(&index.to_be_bytes());
            }
            ElementValue::Enum { type_name, const_name } => {
                out.push(b'e');
                out.extend_from_slice(&type_name.to_be_bytes());
                out.extend_from_slice(&const_name.to_be_bytes());
            }
            ElementValue::Class(index) => {
                out.push(b'c');
                out.extend_from_slice(&index.to_be_bytes());
            }
            ElementValue::Annotation(annotation) => {
                out.push(b'@');
                annotation.write(out);
            }
            ElementValue::Array(values) => {
                out.push(b'[');
                out.extend_from_slice(&(values.len() as u16).to_be_bytes());
                for value in values {
                    value.write(out);
                }
            }
        }
    }

    /// Index of a constant value carrying `tag`
    pub fn const_index(&self, expected: u8) -> Option<u16> {
        match self {
            ElementValue::Const { tag, index } if *tag == expected => Some(*index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub type_index: u16,
    pub elements: Vec<(u16, ElementValue)>,
}

impl Annotation {
    fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let type_index = reader.u2()?;
        let count = reader.u2()?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = reader.u2()?;
            elements.push((name, ElementValue::parse(reader)?));
        }
        Ok(Self { type_index, elements })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.type_index.to_be_bytes());
        out.extend_from_slice(&(self.elements.len() as u16).to_be_bytes());
        for (name, value) in &self.elements {
            out.extend_from_slice(&name.to_be_bytes());
            value.write(out);
        }
    }

    pub fn type_descriptor(&self, pool: &ConstantPool) -> Option<String> {
        pool.utf8(self.type_index)
    }

    /// Value of the element named `name`
    pub fn element<'a>(&'a self, pool: &ConstantPool, name: &str) -> Option<&'a ElementValue> {
        self.elements
            .iter()
            .find(|(index, _)| pool.utf8(*index).as_deref() == Some(name))
            .map(|(_, value)| value)
    }

    /// The `message` of a `kotlin.Deprecated` annotation
    pub fn message(&self, pool: &ConstantPool) -> Option<String> {
        let index = self.element(pool, "message")?.const_index(b's')?;
        pool.utf8(index)
    }
}

/// Body of a `RuntimeVisibleAnnotations` attribute
pub fn parse_annotations(info: &[u8]) -> Result<Vec<Annotation>> {
    let mut reader = Reader::new(info);
    let count = reader.u2()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(Annotation::parse(&mut reader)?);
    }
    if !reader.is_empty() {
        return Err(Error::class_format("trailing bytes after annotations"));
    }
    Ok(annotations)
}

pub fn write_annotations(annotations: &[Annotation]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(annotations.len() as u16).to_be_bytes());
    for annotation in annotations {
        annotation.write(&mut out);
    }
    out
}

/// Visible annotations declared in an attribute table
pub fn visible_annotations(pool: &ConstantPool, attributes: &[Attribute]) -> Result<Vec<Annotation>> {
    match find_attribute(pool, attributes, RUNTIME_VISIBLE_ANNOTATIONS) {
        Some(i) => parse_annotations(&attributes[i].info),
        None => Ok(Vec::new()),
    }
}

pub fn find_attribute(pool: &ConstantPool, attributes: &[Attribute], name: &str) -> Option<usize> {
    attributes.iter().position(|a| pool.utf8(a.name_index).as_deref() == Some(name))
}

pub fn has_deprecated_attribute(pool: &ConstantPool, attributes: &[Attribute]) -> bool {
    find_attribute(pool, attributes, DEPRECATED_ATTRIBUTE).is_some()
}

/// Whether a `kotlin.Deprecated` annotation is already present.
/// Unreadable annotation tables count as not annotated.
pub fn has_deprecation_annotation(pool: &ConstantPool, attributes: &[Attribute]) -> bool {
    visible_annotations(pool, attributes)
        .map(|list| list.iter().any(|a| a.type_descriptor(pool).as_deref() == Some(DEPRECATED_DESC)))
        .unwrap_or(false)
}

/// Add the zero-length `Deprecated` attribute. Returns whether it was added.
pub fn set_deprecated_flag(pool: &mut ConstantPool, attributes: &mut Vec<Attribute>) -> Result<bool> {
    if has_deprecated_attribute(pool, attributes) {
        return Ok(false);
    }
    let name_index = pool.intern_utf8(DEPRECATED_ATTRIBUTE)?;
    attributes.push(Attribute { name_index, info: Vec::new() });
    Ok(true)
}

/// Append `@kotlin.Deprecated(message)` unless one is already present.
/// Returns whether the annotation was added.
pub fn attach_deprecation(pool: &mut ConstantPool, attributes: &mut Vec<Attribute>, message: &str) -> Result<bool> {
    let existing = find_attribute(pool, attributes, RUNTIME_VISIBLE_ANNOTATIONS);
    let mut annotations = match existing {
        Some(i) => parse_annotations(&attributes[i].info)?,
        None => Vec::new(),
    };
    if annotations.iter().any(|a| a.type_descriptor(pool).as_deref() == Some(DEPRECATED_DESC)) {
        return Ok(false);
    }

    let type_index = pool.intern_utf8(DEPRECATED_DESC)?;
    let name = pool.intern_utf8("message")?;
    let value = pool.intern_utf8(message)?;
    annotations.push(Annotation {
        type_index,
        elements: vec![(name, ElementValue::Const { tag: b's', index: value })],
    });

    let info = write_annotations(&annotations);
    match existing {
        Some(i) => attributes[i].info = info,
        None => {
            let name_index = pool.intern_utf8(RUNTIME_VISIBLE_ANNOTATIONS)?;
            attributes.push(Attribute { name_index, info });
        }
    }
    Ok(true)
}
