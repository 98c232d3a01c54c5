//! Kotlin metadata codec
//!
//! The `kotlin.Metadata` class annotation describes the declarations of a
//! class in source-level terms. For class-like kinds its `d1` strings carry
//! a protobuf payload (a delimited `StringTableTypes` followed by a `Class`
//! message) whose names live in `d2`. Decoding keeps the raw payload; only
//! the submessages of symbols that get marked are re-encoded.

pub mod bit_encoding;
pub mod builder;
pub mod conventions;
pub mod proto;
pub mod strings;

use thiserror::Error;

use crate::classfile::annotation::{Annotation, ElementValue};
use crate::classfile::ConstantPool;
use conventions::{MetadataConventions, DEFAULT_MODULE_NAME};
use proto::{Message, Value};
use strings::StringTable;

pub use builder::ClassMetadataBuilder;

/// Oldest and newest supported `mv` (major, minor)
pub const MIN_SUPPORTED_VERSION: (i32, i32) = (1, 4);
pub const MAX_SUPPORTED_VERSION: (i32, i32) = (2, 2);

pub const KIND_CLASS: i32 = 1;

/// A metadata blob could not be understood. Always recoverable: the caller
/// keeps the blob untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataDecodeError {
    #[error("metadata annotation has no '{0}' element")]
    MissingElement(&'static str),

    #[error("unsupported metadata version {0}")]
    UnsupportedVersion(String),

    #[error("unsupported metadata kind {0}")]
    UnsupportedKind(i32),

    #[error("malformed metadata encoding: {0}")]
    Encoding(String),

    #[error("malformed metadata payload: {0}")]
    Protobuf(String),

    #[error("malformed metadata string table: {0}")]
    StringTable(String),
}

/// Declaration flags as encoded in the payload
pub mod flags {
    pub const HAS_ANNOTATIONS: u32 = 1;
    pub const HAS_GETTER: u32 = 1 << 9;

    pub const VISIBILITY_INTERNAL: u32 = 0;
    pub const VISIBILITY_PRIVATE: u32 = 1;
    pub const VISIBILITY_PUBLIC: u32 = 3;

    pub const DEFAULT_CLASS_FLAGS: u32 = 6;
    pub const DEFAULT_FUNCTION_FLAGS: u32 = 6;
    pub const DEFAULT_CONSTRUCTOR_FLAGS: u32 = 6;
    pub const DEFAULT_PROPERTY_FLAGS: u32 = 518;
    pub const DEFAULT_PROPERTY_OLD_FLAGS: u32 = 2054;

    pub fn visibility(flags: u32) -> u32 {
        (flags >> 1) & 0x7
    }

    /// Flags of payloads written before the dedicated `flags` fields existed
    pub fn from_old_flags(old: u32) -> u32 {
        (old & 0x3F) + ((old >> 8) << 6)
    }

    /// Accessor flags implied by a property without explicit getter flags
    pub fn default_accessor_flags(property_flags: u32) -> u32 {
        property_flags & 0x3E
    }
}

// Field numbers of the payload messages
const CLASS_FLAGS: u32 = 1;
const CLASS_CONSTRUCTOR: u32 = 8;
const CLASS_FUNCTION: u32 = 9;
const CLASS_PROPERTY: u32 = 10;
const CLASS_MODULE_NAME: u32 = 101;

const CONSTRUCTOR_FLAGS: u32 = 1;
const FUNCTION_OLD_FLAGS: u32 = 1;
const FUNCTION_NAME: u32 = 2;
const FUNCTION_FLAGS: u32 = 9;
const PROPERTY_OLD_FLAGS: u32 = 1;
const PROPERTY_NAME: u32 = 2;
const PROPERTY_GETTER_FLAGS: u32 = 7;
const PROPERTY_FLAGS: u32 = 11;

/// `constructor_signature`, `method_signature` and `property_signature`
const JVM_SIGNATURE: u32 = 100;

const SIGNATURE_NAME: u32 = 1;
const SIGNATURE_DESC: u32 = 2;

const PROPERTY_SIGNATURE_FIELD: u32 = 1;
const PROPERTY_SIGNATURE_SYNTHETIC_METHOD: u32 = 2;
const PROPERTY_SIGNATURE_GETTER: u32 = 3;

/// Raw element values of the `kotlin.Metadata` annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataHeader {
    pub kind: i32,
    pub version: Vec<i32>,
    pub data1: Vec<String>,
    pub data2: Vec<String>,
    pub extra_string: Option<String>,
    pub package_name: Option<String>,
    pub extra_int: Option<i32>,
}

impl MetadataHeader {
    pub fn from_annotation(annotation: &Annotation, pool: &ConstantPool) -> Result<Self, MetadataDecodeError> {
        let mut header = MetadataHeader {
            kind: KIND_CLASS,
            version: Vec::new(),
            data1: Vec::new(),
            data2: Vec::new(),
            extra_string: None,
            package_name: None,
            extra_int: None,
        };
        let mut has_version = false;

        for (name_index, value) in &annotation.elements {
            let name = pool
                .utf8(*name_index)
                .ok_or_else(|| MetadataDecodeError::Encoding(format!("element name #{}", name_index)))?;
            match name.as_str() {
                "k" => header.kind = int_value(pool, value, "k")?,
                "mv" => {
                    header.version = array_values(value, "mv")?
                        .iter()
                        .map(|v| int_value(pool, v, "mv"))
                        .collect::<Result<_, _>>()?;
                    has_version = true;
                }
                "d1" => header.data1 = string_array(pool, value, "d1")?,
                "d2" => header.data2 = string_array(pool, value, "d2")?,
                "xs" => header.extra_string = Some(string_value(pool, value, "xs")?),
                "pn" => header.package_name = Some(string_value(pool, value, "pn")?),
                "xi" => header.extra_int = Some(int_value(pool, value, "xi")?),
                _ => {}
            }
        }

        if !has_version {
            return Err(MetadataDecodeError::MissingElement("mv"));
        }
        Ok(header)
    }

    /// A fresh annotation holding every present element
    pub fn to_annotation(&self, pool: &mut ConstantPool) -> crate::Result<Annotation> {
        let mut elements = Vec::new();
        elements.push((pool.intern_utf8("k")?, int_element(pool, self.kind)?));
        let version = self.version.iter().map(|&v| int_element(pool, v)).collect::<crate::Result<Vec<_>>>()?;
        elements.push((pool.intern_utf8("mv")?, ElementValue::Array(version)));
        elements.push((pool.intern_utf8("d1")?, string_array_element(pool, &self.data1)?));
        elements.push((pool.intern_utf8("d2")?, string_array_element(pool, &self.data2)?));
        if let Some(xs) = &self.extra_string {
            elements.push((pool.intern_utf8("xs")?, string_element(pool, xs)?));
        }
        if let Some(pn) = &self.package_name {
            elements.push((pool.intern_utf8("pn")?, string_element(pool, pn)?));
        }
        if let Some(xi) = self.extra_int {
            elements.push((pool.intern_utf8("xi")?, int_element(pool, xi)?));
        }
        Ok(Annotation { type_index: pool.intern_utf8(crate::classfile::annotation::METADATA_DESC)?, elements })
    }

    /// `original` with its `d1` and `d2` replaced by this header's
    pub fn replace_payload(&self, original: &Annotation, pool: &mut ConstantPool) -> crate::Result<Annotation> {
        let mut annotation = original.clone();
        for (key, data) in [("d1", &self.data1), ("d2", &self.data2)] {
            let value = string_array_element(pool, data)?;
            let slot = annotation.elements.iter_mut().find(|(name, _)| pool.utf8(*name).as_deref() == Some(key));
            match slot {
                Some((_, existing)) => *existing = value,
                None => {
                    let name = pool.intern_utf8(key)?;
                    annotation.elements.push((name, value));
                }
            }
        }
        Ok(annotation)
    }

    pub fn is_supported_version(&self) -> bool {
        match self.version.as_slice() {
            [major, minor, ..] => {
                (*major, *minor) >= MIN_SUPPORTED_VERSION && (*major, *minor) <= MAX_SUPPORTED_VERSION
            }
            _ => false,
        }
    }

    pub fn version_string(&self) -> String {
        self.version.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(".")
    }
}

fn int_value(pool: &ConstantPool, value: &ElementValue, name: &'static str) -> Result<i32, MetadataDecodeError> {
    value
        .const_index(b'I')
        .and_then(|i| pool.integer(i))
        .ok_or_else(|| MetadataDecodeError::Encoding(format!("'{}' is not an int", name)))
}

fn string_value(pool: &ConstantPool, value: &ElementValue, name: &'static str) -> Result<String, MetadataDecodeError> {
    value
        .const_index(b's')
        .and_then(|i| pool.utf8(i))
        .ok_or_else(|| MetadataDecodeError::Encoding(format!("'{}' is not a string", name)))
}

fn array_values<'a>(value: &'a ElementValue, name: &'static str) -> Result<&'a [ElementValue], MetadataDecodeError> {
    match value {
        ElementValue::Array(values) => Ok(values),
        _ => Err(MetadataDecodeError::Encoding(format!("'{}' is not an array", name))),
    }
}

fn string_array(pool: &ConstantPool, value: &ElementValue, name: &'static str) -> Result<Vec<String>, MetadataDecodeError> {
    array_values(value, name)?.iter().map(|v| string_value(pool, v, name)).collect()
}

fn int_element(pool: &mut ConstantPool, value: i32) -> crate::Result<ElementValue> {
    Ok(ElementValue::Const { tag: b'I', index: pool.intern_integer(value)? })
}

fn string_element(pool: &mut ConstantPool, value: &str) -> crate::Result<ElementValue> {
    Ok(ElementValue::Const { tag: b's', index: pool.intern_utf8(value)? })
}

fn string_array_element(pool: &mut ConstantPool, values: &[String]) -> crate::Result<ElementValue> {
    let values = values.iter().map(|s| string_element(pool, s)).collect::<crate::Result<Vec<_>>>()?;
    Ok(ElementValue::Array(values))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    /// `k = 1`: a class, interface, object or enum
    Class,
    /// File facades, synthetic classes and multi-file parts
    Other(i32),
}

/// JVM name and descriptor recorded for a symbol; either may be omitted
/// when the compiler could derive it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JvmSignature {
    pub name: Option<String>,
    pub descriptor: Option<String>,
}

impl JvmSignature {
    fn decode(bytes: &[u8], strings: &StringTable) -> Result<Self, MetadataDecodeError> {
        let message = Message::decode(bytes)?;
        Ok(Self {
            name: resolve_optional(strings, message.varint(SIGNATURE_NAME))?,
            descriptor: resolve_optional(strings, message.varint(SIGNATURE_DESC))?,
        })
    }

    fn descriptor_matches(&self, descriptor: &str) -> bool {
        self.descriptor.as_deref().is_none_or(|d| d == descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSymbol {
    pub name: String,
    pub signature: Option<JvmSignature>,
    /// `internal` visibility; such functions get a mangled JVM name
    pub visibility_is_restricted: bool,
    pub has_annotations: bool,
    position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySymbol {
    pub name: String,
    pub field_signature: Option<JvmSignature>,
    pub getter_signature: Option<JvmSignature>,
    pub has_annotations: bool,
    pub has_getter: bool,
    pub synthetic_holder_signature: Option<JvmSignature>,
    position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorSymbol {
    pub signature: Option<JvmSignature>,
    pub has_annotations: bool,
    position: usize,
}

/// Decoded view of one metadata blob
#[derive(Debug, Clone)]
pub struct MetadataSymbolTable {
    pub kind: MetadataKind,
    pub header: MetadataHeader,
    pub module_name: String,
    /// HAS_ANNOTATIONS of the class symbol itself
    pub class_has_annotations: bool,
    pub functions: Vec<FunctionSymbol>,
    pub properties: Vec<PropertySymbol>,
    pub constructors: Vec<ConstructorSymbol>,
    payload: Option<Payload>,
    modified: bool,
}

#[derive(Debug, Clone)]
struct Payload {
    strings: StringTable,
    class: Message,
}

/// Decode a metadata header. Blobs outside the supported versions, or
/// whose payload cannot be read, are reported and must be left untouched.
pub fn decode(header: &MetadataHeader) -> Result<MetadataSymbolTable, MetadataDecodeError> {
    if !header.is_supported_version() {
        return Err(MetadataDecodeError::UnsupportedVersion(header.version_string()));
    }

    let mut table = MetadataSymbolTable {
        kind: MetadataKind::Other(header.kind),
        header: header.clone(),
        module_name: DEFAULT_MODULE_NAME.to_string(),
        class_has_annotations: false,
        functions: Vec::new(),
        properties: Vec::new(),
        constructors: Vec::new(),
        payload: None,
        modified: false,
    };
    match header.kind {
        KIND_CLASS => {}
        2..=5 => return Ok(table),
        other => return Err(MetadataDecodeError::UnsupportedKind(other)),
    }
    table.kind = MetadataKind::Class;

    let bytes = bit_encoding::decode_bytes(&header.data1)?;
    let mut pos = 0;
    let types_len = proto::read_varint(&bytes, &mut pos)? as usize;
    let types_end = pos
        .checked_add(types_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| MetadataDecodeError::Protobuf("string table overruns the payload".into()))?;
    let strings = StringTable::parse(&bytes[pos..types_end], &header.data2)?;
    let class = Message::decode(&bytes[types_end..])?;

    if let Some(index) = class.varint(CLASS_MODULE_NAME) {
        table.module_name = resolve(&strings, index)?;
    }
    table.class_has_annotations = class_flags(&class) & flags::HAS_ANNOTATIONS != 0;

    for position in class.positions(CLASS_FUNCTION) {
        let message = submessage(&class, position)?;
        let flags = match message.varint(FUNCTION_FLAGS) {
            Some(f) => f as u32,
            None => message
                .varint(FUNCTION_OLD_FLAGS)
                .map(|old| flags::from_old_flags(old as u32))
                .unwrap_or(flags::DEFAULT_FUNCTION_FLAGS),
        };
        let name_index = message
            .varint(FUNCTION_NAME)
            .ok_or_else(|| MetadataDecodeError::Protobuf("function without a name".into()))?;
        table.functions.push(FunctionSymbol {
            name: resolve(&strings, name_index)?,
            signature: message.bytes(JVM_SIGNATURE).map(|b| JvmSignature::decode(b, &strings)).transpose()?,
            visibility_is_restricted: flags::visibility(flags) == flags::VISIBILITY_INTERNAL,
            has_annotations: flags & flags::HAS_ANNOTATIONS != 0,
            position,
        });
    }

    for position in class.positions(CLASS_PROPERTY) {
        let message = submessage(&class, position)?;
        let flags = property_flags(&message);
        let name_index = message
            .varint(PROPERTY_NAME)
            .ok_or_else(|| MetadataDecodeError::Protobuf("property without a name".into()))?;
        let (field_signature, getter_signature, synthetic_holder_signature) = match message.bytes(JVM_SIGNATURE) {
            Some(bytes) => {
                let signature = Message::decode(bytes)?;
                let part = |number| {
                    signature.bytes(number).map(|b| JvmSignature::decode(b, &strings)).transpose()
                };
                (
                    part(PROPERTY_SIGNATURE_FIELD)?,
                    part(PROPERTY_SIGNATURE_GETTER)?,
                    part(PROPERTY_SIGNATURE_SYNTHETIC_METHOD)?,
                )
            }
            None => (None, None, None),
        };
        table.properties.push(PropertySymbol {
            name: resolve(&strings, name_index)?,
            field_signature,
            getter_signature,
            has_annotations: flags & flags::HAS_ANNOTATIONS != 0,
            has_getter: flags & flags::HAS_GETTER != 0,
            synthetic_holder_signature,
            position,
        });
    }

    for position in class.positions(CLASS_CONSTRUCTOR) {
        let message = submessage(&class, position)?;
        let flags = message.varint(CONSTRUCTOR_FLAGS).map(|f| f as u32).unwrap_or(flags::DEFAULT_CONSTRUCTOR_FLAGS);
        table.constructors.push(ConstructorSymbol {
            signature: message.bytes(JVM_SIGNATURE).map(|b| JvmSignature::decode(b, &strings)).transpose()?,
            has_annotations: flags & flags::HAS_ANNOTATIONS != 0,
            position,
        });
    }

    table.payload = Some(Payload { strings, class });
    Ok(table)
}

fn resolve(strings: &StringTable, index: u64) -> Result<String, MetadataDecodeError> {
    strings
        .get(index as usize)
        .ok_or_else(|| MetadataDecodeError::StringTable(format!("no string at index {}", index)))
}

fn resolve_optional(strings: &StringTable, index: Option<u64>) -> Result<Option<String>, MetadataDecodeError> {
    index.map(|i| resolve(strings, i)).transpose()
}

fn submessage(parent: &Message, position: usize) -> Result<Message, MetadataDecodeError> {
    match &parent.fields[position].value {
        Value::Bytes(bytes) => Message::decode(bytes),
        _ => Err(MetadataDecodeError::Protobuf("expected a nested message".into())),
    }
}

fn class_flags(class: &Message) -> u32 {
    class.varint(CLASS_FLAGS).map(|f| f as u32).unwrap_or(flags::DEFAULT_CLASS_FLAGS)
}

fn property_flags(message: &Message) -> u32 {
    match message.varint(PROPERTY_FLAGS) {
        Some(f) => f as u32,
        None => flags::from_old_flags(
            message.varint(PROPERTY_OLD_FLAGS).map(|f| f as u32).unwrap_or(flags::DEFAULT_PROPERTY_OLD_FLAGS),
        ),
    }
}

impl MetadataSymbolTable {
    pub fn is_class(&self) -> bool {
        self.kind == MetadataKind::Class
    }

    /// Whether any symbol was marked since decoding
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// JVM-visible name a function is looked up under
    pub fn function_key(&self, function: &FunctionSymbol, conventions: &dyn MetadataConventions) -> String {
        match function.signature.as_ref().and_then(|s| s.name.clone()) {
            Some(name) => name,
            None => conventions.function_jvm_name(&function.name, function.visibility_is_restricted, &self.module_name),
        }
    }

    pub fn find_function(&self, jvm_name: &str, descriptor: &str, conventions: &dyn MetadataConventions) -> Option<usize> {
        self.functions.iter().position(|f| {
            self.function_key(f, conventions) == jvm_name
                && f.signature.as_ref().is_none_or(|s| s.descriptor_matches(descriptor))
        })
    }

    pub fn find_constructor(&self, descriptor: &str) -> Option<usize> {
        self.constructors
            .iter()
            .position(|c| c.signature.as_ref().is_none_or(|s| s.descriptor_matches(descriptor)))
    }

    /// Property backed by the field `field_name`
    pub fn find_property_for_field(&self, field_name: &str) -> Option<usize> {
        self.properties.iter().position(|p| {
            match p.field_signature.as_ref().and_then(|s| s.name.as_deref()) {
                Some(name) => name == field_name,
                None => p.name == field_name,
            }
        })
    }

    /// JVM name and optional descriptor of a property's getter
    pub fn getter_of(&self, property: &PropertySymbol, conventions: &dyn MetadataConventions) -> (String, Option<String>) {
        let signature = property.getter_signature.clone().unwrap_or_default();
        let name = signature.name.unwrap_or_else(|| conventions.getter_name(&property.name));
        (name, signature.descriptor)
    }

    /// Set HAS_ANNOTATIONS on the class symbol. Kinds without a class
    /// payload have nothing to mark.
    pub fn mark_class(&mut self) -> Result<bool, MetadataDecodeError> {
        if self.class_has_annotations {
            return Ok(false);
        }
        let Some(payload) = self.payload.as_mut() else {
            return Ok(false);
        };
        let current = class_flags(&payload.class);
        payload.class.set(CLASS_FLAGS, Value::Varint((current | flags::HAS_ANNOTATIONS) as u64));
        self.class_has_annotations = true;
        self.modified = true;
        Ok(true)
    }

    /// Set HAS_ANNOTATIONS on a function. Returns whether anything changed.
    pub fn mark_function(&mut self, index: usize) -> Result<bool, MetadataDecodeError> {
        let Some(symbol) = self.functions.get(index) else {
            return Ok(false);
        };
        if symbol.has_annotations {
            return Ok(false);
        }
        let position = symbol.position;
        self.update(position, |message, _| {
            let current = match message.varint(FUNCTION_FLAGS) {
                Some(f) => f as u32,
                None => message
                    .varint(FUNCTION_OLD_FLAGS)
                    .map(|old| flags::from_old_flags(old as u32))
                    .unwrap_or(flags::DEFAULT_FUNCTION_FLAGS),
            };
            message.set(FUNCTION_FLAGS, Value::Varint((current | flags::HAS_ANNOTATIONS) as u64));
            Ok(())
        })?;
        self.functions[index].has_annotations = true;
        Ok(true)
    }

    pub fn mark_constructor(&mut self, index: usize) -> Result<bool, MetadataDecodeError> {
        let Some(symbol) = self.constructors.get(index) else {
            return Ok(false);
        };
        if symbol.has_annotations {
            return Ok(false);
        }
        let position = symbol.position;
        self.update(position, |message, _| {
            let current = message.varint(CONSTRUCTOR_FLAGS).map(|f| f as u32).unwrap_or(flags::DEFAULT_CONSTRUCTOR_FLAGS);
            message.set(CONSTRUCTOR_FLAGS, Value::Varint((current | flags::HAS_ANNOTATIONS) as u64));
            Ok(())
        })?;
        self.constructors[index].has_annotations = true;
        Ok(true)
    }

    /// Set HAS_ANNOTATIONS on a property and its getter, and record the
    /// synthetic method holding the property's annotations
    pub fn mark_property(&mut self, index: usize, holder_name: &str, holder_descriptor: &str) -> Result<bool, MetadataDecodeError> {
        let Some(symbol) = self.properties.get(index) else {
            return Ok(false);
        };
        let holder = JvmSignature { name: Some(holder_name.to_string()), descriptor: Some(holder_descriptor.to_string()) };
        if symbol.has_annotations && symbol.synthetic_holder_signature.as_ref() == Some(&holder) {
            return Ok(false);
        }
        let position = symbol.position;
        self.update(position, |message, strings| {
            let current = property_flags(message);
            message.set(PROPERTY_FLAGS, Value::Varint((current | flags::HAS_ANNOTATIONS) as u64));
            if current & flags::HAS_GETTER != 0 {
                let getter = message
                    .varint(PROPERTY_GETTER_FLAGS)
                    .map(|f| f as u32)
                    .unwrap_or_else(|| flags::default_accessor_flags(current));
                message.set(PROPERTY_GETTER_FLAGS, Value::Varint((getter | flags::HAS_ANNOTATIONS) as u64));
            }

            let mut signature = match message.bytes(JVM_SIGNATURE) {
                Some(bytes) => Message::decode(bytes)?,
                None => Message::default(),
            };
            let mut method = Message::default();
            method.push(proto::Field::new(SIGNATURE_NAME, Value::Varint(strings.intern(holder_name) as u64)));
            method.push(proto::Field::new(SIGNATURE_DESC, Value::Varint(strings.intern(holder_descriptor) as u64)));
            signature.set(PROPERTY_SIGNATURE_SYNTHETIC_METHOD, Value::Bytes(method.encode()));
            message.set(JVM_SIGNATURE, Value::Bytes(signature.encode()));
            Ok(())
        })?;

        let property = &mut self.properties[index];
        property.has_annotations = true;
        property.synthetic_holder_signature = Some(holder);
        Ok(true)
    }

    fn update<F>(&mut self, position: usize, edit: F) -> Result<(), MetadataDecodeError>
    where
        F: FnOnce(&mut Message, &mut StringTable) -> Result<(), MetadataDecodeError>,
    {
        let payload = self
            .payload
            .as_mut()
            .ok_or_else(|| MetadataDecodeError::UnsupportedKind(self.header.kind))?;
        let mut message = submessage(&payload.class, position)?;
        edit(&mut message, &mut payload.strings)?;
        payload.class.replace(position, Value::Bytes(message.encode()));
        self.modified = true;
        Ok(())
    }

    /// Protobuf payload as it would be written to `d1`
    pub fn encode_payload(&self) -> Option<Vec<u8>> {
        let payload = self.payload.as_ref()?;
        let mut bytes = strings::delimited(&payload.strings.encode_types());
        bytes.extend_from_slice(&payload.class.encode());
        Some(bytes)
    }

    /// Header reflecting the marks. Unmodified tables return the decoded
    /// header unchanged.
    pub fn encode(&self) -> MetadataHeader {
        let (Some(payload), Some(bytes)) = (self.payload.as_ref(), self.encode_payload()) else {
            return self.header.clone();
        };
        if !self.modified {
            return self.header.clone();
        }
        MetadataHeader {
            data1: bit_encoding::encode_bytes(&bytes),
            data2: payload.strings.strings().to_vec(),
            ..self.header.clone()
        }
    }
}
