//! Authoring of class metadata headers

use std::collections::HashMap;

use super::proto::{Field, Message, Value};
use super::{bit_encoding, flags, strings, MetadataHeader, KIND_CLASS};

const DEFAULT_VERSION: [i32; 3] = [2, 0, 0];

/// Builder for `k = 1` metadata headers
pub struct ClassMetadataBuilder {
    version: Vec<i32>,
    class_name: String,
    module_name: Option<String>,
    class: Message,
    strings: Vec<String>,
    indices: HashMap<String, u64>,
    extra_int: Option<i32>,
    eight_to_seven: bool,
}

impl ClassMetadataBuilder {
    pub fn new(internal_name: &str) -> Self {
        Self {
            version: DEFAULT_VERSION.to_vec(),
            class_name: internal_name.to_string(),
            module_name: None,
            class: Message::default(),
            strings: Vec::new(),
            indices: HashMap::new(),
            extra_int: Some(48),
            eight_to_seven: false,
        }
    }

    pub fn version(mut self, version: &[i32]) -> Self {
        self.version = version.to_vec();
        self
    }

    /// Module recorded in the class (the compiler omits the default `main`)
    pub fn module_name(mut self, name: &str) -> Self {
        self.module_name = Some(name.to_string());
        self
    }

    /// Pack `d1` in 8-to-7 mode instead of UTF-8 mode
    pub fn legacy_encoding(mut self) -> Self {
        self.eight_to_seven = true;
        self
    }

    fn string(&mut self, value: &str) -> u64 {
        if let Some(&index) = self.indices.get(value) {
            return index;
        }
        let index = self.strings.len() as u64;
        self.strings.push(value.to_string());
        self.indices.insert(value.to_string(), index);
        index
    }

    fn signature(&mut self, name: Option<&str>, descriptor: Option<&str>) -> Vec<u8> {
        let mut message = Message::default();
        if let Some(name) = name {
            let index = self.string(name);
            message.push(Field::new(1, Value::Varint(index)));
        }
        if let Some(descriptor) = descriptor {
            let index = self.string(descriptor);
            message.push(Field::new(2, Value::Varint(index)));
        }
        message.encode()
    }

    fn add_function(mut self, name: &str, visibility: u32, descriptor: Option<&str>) -> Self {
        let mut message = Message::default();
        let name_index = self.string(name);
        message.push(Field::new(2, Value::Varint(name_index)));
        let function_flags = (visibility << 1) | (flags::DEFAULT_FUNCTION_FLAGS & !0xE);
        if function_flags != flags::DEFAULT_FUNCTION_FLAGS {
            message.push(Field::new(9, Value::Varint(function_flags as u64)));
        }
        if descriptor.is_some() {
            let signature = self.signature(None, descriptor);
            message.push(Field::new(100, Value::Bytes(signature)));
        }
        self.class.push(Field::new(9, Value::Bytes(message.encode())));
        self
    }

    /// Public function whose JVM name equals its declared name
    pub fn function(self, name: &str, descriptor: Option<&str>) -> Self {
        self.add_function(name, flags::VISIBILITY_PUBLIC, descriptor)
    }

    /// Internal function; its JVM name is derived from the module name
    pub fn internal_function(self, name: &str, descriptor: Option<&str>) -> Self {
        self.add_function(name, flags::VISIBILITY_INTERNAL, descriptor)
    }

    /// Function compiled under an explicit JVM name
    pub fn renamed_function(mut self, name: &str, jvm_name: &str, descriptor: &str) -> Self {
        let mut message = Message::default();
        let name_index = self.string(name);
        message.push(Field::new(2, Value::Varint(name_index)));
        let signature = self.signature(Some(jvm_name), Some(descriptor));
        message.push(Field::new(100, Value::Bytes(signature)));
        self.class.push(Field::new(9, Value::Bytes(message.encode())));
        self
    }

    /// Public `val` backed by a field, with an optional getter signature
    pub fn property(mut self, name: &str, field_descriptor: &str, getter: Option<(&str, &str)>) -> Self {
        let mut message = Message::default();
        let name_index = self.string(name);
        message.push(Field::new(2, Value::Varint(name_index)));
        let mut property_flags = flags::DEFAULT_PROPERTY_FLAGS;
        if getter.is_none() {
            property_flags &= !flags::HAS_GETTER;
        }
        if property_flags != flags::DEFAULT_PROPERTY_FLAGS {
            message.push(Field::new(11, Value::Varint(property_flags as u64)));
        }

        let mut signature = Message::default();
        let field = self.signature(Some(name), Some(field_descriptor));
        signature.push(Field::new(1, Value::Bytes(field)));
        if let Some((getter_name, getter_descriptor)) = getter {
            let getter = self.signature(Some(getter_name), Some(getter_descriptor));
            signature.push(Field::new(3, Value::Bytes(getter)));
        }
        message.push(Field::new(100, Value::Bytes(signature.encode())));
        self.class.push(Field::new(10, Value::Bytes(message.encode())));
        self
    }

    pub fn constructor(mut self, descriptor: &str) -> Self {
        let mut message = Message::default();
        let signature = self.signature(None, Some(descriptor));
        message.push(Field::new(100, Value::Bytes(signature)));
        self.class.push(Field::new(8, Value::Bytes(message.encode())));
        self
    }

    pub fn build(mut self) -> MetadataHeader {
        let class_name = self.class_name.clone();
        let fq_name = self.string(&class_name);
        self.class.insert(Field::new(3, Value::Varint(fq_name)));
        if let Some(module) = self.module_name.clone() {
            let index = self.string(&module);
            self.class.push(Field::new(101, Value::Varint(index)));
        }
        // constructors, functions and properties are pushed in call order;
        // protobuf readers accept any order, keep the compiler's layout
        self.class.fields.sort_by_key(|f| f.number);

        let mut types = Message::default();
        match self.strings.len() {
            0 => {}
            1 => types.push(Field::new(1, Value::Bytes(Vec::new()))),
            n => {
                let mut record = Message::default();
                record.push(Field::new(1, Value::Varint(n as u64)));
                types.push(Field::new(1, Value::Bytes(record.encode())));
            }
        }

        let mut payload = strings::delimited(&types.encode());
        payload.extend_from_slice(&self.class.encode());

        MetadataHeader {
            kind: KIND_CLASS,
            version: self.version,
            data1: if self.eight_to_seven {
                bit_encoding::encode_bytes_8_to_7(&payload)
            } else {
                bit_encoding::encode_bytes(&payload)
            },
            data2: self.strings,
            extra_string: None,
            package_name: None,
            extra_int: self.extra_int,
        }
    }
}
