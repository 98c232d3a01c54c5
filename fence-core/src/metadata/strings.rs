//! JVM string table of the metadata payload
//!
//! Names in the protobuf messages are indices into `d2`, decorated by the
//! `StringTableTypes` records (predefined names, substrings, char
//! replacement and class-id operations).

use super::proto::{self, Field, Message, Value};
use super::MetadataDecodeError;

const TYPES_RECORD: u32 = 1;

const RECORD_RANGE: u32 = 1;
const RECORD_PREDEFINED_INDEX: u32 = 2;
const RECORD_OPERATION: u32 = 3;
const RECORD_SUBSTRING_INDEX: u32 = 4;
const RECORD_REPLACE_CHAR: u32 = 5;
const RECORD_STRING: u32 = 6;

const OPERATION_INTERNAL_TO_CLASS_ID: u64 = 1;
const OPERATION_DESC_TO_CLASS_ID: u64 = 2;

pub const PREDEFINED_STRINGS: &[&str] = &[
    "kotlin/Any",
    "kotlin/Nothing",
    "kotlin/Unit",
    "kotlin/Throwable",
    "kotlin/Number",
    "kotlin/Byte",
    "kotlin/Double",
    "kotlin/Float",
    "kotlin/Int",
    "kotlin/Long",
    "kotlin/Short",
    "kotlin/Boolean",
    "kotlin/Char",
    "kotlin/CharSequence",
    "kotlin/String",
    "kotlin/Comparable",
    "kotlin/Enum",
    "kotlin/Array",
    "kotlin/ByteArray",
    "kotlin/DoubleArray",
    "kotlin/FloatArray",
    "kotlin/IntArray",
    "kotlin/LongArray",
    "kotlin/ShortArray",
    "kotlin/BooleanArray",
    "kotlin/CharArray",
    "kotlin/Cloneable",
    "kotlin/Annotation",
    "kotlin/collections/Iterable",
    "kotlin/collections/MutableIterable",
    "kotlin/collections/Collection",
    "kotlin/collections/MutableCollection",
    "kotlin/collections/List",
    "kotlin/collections/MutableList",
    "kotlin/collections/Set",
    "kotlin/collections/MutableSet",
    "kotlin/collections/Map",
    "kotlin/collections/MutableMap",
    "kotlin/collections/Map.Entry",
    "kotlin/collections/MutableMap.MutableEntry",
    "kotlin/collections/Iterator",
    "kotlin/collections/MutableIterator",
    "kotlin/collections/ListIterator",
    "kotlin/collections/MutableListIterator",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Record {
    predefined_index: Option<usize>,
    string: Option<String>,
    operation: u64,
    substring: Option<(usize, usize)>,
    replace_char: Option<(u32, u32)>,
}

impl Record {
    fn parse(message: &Message) -> Result<(Self, usize), MetadataDecodeError> {
        let range = message.varint(RECORD_RANGE).unwrap_or(1) as usize;
        let string = match message.bytes(RECORD_STRING) {
            Some(bytes) => Some(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| MetadataDecodeError::StringTable("record string is not UTF-8".into()))?,
            ),
            None => None,
        };
        let substring = match message.repeated_varints(RECORD_SUBSTRING_INDEX)?.as_slice() {
            [begin, end, ..] => Some((*begin as usize, *end as usize)),
            _ => None,
        };
        let replace_char = match message.repeated_varints(RECORD_REPLACE_CHAR)?.as_slice() {
            [from, to, ..] => Some((*from as u32, *to as u32)),
            _ => None,
        };
        let record = Record {
            predefined_index: message.varint(RECORD_PREDEFINED_INDEX).map(|i| i as usize),
            string,
            operation: message.varint(RECORD_OPERATION).unwrap_or(0),
            substring,
            replace_char,
        };
        Ok((record, range))
    }

    fn resolve(&self, plain: Option<&str>) -> Option<String> {
        let mut value = match (&self.string, self.predefined_index) {
            (Some(s), _) => s.clone(),
            (None, Some(i)) if i < PREDEFINED_STRINGS.len() => PREDEFINED_STRINGS[i].to_string(),
            _ => plain?.to_string(),
        };

        if let Some((begin, end)) = self.substring {
            let chars: Vec<char> = value.chars().collect();
            if begin <= end && end <= chars.len() {
                value = chars[begin..end].iter().collect();
            }
        }
        if let Some((from, to)) = self.replace_char {
            if let (Some(from), Some(to)) = (char::from_u32(from), char::from_u32(to)) {
                value = value.replace(from, &to.to_string());
            }
        }
        match self.operation {
            OPERATION_INTERNAL_TO_CLASS_ID => value = value.replace('$', "."),
            OPERATION_DESC_TO_CLASS_ID => {
                let chars: Vec<char> = value.chars().collect();
                if chars.len() >= 2 {
                    value = chars[1..chars.len() - 1].iter().collect();
                }
                value = value.replace('$', ".");
            }
            _ => {}
        }
        Some(value)
    }
}

/// Resolver over `d2` plus its records, able to append plain strings
#[derive(Debug, Clone)]
pub struct StringTable {
    types: Message,
    records: Vec<Record>,
    strings: Vec<String>,
}

impl StringTable {
    pub fn parse(types_bytes: &[u8], strings: &[String]) -> Result<Self, MetadataDecodeError> {
        let types = Message::decode(types_bytes)?;
        let mut records = Vec::new();
        for index in types.positions(TYPES_RECORD) {
            let Value::Bytes(bytes) = &types.fields[index].value else {
                continue;
            };
            let (record, range) = Record::parse(&Message::decode(bytes)?)?;
            records.extend(std::iter::repeat_n(record, range));
        }
        Ok(Self { types, records, strings: strings.to_vec() })
    }

    pub fn get(&self, index: usize) -> Option<String> {
        let plain = self.strings.get(index).map(String::as_str);
        match self.records.get(index) {
            Some(record) => record.resolve(plain),
            None => plain.map(str::to_string),
        }
    }

    /// Index of `value` as a plain string, appending it when absent
    pub fn intern(&mut self, value: &str) -> usize {
        let plain = Record::default();
        let existing = (0..self.strings.len().min(self.records.len()))
            .find(|&i| self.records[i] == plain && self.strings[i] == value);
        if let Some(index) = existing {
            return index;
        }

        let index = self.records.len().max(self.strings.len());
        if self.records.len() < index {
            let gap = index - self.records.len();
            let mut padding = Message::default();
            if gap > 1 {
                padding.push(Field::new(RECORD_RANGE, Value::Varint(gap as u64)));
            }
            self.types.insert(Field::new(TYPES_RECORD, Value::Bytes(padding.encode())));
            self.records.extend(std::iter::repeat_n(plain.clone(), gap));
        }
        self.strings.resize(index, String::new());

        self.types.insert(Field::new(TYPES_RECORD, Value::Bytes(Vec::new())));
        self.records.push(plain);
        self.strings.push(value.to_string());
        index
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// `StringTableTypes` message bytes
    pub fn encode_types(&self) -> Vec<u8> {
        self.types.encode()
    }
}

/// Prefix `message` with its varint length
pub fn delimited(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 5);
    proto::write_varint(&mut out, message.len() as u64);
    out.extend_from_slice(message);
    out
}
