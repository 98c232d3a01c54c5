//! JVM field and method descriptors (`I`, `[Ljava/lang/String;`, `(IJ)V`)

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseType {
    /// One of `B C D F I J S Z V`
    Primitive(char),
    /// Internal class name, e.g. `java/lang/String`
    Object(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    pub base: BaseType,
    pub dims: usize,
}

impl FieldType {
    pub fn primitive(code: char) -> Self {
        Self { base: BaseType::Primitive(code), dims: 0 }
    }

    pub fn object(internal_name: &str) -> Self {
        Self { base: BaseType::Object(internal_name.to_string()), dims: 0 }
    }

    pub fn is_void(&self) -> bool {
        self.dims == 0 && self.base == BaseType::Primitive('V')
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.dims {
            f.write_str("[")?;
        }
        match &self.base {
            BaseType::Primitive(c) => write!(f, "{}", c),
            BaseType::Object(name) => write!(f, "L{};", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub ret: FieldType,
}

/// Parse a single field descriptor, rejecting trailing input
pub fn parse_field_descriptor(desc: &str) -> Option<FieldType> {
    let (ty, rest) = parse_field_type(desc, false)?;
    rest.is_empty().then_some(ty)
}

/// Parse a method descriptor `(params)ret`
pub fn parse_method_descriptor(desc: &str) -> Option<MethodDescriptor> {
    let mut rest = desc.strip_prefix('(')?;
    let mut params = Vec::new();
    loop {
        if let Some(after) = rest.strip_prefix(')') {
            rest = after;
            break;
        }
        let (ty, after) = parse_field_type(rest, false)?;
        params.push(ty);
        rest = after;
    }
    let (ret, rest) = parse_field_type(rest, true)?;
    rest.is_empty().then_some(MethodDescriptor { params, ret })
}

fn parse_field_type(input: &str, allow_void: bool) -> Option<(FieldType, &str)> {
    let dims = input.bytes().take_while(|&b| b == b'[').count();
    let rest = &input[dims..];
    let code = rest.chars().next()?;
    match code {
        'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => {
            Some((FieldType { base: BaseType::Primitive(code), dims }, &rest[1..]))
        }
        'V' if allow_void && dims == 0 => Some((FieldType::primitive('V'), &rest[1..])),
        'L' => {
            let end = rest.find(';')?;
            let name = &rest[1..end];
            if name.is_empty() {
                return None;
            }
            Some((FieldType { base: BaseType::Object(name.to_string()), dims }, &rest[end + 1..]))
        }
        _ => None,
    }
}
