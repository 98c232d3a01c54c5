//! Wildcard matching for class names, member names and descriptors
//!
//! Class names are matched in internal form (`com/example/Foo`). Within a
//! class name `?` matches one character other than `/`, `*` matches a run of
//! characters without `/`, and `**` matches any run. Member names have no
//! separator, so `*` and `**` behave the same there.

use std::fmt;

use crate::classfile::descriptor::{parse_field_descriptor, parse_method_descriptor, BaseType, FieldType};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(Vec<char>),
    AnyChar,
    AnyRun,
    AnyRunAcross,
}

/// Compiled wildcard pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    source: String,
    segments: Vec<Segment>,
    separator: Option<char>,
}

impl NamePattern {
    /// Class name pattern; dotted names are normalized to internal form
    pub fn class_name(pattern: &str) -> Self {
        let internal = pattern.replace('.', "/");
        Self::compile(&internal, Some('/'))
    }

    /// Member name pattern
    pub fn member_name(pattern: &str) -> Self {
        Self::compile(pattern, None)
    }

    fn compile(pattern: &str, separator: Option<char>) -> Self {
        let mut segments = Vec::new();
        let mut literal = Vec::new();
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let mut stars = 1;
                    while chars.peek() == Some(&'*') {
                        chars.next();
                        stars += 1;
                    }
                    segments.push(if stars == 1 { Segment::AnyRun } else { Segment::AnyRunAcross });
                }
                '?' => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::AnyChar);
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { source: pattern.to_string(), segments, separator }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    #[cfg(test)]
    fn is_wildcard(&self) -> bool {
        self.segments.iter().any(|s| !matches!(s, Segment::Literal(_)))
    }

    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = match self.separator {
            Some(sep) => text.chars().map(|c| if c == '.' { sep } else { c }).collect(),
            None => text.chars().collect(),
        };
        match_segments(&self.segments, &text, self.separator)
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn match_segments(segments: &[Segment], text: &[char], separator: Option<char>) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return text.is_empty();
    };

    match first {
        Segment::Literal(lit) => {
            text.starts_with(lit) && match_segments(rest, &text[lit.len()..], separator)
        }
        Segment::AnyChar => match text.split_first() {
            Some((c, tail)) if Some(*c) != separator => match_segments(rest, tail, separator),
            _ => false,
        },
        Segment::AnyRun => {
            for i in 0..=text.len() {
                if match_segments(rest, &text[i..], separator) {
                    return true;
                }
                if i < text.len() && Some(text[i]) == separator {
                    return false;
                }
            }
            false
        }
        Segment::AnyRunAcross => (0..=text.len()).any(|i| match_segments(rest, &text[i..], separator)),
    }
}

/// Comma separated class name list with optional `!` negation.
///
/// Elements are tried in order and the first one that matches decides. When
/// nothing matches, the result is the negation flag of the last element, so
/// `!a.**` alone matches everything outside `a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameList {
    entries: Vec<(NamePattern, bool)>,
}

impl NameList {
    pub fn new(entries: Vec<(NamePattern, bool)>) -> Self {
        Self { entries }
    }

    pub fn single(pattern: NamePattern) -> Self {
        Self { entries: vec![(pattern, false)] }
    }

    pub fn matches(&self, name: &str) -> bool {
        let mut result = false;
        for (pattern, negated) in &self.entries {
            if pattern.matches(name) {
                return !negated;
            }
            result = *negated;
        }
        result
    }
}

impl fmt::Display for NameList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (pattern, negated)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if *negated {
                f.write_str("!")?;
            }
            f.write_str(&pattern.as_str().replace('/', "."))?;
        }
        Ok(())
    }
}

/// Type pattern as written in a member specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypePattern {
    /// `***`: any type, primitive or not, any array depth
    Any,
    /// `%`: any primitive
    AnyPrimitive { dims: usize },
    /// A primitive keyword, `void` included (code `V`)
    Primitive { code: char, dims: usize },
    /// A (possibly wildcarded) class name
    Class { name: NamePattern, dims: usize },
}

impl TypePattern {
    /// Parse a source-level type such as `java.lang.String[]`, `int` or `**`
    pub fn parse(word: &str) -> Option<Self> {
        let mut base = word;
        let mut dims = 0;
        while let Some(stripped) = base.strip_suffix("[]") {
            base = stripped;
            dims += 1;
        }
        if base.is_empty() || base.contains('[') || base.contains(']') {
            return None;
        }

        let pattern = match base {
            "***" => TypePattern::Any,
            "%" => TypePattern::AnyPrimitive { dims },
            other => match primitive_code(other) {
                Some(code) => TypePattern::Primitive { code, dims },
                None => {
                    if other.contains('<') || other.contains('>') || other == "..." {
                        return None;
                    }
                    TypePattern::Class { name: NamePattern::class_name(other), dims }
                }
            },
        };
        if let TypePattern::Primitive { code: 'V', dims } = pattern {
            if dims > 0 {
                return None;
            }
        }
        Some(pattern)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypePattern::Primitive { code: 'V', dims: 0 })
    }

    pub fn matches(&self, ty: &FieldType) -> bool {
        match self {
            TypePattern::Any => true,
            TypePattern::AnyPrimitive { dims } => {
                *dims == ty.dims && matches!(ty.base, BaseType::Primitive(c) if c != 'V')
            }
            TypePattern::Primitive { code, dims } => {
                *dims == ty.dims && ty.base == BaseType::Primitive(*code)
            }
            TypePattern::Class { name, dims } => {
                *dims == ty.dims
                    && matches!(&ty.base, BaseType::Object(class_name) if name.matches(class_name))
            }
        }
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = match self {
            TypePattern::Any => return f.write_str("***"),
            TypePattern::AnyPrimitive { dims }
            | TypePattern::Primitive { dims, .. }
            | TypePattern::Class { dims, .. } => *dims,
        };
        for _ in 0..dims {
            f.write_str("[")?;
        }
        match self {
            TypePattern::AnyPrimitive { .. } => f.write_str("%"),
            TypePattern::Primitive { code, .. } => write!(f, "{}", code),
            TypePattern::Class { name, .. } => write!(f, "L{};", name.as_str()),
            TypePattern::Any => Ok(()),
        }
    }
}

fn primitive_code(keyword: &str) -> Option<char> {
    Some(match keyword {
        "boolean" => 'Z',
        "byte" => 'B',
        "char" => 'C',
        "short" => 'S',
        "int" => 'I',
        "long" => 'J',
        "float" => 'F',
        "double" => 'D',
        "void" => 'V',
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgPattern {
    Type(TypePattern),
    /// `...`: any number of arguments of any type
    Ellipsis,
}

/// Parameter list of a method pattern.
///
/// `()` only marks the member as a method and leaves the parameters
/// unconstrained; explicit lists must match argument by argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamsPattern {
    Unconstrained,
    List(Vec<ArgPattern>),
}

impl ParamsPattern {
    pub fn matches(&self, params: &[FieldType]) -> bool {
        match self {
            ParamsPattern::Unconstrained => true,
            ParamsPattern::List(args) => match_args(args, params),
        }
    }
}

fn match_args(args: &[ArgPattern], params: &[FieldType]) -> bool {
    match args.split_first() {
        None => params.is_empty(),
        Some((ArgPattern::Ellipsis, rest)) => {
            (0..=params.len()).any(|skip| match_args(rest, &params[skip..]))
        }
        Some((ArgPattern::Type(ty), rest)) => match params.split_first() {
            Some((first, tail)) => ty.matches(first) && match_args(rest, tail),
            None => false,
        },
    }
}

/// Descriptor constraint of a member specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorPattern {
    Field(TypePattern),
    Method { params: ParamsPattern, ret: TypePattern },
}

impl DescriptorPattern {
    /// Match a raw JVM descriptor. Malformed descriptors never match.
    pub fn matches(&self, descriptor: &str) -> bool {
        match self {
            DescriptorPattern::Field(ty) => {
                parse_field_descriptor(descriptor).is_some_and(|ft| ty.matches(&ft))
            }
            DescriptorPattern::Method { params, ret } => parse_method_descriptor(descriptor)
                .is_some_and(|md| ret.matches(&md.ret) && params.matches(&md.params)),
        }
    }
}

impl fmt::Display for DescriptorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorPattern::Field(ty) => write!(f, "{}", ty),
            DescriptorPattern::Method { params, ret } => {
                f.write_str("(")?;
                match params {
                    ParamsPattern::Unconstrained => f.write_str("...")?,
                    ParamsPattern::List(args) => {
                        for arg in args {
                            match arg {
                                ArgPattern::Type(ty) => write!(f, "{}", ty)?,
                                ArgPattern::Ellipsis => f.write_str("...")?,
                            }
                        }
                    }
                }
                write!(f, "){}", ret)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_star_crosses_packages() {
        let p = NamePattern::class_name("a.b.**");
        assert!(p.matches("a.b.c.D"));
        assert!(p.matches("a.b.D"));
        assert!(p.matches("a/b/c/D"));
        assert!(!p.matches("a.c.D"));
    }

    #[test]
    fn test_single_star_stays_in_package() {
        let p = NamePattern::class_name("a.b.*");
        assert!(p.matches("a.b.D"));
        assert!(p.matches("a/b/D"));
        assert!(!p.matches("a.b.c.D"));
    }

    #[test]
    fn test_question_mark() {
        let p = NamePattern::class_name("a.?oo");
        assert!(p.matches("a/Foo"));
        assert!(!p.matches("a/Fooo"));
        assert!(!NamePattern::class_name("a?b").matches("a/b"));
        assert!(NamePattern::member_name("get?").matches("getX"));
    }

    #[test]
    fn test_member_names() {
        let p = NamePattern::member_name("get*");
        assert!(p.matches("getName"));
        assert!(p.matches("get"));
        assert!(!p.matches("setName"));
        assert!(NamePattern::member_name("*").matches("<init>"));
        assert!(NamePattern::member_name("compute$*").matches("compute$mymodule_main"));
        assert!(!NamePattern::member_name("foo").is_wildcard());
    }

    #[test]
    fn test_name_list_negation() {
        let list = NameList::new(vec![
            (NamePattern::class_name("a.internal.**"), true),
            (NamePattern::class_name("a.**"), false),
        ]);
        assert!(list.matches("a/Api"));
        assert!(!list.matches("a/internal/Impl"));
        assert!(!list.matches("b/Other"));

        let only_negated = NameList::new(vec![(NamePattern::class_name("a.**"), true)]);
        assert!(only_negated.matches("b/Other"));
        assert!(!only_negated.matches("a/X"));
        assert_eq!(list.to_string(), "!a.internal.**,a.**");
    }

    #[test]
    fn test_type_patterns() {
        let string = FieldType::object("java/lang/String");
        let int = FieldType::primitive('I');
        let int_array = FieldType { base: BaseType::Primitive('I'), dims: 1 };

        assert!(TypePattern::parse("java.lang.String").unwrap().matches(&string));
        assert!(TypePattern::parse("**").unwrap().matches(&string));
        assert!(!TypePattern::parse("*").unwrap().matches(&string));
        assert!(!TypePattern::parse("**").unwrap().matches(&int));
        assert!(TypePattern::parse("%").unwrap().matches(&int));
        assert!(!TypePattern::parse("%").unwrap().matches(&int_array));
        assert!(TypePattern::parse("int[]").unwrap().matches(&int_array));
        assert!(TypePattern::parse("***").unwrap().matches(&int_array));
        assert!(TypePattern::parse("void[]").is_none());
        assert!(TypePattern::parse("int[").is_none());
        assert!(TypePattern::parse("<init>").is_none());
    }

    #[test]
    fn test_method_descriptor_patterns() {
        let any_void = DescriptorPattern::Method {
            params: ParamsPattern::Unconstrained,
            ret: TypePattern::parse("void").unwrap(),
        };
        assert!(any_void.matches("()V"));
        assert!(any_void.matches("(I)V"));
        assert!(!any_void.matches("()I"));

        let exact = DescriptorPattern::Method {
            params: ParamsPattern::List(vec![
                ArgPattern::Type(TypePattern::parse("int").unwrap()),
                ArgPattern::Type(TypePattern::parse("java.lang.String").unwrap()),
            ]),
            ret: TypePattern::Any,
        };
        assert!(exact.matches("(ILjava/lang/String;)Z"));
        assert!(!exact.matches("(I)Z"));
        assert!(!exact.matches("(ILjava/lang/String;J)Z"));

        let leading_int = DescriptorPattern::Method {
            params: ParamsPattern::List(vec![
                ArgPattern::Type(TypePattern::parse("int").unwrap()),
                ArgPattern::Ellipsis,
            ]),
            ret: TypePattern::Any,
        };
        assert!(leading_int.matches("(I)V"));
        assert!(leading_int.matches("(IJD)V"));
        assert!(!leading_int.matches("(JI)V"));
        assert_eq!(leading_int.to_string(), "(I...)***");
    }

    #[test]
    fn test_field_descriptor_pattern() {
        let p = DescriptorPattern::Field(TypePattern::parse("java.lang.String").unwrap());
        assert!(p.matches("Ljava/lang/String;"));
        assert!(!p.matches("Ljava/lang/Object;"));
        assert!(!p.matches("not a descriptor"));
        assert_eq!(p.to_string(), "Ljava/lang/String;");
    }
}
