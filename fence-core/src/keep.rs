//! Keep specifications and their parser
//!
//! A pattern string holds one or more class specifications in ProGuard keep
//! syntax:
//!
//! ```text
//! [-keep] [!]public|final|abstract|synthetic ... class|interface|enum|@interface <names>
//!     [extends|implements <name>] [{ member; member; ... }]
//! ```
//!
//! Parsing fails closed: any syntax error rejects the whole string.

use std::fmt;

use crate::classfile::{access, DeclarationContainer};
use crate::error::{Error, Result};
use crate::lexer::{Lexer, Span, SpannedToken, Token};
use crate::matcher::{ArgPattern, DescriptorPattern, NameList, NamePattern, ParamsPattern, TypePattern};

const CLASS_MODIFIERS: &[(&str, u16)] = &[
    ("public", access::PUBLIC),
    ("final", access::FINAL),
    ("abstract", access::ABSTRACT),
    ("synthetic", access::SYNTHETIC),
];

const MEMBER_MODIFIERS: &[(&str, u16)] = &[
    ("public", access::PUBLIC),
    ("private", access::PRIVATE),
    ("protected", access::PROTECTED),
    ("static", access::STATIC),
    ("final", access::FINAL),
    ("synchronized", access::SYNCHRONIZED),
    ("volatile", access::VOLATILE),
    ("bridge", access::BRIDGE),
    ("transient", access::TRANSIENT),
    ("varargs", access::VARARGS),
    ("native", access::NATIVE),
    ("abstract", access::ABSTRACT),
    ("strictfp", access::STRICT),
    ("synthetic", access::SYNTHETIC),
];

fn lookup(table: &[(&str, u16)], word: &str) -> Option<u16> {
    table.iter().find(|(name, _)| *name == word).map(|(_, flag)| *flag)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Field,
    /// Neither a method nor a field shape (`*;`, `foo;`)
    Unspecified,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSpecification {
    pub name_pattern: NamePattern,
    /// `None` leaves the descriptor unconstrained
    pub descriptor: Option<DescriptorPattern>,
    pub required_set_flags: u16,
    pub required_unset_flags: u16,
    pub kind: MemberKind,
}

impl MemberSpecification {
    pub fn matches_member(&self, kind: MemberKind, name: &str, descriptor: &str, access_flags: u16) -> bool {
        if name == "<clinit>" || kind == MemberKind::Unspecified || self.kind != kind {
            return false;
        }
        access_flags & self.required_set_flags == self.required_set_flags
            && access_flags & self.required_unset_flags == 0
            && self.name_pattern.matches(name)
            && self.descriptor.as_ref().is_none_or(|d| d.matches(descriptor))
    }
}

impl fmt::Display for MemberSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_modifiers(f, MEMBER_MODIFIERS, self.required_set_flags, self.required_unset_flags)?;
        let kind = match self.kind {
            MemberKind::Method => "method",
            MemberKind::Field => "field",
            MemberKind::Unspecified => "member",
        };
        write!(f, "{} {}", kind, self.name_pattern)?;
        if let Some(descriptor) = &self.descriptor {
            write!(f, " {}", descriptor)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// `class` accepts classes and interfaces alike
    Class,
    Interface,
    Enum,
    Annotation,
}

impl ClassKind {
    fn flags(self) -> u16 {
        match self {
            ClassKind::Class => 0,
            ClassKind::Interface => access::INTERFACE,
            ClassKind::Enum => access::ENUM,
            ClassKind::Annotation => access::ANNOTATION,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            ClassKind::Class => "class",
            ClassKind::Interface => "interface",
            ClassKind::Enum => "enum",
            ClassKind::Annotation => "@interface",
        }
    }
}

/// Everything in a class specification except its names and members
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSpecifier {
    pub required_set_flags: u16,
    pub required_unset_flags: u16,
    pub kind: ClassKind,
    pub kind_negated: bool,
    /// Direct superclass or implemented interface
    pub extends: Option<NamePattern>,
}

impl ClassSpecifier {
    fn matches(&self, container: &DeclarationContainer) -> bool {
        let flags = container.access_flags;
        let (mut set, mut unset) = (self.required_set_flags, self.required_unset_flags);
        if self.kind_negated {
            unset |= self.kind.flags();
        } else {
            set |= self.kind.flags();
        }
        if flags & set != set || flags & unset != 0 {
            return false;
        }
        match &self.extends {
            None => true,
            Some(pattern) => container
                .super_name
                .iter()
                .chain(container.interfaces.iter())
                .any(|name| pattern.matches(name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeepSpecification {
    /// Class names as written
    pub class_pattern: String,
    pub class_names: NameList,
    pub specifier: ClassSpecifier,
    pub members: Vec<MemberSpecification>,
}

impl KeepSpecification {
    /// Name-only class check; `name` may be dotted or internal
    pub fn matches_class(&self, name: &str) -> bool {
        self.class_names.matches(name)
    }

    /// Full class check: names, access flags, class kind and supertype
    pub fn matches_container(&self, container: &DeclarationContainer) -> bool {
        self.matches_class(&container.binary_name) && self.specifier.matches(container)
    }

    /// A rule without members, or with a member of no clear shape, deprecates
    /// the class itself. Its concrete members still target their declarations.
    pub fn is_class_level(&self) -> bool {
        self.members.is_empty() || self.members.iter().any(|m| m.kind == MemberKind::Unspecified)
    }

    pub fn matches_member(&self, kind: MemberKind, name: &str, descriptor: &str, access_flags: u16) -> bool {
        self.members.iter().any(|m| m.matches_member(kind, name, descriptor, access_flags))
    }
}

impl fmt::Display for KeepSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_modifiers(f, CLASS_MODIFIERS, self.specifier.required_set_flags, self.specifier.required_unset_flags)?;
        if self.specifier.kind_negated {
            f.write_str("!")?;
        }
        write!(f, "{} {}", self.specifier.kind.keyword(), self.class_names)?;
        if let Some(extends) = &self.specifier.extends {
            write!(f, " extends {}", extends.as_str().replace('/', "."))?;
        }
        if !self.members.is_empty() {
            f.write_str(" {")?;
            for member in &self.members {
                write!(f, " {};", member)?;
            }
            f.write_str(" }")?;
        }
        Ok(())
    }
}

fn write_modifiers(f: &mut fmt::Formatter<'_>, table: &[(&str, u16)], set: u16, unset: u16) -> fmt::Result {
    let mut seen = 0u16;
    for (name, flag) in table {
        if seen & flag != 0 {
            continue;
        }
        if set & flag != 0 {
            write!(f, "{} ", name)?;
            seen |= flag;
        } else if unset & flag != 0 {
            write!(f, "!{} ", name)?;
            seen |= flag;
        }
    }
    Ok(())
}

/// Parse a pattern string into its class specifications
pub fn parse_keep_specifications(source: &str) -> Result<Vec<KeepSpecification>> {
    let lexer = Lexer::new(source);
    let tokens = lexer.tokenize_with_spans()?;
    let mut parser = Parser::new(tokens, lexer.end_position());
    let specs = parser.parse()?;
    if specs.is_empty() {
        return Err(parser.error("Empty keep specification"));
    }
    Ok(specs)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    end: (usize, usize),
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>, end: (usize, usize)) -> Self {
        Self { tokens, pos: 0, end }
    }

    fn parse(&mut self) -> Result<Vec<KeepSpecification>> {
        let mut specs = Vec::new();
        while !self.is_at_end() {
            specs.push(self.parse_class_specification()?);
        }
        Ok(specs)
    }

    // ===== Class specification =====

    fn parse_class_specification(&mut self) -> Result<KeepSpecification> {
        self.skip_keep_option()?;

        let mut set = 0u16;
        let mut unset = 0u16;
        let (kind, kind_negated) = loop {
            let negated = self.eat(&Token::Bang);
            match self.peek_token() {
                Some(Token::Class) => {
                    if negated {
                        return Err(self.error("'class' cannot be negated"));
                    }
                    self.advance();
                    break (ClassKind::Class, false);
                }
                Some(Token::Interface) => {
                    self.advance();
                    break (ClassKind::Interface, negated);
                }
                Some(Token::Enum) => {
                    self.advance();
                    break (ClassKind::Enum, negated);
                }
                Some(Token::AnnotationInterface) => {
                    self.advance();
                    break (ClassKind::Annotation, negated);
                }
                Some(Token::At) => return Err(self.error("Annotation constraints are not supported")),
                Some(Token::Word(word)) => {
                    let Some(flag) = lookup(CLASS_MODIFIERS, word) else {
                        return Err(self.error(&format!("Unknown class modifier '{}'", word)));
                    };
                    if negated {
                        unset |= flag;
                    } else {
                        set |= flag;
                    }
                    self.advance();
                }
                _ => return Err(self.error("Expected 'class', 'interface', 'enum' or '@interface'")),
            }
        };

        let (class_pattern, class_names) = self.parse_name_list()?;

        let extends = if matches!(self.peek_token(), Some(Token::Extends | Token::Implements)) {
            self.advance();
            if matches!(self.peek_token(), Some(Token::At)) {
                return Err(self.error("Annotation constraints are not supported"));
            }
            Some(NamePattern::class_name(&self.expect_word("supertype name")?))
        } else {
            None
        };

        let mut members = Vec::new();
        if self.eat(&Token::LBrace) {
            loop {
                match self.peek_token() {
                    Some(Token::RBrace) => {
                        self.advance();
                        break;
                    }
                    None => return Err(self.error("Unterminated member list, expected '}'")),
                    _ => members.push(self.parse_member()?),
                }
            }
        }

        Ok(KeepSpecification {
            class_pattern,
            class_names,
            specifier: ClassSpecifier { required_set_flags: set, required_unset_flags: unset, kind, kind_negated, extends },
            members,
        })
    }

    /// Skip a leading `-keep`-style option word and its `,modifier` suffixes
    fn skip_keep_option(&mut self) -> Result<()> {
        if matches!(self.peek_token(), Some(Token::Word(w)) if w.starts_with('-')) {
            self.advance();
            while self.eat(&Token::Comma) {
                self.expect_word("keep option modifier")?;
            }
        }
        Ok(())
    }

    fn parse_name_list(&mut self) -> Result<(String, NameList)> {
        let mut text = String::new();
        let mut entries = Vec::new();
        loop {
            let negated = self.eat(&Token::Bang);
            let word = self.expect_word("class name")?;
            if !text.is_empty() {
                text.push(',');
            }
            if negated {
                text.push('!');
            }
            text.push_str(&word);
            entries.push((NamePattern::class_name(&word), negated));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok((text, NameList::new(entries)))
    }

    // ===== Member specification =====

    fn parse_member(&mut self) -> Result<MemberSpecification> {
        let mut set = 0u16;
        let mut unset = 0u16;
        loop {
            if matches!(self.peek_token(), Some(Token::At)) {
                return Err(self.error("Annotation constraints are not supported"));
            }
            let negated = matches!(self.peek_token(), Some(Token::Bang));
            let word_at = if negated { self.pos + 1 } else { self.pos };
            let flag = match self.tokens.get(word_at).map(|st| &st.token) {
                Some(Token::Word(word)) => lookup(MEMBER_MODIFIERS, word),
                _ => None,
            };
            match flag {
                Some(flag) => {
                    if negated {
                        unset |= flag;
                        self.advance();
                    } else {
                        set |= flag;
                    }
                    self.advance();
                }
                None if negated => {
                    self.advance();
                    return Err(self.error("Expected member modifier after '!'"));
                }
                None => break,
            }
        }

        let first = self.expect_word("member type or name")?;
        let member = |kind, name: &str, descriptor| MemberSpecification {
            name_pattern: NamePattern::member_name(name),
            descriptor,
            required_set_flags: set,
            required_unset_flags: unset,
            kind,
        };

        let spec = match first.as_str() {
            "<fields>" => member(MemberKind::Field, "*", None),
            "<methods>" => member(MemberKind::Method, "*", None),
            _ => match self.peek_token() {
                Some(Token::Semi) if first == "<init>" => member(MemberKind::Method, "<init>", None),
                Some(Token::Semi) => member(MemberKind::Unspecified, &first, None),
                Some(Token::LParen) => {
                    if first != "<init>" {
                        return Err(self.error(&format!("Expected return type before '{}'", first)));
                    }
                    let params = self.parse_params()?;
                    let ret = TypePattern::Primitive { code: 'V', dims: 0 };
                    member(MemberKind::Method, &first, Some(DescriptorPattern::Method { params, ret }))
                }
                Some(Token::Word(_)) => {
                    let ty = TypePattern::parse(&first)
                        .ok_or_else(|| self.error(&format!("Invalid type '{}'", first)))?;
                    let name = self.expect_word("member name")?;
                    if matches!(self.peek_token(), Some(Token::LParen)) {
                        let params = self.parse_params()?;
                        member(MemberKind::Method, &name, Some(DescriptorPattern::Method { params, ret: ty }))
                    } else {
                        if ty.is_void() {
                            return Err(self.error("Field type cannot be 'void'"));
                        }
                        member(MemberKind::Field, &name, Some(DescriptorPattern::Field(ty)))
                    }
                }
                _ => return Err(self.error("Expected member name, '(' or ';'")),
            },
        };

        self.expect(Token::Semi)?;
        Ok(spec)
    }

    fn parse_params(&mut self) -> Result<ParamsPattern> {
        self.expect(Token::LParen)?;
        if self.eat(&Token::RParen) {
            return Ok(ParamsPattern::Unconstrained);
        }

        let mut args = Vec::new();
        loop {
            let word = self.expect_word("parameter type")?;
            if word == "..." {
                args.push(ArgPattern::Ellipsis);
            } else {
                let ty = TypePattern::parse(&word)
                    .filter(|ty| !ty.is_void())
                    .ok_or_else(|| self.error(&format!("Invalid parameter type '{}'", word)))?;
                args.push(ArgPattern::Type(ty));
            }
            if self.eat(&Token::RParen) {
                break;
            }
            self.expect(Token::Comma)?;
        }
        Ok(ParamsPattern::List(args))
    }

    // ===== Helpers =====

    fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|st| &st.token)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|st| st.span)
            .unwrap_or(Span::new(0, 0, self.end.0, self.end.1))
    }

    fn advance(&mut self) -> Option<&SpannedToken> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek_token() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            let found = self.peek_token().map(Token::describe).unwrap_or_else(|| "end of input".to_string());
            Err(self.error(&format!("Expected {}, found {}", expected.describe(), found)))
        }
    }

    fn expect_word(&mut self, what: &str) -> Result<String> {
        match self.peek_token() {
            Some(Token::Word(word)) => {
                let word = word.clone();
                self.advance();
                Ok(word)
            }
            Some(other) => Err(self.error(&format!("Expected {}, found {}", what, other.describe()))),
            None => Err(self.error(&format!("Expected {}, found end of input", what))),
        }
    }

    fn error(&self, message: &str) -> Error {
        let span = self.current_span();
        Error::SpecSyntax { message: message.to_string(), line: span.line, col: span.col }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> KeepSpecification {
        let mut specs = parse_keep_specifications(source).unwrap();
        assert_eq!(specs.len(), 1);
        specs.remove(0)
    }

    #[test]
    fn test_public_void_methods() {
        let spec = parse_one("class com.x.Y { public void *(); }");
        assert!(spec.matches_class("com.x.Y"));
        assert!(spec.matches_class("com/x/Y"));
        assert!(!spec.is_class_level());

        assert!(spec.matches_member(MemberKind::Method, "foo", "()V", access::PUBLIC));
        assert!(spec.matches_member(MemberKind::Method, "bar", "(I)V", access::PUBLIC));
        assert!(!spec.matches_member(MemberKind::Method, "baz", "()V", access::PRIVATE));
        assert!(!spec.matches_member(MemberKind::Method, "value", "()I", access::PUBLIC));
        assert!(!spec.matches_member(MemberKind::Field, "foo", "V", access::PUBLIC));
    }

    #[test]
    fn test_bare_class_is_class_level() {
        let spec = parse_one("class a.b.**");
        assert!(spec.is_class_level());
        assert!(spec.matches_class("a.b.c.D"));
        assert!(!spec.matches_class("a.c.D"));
    }

    #[test]
    fn test_ambiguous_member_is_class_level() {
        let spec = parse_one("class a.B { *; }");
        assert_eq!(spec.members[0].kind, MemberKind::Unspecified);
        assert!(spec.is_class_level());
        assert!(!spec.matches_member(MemberKind::Method, "foo", "()V", 0));
    }

    #[test]
    fn test_fields_and_negated_modifiers() {
        let spec = parse_one("class a.B { !static java.lang.String name; private *** count; <fields>; }");
        assert!(spec.matches_member(MemberKind::Field, "name", "Ljava/lang/String;", access::PRIVATE));
        assert!(!spec.matches_member(MemberKind::Field, "name", "Ljava/lang/String;", access::STATIC));
        assert!(spec.matches_member(MemberKind::Field, "count", "I", access::PRIVATE));
        assert!(spec.matches_member(MemberKind::Field, "anything", "J", access::STATIC));
        assert_eq!(spec.members[0].required_unset_flags, access::STATIC);
    }

    #[test]
    fn test_constructors_and_clinit() {
        let ctor = parse_one("class a.B { <init>(int, ...); }");
        assert!(ctor.matches_member(MemberKind::Method, "<init>", "(IJ)V", access::PUBLIC));
        assert!(!ctor.matches_member(MemberKind::Method, "<init>", "()V", access::PUBLIC));

        let any = parse_one("class a.B { *** *(); }");
        assert!(any.matches_member(MemberKind::Method, "<init>", "()V", 0));
        assert!(!any.matches_member(MemberKind::Method, "<clinit>", "()V", access::STATIC));
    }

    #[test]
    fn test_rendered_dsl_members() {
        let spec = parse_one("class a.B { *** doWork(java.lang.String, int); *** <init>(); }");
        assert!(spec.matches_member(MemberKind::Method, "doWork", "(Ljava/lang/String;I)Z", 0));
        assert!(!spec.matches_member(MemberKind::Method, "doWork", "(I)Z", 0));
        assert!(spec.matches_member(MemberKind::Method, "<init>", "(I)V", 0));
    }

    #[test]
    fn test_name_list_and_supertype() {
        let spec = parse_one("-keep public class !a.internal.**,a.** extends a.Base");
        assert_eq!(spec.class_pattern, "!a.internal.**,a.**");
        assert!(spec.matches_class("a.Api"));
        assert!(!spec.matches_class("a.internal.Impl"));

        let container = DeclarationContainer {
            binary_name: "a/Api".to_string(),
            access_flags: access::PUBLIC | access::SUPER,
            super_name: Some("a/Base".to_string()),
            interfaces: Vec::new(),
            members: Vec::new(),
            deprecated: false,
        };
        assert!(spec.matches_container(&container));

        let other = DeclarationContainer { super_name: Some("java/lang/Object".to_string()), ..container.clone() };
        assert!(!spec.matches_container(&other));
        let hidden = DeclarationContainer { access_flags: 0, ..container };
        assert!(!spec.matches_container(&hidden));
    }

    #[test]
    fn test_class_kinds() {
        let spec = parse_one("interface a.**");
        let mut container = DeclarationContainer {
            binary_name: "a/I".to_string(),
            access_flags: access::INTERFACE | access::ABSTRACT,
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            members: Vec::new(),
            deprecated: false,
        };
        assert!(spec.matches_container(&container));
        container.access_flags = access::PUBLIC;
        assert!(!spec.matches_container(&container));
        assert!(parse_one("!interface a.**").matches_container(&container));
        assert!(parse_one("class a.**").matches_container(&container));
    }

    #[test]
    fn test_multiple_specs_in_one_string() {
        let specs = parse_keep_specifications("class a.A\nclass b.B { void run(); }").unwrap();
        assert_eq!(specs.len(), 2);
        assert!(specs[1].matches_member(MemberKind::Method, "run", "()V", 0));
    }

    #[test]
    fn test_syntax_errors() {
        for source in [
            "",
            "   # only a comment",
            "class a.B {",
            "class a.B { void foo()",
            "publik class a.B",
            "class a.B { int[ x; }",
            "class a.B { void x; }",
            "@a.Ann class a.B",
            "class a.B { @a.Ann *; }",
            "class a.B { !foo bar; }",
            "class a.B { foo(); }",
            "a.B",
            "!class a.B",
        ] {
            let err = parse_keep_specifications(source).unwrap_err();
            assert!(err.is_syntax(), "expected syntax error for {source:?}, got {err:?}");
        }
    }

    #[test]
    fn test_error_position() {
        match parse_keep_specifications("class a.B {\n  publik void x();\n}").unwrap_err() {
            Error::SpecSyntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_display() {
        let spec = parse_one("public class a.B { !private void *(); }");
        assert_eq!(spec.to_string(), "public class a.B { !private method * (...)V; }");
    }
}
