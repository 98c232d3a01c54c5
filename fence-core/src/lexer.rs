//! Lexer for keep patterns
//!
//! Tokenizes ProGuard-style keep specifications such as
//! `class com.example.** { public void *(); }`.

use logos::Logos;
use crate::error::{Error, Result};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    // Class kinds
    #[token("class")]
    Class,
    #[token("interface")]
    Interface,
    #[token("@interface")]
    AnnotationInterface,
    #[token("enum")]
    Enum,

    // Supertype constraint
    #[token("extends")]
    Extends,
    #[token("implements")]
    Implements,

    // Delimiters
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token("!")]
    Bang,
    #[token("@")]
    At,

    /// Names, types, modifiers and wildcards (`com.x.*`, `int[]`, `<init>`, `***`, `...`)
    #[regex(r"[A-Za-z0-9_$.*?%<>\[\]/\-]+", |lex| lex.slice().to_string())]
    Word(String),
}

impl Token {
    /// Human readable form used in syntax errors
    pub fn describe(&self) -> String {
        match self {
            Token::Class => "'class'".to_string(),
            Token::Interface => "'interface'".to_string(),
            Token::AnnotationInterface => "'@interface'".to_string(),
            Token::Enum => "'enum'".to_string(),
            Token::Extends => "'extends'".to_string(),
            Token::Implements => "'implements'".to_string(),
            Token::LBrace => "'{'".to_string(),
            Token::RBrace => "'}'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Semi => "';'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::At => "'@'".to_string(),
            Token::Word(w) => format!("'{}'", w),
        }
    }
}

/// Source location span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, col: usize) -> Self {
        Self { start, end, line, col }
    }
}

/// Token with source location
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

pub struct Lexer<'a> {
    source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    /// Tokenize returning tokens without spans
    pub fn tokenize(&self) -> Result<Vec<Token>> {
        Ok(self.tokenize_with_spans()?.into_iter().map(|st| st.token).collect())
    }

    /// Tokenize returning tokens with source spans
    pub fn tokenize_with_spans(&self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();
        let mut lex = Token::lexer(self.source);

        let line_starts: Vec<usize> = std::iter::once(0)
            .chain(self.source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        while let Some(token) = lex.next() {
            let byte_span = lex.span();
            let (line, col) = offset_to_line_col(&line_starts, byte_span.start);

            match token {
                Ok(tok) => tokens.push(SpannedToken {
                    token: tok,
                    span: Span::new(byte_span.start, byte_span.end, line, col),
                }),
                Err(_) => {
                    return Err(Error::SpecSyntax {
                        message: format!("Unexpected character: '{}'", &self.source[byte_span]),
                        line,
                        col,
                    });
                }
            }
        }

        Ok(tokens)
    }

    /// Position just past the last character, used for end-of-input errors
    pub fn end_position(&self) -> (usize, usize) {
        let line = self.source.matches('\n').count() + 1;
        let col = self.source.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0) + 1;
        (line, col)
    }
}

/// Convert byte offset to line and column (1-indexed)
fn offset_to_line_col(line_starts: &[usize], offset: usize) -> (usize, usize) {
    let line = line_starts.partition_point(|&start| start <= offset);
    let line_start = line_starts.get(line.saturating_sub(1)).copied().unwrap_or(0);
    (line, offset - line_start + 1)
}
