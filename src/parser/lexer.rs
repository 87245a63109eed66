//! Modelica tokens, produced with a [`logos`] lexer.

use crate::errors::{Error, Result};
use crate::syntax::ast::Location;
use logos::Logos;

/// A lexical token kind.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Tok {
    // keywords
    #[token("algorithm")]
    Algorithm,
    #[token("and")]
    And,
    #[token("annotation")]
    Annotation,
    #[token("block")]
    Block,
    #[token("break")]
    Break,
    #[token("class")]
    Class,
    #[token("connect")]
    Connect,
    #[token("connector")]
    Connector,
    #[token("constant")]
    Constant,
    #[token("constrainedby")]
    ConstrainedBy,
    #[token("der")]
    Der,
    #[token("discrete")]
    Discrete,
    #[token("each")]
    Each,
    #[token("else")]
    Else,
    #[token("elseif")]
    ElseIf,
    #[token("elsewhen")]
    ElseWhen,
    #[token("encapsulated")]
    Encapsulated,
    #[token("end")]
    End,
    #[token("enumeration")]
    Enumeration,
    #[token("equation")]
    Equation,
    #[token("expandable")]
    Expandable,
    #[token("extends")]
    Extends,
    #[token("false")]
    False,
    #[token("final")]
    Final,
    #[token("flow")]
    Flow,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("if")]
    If,
    #[token("import")]
    Import,
    #[token("impure")]
    Impure,
    #[token("in")]
    In,
    #[token("initial")]
    Initial,
    #[token("inner")]
    Inner,
    #[token("input")]
    Input,
    #[token("loop")]
    Loop,
    #[token("model")]
    Model,
    #[token("not")]
    Not,
    #[token("operator")]
    Operator,
    #[token("or")]
    Or,
    #[token("outer")]
    Outer,
    #[token("output")]
    Output,
    #[token("package")]
    Package,
    #[token("parameter")]
    Parameter,
    #[token("partial")]
    Partial,
    #[token("protected")]
    Protected,
    #[token("public")]
    Public,
    #[token("pure")]
    Pure,
    #[token("record")]
    Record,
    #[token("redeclare")]
    Redeclare,
    #[token("replaceable")]
    Replaceable,
    #[token("return")]
    Return,
    #[token("stream")]
    Stream,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("type")]
    Type,
    #[token("when")]
    When,
    #[token("while")]
    While,
    #[token("within")]
    Within,

    // punctuation and operators
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(":=")]
    Assign,
    #[token(".")]
    Dot,
    #[token("=")]
    EqSign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token(".+")]
    DotPlus,
    #[token(".-")]
    DotMinus,
    #[token(".*")]
    DotStar,
    #[token("./")]
    DotSlash,
    #[token(".^")]
    DotCaret,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("<>")]
    Ne,

    // terminals
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,
    #[regex(r"[0-9]+")]
    UnsignedInteger,
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+")]
    UnsignedReal,
    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLit,
}

/// One lexed token with its text and byte span.
#[derive(Debug, Clone)]
pub struct Lexeme {
    pub tok: Tok,
    /// Source text; for [`Tok::StringLit`] the unescaped contents.
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// The fully lexed form of one source buffer.
#[derive(Debug)]
pub struct Lexed {
    pub lexemes: Vec<Lexeme>,
    line_starts: Vec<usize>,
    file_name: String,
    source_len: usize,
}

impl Lexed {
    /// Source location for the byte range `start..end`.
    pub fn location(&self, start: usize, end: usize) -> Location {
        let (start_line, start_column) = self.line_col(start);
        let (end_line, end_column) = self.line_col(end);
        Location {
            start_line,
            start_column,
            end_line,
            end_column,
            start: start as u32,
            end: end as u32,
            file_name: self.file_name.clone(),
        }
    }

    /// Location of the lexeme at `index`, or of end-of-file.
    pub fn location_of(&self, index: usize) -> Location {
        match self.lexemes.get(index) {
            Some(lexeme) => self.location(lexeme.start, lexeme.end),
            None => self.location(self.source_len, self.source_len),
        }
    }

    fn line_col(&self, offset: usize) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let column = offset - self.line_starts[line];
        (line as u32 + 1, column as u32 + 1)
    }
}

/// Processes the escape sequences of a quoted string literal.
fn unescape(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Tokenises `source`, failing with [`Error::Parse`] on an unknown character.
pub fn lex(source: &str, file_name: &str) -> Result<Lexed> {
    let mut line_starts = vec![0usize];
    for (i, b) in source.bytes().enumerate() {
        if b == b'\n' {
            line_starts.push(i + 1);
        }
    }

    // buffer hint: token count is well under a quarter of the byte length
    let mut lexemes = Vec::with_capacity(source.len() / 4 + 16);
    let mut lexer = Tok::lexer(source);
    while let Some(item) = lexer.next() {
        let span = lexer.span();
        match item {
            Ok(tok) => {
                let text = if tok == Tok::StringLit {
                    unescape(lexer.slice())
                } else {
                    lexer.slice().to_string()
                };
                lexemes.push(Lexeme {
                    tok,
                    text,
                    start: span.start,
                    end: span.end,
                });
            }
            Err(()) => {
                return Err(Error::Parse {
                    src: source.to_string(),
                    span: (span.start, span.end.saturating_sub(span.start).max(1)).into(),
                    message: format!("unexpected character {:?}", lexer.slice()),
                });
            }
        }
    }

    Ok(Lexed {
        lexemes,
        line_starts,
        file_name: file_name.to_string(),
        source_len: source.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        lex(source, "test.mo")
            .unwrap()
            .lexemes
            .into_iter()
            .map(|l| l.tok)
            .collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            kinds("model Ball end Ball;"),
            vec![Tok::Model, Tok::Ident, Tok::End, Tok::Ident, Tok::Semicolon]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 3. 1e5 2.5e-3"),
            vec![
                Tok::UnsignedInteger,
                Tok::UnsignedReal,
                Tok::UnsignedReal,
                Tok::UnsignedReal,
                Tok::UnsignedReal
            ]
        );
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            kinds("a := b .* c <> d <= e"),
            vec![
                Tok::Ident,
                Tok::Assign,
                Tok::Ident,
                Tok::DotStar,
                Tok::Ident,
                Tok::Ne,
                Tok::Ident,
                Tok::Le,
                Tok::Ident
            ]
        );
    }

    #[test]
    fn test_string_unescape() {
        let lexed = lex(r#""a\nb""#, "test.mo").unwrap();
        assert_eq!(lexed.lexemes[0].text, "a\nb");
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("x // line\n /* block\n comment */ y"),
            vec![Tok::Ident, Tok::Ident]
        );
    }

    #[test]
    fn test_unknown_character() {
        assert!(matches!(lex("model ?", "t.mo"), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_locations() {
        let lexed = lex("model M\n  Real x;\nend M;", "t.mo").unwrap();
        let x = lexed
            .lexemes
            .iter()
            .find(|l| l.text == "x")
            .expect("x token");
        let loc = lexed.location(x.start, x.end);
        assert_eq!(loc.start_line, 2);
        assert_eq!(loc.start_column, 8);
    }
}
