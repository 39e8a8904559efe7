//! Tokens of the QASM subset; one line is lexed at a time.

use std::fmt::{self, Display};

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"//[^\n]*")]
pub(crate) enum Token {
    #[token("OPENQASM")]
    OpenQasm,

    #[token("include")]
    Include,

    #[token("qreg")]
    QReg,

    #[token("creg")]
    CReg,

    #[token("barrier")]
    Barrier,

    #[token("if")]
    If,

    #[token("gate")]
    GateDef,

    #[token("pi")]
    Pi,

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    /// Kept as text: used both as an index and as an angle.
    #[regex(r"[0-9]+", |lex| lex.slice().to_string())]
    Integer(String),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    StringLiteral(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[token("->")]
    Arrow,

    #[token("==")]
    EqEq,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::OpenQasm => write!(f, "OPENQASM"),
            Token::Include => write!(f, "include"),
            Token::QReg => write!(f, "qreg"),
            Token::CReg => write!(f, "creg"),
            Token::Barrier => write!(f, "barrier"),
            Token::If => write!(f, "if"),
            Token::GateDef => write!(f, "gate"),
            Token::Pi => write!(f, "pi"),
            Token::Float(v) => write!(f, "{v}"),
            Token::Integer(s) | Token::Identifier(s) => write!(f, "{s}"),
            Token::StringLiteral(s) => write!(f, "\"{s}\""),
            Token::Arrow => write!(f, "->"),
            Token::EqEq => write!(f, "=="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
        }
    }
}

/// Lex one line, returning the text of the first unrecognized token on failure.
pub(crate) fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    Token::lexer(line)
        .spanned()
        .map(|(token, span)| token.map_err(|_| line[span].to_string()))
        .collect()
}

/// True when `word` lexes as a single identifier, i.e. it is not a keyword.
pub(crate) fn is_identifier(word: &str) -> bool {
    let mut lexer = Token::lexer(word);
    matches!(lexer.next(), Some(Ok(Token::Identifier(ref name))) if name == word)
        && lexer.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_line() {
        let tokens = tokenize("cx q[0],q[1]; // entangle").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("cx".into()),
                Token::Identifier("q".into()),
                Token::LBracket,
                Token::Integer("0".into()),
                Token::RBracket,
                Token::Comma,
                Token::Identifier("q".into()),
                Token::LBracket,
                Token::Integer("1".into()),
                Token::RBracket,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_numbers_and_keywords() {
        let tokens = tokenize("OPENQASM 2.0; rx(-1.5e-3*pi) if ifx").unwrap();
        assert_eq!(tokens[0], Token::OpenQasm);
        assert_eq!(tokens[1], Token::Float(2.0));
        assert_eq!(tokens[5], Token::Minus);
        assert_eq!(tokens[6], Token::Float(1.5e-3));
        assert_eq!(tokens[8], Token::Pi);
        assert_eq!(tokens[10], Token::If);
        assert_eq!(tokens[11], Token::Identifier("ifx".into()));
    }

    #[test]
    fn test_arrow_and_string() {
        let tokens = tokenize("include \"qelib1.inc\"; measure q[0] -> c[0];").unwrap();
        assert_eq!(tokens[1], Token::StringLiteral("qelib1.inc".into()));
        assert!(tokens.contains(&Token::Arrow));
    }

    #[test]
    fn test_unknown_character() {
        assert_eq!(tokenize("h q[0] @;"), Err("@".to_string()));
    }

    #[test]
    fn test_keywords_are_not_identifiers() {
        for word in ["pi", "if", "qreg", "creg", "include", "barrier", "OPENQASM", "gate"] {
            assert!(!is_identifier(word), "{word}");
        }
        for word in ["c", "flags", "_tmp", "pi2", "gates"] {
            assert!(is_identifier(word), "{word}");
        }
        assert!(!is_identifier(""));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier("0c"));
    }
}
