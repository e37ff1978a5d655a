//! Tokenizing configuration file arguments.
//!
//! Each comma-separated argument of a configuration line is lexed on its own
//! into an [`ArgToken`]. An argument that does not lex to exactly one token is
//! treated as an unknown argument by the caller.

use logos::{Lexer, Logos};

/// A classified argument.
#[derive(Debug, Logos, PartialEq, Eq)]
#[logos(error = LexErr)]
pub enum ArgToken {
    // As with numbers in general, these regexes accept more than is valid
    // (e.g. `12ab`), and the callback reports the error.

    /// A number (e.g. `42`, `0x1F`).
    #[regex(r"0x\w*", lex_hex)]
    #[regex(r"\d\w*", lex_dec)]
    Num(u32),

    /// A string literal (e.g. `"sdram"`).
    #[regex(r#""[^"]*""#, |lx| { let s = lx.slice(); s[1..s.len() - 1].to_string() })]
    Str(String),
}

/// Errors raised while splitting a configuration line.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, thiserror::Error)]
pub enum LexErr {
    /// The line does not start with a keyword followed by a space.
    #[error("Expected keyword")]
    ExpectedKeyword,
    /// A `0x` literal has invalid digits, or more than 8 of them.
    #[error("Invalid hexadecimal integer")]
    InvalidHex,
    /// A literal starting with a digit is not a valid decimal integer.
    #[error("Invalid integer")]
    InvalidInteger,
    /// The argument is not a number or a string.
    #[default]
    #[error("Unrecognized argument")]
    Unrecognized,
}

fn lex_hex(lx: &Lexer<'_, ArgToken>) -> Result<u32, LexErr> {
    let Some(hex) = lx.slice().strip_prefix("0x") else {
        unreachable!("Lexer slice should have started with 0x");
    };

    match hex.len() {
        0 => Ok(0),
        1..=8 => u32::from_str_radix(hex, 16).map_err(|_| LexErr::InvalidHex),
        _ => Err(LexErr::InvalidHex),
    }
}

fn lex_dec(lx: &Lexer<'_, ArgToken>) -> Result<u32, LexErr> {
    lx.slice().parse::<u32>().map_err(|_| LexErr::InvalidInteger)
}

#[cfg(test)]
mod tests {
    use logos::Logos;

    use super::*;

    #[test]
    fn test_numbers() {
        let mut tokens = ArgToken::lexer("0x7fff");
        assert_eq!(tokens.next(), Some(Ok(ArgToken::Num(0x7FFF))));
        assert_eq!(tokens.next(), None);

        let mut tokens = ArgToken::lexer("0x1000_0000");
        assert_eq!(tokens.next(), Some(Err(LexErr::InvalidHex)));

        let mut tokens = ArgToken::lexer("4294967295");
        assert_eq!(tokens.next(), Some(Ok(ArgToken::Num(u32::MAX))));
        let mut tokens = ArgToken::lexer("4294967296");
        assert_eq!(tokens.next(), Some(Err(LexErr::InvalidInteger)));
    }

    #[test]
    fn test_strings() {
        let mut tokens = ArgToken::lexer(r#""UART0""#);
        assert_eq!(tokens.next(), Some(Ok(ArgToken::Str("UART0".to_string()))));
        assert_eq!(tokens.next(), None);

        let mut tokens = ArgToken::lexer(r#""unclosed"#);
        assert_eq!(tokens.next(), Some(Err(LexErr::Unrecognized)));
    }
}
