//! Reading system description (`.sdf`) and board (`.board`) files.
//!
//! Both formats share one line grammar:
//!
//! ```text
//! // comment
//! Keyword arg, arg, ...
//! ```
//!
//! The keyword is a run of ASCII letters followed by a single space.
//! Each argument is classified into an [`Arg`]:
//! - `"..."` is a string,
//! - `0x` followed by at most 8 hex digits, or a run of decimal digits, is a number,
//! - anything else is unknown.
//!
//! [`parse_rows`] splits a file into [`ParsedRow`]s, and the format-specific readers
//! ([`sdf`], [`board`]) interpret each row, checking its arguments with [`ParsedRow::args_match`].
//!
//! ```
//! use niisim::config::{parse_rows, Arg};
//!
//! let rows = parse_rows("// a CPU\nAddCPU \"cpu0\", 0x0, 0x20, 50000000").unwrap();
//! assert_eq!(rows[0].keyword, "AddCPU");
//! assert_eq!(rows[0].args[1], Arg::Num(0));
//! assert!(rows[0].args_match("snnn"));
//! ```

pub mod lex;
pub mod sdf;
pub mod board;

use logos::Logos;

use self::lex::{ArgToken, LexErr};

/// Errors from reading configuration files.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigErr {
    /// A line could not be split into a keyword and arguments.
    #[error("line {line}: {err}")]
    Syntax {
        /// The line number, starting at 1.
        line: usize,
        /// What went wrong.
        err: LexErr,
    },
    /// A system description command had invalid arguments or could not be applied.
    #[error("Error while parsing '{0}'")]
    Command(String),
    /// A board command had invalid arguments.
    #[error("Error while parsing {command} in '{file}'")]
    BoardCommand {
        /// The command.
        command: String,
        /// The board file.
        file: String,
    },
    /// A board file could not be read.
    #[error("The board file '{0}' does not exist!")]
    BoardNotFound(String),
}

/// A classified command argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// A quoted string, without its quotes.
    Str(String),
    /// A hexadecimal or decimal number.
    Num(u32),
    /// Anything else.
    Unknown(String),
}
impl Arg {
    /// The string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }
    /// The numeric value, if this is a number.
    pub fn as_num(&self) -> Option<u32> {
        match self {
            Arg::Num(n) => Some(*n),
            _ => None,
        }
    }
    fn pattern_char(&self) -> char {
        match self {
            Arg::Str(_) => 's',
            Arg::Num(_) => 'n',
            Arg::Unknown(_) => 'u',
        }
    }
}

/// A non-empty, non-comment line of a configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    /// The line number, starting at 1.
    pub line: usize,
    /// The command keyword.
    pub keyword: String,
    /// The arguments, in order.
    pub args: Vec<Arg>,
}

impl ParsedRow {
    /// Checks the argument kinds against a pattern.
    ///
    /// Each pattern character is `s` (string), `n` (number), or `u` (unknown).
    /// A `?` after a character makes that argument optional. Optional arguments
    /// may only appear at the end.
    ///
    /// ```
    /// use niisim::config::parse_rows;
    ///
    /// let rows = parse_rows("AddUART \"uart0\", 0x1000, 8\nAddUART \"uart0\", 0x1000, 8, 2").unwrap();
    /// assert!(rows.iter().all(|r| r.args_match("snnn?")));
    /// assert!(!rows[0].args_match("snnn"));
    /// ```
    pub fn args_match(&self, pattern: &str) -> bool {
        let kinds: Vec<char> = pattern.chars().filter(|&c| c != '?').collect();
        let optional = pattern.chars().filter(|&c| c == '?').count();
        let required = kinds.len().saturating_sub(optional);

        (required..=kinds.len()).contains(&self.args.len())
            && self.args.iter()
                .zip(&kinds)
                .all(|(a, &k)| a.pattern_char() == k)
    }

    /// The string argument at `i`.
    pub fn str(&self, i: usize) -> Option<&str> {
        self.args.get(i)?.as_str()
    }

    /// The numeric argument at `i`.
    pub fn num(&self, i: usize) -> Option<u32> {
        self.args.get(i)?.as_num()
    }
}

/// Splits a configuration file into rows.
///
/// Empty lines and lines starting with `//` are skipped.
pub fn parse_rows(src: &str) -> Result<Vec<ParsedRow>, ConfigErr> {
    let mut rows = vec![];

    for (n, text) in src.lines().enumerate() {
        let line = n + 1;
        if text.is_empty() || text.starts_with("//") {
            continue;
        }

        let kw_len = text.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(text.len());
        let Some(rest) = text[kw_len..].strip_prefix(' ') else {
            return Err(ConfigErr::Syntax { line, err: LexErr::ExpectedKeyword });
        };

        let mut args = vec![];
        for arg in rest.split(',') {
            let arg = arg.trim_matches([' ', '\t']);
            if arg.is_empty() {
                break;
            }
            args.push(classify(arg).map_err(|err| ConfigErr::Syntax { line, err })?);
        }

        rows.push(ParsedRow { line, keyword: text[..kw_len].to_string(), args });
    }

    Ok(rows)
}

fn classify(arg: &str) -> Result<Arg, LexErr> {
    let mut tokens = ArgToken::lexer(arg);
    let classified = match tokens.next() {
        Some(Ok(ArgToken::Str(s))) => Arg::Str(s),
        Some(Ok(ArgToken::Num(n))) => Arg::Num(n),
        Some(Err(e @ (LexErr::InvalidHex | LexErr::InvalidInteger))) => return Err(e),
        _ => return Ok(Arg::Unknown(arg.to_string())),
    };

    // the token must span the whole argument
    match tokens.next() {
        None => Ok(classified),
        Some(_) => Ok(Arg::Unknown(arg.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn row(src: &str) -> ParsedRow {
        let mut rows = parse_rows(src).unwrap();
        assert_eq!(rows.len(), 1);
        rows.remove(0)
    }

    #[test]
    fn test_rows() {
        let rows = parse_rows("\
// header
AddSDRAM \"sdram\", 0x0, 0x800000

Map \"jtag\",   \"JTAG\"
").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].args, [Arg::Str("sdram".into()), Arg::Num(0), Arg::Num(0x80_0000)]);
        assert_eq!(rows[1].line, 4);
        assert_eq!(rows[1].str(1), Some("JTAG"));
    }

    #[test]
    fn test_args_stop_at_empty() {
        assert_eq!(row("Cmd 1,,2").args, [Arg::Num(1)]);
        assert!(row("Cmd ").args.is_empty());
    }

    #[rstest]
    #[case("0x10", Arg::Num(16))]
    #[case("0xFFFFFFFF", Arg::Num(u32::MAX))]
    #[case("0x", Arg::Num(0))]
    #[case("1234", Arg::Num(1234))]
    #[case("\"a b\"", Arg::Str("a b".into()))]
    #[case("\"\"", Arg::Str("".into()))]
    #[case("in", Arg::Unknown("in".into()))]
    #[case("\"x\" y", Arg::Unknown("\"x\" y".into()))]
    fn test_classify(#[case] src: &str, #[case] expected: Arg) {
        assert_eq!(row(&format!("Cmd {src}")).args, [expected]);
    }

    #[rstest]
    #[case("Cmd 0x123456789", LexErr::InvalidHex)]
    #[case("Cmd 0xZZ", LexErr::InvalidHex)]
    #[case("Cmd 12a", LexErr::InvalidInteger)]
    #[case("Cmd 99999999999", LexErr::InvalidInteger)]
    #[case("Cmd,1", LexErr::ExpectedKeyword)]
    #[case("Cmd2 1", LexErr::ExpectedKeyword)]
    #[case("Cmd", LexErr::ExpectedKeyword)]
    fn test_syntax_errors(#[case] src: &str, #[case] err: LexErr) {
        assert_eq!(parse_rows(src), Err(ConfigErr::Syntax { line: 1, err }));
    }

    #[test]
    fn test_error_messages() {
        let err = parse_rows("\n\nbad").unwrap_err();
        assert_eq!(err.to_string(), "line 3: Expected keyword");
        assert_eq!(ConfigErr::Command("AddCPU".into()).to_string(), "Error while parsing 'AddCPU'");
    }

    #[test]
    fn test_args_match() {
        let r = row("AddTimer \"t\", 0x10, 32, 50000000, 1, \"ms\", 0, 0, 1");
        assert!(r.args_match("snnnnsnnnn?"));
        assert!(!r.args_match("snnnnsnnnn"));
        assert!(!r.args_match("snnnnsnnn"));
        assert!(!r.args_match("snnnnnnnnn?"));

        let r = row("AddPIO \"p\", 0x10, 16, in");
        assert!(r.args_match("snnu"));
        assert!(!r.args_match("snns"));
    }
}
