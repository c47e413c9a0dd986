//! The assembler's unified error type. Every variant is fatal: there is
//! no recovery, and the caller reports it with file/line/column context
//! and aborts.

use std::fmt;
use std::path::PathBuf;

use crate::lexer::SourceLoc;

#[derive(Clone, Debug, PartialEq)]
pub enum LexicalError {
    UnexpectedChar { loc: SourceLoc, found: char },
    UnterminatedString { loc: SourceLoc },
    MalformedNumber { loc: SourceLoc, text: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum SyntaxError {
    UnexpectedToken { loc: SourceLoc, found: String, expected: &'static str },
    UnknownMnemonic { loc: SourceLoc, mnemonic: String },
    UnknownRegister { loc: SourceLoc, name: String },
    UnknownModifier { loc: SourceLoc, name: String },
    MissingOperand { loc: SourceLoc, mnemonic: String },
    DanglingPunctuation { loc: SourceLoc, found: char },
}

#[derive(Clone, Debug, PartialEq)]
pub enum SemanticError {
    DuplicateLabel { loc: SourceLoc, name: String },
    CompressedRegisterOutOfRange { loc: SourceLoc, reg: u8 },
    MisalignedBranchTarget { loc: SourceLoc, delta: i64 },
    ImmediateOutOfRange { loc: SourceLoc, value: i64, width: u32 },
    UndefinedRoundingMode { loc: SourceLoc, name: String },
    UndefinedSymbol { loc: SourceLoc, name: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Lexical(LexicalError),
    Syntax(SyntaxError),
    Semantic(SemanticError),
    Encoding(mc::EncodingError),
    Io { path: PathBuf, message: String },
}

impl From<LexicalError> for Error {
    fn from(err: LexicalError) -> Error {
        Error::Lexical(err)
    }
}

impl From<SyntaxError> for Error {
    fn from(err: SyntaxError) -> Error {
        Error::Syntax(err)
    }
}

impl From<SemanticError> for Error {
    fn from(err: SemanticError) -> Error {
        Error::Semantic(err)
    }
}

impl From<mc::EncodingError> for Error {
    fn from(err: mc::EncodingError) -> Error {
        match err {
            mc::EncodingError::CompressedRegisterOutOfRange { loc, reg, .. } => {
                Error::Semantic(SemanticError::CompressedRegisterOutOfRange { loc, reg })
            }
            mc::EncodingError::BitWidthMismatch { .. } => Error::Encoding(err),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Lexical(LexicalError::UnexpectedChar { loc, found }) => {
                write!(f, "{}: error: unexpected character '{}'", loc, found)
            }
            Error::Lexical(LexicalError::UnterminatedString { loc }) => write!(f, "{}: error: unterminated string", loc),
            Error::Lexical(LexicalError::MalformedNumber { loc, text }) => {
                write!(f, "{}: error: malformed numeric literal \"{}\"", loc, text)
            }
            Error::Syntax(SyntaxError::UnexpectedToken { loc, found, expected }) => {
                write!(f, "{}: error: unexpected token \"{}\", expected {}", loc, found, expected)
            }
            Error::Syntax(SyntaxError::UnknownMnemonic { loc, mnemonic }) => {
                write!(f, "{}: error: unknown mnemonic \"{}\"", loc, mnemonic)
            }
            Error::Syntax(SyntaxError::UnknownRegister { loc, name }) => {
                write!(f, "{}: error: unknown register \"{}\"", loc, name)
            }
            Error::Syntax(SyntaxError::UnknownModifier { loc, name }) => {
                write!(f, "{}: error: unknown modifier \"{}\"", loc, name)
            }
            Error::Syntax(SyntaxError::MissingOperand { loc, mnemonic }) => {
                write!(f, "{}: error: missing operand for \"{}\"", loc, mnemonic)
            }
            Error::Syntax(SyntaxError::DanglingPunctuation { loc, found }) => {
                write!(f, "{}: error: dangling punctuation '{}'", loc, found)
            }
            Error::Semantic(SemanticError::DuplicateLabel { loc, name }) => {
                write!(f, "{}: error: label \"{}\" already defined", loc, name)
            }
            Error::Semantic(SemanticError::CompressedRegisterOutOfRange { loc, reg }) => {
                write!(f, "{}: error: register x{} is not in 8..=15, required by compressed form", loc, reg)
            }
            Error::Semantic(SemanticError::MisalignedBranchTarget { loc, delta }) => {
                write!(f, "{}: error: branch/jump target offset {} is not 2-byte aligned", loc, delta)
            }
            Error::Semantic(SemanticError::ImmediateOutOfRange { loc, value, width }) => {
                write!(f, "{}: error: immediate {} does not fit in {} signed bits", loc, value, width)
            }
            Error::Semantic(SemanticError::UndefinedRoundingMode { loc, name }) => {
                write!(f, "{}: error: undefined rounding mode \"{}\"", loc, name)
            }
            Error::Semantic(SemanticError::UndefinedSymbol { loc, name }) => {
                write!(f, "{}: error: reference to undefined symbol \"{}\"", loc, name)
            }
            Error::Encoding(err) => write!(f, "{}", err),
            Error::Io { path, message } => write!(f, "{}: {}", path.display(), message),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
