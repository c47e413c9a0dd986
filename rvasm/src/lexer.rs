//! Hand-rolled, single-pass lexer. Operates directly on `&str`; tracks
//! `line`/`col` for diagnostics.

pub use mc::instruction::SourceLoc;

use crate::error::{LexicalError, Result};

#[derive(Clone, PartialEq, Debug)]
pub enum TokenKind {
    /// A mnemonic-shaped identifier that resolved against the opcode table
    /// or the pseudo-instruction set.
    Instruction,
    /// Anything alphabetic that isn't a register, mnemonic, directive or
    /// modifier: a symbol reference.
    Identifier,
    Register(u8),
    Integer(i64),
    Float(f64),
    /// `%lo`, `%hi`, ... — the raw lexeme (with the leading `%`) is
    /// resolved to a `Modifier` by the parser so an unknown one reports
    /// `SyntaxError::UnknownModifier` with the right location.
    Modifier,
    Directive,
    LabelDef,
    Comma,
    LParen,
    RParen,
    Colon,
    Newline,
    Eof,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub loc: SourceLoc,
}

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    _source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            _source: source,
        }
    }

    fn loc(&self) -> SourceLoc {
        SourceLoc {
            line: self.line,
            col: self.col,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn emit(&self, kind: TokenKind, lexeme: String, loc: SourceLoc) -> Token {
        Token { kind, lexeme, loc }
    }

    /// Tokenizes the entire source, ending with one `Eof` token.
    pub fn lex(source: &str) -> Result<Vec<Token>> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let is_eof = matches!(tok.kind, TokenKind::Eof);
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token> {
        loop {
            match self.peek() {
                None => return Ok(self.emit(TokenKind::Eof, String::new(), self.loc())),
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('\n') => {
                    let loc = self.loc();
                    self.advance();
                    return Ok(self.emit(TokenKind::Newline, "\n".to_string(), loc));
                }
                Some(c) if c.is_ascii_digit() => return self.lex_number(),
                Some('-') if self.peek_at(1).map_or(false, |c| c.is_ascii_digit()) => return self.lex_number(),
                Some('.') => return self.lex_directive(),
                Some('%') => return self.lex_modifier(),
                Some(',') => {
                    let loc = self.loc();
                    self.advance();
                    return Ok(self.emit(TokenKind::Comma, ",".to_string(), loc));
                }
                Some('(') => {
                    let loc = self.loc();
                    self.advance();
                    return Ok(self.emit(TokenKind::LParen, "(".to_string(), loc));
                }
                Some(')') => {
                    let loc = self.loc();
                    self.advance();
                    return Ok(self.emit(TokenKind::RParen, ")".to_string(), loc));
                }
                Some(':') => {
                    let loc = self.loc();
                    self.advance();
                    return Ok(self.emit(TokenKind::Colon, ":".to_string(), loc));
                }
                Some(c) if c.is_ascii_alphabetic() || c == '_' => return self.lex_word(),
                Some(c) => {
                    let loc = self.loc();
                    self.advance();
                    return Err(LexicalError::UnexpectedChar { loc, found: c }.into());
                }
            }
        }
    }

    fn lex_number(&mut self) -> Result<Token> {
        let loc = self.loc();
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push(self.advance().unwrap());
        }
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            text.push(self.advance().unwrap());
            text.push(self.advance().unwrap());
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            let digits = &text[if text.starts_with('-') { 3 } else { 2 }..];
            let magnitude = i64::from_str_radix(digits, 16)
                .map_err(|_| LexicalError::MalformedNumber { loc, text: text.clone() })?;
            let value = if text.starts_with('-') { -magnitude } else { magnitude };
            return Ok(self.emit(TokenKind::Integer(value), text, loc));
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else if c == '.' && !is_float && self.peek_at(1).map_or(false, |d| d.is_ascii_digit()) {
                is_float = true;
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| LexicalError::MalformedNumber { loc, text: text.clone() })?;
            Ok(self.emit(TokenKind::Float(value), text, loc))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| LexicalError::MalformedNumber { loc, text: text.clone() })?;
            Ok(self.emit(TokenKind::Integer(value), text, loc))
        }
    }

    fn lex_directive(&mut self) -> Result<Token> {
        let loc = self.loc();
        let mut text = String::new();
        text.push(self.advance().unwrap()); // '.'
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Ok(self.emit(TokenKind::Directive, text, loc))
    }

    fn lex_modifier(&mut self) -> Result<Token> {
        let loc = self.loc();
        let mut text = String::new();
        text.push(self.advance().unwrap()); // '%'
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Ok(self.emit(TokenKind::Modifier, text, loc))
    }

    fn lex_word(&mut self) -> Result<Token> {
        let loc = self.loc();
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // A label definition is an identifier immediately followed by ':'
        // with no intervening whitespace.
        if self.peek() == Some(':') {
            self.advance();
            return Ok(self.emit(TokenKind::LabelDef, text, loc));
        }

        if let Some(reg) = mc::register::lookup_int(&text).or_else(|| mc::register::lookup_fp(&text)) {
            return Ok(self.emit(TokenKind::Register(reg.0), text, loc));
        }

        if mc::OPCODES.lookup(&text).is_some() || crate::pseudo::is_pseudo_mnemonic(&text) {
            return Ok(self.emit(TokenKind::Instruction, text, loc));
        }

        Ok(self.emit(TokenKind::Identifier, text, loc))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::lex(src).unwrap()
    }

    #[test]
    fn addi_line_tokenizes() {
        let tokens = lex("addi x1, x0, 5\n");
        let kinds: Vec<&TokenKind> = tokens.iter().map(|t| &t.kind).collect();
        assert!(matches!(kinds[0], TokenKind::Instruction));
        assert!(matches!(kinds[1], TokenKind::Register(1)));
        assert!(matches!(kinds[2], TokenKind::Comma));
        assert!(matches!(kinds[3], TokenKind::Register(0)));
        assert!(matches!(kinds[4], TokenKind::Comma));
        assert!(matches!(kinds[5], TokenKind::Integer(5)));
        assert!(matches!(kinds[6], TokenKind::Newline));
        assert!(matches!(kinds[7], TokenKind::Eof));
    }

    #[test]
    fn label_definition_requires_no_space_before_colon() {
        let tokens = lex("main:\n");
        assert!(matches!(tokens[0].kind, TokenKind::LabelDef));
        assert_eq!(tokens[0].lexeme, "main");
    }

    #[test]
    fn comment_is_not_a_token() {
        let tokens = lex("addi x1, x0, 5 # load five\n");
        assert!(tokens.iter().all(|t| !t.lexeme.contains('#')));
    }

    #[test]
    fn hex_and_negative_integers() {
        let tokens = lex("0x12345 -4\n");
        assert!(matches!(tokens[0].kind, TokenKind::Integer(0x12345)));
        assert!(matches!(tokens[1].kind, TokenKind::Integer(-4)));
    }

    #[test]
    fn modifier_and_directive_tokens() {
        let tokens = lex("%hi(msg) .global\n");
        assert!(matches!(tokens[0].kind, TokenKind::Modifier));
        assert_eq!(tokens[0].lexeme, "%hi");
        assert!(matches!(tokens[1].kind, TokenKind::LParen));
        assert!(matches!(tokens[2].kind, TokenKind::Identifier));
        assert!(matches!(tokens[4].kind, TokenKind::Directive));
    }

    #[test]
    fn unrecognized_character_is_lexical_error() {
        let result = Lexer::lex("addi x1, x0, 5 $\n");
        assert!(result.is_err());
    }
}
