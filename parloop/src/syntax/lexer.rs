//! Hand-written scanner with Go's automatic semicolon insertion: a newline
//! terminates the statement when the previous token could end one.

use super::token::{Token, TokenKind};
use super::Span;

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Kind of the last emitted token, for semicolon insertion.
    last: Option<TokenKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub offset: u32,
    pub message: String,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Lexer<'a> {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            last: None,
        }
    }

    /// Tokenize the whole buffer, appending a final Eof token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, n: usize) -> u8 {
        self.bytes.get(self.pos + n).copied().unwrap_or(0)
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> LexError {
        LexError {
            offset: offset as u32,
            message: message.into(),
        }
    }

    /// Skip whitespace and comments; emit an inserted semicolon when a
    /// newline ends a statement.
    fn skip_trivia(&mut self) -> Result<Option<Token>, LexError> {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\n' => {
                    if self.last.map_or(false, TokenKind::ends_statement) {
                        let span = Span::new(self.pos as u32, self.pos as u32 + 1);
                        self.pos += 1;
                        return Ok(Some(Token::new(TokenKind::Semicolon, span)));
                    }
                    self.pos += 1;
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while self.pos < self.bytes.len() && self.peek() != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    let start = self.pos;
                    self.pos += 2;
                    let mut contains_newline = false;
                    loop {
                        if self.pos >= self.bytes.len() {
                            return Err(self.error(start, "unterminated comment"));
                        }
                        if self.peek() == b'\n' {
                            contains_newline = true;
                        }
                        if self.peek() == b'*' && self.peek_at(1) == b'/' {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                    // A general comment spanning lines acts like a newline.
                    if contains_newline && self.last.map_or(false, TokenKind::ends_statement) {
                        let span = Span::new(self.pos as u32, self.pos as u32);
                        return Ok(Some(Token::new(TokenKind::Semicolon, span)));
                    }
                }
                _ => return Ok(None),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        if let Some(semi) = self.skip_trivia()? {
            self.last = Some(TokenKind::Semicolon);
            return Ok(semi);
        }
        let start = self.pos;
        if self.pos >= self.bytes.len() {
            // Insert a semicolon before EOF as well, so unterminated final
            // lines still parse.
            if self.last.map_or(false, TokenKind::ends_statement) {
                self.last = Some(TokenKind::Semicolon);
                return Ok(Token::new(
                    TokenKind::Semicolon,
                    Span::new(start as u32, start as u32),
                ));
            }
            return Ok(Token::new(
                TokenKind::Eof,
                Span::new(start as u32, start as u32),
            ));
        }

        let kind = match self.peek() {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_ident(),
            b'0'..=b'9' => self.scan_number()?,
            b'.' if self.peek_at(1).is_ascii_digit() => self.scan_number()?,
            b'"' => self.scan_string()?,
            b'`' => self.scan_raw_string()?,
            b'\'' => self.scan_rune()?,
            _ if self.peek() >= 0x80 => self.scan_ident(),
            _ => self.scan_operator()?,
        };
        self.last = Some(kind);
        Ok(Token::new(kind, Span::new(start as u32, self.pos as u32)))
    }

    fn scan_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let b = self.peek();
            if b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80 {
                self.pos += 1;
            } else {
                break;
            }
        }
        TokenKind::keyword(&self.src[start..self.pos]).unwrap_or(TokenKind::Ident)
    }

    fn scan_number(&mut self) -> Result<TokenKind, LexError> {
        let mut kind = TokenKind::Int;
        if self.peek() == b'0' && matches!(self.peek_at(1), b'x' | b'X' | b'b' | b'B' | b'o' | b'O')
        {
            self.pos += 2;
            while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
                self.pos += 1;
            }
            return Ok(TokenKind::Int);
        }
        while self.peek().is_ascii_digit() || self.peek() == b'_' {
            self.pos += 1;
        }
        if self.peek() == b'.' && self.peek_at(1) != b'.' {
            kind = TokenKind::Float;
            self.pos += 1;
            while self.peek().is_ascii_digit() || self.peek() == b'_' {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), b'e' | b'E') {
            kind = TokenKind::Float;
            self.pos += 1;
            if matches!(self.peek(), b'+' | b'-') {
                self.pos += 1;
            }
            while self.peek().is_ascii_digit() {
                self.pos += 1;
            }
        }
        if self.peek() == b'i' {
            kind = TokenKind::Imag;
            self.pos += 1;
        }
        Ok(kind)
    }

    fn scan_string(&mut self) -> Result<TokenKind, LexError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                0 | b'\n' => return Err(self.error(start, "unterminated string literal")),
                b'\\' => self.pos += 2,
                b'"' => {
                    self.pos += 1;
                    return Ok(TokenKind::Str);
                }
                _ => self.pos += 1,
            }
        }
    }

    fn scan_raw_string(&mut self) -> Result<TokenKind, LexError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                0 => return Err(self.error(start, "unterminated raw string literal")),
                b'`' => {
                    self.pos += 1;
                    return Ok(TokenKind::Str);
                }
                _ => self.pos += 1,
            }
        }
    }

    fn scan_rune(&mut self) -> Result<TokenKind, LexError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                0 | b'\n' => return Err(self.error(start, "unterminated rune literal")),
                b'\\' => self.pos += 2,
                b'\'' => {
                    self.pos += 1;
                    return Ok(TokenKind::Rune);
                }
                _ => self.pos += 1,
            }
        }
    }

    fn scan_operator(&mut self) -> Result<TokenKind, LexError> {
        use TokenKind::*;
        let b = self.peek();
        let two = [b, self.peek_at(1)];
        let three = [b, self.peek_at(1), self.peek_at(2)];

        let (kind, len) = match three {
            [b'<', b'<', b'='] => (ShlAssign, 3),
            [b'>', b'>', b'='] => (ShrAssign, 3),
            [b'&', b'^', b'='] => (AndNotAssign, 3),
            [b'.', b'.', b'.'] => (Ellipsis, 3),
            _ => match two {
                [b'+', b'+'] => (Inc, 2),
                [b'-', b'-'] => (Dec, 2),
                [b'+', b'='] => (AddAssign, 2),
                [b'-', b'='] => (SubAssign, 2),
                [b'*', b'='] => (MulAssign, 2),
                [b'/', b'='] => (QuoAssign, 2),
                [b'%', b'='] => (RemAssign, 2),
                [b'&', b'&'] => (LogicAnd, 2),
                [b'&', b'^'] => (AndNot, 2),
                [b'&', b'='] => (AndAssign, 2),
                [b'|', b'|'] => (LogicOr, 2),
                [b'|', b'='] => (OrAssign, 2),
                [b'^', b'='] => (XorAssign, 2),
                [b'<', b'<'] => (Shl, 2),
                [b'<', b'='] => (Leq, 2),
                [b'<', b'-'] => (Arrow, 2),
                [b'>', b'>'] => (Shr, 2),
                [b'>', b'='] => (Geq, 2),
                [b'=', b'='] => (Eql, 2),
                [b'!', b'='] => (Neq, 2),
                [b':', b'='] => (Define, 2),
                _ => match b {
                    b'+' => (Add, 1),
                    b'-' => (Sub, 1),
                    b'*' => (Mul, 1),
                    b'/' => (Quo, 1),
                    b'%' => (Rem, 1),
                    b'&' => (And, 1),
                    b'|' => (Or, 1),
                    b'^' => (Xor, 1),
                    b'<' => (Lss, 1),
                    b'>' => (Gtr, 1),
                    b'=' => (Assign, 1),
                    b'!' => (Not, 1),
                    b'~' => (Tilde, 1),
                    b'(' => (LParen, 1),
                    b')' => (RParen, 1),
                    b'[' => (LBracket, 1),
                    b']' => (RBracket, 1),
                    b'{' => (LBrace, 1),
                    b'}' => (RBrace, 1),
                    b',' => (Comma, 1),
                    b'.' => (Period, 1),
                    b';' => (Semicolon, 1),
                    b':' => (Colon, 1),
                    _ => {
                        return Err(self.error(
                            self.pos,
                            format!("unexpected character {:?}", self.src[self.pos..].chars().next().unwrap_or('\0')),
                        ))
                    }
                },
            },
        };
        self.pos += len;
        Ok(kind)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn scans_for_header() {
        use TokenKind::*;
        assert_eq!(
            kinds("for i := 0; i < 10; i++ {"),
            vec![
                For, Ident, Define, Int, Semicolon, Ident, Lss, Int, Semicolon, Ident, Inc,
                LBrace, Eof
            ]
        );
    }

    #[test]
    fn inserts_semicolons_at_newlines() {
        use TokenKind::*;
        assert_eq!(
            kinds("x++\ny--\n"),
            vec![Ident, Inc, Semicolon, Ident, Dec, Semicolon, Eof]
        );
        // No insertion after a binary operator.
        assert_eq!(kinds("x +\ny"), vec![Ident, Add, Ident, Semicolon, Eof]);
    }

    #[test]
    fn comments_are_trivia() {
        use TokenKind::*;
        assert_eq!(
            kinds("a // trailing\nb /* inline */ c"),
            vec![Ident, Semicolon, Ident, Ident, Semicolon, Eof]
        );
    }

    #[test]
    fn scans_composite_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("a &^= b <<= c ... <-"),
            vec![Ident, AndNotAssign, Ident, ShlAssign, Ident, Ellipsis, Arrow, Eof]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(Lexer::new("\"abc").tokenize().is_err());
    }
}
