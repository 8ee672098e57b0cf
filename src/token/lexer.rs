use tracing::warn;

use super::{
    Token, TokenKind, DIRECTIVE_KEYWORDS, LOOP_TERMINATOR_KEYWORDS, PLAIN_KEYWORDS,
    PROCEDURE_KEYWORDS, STRUCTURE_KEYWORDS, TYPE_KEYWORDS, WINDOW_ELEMENT_KEYWORDS,
};

const ASCII_DIGIT: u8 = 1 << 0;
const ASCII_IDENT_START: u8 = 1 << 1;
const ASCII_IDENT_CONT: u8 = 1 << 2;

const fn build_ascii_class() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let c = i as u8;
        if c >= b'0' && c <= b'9' {
            table[i] |= ASCII_DIGIT | ASCII_IDENT_CONT;
        }
        if (c >= b'a' && c <= b'z') || (c >= b'A' && c <= b'Z') || c == b'_' {
            table[i] |= ASCII_IDENT_START | ASCII_IDENT_CONT;
        }
        // Colon continues an identifier: qualified field references such as
        // File:Field are a single lexeme in this grammar.
        if c == b':' {
            table[i] |= ASCII_IDENT_CONT;
        }
        i += 1;
    }
    table
}

const ASCII_CLASS: [u8; 256] = build_ascii_class();

#[inline]
fn ascii_flags(c: char) -> u8 {
    if c.is_ascii() {
        ASCII_CLASS[c as usize]
    } else {
        0
    }
}

#[inline]
fn is_ident_start(c: char) -> bool {
    ascii_flags(c) & ASCII_IDENT_START != 0
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    ascii_flags(c) & ASCII_IDENT_CONT != 0
}

/// Hand-written scanner for column-sensitive 4GL source. One pass, one
/// character of look-ahead, and it never fails: broken input still yields a
/// best-effort token stream for the editor feedback loop.
pub struct Tokenizer {
    chars: Vec<char>,
    idx: usize,
    len: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
}

impl Tokenizer {
    pub fn tokenize(s: &str) -> Vec<Token> {
        let chars: Vec<char> = s.chars().collect();
        let mut t = Tokenizer {
            len: chars.len(),
            chars,
            idx: 0,
            line: 0,
            column: 0,
            tokens: Vec::with_capacity(s.len() / 4),
        };
        t.scan();
        t.tokens
    }

    fn eof(&self) -> bool {
        self.idx >= self.len
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn advance_char(&mut self) {
        if !self.eof() && self.chars[self.idx] == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        self.idx += 1;
    }

    fn push(&mut self, kind: TokenKind, text: String, line: u32, column: u32) {
        self.tokens.push(Token::new(kind, text, line, column));
    }

    fn scan(&mut self) {
        while !self.eof() {
            let c = self.chars[self.idx];
            if c.is_whitespace() {
                self.advance_char();
            } else if c == '!' {
                self.read_comment();
            } else if is_ident_start(c) {
                self.read_word();
            } else if c.is_ascii_digit() {
                self.read_number();
            } else if c == '\'' {
                self.read_string();
            } else if c == '.' {
                self.read_period();
            } else if is_operator_start(c) {
                self.read_operator();
            } else {
                warn!(line = self.line, column = self.column, ch = %c, "skipping unrecognized character");
                self.advance_char();
            }
        }
    }

    /// Full comment text (including the `!`) is kept so the folding pass can
    /// spot !REGION / !ENDREGION markers later.
    fn read_comment(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while !self.eof() && self.chars[self.idx] != '\n' {
            text.push(self.chars[self.idx]);
            self.advance_char();
        }
        self.push(TokenKind::Comment, text, line, column);
    }

    fn read_word(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while !self.eof() && is_ident_continue(self.chars[self.idx]) {
            text.push(self.chars[self.idx]);
            self.advance_char();
        }
        let kind = self.classify_word(&text, column);
        self.push(kind, text, line, column);
    }

    fn classify_word(&self, text: &str, column: u32) -> TokenKind {
        // Column 0 is label territory; reserved words landing there are
        // re-routed by the structure builder, not here.
        if column == 0 {
            return TokenKind::Label;
        }
        let upper = text.to_ascii_uppercase();
        let upper = upper.as_str();
        if STRUCTURE_KEYWORDS.contains(upper) {
            TokenKind::StructureOpen
        } else if WINDOW_ELEMENT_KEYWORDS.contains(upper) {
            TokenKind::WindowElement
        } else if PROCEDURE_KEYWORDS.contains(upper) {
            TokenKind::Procedure
        } else if upper == "ROUTINE" {
            TokenKind::Routine
        } else if upper == "CODE" || upper == "DATA" {
            TokenKind::ExecutionMarker
        } else if upper == "END" {
            TokenKind::EndStatement
        } else if DIRECTIVE_KEYWORDS.contains(upper) {
            TokenKind::Directive
        } else if TYPE_KEYWORDS.contains(upper)
            || PLAIN_KEYWORDS.contains(upper)
            || LOOP_TERMINATOR_KEYWORDS.contains(upper)
        {
            TokenKind::Keyword
        } else if text.contains(':') {
            TokenKind::Variable
        } else if self.peek() == Some('(') {
            TokenKind::Function
        } else {
            TokenKind::Identifier
        }
    }

    /// Maximal digit run with at most one interior dot. A trailing dot is
    /// left behind: that is the statement terminator, not a decimal point.
    fn read_number(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while !self.eof() {
            let c = self.chars[self.idx];
            if c.is_ascii_digit() {
                text.push(c);
                self.advance_char();
            } else if c == '.'
                && !text.contains('.')
                && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
            {
                text.push(c);
                self.advance_char();
            } else {
                break;
            }
        }
        self.push(TokenKind::Number, text, line, column);
    }

    /// Single-quoted, no escape mechanism (known simplification). An unclosed
    /// string is recovered at end of line instead of aborting the scan.
    fn read_string(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut content = String::new();
        self.advance_char(); // opening quote
        while !self.eof() {
            let c = self.chars[self.idx];
            if c == '\'' {
                self.advance_char();
                self.push(TokenKind::String, content, line, column);
                return;
            }
            if c == '\n' {
                break;
            }
            content.push(c);
            self.advance_char();
        }
        warn!(line, column, "string literal not closed; recovering at end of line");
        self.push(TokenKind::String, content, line, column);
    }

    /// `.` tightly bound between identifier characters is a member-access
    /// dot (Type.Method); anything else is a terminator candidate.
    fn read_period(&mut self) {
        let (line, column) = (self.line, self.column);
        let prev_is_ident = self
            .idx
            .checked_sub(1)
            .and_then(|i| self.chars.get(i).copied())
            .is_some_and(is_ident_continue);
        let next_is_ident = self.peek_at(1).is_some_and(is_ident_start);
        self.advance_char();
        if prev_is_ident && next_is_ident {
            self.push(TokenKind::Operator, ".".into(), line, column);
        } else {
            self.push(TokenKind::EndStatement, ".".into(), line, column);
        }
    }

    fn read_operator(&mut self) {
        let (line, column) = (self.line, self.column);
        let c = self.chars[self.idx];
        self.advance_char();
        let two = self.peek().map(|n| {
            let mut s = String::with_capacity(2);
            s.push(c);
            s.push(n);
            s
        });
        if let Some(two) = two {
            if matches!(
                two.as_str(),
                "<=" | ">=" | "<>" | "&=" | "+=" | "-=" | "*=" | "/=" | "^=" | "=>"
            ) {
                self.advance_char();
                self.push(TokenKind::Operator, two, line, column);
                return;
            }
        }
        self.push(TokenKind::Operator, c.to_string(), line, column);
    }
}

#[inline]
fn is_operator_start(c: char) -> bool {
    matches!(
        c,
        '(' | ')'
            | ','
            | ':'
            | ';'
            | '='
            | '+'
            | '-'
            | '*'
            | '/'
            | '<'
            | '>'
            | '&'
            | '|'
            | '^'
            | '~'
            | '?'
            | '@'
            | '#'
            | '$'
            | '%'
            | '['
            | ']'
            | '{'
            | '}'
    )
}
