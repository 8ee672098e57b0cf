use std::fmt;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::util::fast_map::{set_of, FastHashSet};

mod lexer;

pub use lexer::Tokenizer;

/// Index of a token inside its document's arena. Parent/child links are ids,
/// never references, so the annotated list stays a plain `Vec<Token>`.
pub type TokenId = usize;

/// 0-based line/column position, the coordinate system editors speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: u32,
    #[serde(rename = "character")]
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Span covering one token's lexeme on a single line.
    pub fn of_token(tok: &Token) -> Self {
        let mut len = tok.text.chars().count() as u32;
        // String tokens store their content without the quote delimiters.
        if tok.kind == TokenKind::String {
            len += 2;
        }
        let start = Position::new(tok.line, tok.column);
        let end = Position::new(tok.line, tok.column + len);
        Self { start, end }
    }
}

/// Coarse lexical classification. Assigned once by the tokenizer and never
/// mutated; the structure builder refines the role through `sub_kind` and the
/// other annotations instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Number,
    String,
    Operator,
    Comment,
    Directive,
    Label,
    Variable,
    Function,
    StructureOpen,
    EndStatement,
    ExecutionMarker,
    Procedure,
    Routine,
    WindowElement,
}

/// Role refinement added by the structure builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubKind {
    Procedure,
    GlobalProcedure,
    MapProcedure,
    MethodDeclaration,
    MethodImplementation,
    InterfaceMethod,
    Routine,
    Class,
    Structure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub sub_kind: Option<SubKind>,
    pub text: String,
    pub line: u32,
    pub column: u32,
    // Annotations below are owned by the structure builder. Lexical fields
    // above never change after tokenization.
    pub closing_line: Option<u32>,
    pub label: Option<String>,
    pub parent: Option<TokenId>,
    pub children: Vec<TokenId>,
    pub structure_prefix: Option<String>,
    pub max_label_width: u32,
    pub has_local_data: bool,
    pub execution_marker_line: Option<u32>,
    pub referenced_file: Option<String>,
    pub single_line_with_continuation: bool,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind,
            sub_kind: None,
            text: text.into(),
            line,
            column,
            closing_line: None,
            label: None,
            parent: None,
            children: Vec::new(),
            structure_prefix: None,
            max_label_width: 0,
            has_local_data: false,
            execution_marker_line: None,
            referenced_file: None,
            single_line_with_continuation: false,
        }
    }

    /// Uppercased lexeme, the form all keyword comparisons use.
    pub fn upper(&self) -> String {
        self.text.to_ascii_uppercase()
    }

    pub fn text_eq(&self, word: &str) -> bool {
        self.text.eq_ignore_ascii_case(word)
    }

    pub fn span(&self) -> Span {
        Span::of_token(self)
    }
}

/// Keywords that open a nesting block structure.
pub static STRUCTURE_KEYWORDS: Lazy<FastHashSet<&'static str>> = Lazy::new(|| {
    set_of(&[
        "IF", "LOOP", "CASE", "EXECUTE", "BEGIN", "ACCEPT", "GROUP", "QUEUE", "RECORD", "FILE",
        "VIEW", "JOIN", "CLASS", "INTERFACE", "MAP", "MODULE", "ITEMIZE", "WINDOW", "APPLICATION",
        "REPORT", "DETAIL", "HEADER", "FOOTER", "FORM", "BREAK",
    ])
});

/// Window-family members that fold and carry fields but are not top-level
/// structures in their own right.
pub static WINDOW_ELEMENT_KEYWORDS: Lazy<FastHashSet<&'static str>> =
    Lazy::new(|| set_of(&["SHEET", "TAB", "MENUBAR", "MENU", "TOOLBAR", "OPTION", "OLE"]));

/// Structures whose direct children are named fields (column-0 labels).
pub static FIELD_BEARING_KEYWORDS: Lazy<FastHashSet<&'static str>> = Lazy::new(|| {
    set_of(&[
        "GROUP", "QUEUE", "RECORD", "FILE", "VIEW", "WINDOW", "APPLICATION", "REPORT", "DETAIL",
        "HEADER", "FOOTER", "FORM",
    ])
});

/// Block kinds whose body is a declaration list: PROCEDURE/FUNCTION inside
/// them declares, never implements.
pub static DECLARATION_BLOCK_KEYWORDS: Lazy<FastHashSet<&'static str>> =
    Lazy::new(|| set_of(&["CLASS", "MAP", "INTERFACE", "MODULE"]));

/// Condition keywords that either lead a LOOP's own condition or terminate it
/// from below.
pub static LOOP_TERMINATOR_KEYWORDS: Lazy<FastHashSet<&'static str>> =
    Lazy::new(|| set_of(&["UNTIL", "WHILE"]));

pub static PROCEDURE_KEYWORDS: Lazy<FastHashSet<&'static str>> =
    Lazy::new(|| set_of(&["PROCEDURE", "FUNCTION"]));

pub static DIRECTIVE_KEYWORDS: Lazy<FastHashSet<&'static str>> =
    Lazy::new(|| set_of(&["OMIT", "COMPILE", "INCLUDE", "MEMBER", "PROGRAM"]));

/// Simple data type keywords, used for declarations and overload signatures.
pub static TYPE_KEYWORDS: Lazy<FastHashSet<&'static str>> = Lazy::new(|| {
    set_of(&[
        "BYTE", "SHORT", "USHORT", "LONG", "ULONG", "SIGNED", "UNSIGNED", "SREAL", "REAL",
        "BFLOAT4", "BFLOAT8", "DECIMAL", "PDECIMAL", "STRING", "CSTRING", "PSTRING", "ASTRING",
        "DATE", "TIME", "ANY", "VARIANT",
    ])
});

/// Remaining reserved words that carry no structural role of their own.
pub static PLAIN_KEYWORDS: Lazy<FastHashSet<&'static str>> = Lazy::new(|| {
    set_of(&[
        "THEN", "ELSE", "ELSIF", "OF", "OROF", "ORELSE", "TO", "BY", "DO", "EXIT", "CYCLE",
        "RETURN", "GOTO", "AND", "OR", "NOT", "XOR", "NEW", "DISPOSE", "SELF", "PARENT", "TRUE",
        "FALSE", "CHOOSE", "TIMES",
    ])
});

/// END spelled as a column-0 word still terminates; naive lexing files it as
/// a label, so structural passes re-route through this check.
pub fn is_end_statement(tok: &Token) -> bool {
    tok.kind == TokenKind::EndStatement || (tok.kind == TokenKind::Label && tok.text_eq("END"))
}

/// CODE/DATA at column 0 is the same quirk for execution markers.
pub fn is_execution_marker(tok: &Token) -> bool {
    tok.kind == TokenKind::ExecutionMarker
        || (tok.kind == TokenKind::Label && (tok.text_eq("CODE") || tok.text_eq("DATA")))
}

/// A structural keyword only acts as one when it is not a colon- or
/// dot-qualified field suffix. The decision needs the preceding token, which
/// the lexer does not track, so it lives here as a pure function.
pub fn is_keyword_context(tok: &Token, prev: Option<&Token>) -> bool {
    match prev {
        Some(p) if p.line == tok.line && p.kind == TokenKind::Operator => {
            !(p.text == ":" || p.text == ".")
        }
        _ => true,
    }
}

/// A structural keyword opens a block only in statement position: first on
/// its line, or preceded solely by the declaring label. Anywhere else it is
/// an attribute or a parameter type (`CLASS,MODULE('x')`, `Foo(GROUP g)`).
pub fn is_statement_position(tokens: &[Token], i: usize) -> bool {
    let line = tokens[i].line;
    tokens[..i]
        .iter()
        .rev()
        .take_while(|t| t.line == line)
        .all(|t| t.kind == TokenKind::Label)
}
