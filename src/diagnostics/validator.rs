use once_cell::sync::Lazy;
use tracing::warn;

use crate::resolve::{normalize_signature, signature_text};
use crate::token::{
    is_end_statement, is_execution_marker, is_keyword_context, is_statement_position, Span, Token,
    TokenKind, DECLARATION_BLOCK_KEYWORDS, LOOP_TERMINATOR_KEYWORDS, TYPE_KEYWORDS,
};
use crate::util::fast_map::{set_of, FastHashSet};

use super::Diagnostic;

// Keep the finding volume sane on badly broken files.
const MAX_DIAGNOSTICS: usize = 200;

/// Structures that must reach an explicit terminator before the next scope
/// boundary. Procedures and routines are deliberately absent: they close
/// implicitly. MODULE is context-dependent and handled separately.
static REQUIRES_TERMINATOR: Lazy<FastHashSet<&'static str>> = Lazy::new(|| {
    set_of(&[
        "IF", "LOOP", "CASE", "EXECUTE", "BEGIN", "ACCEPT", "GROUP", "QUEUE", "RECORD", "FILE",
        "VIEW", "JOIN", "CLASS", "INTERFACE", "MAP", "ITEMIZE", "WINDOW", "APPLICATION", "REPORT",
        "SHEET", "TAB", "MENUBAR", "MENU", "TOOLBAR", "OPTION", "OLE",
    ])
});

#[derive(Debug)]
struct Frame {
    id: usize,
    upper: String,
    saw_of: bool,
    has_driver: bool,
    has_record: bool,
}

#[derive(Debug)]
struct DeclInfo {
    qualified_name: String,
    signature: String,
    return_type: String,
    span: Span,
}

#[derive(Debug)]
struct ImplInfo {
    name: String,
    start: usize,
    end: usize,
}

/// Strict structural validation. This is an independent stack-based re-scan
/// of the token stream, not a walk of the builder's tree: the builder is
/// lenient by contract, so the same input is checked through a second,
/// simpler mechanism. Reports every violation found; never stops early.
pub fn validate(tokens: &[Token], source: &str) -> Vec<Diagnostic> {
    let mut v = Validator {
        tokens,
        source,
        stack: Vec::new(),
        consumed: FastHashSet::default(),
        declarations: Vec::new(),
        implementations: Vec::new(),
        out: Vec::new(),
    };
    v.run();
    v.out
}

struct Validator<'a> {
    tokens: &'a [Token],
    source: &'a str,
    stack: Vec<Frame>,
    consumed: FastHashSet<usize>,
    declarations: Vec<DeclInfo>,
    implementations: Vec<ImplInfo>,
    out: Vec<Diagnostic>,
}

impl<'a> Validator<'a> {
    fn run(&mut self) {
        for i in 0..self.tokens.len() {
            let tok = &self.tokens[i];
            if is_end_statement(tok) {
                self.on_end(i);
                continue;
            }
            if is_execution_marker(tok) {
                self.flush_boundary();
                continue;
            }
            match tok.kind {
                TokenKind::StructureOpen | TokenKind::WindowElement => self.on_open(i),
                TokenKind::Keyword => self.on_keyword(i),
                TokenKind::Procedure => self.on_procedure(i),
                TokenKind::Routine => {
                    if self.keyword_context(i) {
                        self.flush_boundary();
                    }
                }
                TokenKind::Directive => self.on_directive(i),
                TokenKind::Function | TokenKind::Identifier | TokenKind::Label => {
                    if self.in_declaration_block()
                        && self.leads_line(i)
                        && self.followed_by_paren(i)
                    {
                        self.record_declaration(i, i);
                    }
                }
                _ => {}
            }
        }
        self.flush_boundary();
        self.check_return_consistency();
        if self.out.len() > MAX_DIAGNOSTICS {
            warn!(limit = MAX_DIAGNOSTICS, "diagnostic limit reached; truncating");
            self.out.truncate(MAX_DIAGNOSTICS);
        }
    }

    // ---- structural rules ----

    fn on_open(&mut self, i: usize) {
        if !self.keyword_context(i) || !is_statement_position(self.tokens, i) {
            return;
        }
        if let Some(term) = self.inline_terminator(i) {
            self.consumed.insert(term);
            return;
        }
        let tok = &self.tokens[i];
        let upper = tok.upper();
        if upper == "RECORD" {
            if let Some(file) = self.stack.iter_mut().rev().find(|f| f.upper == "FILE") {
                file.has_record = true;
            }
        }
        if upper == "EXECUTE" {
            if let Some(next) = self.tokens.get(i + 1) {
                if next.line == tok.line && next.kind == TokenKind::String {
                    self.out.push(Diagnostic::warning(
                        next.span(),
                        "EXECUTE controlling expression should be numeric, not a string literal",
                    ));
                }
            }
        }
        let has_driver = upper == "FILE" && self.same_line_attribute(i, "DRIVER");
        self.stack.push(Frame {
            id: i,
            upper,
            saw_of: false,
            has_driver,
            has_record: false,
        });
    }

    fn on_end(&mut self, i: usize) {
        if self.consumed.contains(&i) {
            return;
        }
        if let Some(frame) = self.stack.pop() {
            self.check_file_frame(&frame);
        }
    }

    fn on_keyword(&mut self, i: usize) {
        let upper = self.tokens[i].upper();
        if LOOP_TERMINATOR_KEYWORDS.contains(upper.as_str()) {
            self.on_loop_terminator(i);
            return;
        }
        match upper.as_str() {
            "OF" => {
                if let Some(case) = self.stack.iter_mut().rev().find(|f| f.upper == "CASE") {
                    case.saw_of = true;
                }
            }
            "OROF" => {
                let missing_of = self
                    .stack
                    .iter()
                    .rev()
                    .find(|f| f.upper == "CASE")
                    .is_some_and(|case| !case.saw_of);
                if missing_of {
                    self.out.push(Diagnostic::error(
                        self.tokens[i].span(),
                        "OROF without a preceding OF in CASE structure",
                    ));
                }
            }
            _ => {}
        }
    }

    fn on_loop_terminator(&mut self, i: usize) {
        let Some(pos) = self.stack.iter().rposition(|f| f.upper == "LOOP") else {
            return;
        };
        if self.tokens[self.stack[pos].id].line == self.tokens[i].line {
            return; // the loop's own leading condition
        }
        let closed = self.stack.split_off(pos);
        for frame in &closed {
            self.check_file_frame(frame);
        }
    }

    fn on_procedure(&mut self, i: usize) {
        if !self.keyword_context(i) {
            return;
        }
        if self.in_declaration_block() {
            if let Some(name_idx) = self.name_token_before(i) {
                self.record_declaration(name_idx, i);
            }
            return;
        }
        self.flush_boundary();
        let name = self.qualified_name_before(i).unwrap_or_default();
        if let Some(prev) = self.implementations.last_mut() {
            if prev.end == usize::MAX {
                prev.end = i;
            }
        }
        self.implementations.push(ImplInfo {
            name,
            start: i,
            end: usize::MAX,
        });
    }

    fn on_directive(&mut self, i: usize) {
        let upper = self.tokens[i].upper();
        if upper != "OMIT" && upper != "COMPILE" {
            return;
        }
        let Some(terminator) = self.first_string_argument(i) else {
            return;
        };
        let open_line = self.tokens[i].line as usize;
        let needle = terminator.to_ascii_lowercase();
        let closed = self
            .source
            .lines()
            .skip(open_line + 1)
            .any(|l| l.to_ascii_lowercase().contains(&needle));
        if !closed {
            self.out.push(Diagnostic::error(
                self.tokens[i].span(),
                format!("{upper}('{terminator}') block not terminated with terminator string"),
            ));
        }
    }

    /// Scope boundary (execution marker, routine, or implementation start):
    /// everything still on the stack that needs a terminator is reported.
    fn flush_boundary(&mut self) {
        let frames = std::mem::take(&mut self.stack);
        for (pos, frame) in frames.iter().enumerate() {
            let required = if frame.upper == "MODULE" {
                // MODULE needs END when it lists forward declarations inside
                // a MAP; under CLASS it is an attribute-style block.
                pos > 0 && frames[pos - 1].upper == "MAP"
            } else {
                REQUIRES_TERMINATOR.contains(frame.upper.as_str())
            };
            if required {
                self.out.push(Diagnostic::error(
                    self.tokens[frame.id].span(),
                    format!("{} structure is not terminated", frame.upper),
                ));
            }
        }
    }

    fn check_file_frame(&mut self, frame: &Frame) {
        if frame.upper != "FILE" {
            return;
        }
        let span = self.tokens[frame.id].span();
        if !frame.has_driver {
            self.out
                .push(Diagnostic::error(span, "FILE structure missing DRIVER attribute"));
        }
        if !frame.has_record {
            self.out
                .push(Diagnostic::error(span, "FILE structure missing RECORD structure"));
        }
    }

    // ---- declaration/implementation return consistency ----

    fn record_declaration(&mut self, name_idx: usize, decl_idx: usize) {
        let name = self.tokens[name_idx].text.clone();
        let qualified_name = match self.enclosing_class_label() {
            Some(class) => format!("{class}.{name}"),
            None => name,
        };
        let signature = signature_text(self.tokens, decl_idx);
        let return_type = self.return_type_after(decl_idx);
        self.declarations.push(DeclInfo {
            qualified_name,
            signature,
            return_type,
            span: self.tokens[name_idx].span(),
        });
    }

    fn check_return_consistency(&mut self) {
        for decl in &self.declarations {
            if decl.return_type.is_empty() {
                continue;
            }
            let decl_sig = normalize_signature(&decl.signature);
            let matching: Vec<&ImplInfo> = self
                .implementations
                .iter()
                .filter(|im| im.name.eq_ignore_ascii_case(&decl.qualified_name))
                .collect();
            let chosen = matching
                .iter()
                .find(|im| normalize_signature(&signature_text(self.tokens, im.start)) == decl_sig)
                .or_else(|| matching.first());
            let Some(im) = chosen else { continue };
            let end = im.end.min(self.tokens.len());
            let mut returns = 0usize;
            let mut with_value = 0usize;
            for j in im.start..end {
                let tok = &self.tokens[j];
                if tok.kind == TokenKind::Keyword && tok.text_eq("RETURN") {
                    returns += 1;
                    let has_value = self.tokens.get(j + 1).is_some_and(|n| {
                        n.line == tok.line
                            && n.kind != TokenKind::Comment
                            && !is_end_statement(n)
                    });
                    if has_value {
                        with_value += 1;
                    }
                }
            }
            if returns == 0 {
                self.out.push(Diagnostic::error(
                    decl.span,
                    format!(
                        "Declaration of '{}' specifies return type {} but its implementation has no RETURN statement",
                        decl.qualified_name, decl.return_type
                    ),
                ));
            } else if with_value == 0 {
                self.out.push(Diagnostic::error(
                    decl.span,
                    format!(
                        "Declaration of '{}' specifies return type {} but its RETURN statements return no value",
                        decl.qualified_name, decl.return_type
                    ),
                ));
            }
        }
    }

    // ---- token helpers (the validator keeps its own copies by design) ----

    fn keyword_context(&self, i: usize) -> bool {
        let prev = i.checked_sub(1).map(|j| &self.tokens[j]);
        is_keyword_context(&self.tokens[i], prev)
    }

    fn leads_line(&self, i: usize) -> bool {
        i == 0 || self.tokens[i - 1].line != self.tokens[i].line
    }

    fn followed_by_paren(&self, i: usize) -> bool {
        self.tokens
            .get(i + 1)
            .is_some_and(|t| t.line == self.tokens[i].line && t.text == "(")
    }

    fn in_declaration_block(&self) -> bool {
        self.stack
            .iter()
            .any(|f| DECLARATION_BLOCK_KEYWORDS.contains(f.upper.as_str()))
    }

    fn enclosing_class_label(&self) -> Option<String> {
        self.stack
            .iter()
            .rev()
            .find(|f| f.upper == "CLASS")
            .and_then(|f| self.label_before(f.id))
    }

    fn label_before(&self, i: usize) -> Option<String> {
        let line = self.tokens[i].line;
        let mut j = i;
        while j > 0 && self.tokens[j - 1].line == line {
            j -= 1;
            if self.tokens[j].kind == TokenKind::Label {
                return Some(self.tokens[j].text.clone());
            }
        }
        None
    }

    fn inline_terminator(&self, i: usize) -> Option<usize> {
        let line = self.tokens[i].line;
        for j in i + 1..self.tokens.len() {
            let tok = &self.tokens[j];
            if tok.line != line {
                return None;
            }
            if is_end_statement(tok) {
                return Some(j);
            }
            if matches!(
                tok.kind,
                TokenKind::StructureOpen
                    | TokenKind::WindowElement
                    | TokenKind::Procedure
                    | TokenKind::Routine
            ) {
                return None;
            }
        }
        None
    }

    fn same_line_attribute(&self, i: usize, attr: &str) -> bool {
        let line = self.tokens[i].line;
        self.tokens[i + 1..]
            .iter()
            .take_while(|t| t.line == line)
            .any(|t| {
                matches!(t.kind, TokenKind::Identifier | TokenKind::Function) && t.text_eq(attr)
            })
    }

    fn first_string_argument(&self, i: usize) -> Option<String> {
        let line = self.tokens[i].line;
        if self.tokens.get(i + 1).map(|t| t.text.as_str()) != Some("(") {
            return None;
        }
        self.tokens[i + 2..]
            .iter()
            .take_while(|t| t.line == line && t.text != ")")
            .find(|t| t.kind == TokenKind::String)
            .map(|t| t.text.clone())
    }

    fn name_token_before(&self, i: usize) -> Option<usize> {
        let line = self.tokens[i].line;
        let mut j = i;
        while j > 0 && self.tokens[j - 1].line == line {
            j -= 1;
            if matches!(
                self.tokens[j].kind,
                TokenKind::Label | TokenKind::Identifier | TokenKind::Variable | TokenKind::Function
            ) {
                return Some(j);
            }
            if !(self.tokens[j].kind == TokenKind::Operator && self.tokens[j].text == ".") {
                return None;
            }
        }
        None
    }

    fn qualified_name_before(&self, i: usize) -> Option<String> {
        let line = self.tokens[i].line;
        let mut parts: Vec<&str> = Vec::new();
        let mut j = i;
        while j > 0 {
            let prev = &self.tokens[j - 1];
            if prev.line != line {
                break;
            }
            let joinable = matches!(
                prev.kind,
                TokenKind::Label | TokenKind::Identifier | TokenKind::Variable | TokenKind::Function
            ) || (prev.kind == TokenKind::Operator && prev.text == ".");
            if !joinable {
                break;
            }
            parts.push(&prev.text);
            j -= 1;
        }
        if parts.is_empty() {
            return None;
        }
        parts.reverse();
        Some(parts.concat())
    }

    /// Return type after the closing paren of a declaration: the first
    /// comma-separated element when it reads as a data type.
    fn return_type_after(&self, i: usize) -> String {
        let line = self.tokens[i].line;
        let mut depth = 0i32;
        let mut saw_parens = false;
        let mut j = i + 1;
        while j < self.tokens.len() && self.tokens[j].line == line {
            match self.tokens[j].text.as_str() {
                "(" => {
                    depth += 1;
                    saw_parens = true;
                }
                ")" => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            j += 1;
        }
        if !saw_parens {
            return String::new();
        }
        // Expect `,TYPE` directly after the parameter list.
        let Some(comma) = self.tokens.get(j + 1) else {
            return String::new();
        };
        if comma.line != line || comma.text != "," {
            return String::new();
        }
        match self.tokens.get(j + 2) {
            Some(star) if star.text == "*" => self
                .tokens
                .get(j + 3)
                .filter(|t| TYPE_KEYWORDS.contains(t.upper().as_str()))
                .map(|t| format!("*{}", t.upper()))
                .unwrap_or_default(),
            Some(t) if TYPE_KEYWORDS.contains(t.upper().as_str()) => t.upper(),
            _ => String::new(),
        }
    }
}
