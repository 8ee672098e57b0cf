use tracing::{debug, warn};

use crate::token::{
    is_keyword_context, is_statement_position, SubKind, Token, TokenId, TokenKind,
    DECLARATION_BLOCK_KEYWORDS, FIELD_BEARING_KEYWORDS, LOOP_TERMINATOR_KEYWORDS,
};
use crate::util::fast_map::FastHashSet;

use super::DocumentMap;

// Safety valve: a degenerate file must not grow unbounded child lists.
const MAX_CHILDREN: usize = 10_000;
// Bounded forward scan for structure attributes (PRE, inline terminators).
const MAX_ATTRIBUTE_SCAN: usize = 64;

/// Single-pass structure builder. Three explicit stacks plus a declaration
/// depth counter; the stacks are threaded through one dispatcher so the
/// builder stays unit-testable on token slices. It never fails: malformed
/// input degrades to a best-effort tree that the diagnostic validator then
/// reports on.
pub struct StructureBuilder<'a> {
    tokens: Vec<Token>,
    // Raw source lines; OMIT/COMPILE terminator strings match per physical
    // line, not per token.
    source_lines: Vec<&'a str>,
    open_structures: Vec<TokenId>,
    open_procedures: Vec<TokenId>,
    open_routines: Vec<TokenId>,
    declaration_depth: usize,
    consumed_terminators: FastHashSet<TokenId>,
    first_execution_marker: Option<TokenId>,
    global_variables: Vec<TokenId>,
    conditional_ranges: Vec<(u32, u32)>,
    pending_conditionals: Vec<(TokenId, String)>,
    seen_program: bool,
}

impl<'a> StructureBuilder<'a> {
    pub fn build(tokens: Vec<Token>, source: &'a str) -> DocumentMap {
        let mut b = StructureBuilder {
            tokens,
            source_lines: source.lines().collect(),
            open_structures: Vec::new(),
            open_procedures: Vec::new(),
            open_routines: Vec::new(),
            declaration_depth: 0,
            consumed_terminators: FastHashSet::default(),
            first_execution_marker: None,
            global_variables: Vec::new(),
            conditional_ranges: Vec::new(),
            pending_conditionals: Vec::new(),
            seen_program: false,
        };
        b.run();
        DocumentMap::from_parts(
            b.tokens,
            b.first_execution_marker,
            b.global_variables,
            b.conditional_ranges,
        )
    }

    fn run(&mut self) {
        for i in 0..self.tokens.len() {
            match self.tokens[i].kind {
                TokenKind::StructureOpen | TokenKind::WindowElement => self.on_structure_open(i),
                TokenKind::EndStatement => self.on_end(i),
                TokenKind::Keyword => {
                    if LOOP_TERMINATOR_KEYWORDS.contains(self.tokens[i].upper().as_str()) {
                        self.on_loop_terminator(i);
                    }
                }
                TokenKind::Procedure => self.on_procedure(i),
                TokenKind::Routine => self.on_routine(i),
                TokenKind::ExecutionMarker => self.on_execution_marker(i),
                TokenKind::Label => self.on_label(i),
                TokenKind::Directive => self.on_directive(i),
                TokenKind::Identifier | TokenKind::Function => {
                    if self.declaration_depth > 0 && self.leads_line(i) && self.followed_by_paren(i)
                    {
                        self.on_declaration_name(i);
                    }
                }
                _ => {}
            }
        }
        self.finish();
    }

    // ---- dispatch handlers ----

    fn on_structure_open(&mut self, i: usize) {
        if !self.keyword_context(i) || !is_statement_position(&self.tokens, i) {
            return;
        }
        let line = self.tokens[i].line;
        let upper = self.tokens[i].upper();

        // MODULE('other.clw') carries a file reference.
        if upper == "MODULE" {
            if let Some(file) = self.first_string_argument(i) {
                self.tokens[i].referenced_file = Some(file);
            }
        }

        if let Some(term) = self.inline_terminator(i) {
            // Terminates on its own line: no fold, cannot mis-nest, no push.
            self.tokens[i].closing_line = Some(line);
            self.tokens[i].sub_kind = Some(SubKind::Structure);
            self.consumed_terminators.insert(term);
            if term > i + 1 && matches!(upper.as_str(), "IF" | "LOOP" | "CASE" | "EXECUTE") {
                self.tokens[i].single_line_with_continuation = true;
            }
            return;
        }

        let parent = self.current_parent();
        self.link_parent(i, parent);
        self.bind_preceding_label(i);
        self.tokens[i].sub_kind = Some(if upper == "CLASS" {
            SubKind::Class
        } else {
            SubKind::Structure
        });
        if let Some(prefix) = self.scan_prefix_attribute(i) {
            self.tokens[i].structure_prefix = Some(prefix);
        }
        if DECLARATION_BLOCK_KEYWORDS.contains(upper.as_str()) {
            self.declaration_depth += 1;
        }
        self.open_structures.push(i);
    }

    fn on_end(&mut self, i: usize) {
        if self.consumed_terminators.contains(&i) {
            return;
        }
        match self.open_structures.pop() {
            Some(top) => self.close_structure(top, self.tokens[i].line),
            None => {
                // Stray END (e.g. after RETURN at the end of a procedure
                // body) is consumed silently; procedures take no terminator.
                debug!(line = self.tokens[i].line, "stray end statement ignored");
            }
        }
    }

    fn on_loop_terminator(&mut self, i: usize) {
        let Some(pos) = self
            .open_structures
            .iter()
            .rposition(|&id| self.tokens[id].text_eq("LOOP"))
        else {
            return;
        };
        let loop_id = self.open_structures[pos];
        if self.tokens[loop_id].line == self.tokens[i].line {
            // The loop's own leading condition (LOOP UNTIL x / LOOP WHILE x).
            return;
        }
        // Terminator: close every frame down to and including the innermost
        // open loop.
        let line = self.tokens[i].line;
        while let Some(top) = self.open_structures.pop() {
            self.close_structure(top, line);
            if top == loop_id {
                break;
            }
        }
    }

    fn on_procedure(&mut self, i: usize) {
        if !self.keyword_context(i) {
            return;
        }
        let line = self.tokens[i].line;
        let name = self.qualified_name_before(i);

        if self.declaration_depth > 0 {
            let Some(block) = self.enclosing_declaration_block() else {
                return;
            };
            let sub = match self.tokens[block].upper().as_str() {
                "CLASS" => SubKind::MethodDeclaration,
                "INTERFACE" => SubKind::InterfaceMethod,
                _ => SubKind::MapProcedure, // MAP or MODULE
            };
            self.tokens[i].sub_kind = Some(sub);
            self.tokens[i].label = name;
            self.link_parent(i, Some(block));
            return;
        }

        // A new implementation closes whatever is still open below it.
        let boundary = line.saturating_sub(1).max(self.open_procedure_line());
        self.close_open_routines(boundary);
        self.close_structures_down_to(0, boundary);
        if let Some(prev) = self.open_procedures.pop() {
            self.tokens[prev].closing_line = Some(boundary);
        }

        let sub = match &name {
            Some(n) if n.contains('.') => SubKind::MethodImplementation,
            _ if self.seen_program && self.open_procedures.is_empty() => SubKind::GlobalProcedure,
            _ => SubKind::Procedure,
        };
        self.tokens[i].sub_kind = Some(sub);
        self.tokens[i].label = name;
        self.open_procedures.push(i);
    }

    fn on_routine(&mut self, i: usize) {
        if !self.keyword_context(i) {
            return;
        }
        let line = self.tokens[i].line;
        let boundary = line.saturating_sub(1).max(self.open_procedure_line());
        // Routines never nest: a new one closes the previous, along with any
        // structure left open inside the procedure body.
        let min_id = self
            .open_procedures
            .last()
            .map(|&p| p + 1)
            .unwrap_or(0);
        self.close_structures_down_to(min_id, boundary);
        if let Some(prev) = self.open_routines.pop() {
            self.tokens[prev].closing_line = Some(boundary);
        }
        self.tokens[i].sub_kind = Some(SubKind::Routine);
        self.tokens[i].label = self.qualified_name_before(i);
        let parent = self.open_procedures.last().copied();
        self.link_parent(i, parent);
        self.open_routines.push(i);
    }

    fn on_execution_marker(&mut self, i: usize) {
        let line = self.tokens[i].line;
        let is_data = self.tokens[i].text_eq("DATA");
        let target = self
            .open_routines
            .last()
            .copied()
            .or_else(|| self.open_procedures.last().copied());
        if is_data {
            if let Some(t) = target {
                self.tokens[t].has_local_data = true;
            }
            return;
        }
        if let Some(t) = target {
            self.tokens[t].execution_marker_line = Some(line);
        }
        if self.first_execution_marker.is_none() {
            self.first_execution_marker = Some(i);
        }
    }

    fn on_label(&mut self, i: usize) {
        let tok = &self.tokens[i];
        // Reserved words that naive lexing files as labels when they start in
        // column 0.
        if tok.text_eq("CODE") || tok.text_eq("DATA") {
            self.on_execution_marker(i);
            return;
        }
        if tok.text_eq("END") {
            self.on_end(i);
            return;
        }
        self.tokens[i].label = Some(self.tokens[i].text.clone());
        // A label naming a structure, procedure, or routine is bound by that
        // token's own handler.
        if self.names_following_declaration(i) {
            return;
        }
        if self.declaration_depth > 0 && self.followed_by_paren(i) {
            self.on_declaration_name(i);
            return;
        }
        if let Some(&top) = self.open_structures.last() {
            if FIELD_BEARING_KEYWORDS.contains(self.tokens[top].upper().as_str())
                || self.tokens[top].kind == TokenKind::WindowElement
            {
                self.link_parent(i, Some(top));
                if let Some(prefix) = self.inherited_prefix(top) {
                    self.tokens[i].structure_prefix = Some(prefix);
                }
                return;
            }
        }
        if self.open_procedures.is_empty()
            && self.open_routines.is_empty()
            && self.open_structures.is_empty()
            && self.declaration_depth == 0
            && self.first_execution_marker.is_none()
        {
            if self.starts_data_declaration(i) {
                self.global_variables.push(i);
            }
            return;
        }
        // Local declaration before CODE marks the scope as carrying data.
        let scope = self
            .open_routines
            .last()
            .copied()
            .or_else(|| self.open_procedures.last().copied());
        if let Some(scope) = scope {
            if self.tokens[scope].execution_marker_line.is_none() {
                self.tokens[scope].has_local_data = true;
                self.link_parent(i, Some(scope));
            }
        }
    }

    fn on_directive(&mut self, i: usize) {
        let upper = self.tokens[i].upper();
        match upper.as_str() {
            "OMIT" | "COMPILE" => {
                if let Some(term) = self.first_string_argument(i) {
                    self.pending_conditionals.push((i, term));
                } else {
                    warn!(line = self.tokens[i].line, directive = %upper, "conditional-compilation directive without terminator string");
                }
            }
            "INCLUDE" | "MEMBER" => {
                if let Some(file) = self.first_string_argument(i) {
                    self.tokens[i].referenced_file = Some(file);
                }
            }
            "PROGRAM" => self.seen_program = true,
            _ => {}
        }
    }

    /// Declaration-looking name inside an open MAP/CLASS/INTERFACE/MODULE
    /// block, written without a PROCEDURE keyword: `Foo(LONG x)`.
    fn on_declaration_name(&mut self, i: usize) {
        let Some(block) = self.enclosing_declaration_block() else {
            return;
        };
        let sub = match self.tokens[block].upper().as_str() {
            "CLASS" => SubKind::MethodDeclaration,
            "INTERFACE" => SubKind::InterfaceMethod,
            _ => SubKind::MapProcedure,
        };
        self.tokens[i].sub_kind = Some(sub);
        self.tokens[i].label = Some(self.tokens[i].text.clone());
        self.link_parent(i, Some(block));
    }

    // ---- end-of-pass fixups ----

    fn finish(&mut self) {
        let last_line = self.tokens.last().map(|t| t.line).unwrap_or(0);
        let unclosed =
            self.open_structures.len() + self.open_procedures.len() + self.open_routines.len();
        if unclosed > 0 {
            // Normal while the user is mid-edit; the validator surfaces it.
            warn!(unclosed, last_line, "force-closing scopes open at end of input");
        }
        while let Some(id) = self.open_routines.pop() {
            self.tokens[id].closing_line = Some(last_line);
        }
        while let Some(id) = self.open_procedures.pop() {
            self.tokens[id].closing_line = Some(last_line);
        }
        while let Some(id) = self.open_structures.pop() {
            self.close_structure(id, last_line);
        }
        for (id, term) in std::mem::take(&mut self.pending_conditionals) {
            let open_line = self.tokens[id].line;
            let needle = term.to_ascii_lowercase();
            // First later physical line containing the terminator string; the
            // string may span several tokens, so the match is on source text.
            let closing = self
                .source_lines
                .iter()
                .enumerate()
                .skip(open_line as usize + 1)
                .find(|(_, l)| l.to_ascii_lowercase().contains(&needle))
                .map(|(idx, _)| idx as u32);
            let end = match closing {
                Some(end) => end,
                None => {
                    warn!(line = open_line, terminator = %term, "conditional block open at end of input");
                    last_line
                }
            };
            self.tokens[id].closing_line = Some(end);
            self.conditional_ranges.push((open_line, end));
        }
        self.compute_label_widths();
    }

    /// Widest label among a structure's direct fields, plus any column-0
    /// label sharing its opening line. Drives field alignment in the editor.
    fn compute_label_widths(&mut self) {
        for id in 0..self.tokens.len() {
            if self.tokens[id].children.is_empty() {
                continue;
            }
            let mut width = self
                .labels_on_line(self.tokens[id].line)
                .map(|t| t.text.chars().count() as u32)
                .max()
                .unwrap_or(0);
            for &child in &self.tokens[id].children {
                let child = &self.tokens[child];
                if child.kind == TokenKind::Label {
                    width = width.max(child.text.chars().count() as u32);
                }
            }
            self.tokens[id].max_label_width = width;
        }
    }

    fn labels_on_line(&self, line: u32) -> impl Iterator<Item = &Token> {
        // Linear over the token list is fine here: called once per parent at
        // end of pass.
        self.tokens
            .iter()
            .filter(move |t| t.line == line && t.kind == TokenKind::Label)
    }

    // ---- shared mechanics ----

    fn close_structure(&mut self, id: TokenId, line: u32) {
        self.tokens[id].closing_line = Some(line.max(self.tokens[id].line));
        if DECLARATION_BLOCK_KEYWORDS.contains(self.tokens[id].upper().as_str()) {
            self.declaration_depth = self.declaration_depth.saturating_sub(1);
        }
    }

    fn close_open_routines(&mut self, line: u32) {
        while let Some(id) = self.open_routines.pop() {
            self.tokens[id].closing_line = Some(line);
        }
    }

    /// Pop and close every open structure with id above `min_id`.
    fn close_structures_down_to(&mut self, min_id: TokenId, line: u32) {
        while let Some(&top) = self.open_structures.last() {
            if top < min_id {
                break;
            }
            self.open_structures.pop();
            self.close_structure(top, line);
        }
    }

    fn open_procedure_line(&self) -> u32 {
        self.open_procedures
            .last()
            .map(|&id| self.tokens[id].line)
            .unwrap_or(0)
    }

    /// Structure stack takes priority over routines, routines over
    /// procedures.
    fn current_parent(&self) -> Option<TokenId> {
        self.open_structures
            .last()
            .or_else(|| self.open_routines.last())
            .or_else(|| self.open_procedures.last())
            .copied()
    }

    fn link_parent(&mut self, child: TokenId, parent: Option<TokenId>) {
        let Some(parent) = parent else { return };
        self.tokens[child].parent = Some(parent);
        if self.tokens[parent].children.len() >= MAX_CHILDREN {
            warn!(
                line = self.tokens[parent].line,
                "child list limit reached; dropping further links"
            );
            return;
        }
        self.tokens[parent].children.push(child);
    }

    fn keyword_context(&self, i: usize) -> bool {
        let prev = i.checked_sub(1).map(|j| &self.tokens[j]);
        is_keyword_context(&self.tokens[i], prev)
    }

    /// Does the structure opened at `i` terminate on its own physical line?
    /// Returns the id of the terminator it consumes.
    fn inline_terminator(&self, i: usize) -> Option<TokenId> {
        let line = self.tokens[i].line;
        for j in i + 1..self.tokens.len().min(i + 1 + MAX_ATTRIBUTE_SCAN) {
            let tok = &self.tokens[j];
            if tok.line != line {
                return None;
            }
            match tok.kind {
                TokenKind::EndStatement => return Some(j),
                TokenKind::StructureOpen | TokenKind::WindowElement | TokenKind::Procedure
                | TokenKind::Routine => return None,
                _ => {}
            }
        }
        None
    }

    /// Bind the column-0 label preceding a structure keyword on the same
    /// line, e.g. `MyQueue QUEUE,PRE(MQ)`.
    fn bind_preceding_label(&mut self, i: usize) {
        let line = self.tokens[i].line;
        let mut j = i;
        while j > 0 && self.tokens[j - 1].line == line {
            j -= 1;
            if self.tokens[j].kind == TokenKind::Label {
                self.tokens[i].label = Some(self.tokens[j].text.clone());
                return;
            }
        }
    }

    /// Backward scan across contiguous label/variable/member-dot tokens on
    /// the same line, joined into a qualified `Type.Method` name.
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

    /// Innermost open CLASS/MAP/INTERFACE/MODULE block.
    fn enclosing_declaration_block(&self) -> Option<TokenId> {
        self.open_structures
            .iter()
            .rev()
            .copied()
            .find(|&id| DECLARATION_BLOCK_KEYWORDS.contains(self.tokens[id].upper().as_str()))
    }

    /// PRE(Short) attribute within a bounded forward scan, stopping at the
    /// first terminator or nested structure.
    fn scan_prefix_attribute(&self, i: usize) -> Option<String> {
        for j in i + 1..self.tokens.len().min(i + 1 + MAX_ATTRIBUTE_SCAN) {
            let tok = &self.tokens[j];
            match tok.kind {
                TokenKind::EndStatement
                | TokenKind::StructureOpen
                | TokenKind::WindowElement
                | TokenKind::Procedure
                | TokenKind::Routine
                | TokenKind::ExecutionMarker
                | TokenKind::Label => return None,
                TokenKind::Identifier | TokenKind::Function if tok.text_eq("PRE") => {
                    if self.tokens.get(j + 1).is_some_and(|t| t.text == "(") {
                        return self.tokens.get(j + 2).and_then(|t| {
                            matches!(
                                t.kind,
                                TokenKind::Identifier | TokenKind::Variable | TokenKind::Function
                            )
                            .then(|| t.text.clone())
                        });
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Walk parent links upward until a prefix is found or the chain ends.
    fn inherited_prefix(&self, mut id: TokenId) -> Option<String> {
        loop {
            if let Some(prefix) = &self.tokens[id].structure_prefix {
                return Some(prefix.clone());
            }
            id = self.tokens[id].parent?;
        }
    }

    /// First string literal inside the parenthesized argument list directly
    /// following token `i`, e.g. OMIT('**END**') or MODULE('win.clw').
    fn first_string_argument(&self, i: usize) -> Option<String> {
        let line = self.tokens[i].line;
        let open = self.tokens.get(i + 1)?;
        if open.line != line || open.text != "(" {
            return None;
        }
        for j in i + 2..self.tokens.len().min(i + 2 + MAX_ATTRIBUTE_SCAN) {
            let tok = &self.tokens[j];
            if tok.line != line || tok.text == ")" {
                return None;
            }
            if tok.kind == TokenKind::String {
                return Some(tok.text.clone());
            }
        }
        None
    }

    fn leads_line(&self, i: usize) -> bool {
        i == 0 || self.tokens[i - 1].line != self.tokens[i].line
    }

    fn followed_by_paren(&self, i: usize) -> bool {
        self.tokens
            .get(i + 1)
            .is_some_and(|t| t.line == self.tokens[i].line && t.text == "(")
    }

    /// Is this label the name of a structure/procedure/routine declared later
    /// on the same line?
    fn names_following_declaration(&self, i: usize) -> bool {
        let line = self.tokens[i].line;
        for j in i + 1..self.tokens.len().min(i + 1 + MAX_ATTRIBUTE_SCAN) {
            let tok = &self.tokens[j];
            if tok.line != line {
                return false;
            }
            match tok.kind {
                TokenKind::StructureOpen
                | TokenKind::WindowElement
                | TokenKind::Procedure
                | TokenKind::Routine => return true,
                TokenKind::Operator if tok.text == "." => continue,
                TokenKind::Identifier | TokenKind::Variable | TokenKind::Function => continue,
                _ => return false,
            }
        }
        false
    }

    /// Label followed on the same line by something that reads like a data
    /// declaration (`x LONG`, `Name STRING(20)`).
    fn starts_data_declaration(&self, i: usize) -> bool {
        self.tokens.get(i + 1).is_some_and(|t| {
            t.line == self.tokens[i].line
                && matches!(
                    t.kind,
                    TokenKind::Keyword
                        | TokenKind::Identifier
                        | TokenKind::Variable
                        | TokenKind::Function
                )
        })
    }
}
