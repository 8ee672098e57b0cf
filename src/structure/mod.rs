use crate::token::{SubKind, Token, TokenId, TokenKind};
use crate::util::fast_map::{map_with_capacity, FastHashMap};

mod builder;
#[cfg(test)]
mod builder_test;

pub use builder::StructureBuilder;

/// Annotated token arena plus the lookup indices the builder computes in its
/// single pass. Everything here is read-only after construction; the folding,
/// diagnostic, and resolver stages share it freely.
#[derive(Debug, Default)]
pub struct DocumentMap {
    tokens: Vec<Token>,
    line_index: FastHashMap<u32, Vec<TokenId>>,
    label_index: FastHashMap<String, Vec<TokenId>>,
    structure_index: FastHashMap<String, Vec<TokenId>>,
    first_execution_marker: Option<TokenId>,
    global_variables: Vec<TokenId>,
    conditional_ranges: Vec<(u32, u32)>,
    last_line: u32,
}

impl DocumentMap {
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token(&self, id: TokenId) -> &Token {
        &self.tokens[id]
    }

    /// Last line that carries any token at all.
    pub fn last_line(&self) -> u32 {
        self.last_line
    }

    pub fn tokens_on_line(&self, line: u32) -> &[TokenId] {
        self.line_index.get(&line).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tokens bound to `name` (labels, procedures, routines, structures),
    /// case-insensitive.
    pub fn find_by_label(&self, name: &str) -> &[TokenId] {
        self.label_index
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Open-block tokens of one structural keyword, uppercased ("MAP",
    /// "CLASS", "LOOP", ...), in source order.
    pub fn structures_of_kind(&self, keyword: &str) -> &[TokenId] {
        self.structure_index
            .get(&keyword.to_ascii_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All forward-declaration-list blocks.
    pub fn map_blocks(&self) -> &[TokenId] {
        self.structures_of_kind("MAP")
    }

    pub fn class_blocks(&self) -> &[TokenId] {
        self.structures_of_kind("CLASS")
    }

    /// Whether `line` falls inside a MAP block (inclusive of both the opening
    /// and closing lines).
    pub fn is_inside_map(&self, line: u32) -> bool {
        self.map_blocks().iter().any(|&id| {
            let t = &self.tokens[id];
            line >= t.line && line <= t.closing_line.unwrap_or(self.last_line)
        })
    }

    /// First CODE marker in the document: the boundary between global
    /// declarations and procedural code.
    pub fn first_execution_marker(&self) -> Option<TokenId> {
        self.first_execution_marker
    }

    /// Column-0 data declarations in global scope (before the first execution
    /// marker, outside any procedure or structure).
    pub fn global_variables(&self) -> &[TokenId] {
        &self.global_variables
    }

    /// Dead-code predicate: is `line` inside an OMIT/COMPILE region? Callers
    /// use this to suppress hover/hints on conditionally-excluded code.
    pub fn is_line_conditionally_compiled(&self, line: u32) -> bool {
        self.conditional_ranges
            .iter()
            .any(|&(start, end)| line >= start && line <= end)
    }

    pub fn conditional_ranges(&self) -> &[(u32, u32)] {
        &self.conditional_ranges
    }

    /// Declaration tokens (MAP/MODULE-in-MAP members) matching `name`.
    pub fn find_declarations(&self, name: &str) -> Vec<TokenId> {
        let mut out = Vec::new();
        for &map_id in self.map_blocks() {
            self.collect_map_declarations(map_id, name, &mut out);
        }
        out
    }

    fn collect_map_declarations(&self, block: TokenId, name: &str, out: &mut Vec<TokenId>) {
        for &child in &self.tokens[block].children {
            let tok = &self.tokens[child];
            match tok.sub_kind {
                Some(SubKind::MapProcedure) => {
                    if tok.label.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(name)) {
                        out.push(child);
                    }
                }
                // MODULE sub-blocks list more declarations; any other nested
                // kind is skipped.
                _ if tok.kind == TokenKind::StructureOpen && tok.text_eq("MODULE") => {
                    self.collect_map_declarations(child, name, out);
                }
                _ => {}
            }
        }
    }

    /// Implementation candidates for `name`: procedure-family tokens outside
    /// any declaration block.
    pub fn find_implementations(&self, name: &str) -> Vec<TokenId> {
        self.find_by_label(name)
            .iter()
            .copied()
            .filter(|&id| {
                matches!(
                    self.tokens[id].sub_kind,
                    Some(SubKind::Procedure)
                        | Some(SubKind::GlobalProcedure)
                        | Some(SubKind::MethodImplementation)
                )
            })
            .collect()
    }

    pub(crate) fn from_parts(
        tokens: Vec<Token>,
        first_execution_marker: Option<TokenId>,
        global_variables: Vec<TokenId>,
        conditional_ranges: Vec<(u32, u32)>,
    ) -> Self {
        let last_line = tokens.last().map(|t| t.line).unwrap_or(0);
        let mut line_index: FastHashMap<u32, Vec<TokenId>> =
            map_with_capacity(last_line as usize + 1);
        let mut label_index: FastHashMap<String, Vec<TokenId>> = FastHashMap::default();
        let mut structure_index: FastHashMap<String, Vec<TokenId>> = FastHashMap::default();
        for (id, tok) in tokens.iter().enumerate() {
            line_index.entry(tok.line).or_default().push(id);
            if let Some(label) = &tok.label {
                label_index.entry(label.to_ascii_lowercase()).or_default().push(id);
            }
            if tok.sub_kind.is_some()
                && matches!(tok.kind, TokenKind::StructureOpen | TokenKind::WindowElement)
            {
                structure_index.entry(tok.upper()).or_default().push(id);
            }
        }
        Self {
            tokens,
            line_index,
            label_index,
            structure_index,
            first_execution_marker,
            global_variables,
            conditional_ranges,
            last_line,
        }
    }
}
