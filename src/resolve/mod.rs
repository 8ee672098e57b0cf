use serde::Serialize;

use crate::structure::DocumentMap;
use crate::token::{Token, TokenId, TokenKind};

#[cfg(test)]
mod resolve_test;

/// Plain navigation target handed back to the host. 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub line: u32,
    #[serde(rename = "character")]
    pub column: u32,
}

/// Jump from a forward declaration inside a MAP block to its out-of-block
/// implementation. Only valid when `position_line` lies inside a MAP;
/// overloads are disambiguated by the caller-supplied declaration signature.
/// "Not found" is a normal outcome, never an error.
pub fn find_implementation(
    name: &str,
    map: &DocumentMap,
    position_line: u32,
    decl_signature: Option<&str>,
) -> Option<Location> {
    if !map.is_inside_map(position_line) {
        return None;
    }
    let candidates = map.find_implementations(name);
    pick(map, &candidates, decl_signature).map(|id| location_of(map, id))
}

/// The inverse jump: from an implementation back to its MAP declaration,
/// searching MODULE sub-blocks nested in a MAP but skipping nested blocks of
/// any other kind.
pub fn find_declaration(
    name: &str,
    map: &DocumentMap,
    impl_signature: Option<&str>,
) -> Option<Location> {
    let candidates = map.find_declarations(name);
    pick(map, &candidates, impl_signature).map(|id| location_of(map, id))
}

fn pick(map: &DocumentMap, candidates: &[TokenId], signature: Option<&str>) -> Option<TokenId> {
    let Some(sig) = signature else {
        return candidates.first().copied();
    };
    let want = normalize_signature(sig);
    candidates
        .iter()
        .copied()
        .find(|&id| normalize_signature(&signature_text(map.tokens(), id)) == want)
        .or_else(|| candidates.first().copied())
}

fn location_of(map: &DocumentMap, id: TokenId) -> Location {
    let tok = map.token(id);
    if tok.kind == TokenKind::Procedure {
        // Point at the name label rather than the PROCEDURE keyword.
        for &other in map.tokens_on_line(tok.line) {
            let t = map.token(other);
            if t.kind == TokenKind::Label && t.column < tok.column {
                return Location {
                    line: t.line,
                    column: t.column,
                };
            }
        }
    }
    Location {
        line: tok.line,
        column: tok.column,
    }
}

/// Normalized overload signature: variable names stripped, type keywords
/// case-folded, reference (`*`) parameters distinct from by-value ones.
pub fn normalize_signature(sig: &str) -> Vec<String> {
    let inner = sig.trim().trim_start_matches('(').trim_end_matches(')');
    inner
        .split(',')
        .filter_map(|param| {
            let mut rest = param.trim();
            let by_ref = rest.starts_with('*');
            if by_ref {
                rest = rest[1..].trim_start();
            }
            let word: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == ':')
                .collect();
            if word.is_empty() {
                return None;
            }
            let mut normalized = word.to_ascii_uppercase();
            if by_ref {
                normalized.insert(0, '*');
            }
            Some(normalized)
        })
        .collect()
}

/// Raw text of the parameter list opening on token `from`'s line: everything
/// between the outer parens, space-joined. Empty when there is none.
pub(crate) fn signature_text(tokens: &[Token], from: usize) -> String {
    let line = tokens[from].line;
    let Some(open) = tokens[from..]
        .iter()
        .position(|t| t.text == "(")
        .map(|p| from + p)
    else {
        return String::new();
    };
    if tokens[open].line != line {
        return String::new();
    }
    let mut depth = 0i32;
    let mut parts: Vec<&str> = Vec::new();
    for tok in &tokens[open..tokens.len().min(open + 128)] {
        match tok.text.as_str() {
            "(" => depth += 1,
            ")" => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
        if depth > 0 && tok.text != "(" {
            parts.push(&tok.text);
        }
    }
    parts.join(" ")
}
