use serde::Serialize;
use tracing::warn;

use crate::structure::DocumentMap;
use crate::token::{SubKind, TokenId, TokenKind};

// Safety valves for pathological input; hitting either logs and returns the
// partial result.
const MAX_FOLDING_RANGES: usize = 5_000;
const MAX_WALK_DEPTH: usize = 64;

/// Collapsible line range. Only one kind is emitted; the enum matches the
/// host protocol's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FoldingRange {
    #[serde(rename = "startLine")]
    pub start_line: u32,
    #[serde(rename = "endLine")]
    pub end_line: u32,
    pub kind: FoldingKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FoldingKind {
    Region,
}

impl FoldingRange {
    fn new(start_line: u32, end_line: u32) -> Self {
        Self {
            start_line,
            end_line,
            kind: FoldingKind::Region,
        }
    }
}

const FOLDABLE: &[SubKind] = &[
    SubKind::Procedure,
    SubKind::GlobalProcedure,
    SubKind::MethodImplementation,
    SubKind::MethodDeclaration,
    SubKind::InterfaceMethod,
    SubKind::MapProcedure,
    SubKind::Routine,
    SubKind::Class,
    SubKind::Structure,
];

/// Walk the annotated token list and emit collapsible ranges for
/// procedures, routines, structures, and !REGION comment markers.
pub fn compute_folding_ranges(map: &DocumentMap) -> Vec<FoldingRange> {
    let mut out = Vec::new();
    let tokens = map.tokens();

    for (id, tok) in tokens.iter().enumerate() {
        if out.len() >= MAX_FOLDING_RANGES {
            warn!(limit = MAX_FOLDING_RANGES, "folding range limit reached; returning partial result");
            return out;
        }
        let Some(sub) = tok.sub_kind else { continue };
        if !FOLDABLE.contains(&sub) {
            continue;
        }
        // Inline control statements must never fold.
        if tok.single_line_with_continuation {
            continue;
        }
        let closing = match tok.closing_line {
            Some(line) => line,
            // The builder's annotation is the source of truth; inference is
            // the fallback for procedure-family tokens it could not close.
            None if is_procedure_family(sub) => infer_procedure_close(map, id),
            None => continue,
        };
        if closing > tok.line {
            out.push(FoldingRange::new(tok.line, closing));
            // Scopes with local data get an extra execution-body fold nested
            // inside the declaration fold.
            if let Some(marker) = tok.execution_marker_line {
                if tok.has_local_data && closing > marker {
                    out.push(FoldingRange::new(marker, closing));
                }
            }
        }
    }

    collect_region_folds(map, &mut out);
    out
}

fn is_procedure_family(sub: SubKind) -> bool {
    matches!(
        sub,
        SubKind::Procedure
            | SubKind::GlobalProcedure
            | SubKind::MethodImplementation
            | SubKind::Routine
    )
}

/// Closing line for a procedure the builder left unterminated: the line
/// before the next sibling procedure at the same nesting depth, else end of
/// file.
fn infer_procedure_close(map: &DocumentMap, id: TokenId) -> u32 {
    let tokens = map.tokens();
    let depth = nesting_depth(map, id);
    for (other, tok) in tokens.iter().enumerate().skip(id + 1) {
        if tok.kind != TokenKind::Procedure || tok.sub_kind.is_none() {
            continue;
        }
        if nesting_depth(map, other) == depth && tok.line > tokens[id].line {
            return tok.line.saturating_sub(1);
        }
    }
    map.last_line()
}

fn nesting_depth(map: &DocumentMap, id: TokenId) -> usize {
    let mut depth = 0;
    let mut cursor = id;
    while let Some(parent) = map.token(cursor).parent {
        depth += 1;
        cursor = parent;
        if depth >= MAX_WALK_DEPTH {
            warn!(limit = MAX_WALK_DEPTH, "parent chain depth limit reached");
            break;
        }
    }
    depth
}

/// !REGION / !ENDREGION comment pairs, matched with a stack; an unclosed
/// region is force-closed at end of file.
fn collect_region_folds(map: &DocumentMap, out: &mut Vec<FoldingRange>) {
    let mut stack: Vec<u32> = Vec::new();
    for tok in map.tokens() {
        if tok.kind != TokenKind::Comment {
            continue;
        }
        let body = tok.text.trim_start_matches('!').trim().to_ascii_uppercase();
        if body.starts_with("ENDREGION") {
            if let Some(start) = stack.pop() {
                if out.len() >= MAX_FOLDING_RANGES {
                    warn!(limit = MAX_FOLDING_RANGES, "folding range limit reached; returning partial result");
                    return;
                }
                if tok.line > start {
                    out.push(FoldingRange::new(start, tok.line));
                }
            }
        } else if body.starts_with("REGION") {
            stack.push(tok.line);
        }
    }
    for start in stack {
        warn!(start, "region comment not closed; folding to end of file");
        if map.last_line() > start {
            out.push(FoldingRange::new(start, map.last_line()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::StructureBuilder;
    use crate::token::Tokenizer;

    fn folds(src: &str) -> Vec<(u32, u32)> {
        let map = StructureBuilder::build(Tokenizer::tokenize(src), src);
        compute_folding_ranges(&map)
            .into_iter()
            .map(|r| (r.start_line, r.end_line))
            .collect()
    }

    #[test]
    fn procedure_folds_to_last_line() {
        let src = "MyProc PROCEDURE()\n  CODE\n  RETURN\n  END";
        assert_eq!(folds(src), vec![(0, 3)]);
    }

    #[test]
    fn procedure_with_local_data_gets_body_fold() {
        let src = "MyProc PROCEDURE()\nx  LONG\n  CODE\n  x = 1\n  RETURN";
        assert_eq!(folds(src), vec![(0, 4), (2, 4)]);
    }

    #[test]
    fn inline_if_never_folds() {
        let src = "P PROCEDURE()\n  CODE\n  IF x > 3.14 THEN result = 1.5.\n  RETURN";
        assert_eq!(folds(src), vec![(0, 3)]);
    }

    #[test]
    fn nested_structure_folds() {
        let src = "Q QUEUE,PRE(Q)\nName  STRING(20)\n  END\n";
        assert_eq!(folds(src), vec![(0, 2)]);
    }

    #[test]
    fn region_comments_fold() {
        let src = "!REGION setup\nA  LONG\nB  LONG\n!ENDREGION\n";
        assert_eq!(folds(src), vec![(0, 3)]);
    }

    #[test]
    fn unclosed_region_folds_to_eof() {
        let src = "!REGION top\nA  LONG\nB  LONG\n";
        assert_eq!(folds(src), vec![(0, 2)]);
    }

    #[test]
    fn two_procedures_close_each_other() {
        let src = "First PROCEDURE()\n  CODE\n  RETURN\nSecond PROCEDURE()\n  CODE\n  RETURN";
        assert_eq!(folds(src), vec![(0, 2), (3, 5)]);
    }
}
