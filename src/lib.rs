#[cfg(test)]
mod analysis_test;

pub mod cache;
pub mod diagnostics;
pub mod folding;
pub mod resolve;
pub mod structure;
pub mod token;
pub mod util;

use diagnostics::Diagnostic;
use folding::FoldingRange;
use structure::{DocumentMap, StructureBuilder};
use token::Tokenizer;

/// One document version's complete analysis: the annotated token tree plus
/// the artifacts derived from it. Produced fresh per request; read-only
/// afterwards.
pub struct DocumentAnalysis {
    pub map: DocumentMap,
    pub folding: Vec<FoldingRange>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Full pipeline: tokenize, build structure, then fold and validate. Total —
/// broken input degrades to a best-effort result instead of failing.
pub fn analyze(text: &str) -> DocumentAnalysis {
    let tokens = Tokenizer::tokenize(text);
    let diagnostics = diagnostics::validate(&tokens, text);
    let map = StructureBuilder::build(tokens, text);
    let folding = folding::compute_folding_ranges(&map);
    DocumentAnalysis {
        map,
        folding,
        diagnostics,
    }
}
