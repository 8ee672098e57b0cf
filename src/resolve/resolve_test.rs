#[cfg(test)]
mod tests {
    use crate::resolve::{find_declaration, find_implementation, normalize_signature, Location};
    use crate::structure::{DocumentMap, StructureBuilder};
    use crate::token::Tokenizer;

    fn build(src: &str) -> DocumentMap {
        StructureBuilder::build(Tokenizer::tokenize(src), src)
    }

    fn loc(line: u32, column: u32) -> Location {
        Location { line, column }
    }

    #[test]
    fn declaration_to_implementation_and_back() {
        let map = build(
            "  MAP\nFoo     PROCEDURE(STRING pName)\n  END\nFoo PROCEDURE(STRING pName)\n  CODE\n  RETURN",
        );
        assert_eq!(find_implementation("Foo", &map, 1, None), Some(loc(3, 0)));
        assert_eq!(find_declaration("Foo", &map, None), Some(loc(1, 0)));
    }

    #[test]
    fn implementation_jump_requires_map_position() {
        let map = build(
            "  MAP\nFoo     PROCEDURE()\n  END\nFoo PROCEDURE()\n  CODE\n  RETURN",
        );
        assert!(find_implementation("Foo", &map, 4, None).is_none());
        assert!(find_implementation("Missing", &map, 1, None).is_none());
    }

    #[test]
    fn overloads_resolved_by_signature() {
        let map = build(
            "  MAP\nFoo     PROCEDURE(STRING s1, STRING s2)\nFoo     PROCEDURE(LONG n)\n  END\nFoo PROCEDURE(STRING a, STRING b)\n  CODE\n  RETURN\nFoo PROCEDURE(LONG x)\n  CODE\n  RETURN",
        );
        assert_eq!(
            find_implementation("Foo", &map, 2, Some("(LONG n)")),
            Some(loc(7, 0))
        );
        assert_eq!(
            find_implementation("Foo", &map, 1, Some("(STRING s1, STRING s2)")),
            Some(loc(4, 0))
        );
        assert_eq!(
            find_declaration("Foo", &map, Some("(STRING a, STRING b)")),
            Some(loc(1, 0))
        );
        assert_eq!(
            find_declaration("Foo", &map, Some("(LONG x)")),
            Some(loc(2, 0))
        );
    }

    #[test]
    fn unmatched_signature_falls_back_to_first_candidate() {
        let map = build(
            "  MAP\nFoo     PROCEDURE(LONG n)\n  END\nFoo PROCEDURE(LONG x)\n  CODE\n  RETURN",
        );
        assert_eq!(
            find_implementation("Foo", &map, 1, Some("(DATE d)")),
            Some(loc(3, 0))
        );
    }

    #[test]
    fn declarations_found_inside_map_modules() {
        let map = build(
            "  MAP\n    MODULE('util.clw')\nBar       PROCEDURE(LONG x)\n    END\n  END\nBar PROCEDURE(LONG x)\n  CODE\n  RETURN",
        );
        assert_eq!(find_declaration("Bar", &map, None), Some(loc(2, 0)));
        assert_eq!(find_implementation("Bar", &map, 2, None), Some(loc(5, 0)));
    }

    #[test]
    fn normalize_strips_names_and_folds_case() {
        assert_eq!(
            normalize_signature("(STRING a, string b)"),
            vec!["STRING", "STRING"]
        );
        assert_eq!(normalize_signature("( LONG x )"), vec!["LONG"]);
        assert_eq!(normalize_signature("(CusQueue q)"), vec!["CUSQUEUE"]);
        assert!(normalize_signature("()").is_empty());
        assert!(normalize_signature("").is_empty());
    }

    #[test]
    fn reference_parameters_stay_distinct() {
        assert_eq!(normalize_signature("(*CSTRING p)"), vec!["*CSTRING"]);
        assert_ne!(
            normalize_signature("(*CSTRING p)"),
            normalize_signature("(CSTRING p)")
        );
    }
}
