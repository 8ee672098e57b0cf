#[cfg(test)]
mod tests {
    use crate::structure::{DocumentMap, StructureBuilder};
    use crate::token::{SubKind, Token, Tokenizer};

    fn build(src: &str) -> DocumentMap {
        StructureBuilder::build(Tokenizer::tokenize(src), src)
    }

    fn implementation<'a>(map: &'a DocumentMap, name: &str) -> &'a Token {
        let ids = map.find_implementations(name);
        assert_eq!(ids.len(), 1, "expected one implementation of {name}");
        map.token(ids[0])
    }

    #[test]
    fn procedure_closes_at_next_procedure() {
        let map = build(
            "MyProc PROCEDURE()\n  CODE\n  RETURN\nOther PROCEDURE()\n  CODE",
        );
        let first = implementation(&map, "MyProc");
        assert_eq!(first.sub_kind, Some(SubKind::Procedure));
        assert_eq!(first.label.as_deref(), Some("MyProc"));
        assert_eq!(first.closing_line, Some(2));
        assert_eq!(implementation(&map, "Other").closing_line, Some(4));
    }

    #[test]
    fn routines_never_nest() {
        let map = build(
            "MyProc PROCEDURE()\n  CODE\n  DO R1\nR1 ROUTINE\n  CODE\nR2 ROUTINE\n  CODE",
        );
        let r1 = map.token(map.find_by_label("R1")[1]);
        assert_eq!(r1.sub_kind, Some(SubKind::Routine));
        assert_eq!(r1.closing_line, Some(4));
        let r2 = map.token(map.find_by_label("R2")[1]);
        assert_eq!(r2.closing_line, Some(6));
        assert_eq!(implementation(&map, "MyProc").closing_line, Some(6));
    }

    #[test]
    fn leading_until_is_a_condition_not_a_terminator() {
        let map = build("  LOOP UNTIL Done\n    x = 1\n  END");
        let loops = map.structures_of_kind("LOOP");
        assert_eq!(loops.len(), 1);
        assert_eq!(map.token(loops[0]).closing_line, Some(2));
    }

    #[test]
    fn trailing_until_closes_intervening_structures() {
        let map = build("  LOOP\n    IF x\n      y = 1\n  UNTIL z");
        assert_eq!(map.token(map.structures_of_kind("LOOP")[0]).closing_line, Some(3));
        assert_eq!(map.token(map.structures_of_kind("IF")[0]).closing_line, Some(3));
    }

    #[test]
    fn map_declarations_recurse_into_modules() {
        let map = build(
            "  MAP\nFoo     PROCEDURE(STRING a)\n    MODULE('util.clw')\nBar       PROCEDURE(LONG x)\n    END\n  END",
        );
        let foo = map.find_declarations("Foo");
        assert_eq!(foo.len(), 1);
        assert_eq!(map.token(foo[0]).sub_kind, Some(SubKind::MapProcedure));
        let bar = map.find_declarations("Bar");
        assert_eq!(bar.len(), 1);
        let module = map.token(map.structures_of_kind("MODULE")[0]);
        assert_eq!(module.referenced_file.as_deref(), Some("util.clw"));
        assert_eq!(module.closing_line, Some(4));
        assert_eq!(map.token(map.map_blocks()[0]).closing_line, Some(5));
        assert!(map.is_inside_map(3));
        assert!(!map.is_inside_map(6));
    }

    #[test]
    fn inline_if_consumes_its_own_terminator() {
        let map = build("  IF x THEN y = 1.\n  CASE z\n  OF 1\n  END");
        let iff = map.token(map.structures_of_kind("IF")[0]);
        assert_eq!(iff.closing_line, Some(0));
        assert!(iff.single_line_with_continuation);
        // The consumed dot did not steal the CASE's END.
        assert_eq!(map.token(map.structures_of_kind("CASE")[0]).closing_line, Some(3));
    }

    #[test]
    fn prefix_attribute_flows_to_fields() {
        let map = build("Q     QUEUE,PRE(MQ)\nName    STRING(20)\nNum     LONG\n      END");
        let queue = map.token(map.structures_of_kind("QUEUE")[0]);
        assert_eq!(queue.label.as_deref(), Some("Q"));
        assert_eq!(queue.structure_prefix.as_deref(), Some("MQ"));
        assert_eq!(queue.max_label_width, 4);
        let name = map.token(map.find_by_label("Name")[0]);
        assert_eq!(name.structure_prefix.as_deref(), Some("MQ"));
    }

    #[test]
    fn omit_region_closed_by_terminator_comment() {
        let map = build("  OMIT('***')\nx LONG\n  !***\ny LONG");
        assert_eq!(map.conditional_ranges(), &[(0, 2)]);
        assert!(map.is_line_conditionally_compiled(1));
        assert!(!map.is_line_conditionally_compiled(3));
    }

    #[test]
    fn omit_terminator_may_span_multiple_tokens() {
        // A bare `***` line lexes as three operator tokens; the terminator
        // match is against the physical line.
        let map = build("  OMIT('***')\nx LONG\n  ***\ny LONG");
        assert_eq!(map.conditional_ranges(), &[(0, 2)]);
        assert!(map.is_line_conditionally_compiled(2));
        assert!(!map.is_line_conditionally_compiled(3));
    }

    #[test]
    fn unclosed_omit_runs_to_end_of_input() {
        let map = build("  OMIT('never')\nx LONG\ny LONG");
        assert_eq!(map.conditional_ranges(), &[(0, 2)]);
    }

    #[test]
    fn global_versus_local_data() {
        let map = build("Gvar  LONG\nMyProc PROCEDURE()\nLoc     LONG\n  CODE\n  RETURN");
        let globals = map.global_variables();
        assert_eq!(globals.len(), 1);
        assert_eq!(map.token(globals[0]).text, "Gvar");
        let proc = implementation(&map, "MyProc");
        assert!(proc.has_local_data);
        assert_eq!(proc.execution_marker_line, Some(3));
        assert_eq!(map.first_execution_marker().map(|id| map.token(id).line), Some(3));
    }

    #[test]
    fn method_implementation_by_dotted_name() {
        let map = build("ThisWindow.Init PROCEDURE()\n  CODE\n  RETURN");
        let ids = map.find_implementations("ThisWindow.Init");
        assert_eq!(ids.len(), 1);
        assert_eq!(map.token(ids[0]).sub_kind, Some(SubKind::MethodImplementation));
    }

    #[test]
    fn structure_keyword_in_attribute_position_is_inert() {
        let map = build("MyClass CLASS,MODULE('win.clw')\nInit      PROCEDURE()\n        END");
        assert!(map.structures_of_kind("MODULE").is_empty());
        let class = map.token(map.class_blocks()[0]);
        assert_eq!(class.closing_line, Some(2));
        assert_eq!(class.label.as_deref(), Some("MyClass"));
        let init = map.token(map.find_by_label("Init")[1]);
        assert_eq!(init.sub_kind, Some(SubKind::MethodDeclaration));
    }

    #[test]
    fn structure_keyword_as_parameter_type_is_inert() {
        let map = build("  MAP\nFoo     PROCEDURE(GROUP g)\n  END");
        assert!(map.structures_of_kind("GROUP").is_empty());
        assert_eq!(map.token(map.map_blocks()[0]).closing_line, Some(2));
    }

    #[test]
    fn program_directive_marks_global_procedures() {
        let map = build("  PROGRAM\n  CODE\nMain PROCEDURE()\n  CODE");
        let ids = map.find_implementations("Main");
        assert_eq!(map.token(ids[0]).sub_kind, Some(SubKind::GlobalProcedure));
    }

    #[test]
    fn rebuild_is_deterministic() {
        let src = "P PROCEDURE()\nQ QUEUE\nF   LONG\n  END\n  CODE\n  RETURN";
        let a = build(src);
        let b = build(src);
        assert_eq!(a.tokens(), b.tokens());
    }
}
