#[cfg(test)]
mod tests {
    use crate::diagnostics::{validate, Diagnostic, Severity};
    use crate::token::Tokenizer;

    fn check(src: &str) -> Vec<Diagnostic> {
        validate(&Tokenizer::tokenize(src), src)
    }

    #[test]
    fn well_formed_program_is_clean() {
        let src = "  PROGRAM\n  MAP\nFoo     PROCEDURE(LONG x),LONG\n  END\n  CODE\n  RETURN\nFoo PROCEDURE(LONG x)\n  CODE\n  RETURN x";
        assert_eq!(check(src), vec![]);
    }

    #[test]
    fn unterminated_if_reports_once_at_opening() {
        let src = "Simple PROCEDURE()\n  CODE\n  IF x = 1\n    y = 2\n  RETURN";
        let diags = check(src);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
        assert!(diags[0].message.contains("IF"));
        assert_eq!(diags[0].range.start.line, 2);
    }

    #[test]
    fn unterminated_data_structure_names_its_keyword() {
        let diags = check("Q QUEUE\nF   LONG");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "QUEUE structure is not terminated");
    }

    #[test]
    fn inline_terminator_satisfies_the_structure() {
        assert_eq!(check("P PROCEDURE()\n  CODE\n  IF x THEN y = 1."), vec![]);
    }

    #[test]
    fn until_terminator_closes_loop_and_intervening() {
        let src = "P PROCEDURE()\n  CODE\n  LOOP\n    IF x\n      y = 1\n  UNTIL z";
        assert_eq!(check(src), vec![]);
    }

    #[test]
    fn omit_without_terminator_string_occurrence() {
        let diags = check("  OMIT('***')\nx LONG");
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].message,
            "OMIT('***') block not terminated with terminator string"
        );
        assert_eq!(check("  OMIT('***')\nx LONG\n  !***"), vec![]);
    }

    #[test]
    fn file_requires_driver_and_record() {
        let diags = check("F FILE\n  END");
        let messages: Vec<&str> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "FILE structure missing DRIVER attribute",
                "FILE structure missing RECORD structure",
            ]
        );

        let src = "F FILE,DRIVER('TopSpeed')\nR   RECORD\nN     LONG\n    END\n  END";
        assert_eq!(check(src), vec![]);
    }

    #[test]
    fn orof_needs_a_preceding_of() {
        let bad = "P PROCEDURE()\n  CODE\n  CASE x\n  OROF 1\n  END";
        let diags = check(bad);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("OROF"));

        let good = "P PROCEDURE()\n  CODE\n  CASE x\n  OF 1\n  OROF 2\n  END";
        assert_eq!(check(good), vec![]);
    }

    #[test]
    fn execute_on_string_literal_warns() {
        let diags = check("P PROCEDURE()\n  CODE\n  EXECUTE 'three'\n    DoIt\n  END");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[0].range.start.line, 2);
        // Range covers the whole literal including its quotes.
        assert_eq!(diags[0].range.start.column, 10);
        assert_eq!(diags[0].range.end.column, 17);
    }

    #[test]
    fn declared_return_type_with_no_return_statement() {
        let src = "  MAP\nFoo     PROCEDURE(),LONG\n  END\nFoo PROCEDURE()\n  CODE\n  x = 1";
        let diags = check(src);
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].message,
            "Declaration of 'Foo' specifies return type LONG but its implementation has no RETURN statement"
        );
    }

    #[test]
    fn declared_return_type_with_bare_returns() {
        let src = "  MAP\nFoo     PROCEDURE(),LONG\n  END\nFoo PROCEDURE()\n  CODE\n  RETURN";
        let diags = check(src);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("return no value"));
    }

    #[test]
    fn method_return_checked_against_qualified_name() {
        let src = "C CLASS\nInit    PROCEDURE(),LONG\n  END\n  CODE\nC.Init PROCEDURE()\n  CODE\n  RETURN 1";
        assert_eq!(check(src), vec![]);

        let bad = "C CLASS\nInit    PROCEDURE(),LONG\n  END\n  CODE\nC.Init PROCEDURE()\n  CODE\n  RETURN";
        let diags = check(bad);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("'C.Init'"));
    }

    #[test]
    fn module_needs_end_only_inside_map() {
        let src = "  MAP\n    MODULE('a.clw')\nFoo       PROCEDURE()\n  CODE";
        let diags = check(src);
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().any(|d| d.message.contains("MAP")));
        assert!(diags.iter().any(|d| d.message.contains("MODULE")));

        let attr = "C CLASS,MODULE('a.clw')\nM   PROCEDURE()\n  END\n  CODE";
        assert_eq!(check(attr), vec![]);
    }

    #[test]
    fn procedures_and_routines_close_implicitly() {
        let src = "A PROCEDURE()\n  CODE\n  DO R\nR ROUTINE\n  CODE\nB PROCEDURE()\n  CODE";
        assert_eq!(check(src), vec![]);
    }
}
