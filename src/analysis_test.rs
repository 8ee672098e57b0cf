#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::analyze;
    use crate::diagnostics::Severity;
    use crate::resolve;

    #[test]
    fn simple_procedure_end_to_end() {
        let a = analyze("MyProc PROCEDURE()\n  CODE\n  RETURN\n  END");
        assert!(a.diagnostics.is_empty());
        let folds: Vec<(u32, u32)> = a.folding.iter().map(|r| (r.start_line, r.end_line)).collect();
        assert_eq!(folds, vec![(0, 3)]);
        assert_eq!(a.map.find_implementations("MyProc").len(), 1);
    }

    #[test]
    fn map_declaration_navigates_both_ways() {
        let a = analyze(
            "  MAP\nFoo     PROCEDURE(STRING pName)\n  END\nFoo PROCEDURE(STRING pName)\n  CODE\n  RETURN",
        );
        assert!(a.diagnostics.is_empty());
        let to_impl = resolve::find_implementation("Foo", &a.map, 1, None);
        assert_eq!(to_impl.map(|l| l.line), Some(3));
        let to_decl = resolve::find_declaration("Foo", &a.map, None);
        assert_eq!(to_decl.map(|l| l.line), Some(1));
    }

    #[test]
    fn broken_input_still_yields_structure() {
        let a = analyze("Simple PROCEDURE()\n  CODE\n  IF x = 1\n    y = 2\n  RETURN");
        assert_eq!(a.diagnostics.len(), 1);
        assert_eq!(a.diagnostics[0].range.start.line, 2);
        // The lenient builder still produced a tree and a procedure fold.
        assert!(!a.folding.is_empty());
        assert_eq!(a.map.find_implementations("Simple").len(), 1);
    }

    #[test]
    fn larger_program_is_clean() {
        let src = "\
  PROGRAM
  MAP
Setup     PROCEDURE()
Total     PROCEDURE(LONG pCount),LONG
  END
GRate LONG
  CODE
  Setup()
  RETURN
Setup PROCEDURE()
Q       QUEUE,PRE(SQ)
Name      STRING(20)
        END
  CODE
  DO Fill
  RETURN
Fill ROUTINE
  CODE
  ADD(Q)
Total PROCEDURE(LONG pCount)
  CODE
  RETURN pCount * GRate";
        let a = analyze(src);
        assert_eq!(a.diagnostics, vec![]);
        assert_eq!(a.map.global_variables().len(), 1);
        assert!(a.map.is_inside_map(3));
        assert_eq!(a.map.find_declarations("Total").len(), 1);
        assert_eq!(a.map.find_implementations("Total").len(), 1);
    }

    #[test]
    fn diagnostic_wire_shape() {
        let a = analyze("Q QUEUE\nF   LONG");
        assert_eq!(a.diagnostics[0].severity, Severity::Error);
        let got = serde_json::to_value(&a.diagnostics[0]).unwrap();
        assert_eq!(
            got,
            json!({
                "range": {
                    "start": {"line": 0, "character": 2},
                    "end": {"line": 0, "character": 7},
                },
                "severity": "error",
                "message": "QUEUE structure is not terminated",
                "source": "clarion-analysis",
            })
        );
    }

    #[test]
    fn folding_wire_shape() {
        let a = analyze("MyProc PROCEDURE()\n  CODE\n  RETURN");
        let got = serde_json::to_value(&a.folding).unwrap();
        assert_eq!(
            got,
            json!([{"startLine": 0, "endLine": 2, "kind": "region"}])
        );
    }
}
