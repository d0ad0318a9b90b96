//! Scenario-level tests for the safety analyzer: each case is a small Go
//! source, and the expectation is the verdict (and rule) per loop line.

use parloop::analysis::{analyze_loop, AcceptMap, AnalysisContext, RuleId, Verdict};
use parloop::loops::find_loops;
use parloop::package::import_map;
use parloop::resolve::{collect_package_scope, resolve_file, universe_scope, SymbolTable};
use parloop::syntax::{parse_file, SourceFile};
use parloop::types::check_file;

/// Analyze every loop of `src`; returns `(line, verdict)` in source order.
fn verdicts_with(src: &str, accept: &AcceptMap) -> Vec<(u32, Verdict)> {
    let source = SourceFile::new("test.go", src);
    let ast = parse_file(&source).expect("test source must parse");
    let mut table = SymbolTable::default();
    let universe = universe_scope(&mut table);
    let package = collect_package_scope(std::slice::from_ref(&ast), &mut table);
    let mut bindings = resolve_file(&ast, &mut table, &universe, &package);
    let imports = import_map(&ast);
    let oracle = check_file(&ast, &table, &mut bindings, &imports);
    let cx = AnalysisContext {
        source: &source,
        symbols: &table,
        bindings: &bindings,
        oracle: &oracle,
        accept,
    };
    find_loops(&ast, &source)
        .iter()
        .map(|lp| (lp.start_line, analyze_loop(&cx, lp)))
        .collect()
}

fn verdicts(src: &str) -> Vec<(u32, Verdict)> {
    verdicts_with(src, &AcceptMap::default())
}

fn assert_permit(verdicts: &[(u32, Verdict)], line: u32) {
    let (_, v) = verdicts
        .iter()
        .find(|(l, _)| *l == line)
        .unwrap_or_else(|| panic!("no loop at line {line}"));
    assert!(v.is_permit(), "expected PERMIT at line {line}, got {v:?}");
}

fn assert_reject(verdicts: &[(u32, Verdict)], line: u32, rule: RuleId) {
    let (_, v) = verdicts
        .iter()
        .find(|(l, _)| *l == line)
        .unwrap_or_else(|| panic!("no loop at line {line}"));
    match v {
        Verdict::Reject(rejections) => {
            assert!(
                rejections.iter().any(|r| r.rule == rule),
                "expected {rule} at line {line}, got {rejections:?}"
            );
        }
        Verdict::Permit => panic!("expected REJECT {rule} at line {line}, got PERMIT"),
    }
}

#[test]
fn array_write_by_loop_index_is_permitted() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\tvar arr [10]int\n\tfor i := 0; i < 10; i++ {\n\t\tarr[i] = i\n\t}\n}\n",
    );
    assert_permit(&v, 5);
}

#[test]
fn external_variable_mutation_rejects_with_message() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\tvar j = 100\n\tfor i := 0; i < 10; i++ {\n\t\tj++\n\t}\n}\n",
    );
    assert_reject(&v, 5, RuleId::R012);
    let Verdict::Reject(rej) = &v[0].1 else {
        panic!()
    };
    assert!(rej[0].message.contains("declared outside"));
}

#[test]
fn read_write_same_array_rejects() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\tvar arr [10]int\n\tfor i := 0; i < 10; i++ {\n\t\tarr[i] = arr[i] + 1\n\t}\n}\n",
    );
    assert_reject(&v, 5, RuleId::R002);
}

#[test]
fn return_inside_function_literal_is_permitted() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\tfor i := 0; i < 10; i++ {\n\t\tif i == 5 {\n\t\t\tgo func() { return }()\n\t\t}\n\t}\n}\n",
    );
    assert_permit(&v, 4);
}

#[test]
fn bare_return_in_loop_body_rejects() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\tfor i := 0; i < 10; i++ {\n\t\tif i == 5 {\n\t\t\treturn\n\t\t}\n\t}\n}\n",
    );
    assert_reject(&v, 4, RuleId::R003);
}

#[test]
fn empty_clauses_reject_loop_variable_rule() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\ti := 0\n\tfor ; i < 10; i++ {\n\t\tprintln(i)\n\t}\n\tfor {\n\t\tbreak\n\t}\n}\n",
    );
    assert_reject(&v, 5, RuleId::R001);
    assert_reject(&v, 8, RuleId::R001);
}

#[test]
fn range_over_map_without_key_rejects() {
    let v = verdicts(
        "package main\n\nfunc f(m map[string]int, out []int) {\n\tfor _, v := range m {\n\t\tprintln(v)\n\t}\n\tfor k := range m {\n\t\tprintln(k)\n\t}\n}\n",
    );
    assert_reject(&v, 4, RuleId::R001);
    assert_permit(&v, 7);
}

#[test]
fn range_assignment_form_rejects() {
    let v = verdicts(
        "package main\n\nfunc f(xs []int) {\n\tvar i int\n\tfor i = range xs {\n\t\tprintln(i)\n\t}\n}\n",
    );
    assert_reject(&v, 5, RuleId::R001);
}

#[test]
fn literal_index_rejects_non_loop_variable_rule() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\tvar arr [10]int\n\tfor i := 0; i < 10; i++ {\n\t\tarr[1] = i\n\t}\n}\n",
    );
    assert_reject(&v, 5, RuleId::R009);
}

#[test]
fn derived_index_variable_rejects() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\tvar arr [10]int\n\tfor i := 0; i < 10; i++ {\n\t\tj := i\n\t\tarr[j] = i\n\t}\n}\n",
    );
    assert_reject(&v, 5, RuleId::R009);
}

#[test]
fn index_expression_containing_loop_variable_is_permitted() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\tvar arr [11]int\n\tfor i := 0; i < 10; i++ {\n\t\tarr[i+1] = i\n\t}\n}\n",
    );
    assert_permit(&v, 5);
}

#[test]
fn map_write_rejects_indexable_rule() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\tm := make(map[int]int)\n\tfor i := 0; i < 10; i++ {\n\t\tm[i] = i\n\t}\n}\n",
    );
    assert_reject(&v, 5, RuleId::R008);
}

#[test]
fn untyped_index_base_rejects_type_rule() {
    // `mystery` never resolves, so `xs` has no type.
    let v = verdicts(
        "package main\n\nfunc f() {\n\txs := mystery()\n\tfor i := 0; i < 10; i++ {\n\t\txs[i] = i\n\t}\n}\n",
    );
    assert_reject(&v, 5, RuleId::R007);
}

#[test]
fn compound_index_base_rejects() {
    let v = verdicts(
        "package main\n\nfunc grid() [][]int {\n\treturn nil\n}\n\nfunc f() {\n\tfor i := 0; i < 10; i++ {\n\t\tgrid()[i] = nil\n\t}\n}\n",
    );
    assert_reject(&v, 7, RuleId::R006);
}

#[test]
fn write_to_loop_variable_rejects() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\tfor i := 0; i < 10; i++ {\n\t\ti = 5\n\t}\n}\n",
    );
    assert_reject(&v, 4, RuleId::R011);
}

#[test]
fn break_rules_follow_nesting() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\
         \tfor i := 0; i < 10; i++ {\n\
         \t\tfor j := 0; j < 10; j++ {\n\
         \t\t\tif j == 5 {\n\t\t\t\tbreak\n\t\t\t}\n\
         \t\t\tprintln(i + j)\n\
         \t\t}\n\
         \t}\n\
         \tfor i := 0; i < 10; i++ {\n\
         \t\tif i == 5 {\n\t\t\tbreak\n\t\t}\n\
         \t}\n\
         }\n",
    );
    // Outer loop absorbs the inner's break; the inner loop itself cannot
    // give its break away.
    assert_permit(&v, 4);
    assert_reject(&v, 5, RuleId::R005);
    assert_reject(&v, 12, RuleId::R005);
}

#[test]
fn break_inside_switch_is_permitted() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\tfor i := 0; i < 10; i++ {\n\t\tswitch i {\n\t\tcase 5:\n\t\t\tbreak\n\t\tdefault:\n\t\t\tprintln(i)\n\t\t}\n\t}\n}\n",
    );
    assert_permit(&v, 4);
}

#[test]
fn goto_rules_follow_label_placement() {
    let v = verdicts(
        "package main\n\nfunc f() {\n\
         \tfor i := 0; i < 10; i++ {\n\
         \t\tif i == 5 {\n\t\t\tgoto end\n\t\t}\n\
         \t\tprintln(i)\n\
         \tend:\n\
         \t}\n\
         start:\n\
         \tfor i := 0; i < 10; i++ {\n\
         \t\tif i == 5 {\n\t\t\tgoto start\n\t\t}\n\
         \t}\n\
         }\n",
    );
    assert_permit(&v, 4);
    assert_reject(&v, 12, RuleId::R004);
}

#[test]
fn method_call_on_outer_receiver_rejects_unless_accepted() {
    let src = "package main\n\ntype counter struct {\n\tn int\n}\n\nfunc (c *counter) bump() {\n\tc.n++\n}\n\nfunc f() {\n\tc := counter{}\n\tfor i := 0; i < 10; i++ {\n\t\tc.bump()\n\t}\n}\n";
    let v = verdicts(src);
    assert_reject(&v, 13, RuleId::R013);

    let mut accept = AcceptMap::default();
    accept.insert("c", 13);
    let v = verdicts_with(src, &accept);
    assert_permit(&v, 13);

    // The override is line-exact.
    let mut wrong_line = AcceptMap::default();
    wrong_line.insert("c", 14);
    let v = verdicts_with(src, &wrong_line);
    assert_reject(&v, 13, RuleId::R013);
}

#[test]
fn method_call_on_loop_local_receiver_is_permitted() {
    let v = verdicts(
        "package main\n\ntype counter struct {\n\tn int\n}\n\nfunc (c *counter) bump() {\n\tc.n++\n}\n\nfunc f() {\n\tfor i := 0; i < 10; i++ {\n\t\tc := counter{}\n\t\tc.bump()\n\t\tprintln(i)\n\t}\n}\n",
    );
    assert_permit(&v, 12);
}

#[test]
fn package_function_calls_are_not_receivers() {
    let v = verdicts(
        "package main\n\nimport \"fmt\"\n\nfunc f() {\n\tfor i := 0; i < 10; i++ {\n\t\tfmt.Println(i)\n\t}\n}\n",
    );
    assert_permit(&v, 6);
}

#[test]
fn nested_loop_verdicts_are_independent() {
    // Outer writes an outer variable (reject); inner writes its own array
    // by its own index (permit).
    let v = verdicts(
        "package main\n\nfunc f() {\n\tvar total int\n\tvar arr [10]int\n\tfor i := 0; i < 10; i++ {\n\t\ttotal = i\n\t\tfor j := 0; j < 10; j++ {\n\t\t\tarr[j] = j\n\t\t}\n\t}\n}\n",
    );
    assert_reject(&v, 6, RuleId::R012);
    assert_permit(&v, 8);
}

#[test]
fn struct_field_read_write_disjointness_uses_field_identity() {
    // grid.rows is written and read under the same field symbol.
    let v = verdicts(
        "package main\n\ntype grid struct {\n\trows [10]int\n}\n\nfunc f(g grid) {\n\tfor i := 0; i < 10; i++ {\n\t\tg.rows[i] = g.rows[i] + 1\n\t}\n}\n",
    );
    assert_reject(&v, 8, RuleId::R002);
}

#[test]
fn verdicts_are_deterministic_across_runs() {
    let src = "package main\n\nfunc f() {\n\tvar arr [10]int\n\tvar j int\n\tfor i := 0; i < 10; i++ {\n\t\tarr[i] = arr[i] + 1\n\t\tj = i\n\t}\n\t_ = j\n}\n";
    let first = verdicts(src);
    let second = verdicts(src);
    assert_eq!(first.len(), second.len());
    for ((l1, v1), (l2, v2)) in first.iter().zip(second.iter()) {
        assert_eq!(l1, l2);
        match (v1, v2) {
            (Verdict::Permit, Verdict::Permit) => {}
            (Verdict::Reject(a), Verdict::Reject(b)) => {
                let rules_a: Vec<_> = a.iter().map(|r| r.rule).collect();
                let rules_b: Vec<_> = b.iter().map(|r| r.rule).collect();
                assert_eq!(rules_a, rules_b);
            }
            other => panic!("verdicts diverged: {other:?}"),
        }
    }
}
