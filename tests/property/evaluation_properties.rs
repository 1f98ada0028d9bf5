use match_eval::{
    evaluate, evaluate_expression, BooleanRuleExpression as Expr, EvaluationFlags, LeafOperator,
    PatternMatch, PatternMatchRegistry, RangeSet, Rule,
};
use proptest::prelude::*;

fn arb_match() -> impl Strategy<Value = PatternMatch> {
    (
        prop::sample::select(vec!["a", "b", "c"]),
        0usize..60,
        0usize..25,
        prop::option::of(prop::sample::select(vec!["x", "y", "z"])),
    )
        .prop_map(|(id, start, len, value)| {
            let pm = PatternMatch::bare(id, start, start + len);
            match value {
                Some(v) => pm.bind("$X", v),
                None => pm,
            }
        })
}

fn arb_matches() -> impl Strategy<Value = Vec<PatternMatch>> {
    prop::collection::vec(arb_match(), 0..24)
}

fn run(expr: &Expr, matches: &[PatternMatch]) -> RangeSet {
    let registry = PatternMatchRegistry::new(matches);
    let (ranges, _) = evaluate_expression(expr, &registry, &EvaluationFlags::default())
        .expect("expression without where-predicates evaluates");
    ranges
}

fn all(children: Vec<Expr>) -> Expr {
    Expr::all(children).expect("non-empty")
}

fn leaf(op: LeafOperator, id: &str) -> Expr {
    Expr::leaf(op, id)
}

proptest! {
    #[test]
    fn result_is_subset_of_all_ranges(matches in arb_matches()) {
        let expr = all(vec![
            leaf(LeafOperator::And, "a"),
            leaf(LeafOperator::AndNotInside, "b"),
        ]);
        let universe: RangeSet = matches.iter().map(|pm| pm.range.clone()).collect();
        prop_assert!(run(&expr, &matches).is_subset(&universe));
    }

    #[test]
    fn evaluation_is_repeatable(matches in arb_matches()) {
        let rule = Rule::new(
            "r",
            all(vec![leaf(LeafOperator::And, "a"), leaf(LeafOperator::AndInside, "b")]),
            "$X inside",
        );
        let first = evaluate(&rule, &matches, false).expect("evaluates");
        let second = evaluate(&rule, &matches, false).expect("evaluates");
        prop_assert_eq!(first, second);
    }

    #[test]
    fn repeated_conjunct_is_idempotent(matches in arb_matches()) {
        let once = all(vec![leaf(LeafOperator::And, "a")]);
        let twice = all(vec![leaf(LeafOperator::And, "a"), leaf(LeafOperator::And, "a")]);
        prop_assert_eq!(run(&once, &matches), run(&twice, &matches));
    }

    #[test]
    fn and_and_not_partition_the_candidates(matches in arb_matches()) {
        let base = run(&all(vec![leaf(LeafOperator::And, "a")]), &matches);
        let with = run(
            &all(vec![leaf(LeafOperator::And, "a"), leaf(LeafOperator::And, "b")]),
            &matches,
        );
        let without = run(
            &all(vec![leaf(LeafOperator::And, "a"), leaf(LeafOperator::AndNot, "b")]),
            &matches,
        );

        prop_assert!(with.is_disjoint(&without));
        let union: RangeSet = with.union(&without).cloned().collect();
        prop_assert_eq!(union, base);
    }

    #[test]
    fn inside_and_not_inside_partition_the_candidates(matches in arb_matches()) {
        let base = run(&all(vec![leaf(LeafOperator::And, "a")]), &matches);
        let inside = run(
            &all(vec![leaf(LeafOperator::And, "a"), leaf(LeafOperator::AndInside, "b")]),
            &matches,
        );
        let outside = run(
            &all(vec![leaf(LeafOperator::And, "a"), leaf(LeafOperator::AndNotInside, "b")]),
            &matches,
        );

        prop_assert!(inside.is_disjoint(&outside));
        let union: RangeSet = inside.union(&outside).cloned().collect();
        prop_assert_eq!(union, base);
    }

    #[test]
    fn conjunct_order_does_not_matter(matches in arb_matches()) {
        let forward = all(vec![
            leaf(LeafOperator::And, "a"),
            leaf(LeafOperator::AndInside, "b"),
            leaf(LeafOperator::AndNot, "c"),
        ]);
        let reversed = all(vec![
            leaf(LeafOperator::AndNot, "c"),
            leaf(LeafOperator::AndInside, "b"),
            leaf(LeafOperator::And, "a"),
        ]);
        prop_assert_eq!(run(&forward, &matches), run(&reversed, &matches));
    }

    #[test]
    fn either_is_the_union_of_its_children(matches in arb_matches()) {
        let a = run(&leaf(LeafOperator::And, "a"), &matches);
        let b = run(&leaf(LeafOperator::And, "b"), &matches);
        let either = Expr::either(vec![leaf(LeafOperator::And, "a"), leaf(LeafOperator::And, "b")])
            .expect("non-empty");
        let expected: RangeSet = a.union(&b).cloned().collect();
        prop_assert_eq!(run(&either, &matches), expected);
    }

    #[test]
    fn taint_rules_report_every_match(matches in arb_matches()) {
        let rule = Rule::taint("taint", "tainted");
        let (findings, trace) = evaluate(&rule, &matches, false).expect("taint never fails");
        prop_assert_eq!(findings.len(), matches.len());
        prop_assert!(trace.is_empty());
    }

    #[test]
    fn findings_follow_input_order(matches in arb_matches()) {
        let rule = Rule::new("r", all(vec![leaf(LeafOperator::And, "a")]), "m");
        let (findings, _) = evaluate(&rule, &matches, false).expect("evaluates");
        let expected: Vec<_> = matches
            .iter()
            .filter(|pm| findings.iter().any(|f| f.range == pm.range))
            .map(|pm| pm.range.clone())
            .collect();
        let actual: Vec<_> = findings.iter().map(|f| f.range.clone()).collect();
        prop_assert_eq!(actual, expected);
    }
}
