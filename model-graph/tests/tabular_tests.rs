use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use model_graph::{GraphError, Mat, NodeArena, NodeId, NodeKind, NodeValue, ValueType};

fn simplex(rows: usize, cols: usize, entries: &[f64]) -> NodeValue {
    NodeValue::Simplex(Mat::from_row_slice(rows, cols, entries))
}

/// 4-row table over two boolean parents, distinct P(true) per row so the
/// selected row is identifiable from the score.
fn two_parent_arena() -> (NodeArena, NodeId, NodeId, NodeId) {
    let mut arena = NodeArena::new();
    let table = arena.add_constant(simplex(
        4,
        2,
        &[
            0.9, 0.1, // row 0: (false, false)
            0.8, 0.2, // row 1: (false, true)
            0.7, 0.3, // row 2: (true, false)
            0.6, 0.4, // row 3: (true, true)
        ],
    ));
    let p1 = arena.add_constant(NodeValue::Boolean(false));
    let p2 = arena.add_constant(NodeValue::Boolean(false));
    let dist = arena
        .add_tabular(ValueType::Boolean, vec![table, p1, p2])
        .unwrap();
    (arena, dist, p1, p2)
}

#[test]
fn construction_validates_table_shape() {
    let mut arena = NodeArena::new();

    // three columns
    let wide = arena.add_constant(simplex(2, 3, &[0.5, 0.3, 0.2, 0.1, 0.8, 0.1]));
    let flag = arena.add_constant(NodeValue::Boolean(true));
    assert!(matches!(
        arena.add_tabular(ValueType::Boolean, vec![wide, flag]),
        Err(GraphError::InvalidArgument(_))
    ));

    // row count must be 2^(parents - 1); the message names the expectation
    let short = arena.add_constant(simplex(2, 2, &[0.5, 0.5, 0.1, 0.9]));
    let p1 = arena.add_constant(NodeValue::Boolean(true));
    let p2 = arena.add_constant(NodeValue::Boolean(false));
    let err = arena
        .add_tabular(ValueType::Boolean, vec![short, p1, p2])
        .unwrap_err();
    match err {
        GraphError::InvalidArgument(msg) => {
            assert!(msg.contains("expected 4 rows"), "unexpected message: {}", msg)
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // a 1-parent boolean case with a 2x2 table is fine
    let ok = arena.add_constant(simplex(2, 2, &[0.5, 0.5, 0.1, 0.9]));
    let p = arena.add_constant(NodeValue::Boolean(true));
    assert!(arena.add_tabular(ValueType::Boolean, vec![ok, p]).is_ok());
}

#[test]
fn construction_validates_parent_kinds() {
    let mut arena = NodeArena::new();

    // the table must be a constant row-simplex matrix
    let not_simplex = arena.add_constant(NodeValue::Matrix(Mat::from_row_slice(
        2,
        2,
        &[0.5, 0.5, 0.1, 0.9],
    )));
    let flag = arena.add_constant(NodeValue::Boolean(true));
    assert!(matches!(
        arena.add_tabular(ValueType::Boolean, vec![not_simplex, flag]),
        Err(GraphError::InvalidArgument(_))
    ));

    // non-boolean conditioning parent
    let table = arena.add_constant(simplex(2, 2, &[0.5, 0.5, 0.1, 0.9]));
    let real = arena.add_constant(NodeValue::Real(1.0));
    assert!(matches!(
        arena.add_tabular(ValueType::Boolean, vec![table, real]),
        Err(GraphError::InvalidArgument(_))
    ));

    // only boolean samples are supported
    let table2 = arena.add_constant(simplex(2, 2, &[0.5, 0.5, 0.1, 0.9]));
    assert!(matches!(
        arena.add_tabular(ValueType::Real, vec![table2, flag]),
        Err(GraphError::InvalidArgument(_))
    ));

    // no parents at all
    assert!(matches!(
        arena.add_tabular(ValueType::Boolean, vec![]),
        Err(GraphError::InvalidArgument(_))
    ));
}

#[test]
fn row_index_encodes_parents_from_the_last_inward() {
    // bit 0 comes from the last parent, bit 1 from the one before it
    let cases: [((bool, bool), f64); 4] = [
        ((false, false), 0.1),
        ((false, true), 0.2),
        ((true, false), 0.3),
        ((true, true), 0.4),
    ];
    for ((v1, v2), expected_p) in cases {
        let (mut arena, dist, p1, p2) = two_parent_arena();
        arena.set_value(p1, NodeValue::Boolean(v1)).unwrap();
        arena.set_value(p2, NodeValue::Boolean(v2)).unwrap();
        let coin = arena.add_sample(vec![dist]).unwrap();

        arena.set_value(coin, NodeValue::Boolean(true)).unwrap();
        let lp = arena.log_prob(coin).unwrap();
        assert_abs_diff_eq!(lp, expected_p.ln(), epsilon = 1e-12);

        arena.set_value(coin, NodeValue::Boolean(false)).unwrap();
        let lp = arena.log_prob(coin).unwrap();
        assert_abs_diff_eq!(lp, (1.0 - expected_p).ln(), epsilon = 1e-12);
    }
}

#[test]
fn log_prob_rejects_non_boolean_values() {
    let (arena, dist, _, _) = two_parent_arena();
    let dist_node = arena.get(dist).unwrap();
    let d = match &dist_node.kind {
        NodeKind::Distribution(d) => d,
        _ => unreachable!(),
    };
    for bad in [
        NodeValue::Real(1.0),
        NodeValue::Probability(0.5),
        NodeValue::Matrix(Mat::zeros(1, 1)),
    ] {
        assert!(matches!(
            d.log_prob(&arena, dist_node, &bad),
            Err(GraphError::TypeMismatch {
                expected: ValueType::Boolean,
                ..
            })
        ));
    }
}

#[test]
fn out_of_range_entries_fail_at_scoring_time() {
    let mut arena = NodeArena::new();
    // shape is fine, entries are not; construction must still succeed
    let table = arena.add_constant(simplex(2, 2, &[0.5, 0.5, -0.5, 1.5]));
    let flag = arena.add_constant(NodeValue::Boolean(true));
    let dist = arena.add_tabular(ValueType::Boolean, vec![table, flag]).unwrap();
    let coin = arena.add_sample(vec![dist]).unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    assert!(matches!(
        arena.eval(coin, &mut rng),
        Err(GraphError::OutOfRange { value, .. }) if value > 1.0
    ));

    // the healthy row still scores
    arena.set_value(flag, NodeValue::Boolean(false)).unwrap();
    arena.set_value(coin, NodeValue::Boolean(true)).unwrap();
    assert_abs_diff_eq!(arena.log_prob(coin).unwrap(), 0.5_f64.ln(), epsilon = 1e-12);
}

#[test]
fn sampling_follows_the_selected_row() {
    let (mut arena, dist, p1, p2) = two_parent_arena();
    arena.set_value(p1, NodeValue::Boolean(true)).unwrap();
    arena.set_value(p2, NodeValue::Boolean(true)).unwrap();
    let coin = arena.add_sample(vec![dist]).unwrap();

    let mut rng = StdRng::seed_from_u64(9);
    let n = 20_000;
    let mut trues = 0usize;
    for _ in 0..n {
        arena.eval(coin, &mut rng).unwrap();
        if arena.get(coin).unwrap().value.as_bool().unwrap() {
            trues += 1;
        }
    }
    assert_abs_diff_eq!(trues as f64 / n as f64, 0.4, epsilon = 0.02);
}

#[test]
fn gradients_are_unsupported_in_every_call_pattern() {
    let (mut arena, dist, _, _) = two_parent_arena();
    let coin = arena.add_sample(vec![dist]).unwrap();
    arena.set_value(coin, NodeValue::Boolean(true)).unwrap();

    let mut g1 = 0.0;
    let mut g2 = 0.0;

    // w.r.t. the node's own value
    assert!(matches!(
        arena.gradient_log_prob(coin, coin, &mut g1, &mut g2),
        Err(GraphError::Unsupported {
            what: "gradient_log_prob_value",
            distribution: "Tabular",
        })
    ));

    // w.r.t. an ancestor
    let table = arena.get(dist).unwrap().parents[0];
    assert!(matches!(
        arena.gradient_log_prob(coin, table, &mut g1, &mut g2),
        Err(GraphError::Unsupported {
            what: "gradient_log_prob_param",
            distribution: "Tabular",
        })
    ));

    // backward-mode accumulation is just as impossible
    assert!(matches!(
        arena.backward(coin),
        Err(GraphError::Unsupported { .. })
    ));

    // nothing leaked into the accumulators
    assert_eq!(g1, 0.0);
    assert_eq!(g2, 0.0);
}
