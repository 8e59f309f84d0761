use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use model_graph::{GraphError, Mat, NodeArena, NodeValue};

#[test]
fn multiply_and_add_over_scalars() {
    let mut arena = NodeArena::new();
    let a = arena.add_constant(NodeValue::Real(2.0));
    let b = arena.add_constant(NodeValue::Real(3.0));
    let c = arena.add_constant(NodeValue::Real(4.0));

    let prod = arena.add_multiply(vec![a, b, c]).unwrap();
    let sum = arena.add_add(vec![a, b, c]).unwrap();

    let mut rng = StdRng::seed_from_u64(0);
    arena.eval(prod, &mut rng).unwrap();
    arena.eval(sum, &mut rng).unwrap();

    assert_abs_diff_eq!(arena.get(prod).unwrap().value.as_real().unwrap(), 24.0);
    assert_abs_diff_eq!(arena.get(sum).unwrap().value.as_real().unwrap(), 9.0);
}

#[test]
fn probability_parents_participate_as_reals() {
    let mut arena = NodeArena::new();
    let p = arena.add_constant(NodeValue::probability(0.5).unwrap());
    let q = arena.add_constant(NodeValue::probability(0.4).unwrap());

    let prod = arena.add_multiply(vec![p, q]).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    arena.eval(prod, &mut rng).unwrap();
    assert_abs_diff_eq!(arena.get(prod).unwrap().value.as_real().unwrap(), 0.2);
}

#[test]
fn multiply_and_add_over_matrices_elementwise() {
    let mut arena = NodeArena::new();
    let a = arena.add_constant(NodeValue::Matrix(Mat::from_row_slice(
        2,
        2,
        &[1.0, 2.0, 3.0, 4.0],
    )));
    let b = arena.add_constant(NodeValue::Matrix(Mat::from_row_slice(
        2,
        2,
        &[5.0, 6.0, 7.0, 8.0],
    )));
    let c = arena.add_constant(NodeValue::Matrix(Mat::from_row_slice(
        2,
        2,
        &[2.0, 2.0, 2.0, 2.0],
    )));

    let prod = arena.add_multiply(vec![a, b, c]).unwrap();
    let sum = arena.add_add(vec![a, b, c]).unwrap();

    let mut rng = StdRng::seed_from_u64(0);
    arena.eval(prod, &mut rng).unwrap();
    arena.eval(sum, &mut rng).unwrap();

    let expected_prod = Mat::from_row_slice(2, 2, &[10.0, 24.0, 42.0, 64.0]);
    let expected_sum = Mat::from_row_slice(2, 2, &[8.0, 10.0, 12.0, 14.0]);
    assert_eq!(arena.get(prod).unwrap().value.as_matrix().unwrap(), &expected_prod);
    assert_eq!(arena.get(sum).unwrap().value.as_matrix().unwrap(), &expected_sum);
}

#[test]
fn construction_rejects_bad_operand_sets() {
    let mut arena = NodeArena::new();
    let x = arena.add_constant(NodeValue::Real(1.0));
    let m = arena.add_constant(NodeValue::Matrix(Mat::zeros(2, 2)));
    let m3 = arena.add_constant(NodeValue::Matrix(Mat::zeros(3, 2)));
    let flag = arena.add_constant(NodeValue::Boolean(true));

    assert!(matches!(
        arena.add_multiply(vec![x]),
        Err(GraphError::InvalidArgument(_))
    ));
    assert!(matches!(
        arena.add_multiply(vec![x, m]),
        Err(GraphError::InvalidArgument(_))
    ));
    assert!(matches!(
        arena.add_add(vec![m, m3]),
        Err(GraphError::InvalidArgument(_))
    ));
    assert!(matches!(
        arena.add_add(vec![x, flag]),
        Err(GraphError::TypeMismatch { .. })
    ));
}

#[test]
fn add_propagates_chain_factors_by_the_sum_rule() {
    let mut arena = NodeArena::new();
    let x = arena.add_constant(NodeValue::Real(2.0));
    let y = arena.add_constant(NodeValue::Real(5.0));
    let sum = arena.add_add(vec![x, y]).unwrap();

    // x is the target of the walk: dx/dx = 1
    arena.get_mut(x).unwrap().grad1 = 1.0;
    arena.compute_gradients(sum).unwrap();

    let node = arena.get(sum).unwrap();
    assert_abs_diff_eq!(node.grad1, 1.0);
    assert_abs_diff_eq!(node.grad2, 0.0);
}

#[test]
fn multiply_propagates_chain_factors_by_the_product_rule() {
    let mut arena = NodeArena::new();
    let x = arena.add_constant(NodeValue::Real(2.0));
    let y = arena.add_constant(NodeValue::Real(5.0));
    let z = arena.add_constant(NodeValue::Real(7.0));
    let prod = arena.add_multiply(vec![x, y, z]).unwrap();

    arena.get_mut(x).unwrap().grad1 = 1.0;
    arena.compute_gradients(prod).unwrap();

    // d(xyz)/dx = yz; second order vanishes for a single linear factor
    let node = arena.get(prod).unwrap();
    assert_abs_diff_eq!(node.grad1, 35.0);
    assert_abs_diff_eq!(node.grad2, 0.0);

    // with two parents carrying first-order factors the cross term appears:
    // f = x * y, x' = y' = 1 -> f'' = 2
    let mut arena = NodeArena::new();
    let x = arena.add_constant(NodeValue::Real(2.0));
    let y = arena.add_constant(NodeValue::Real(5.0));
    let prod = arena.add_multiply(vec![x, y]).unwrap();
    arena.get_mut(x).unwrap().grad1 = 1.0;
    arena.get_mut(y).unwrap().grad1 = 1.0;
    arena.compute_gradients(prod).unwrap();
    let node = arena.get(prod).unwrap();
    assert_abs_diff_eq!(node.grad1, 7.0);
    assert_abs_diff_eq!(node.grad2, 2.0);
}
