//! Minimal forward/backward pass over a two-coin chain.
//!
//! Run with `RUST_LOG=debug cargo run --example coin_chain` to watch the
//! synchronization traces.

use anyhow::Result;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use model_graph::{Mat, NodeArena, NodeValue, ValueType};

fn main() -> Result<()> {
    env_logger::init();

    let mut arena = NodeArena::new();

    // coin ~ Bernoulli(0.2); weather | coin through a 2x2 table
    let p = arena.add_constant(NodeValue::probability(0.2).unwrap());
    let coin_dist = arena.add_bernoulli(ValueType::Boolean, vec![p])?;
    let coin = arena.add_sample(vec![coin_dist])?;

    let table = arena.add_constant(NodeValue::Simplex(Mat::from_row_slice(
        2,
        2,
        &[0.9, 0.1, 0.3, 0.7],
    )));
    let weather_dist = arena.add_tabular(ValueType::Boolean, vec![table, coin])?;
    let weather = arena.add_sample(vec![weather_dist])?;

    let mut rng = StdRng::seed_from_u64(2024);
    for step in 0..5 {
        arena.eval(coin, &mut rng)?;
        arena.eval(weather, &mut rng)?;
        let joint = arena.log_prob(coin)? + arena.log_prob(weather)?;
        info!(
            "step {}: coin={} weather={} log_prob={:.4}",
            step,
            arena.get(coin)?.value.as_bool().unwrap(),
            arena.get(weather)?.value.as_bool().unwrap(),
            joint
        );
    }

    // backward pass on the coin under an observed value
    arena.observe(coin, NodeValue::Boolean(true))?;
    arena.backward(coin)?;
    info!(
        "d log_prob / d p at the parameter: {:.4}",
        arena.get(p)?.back_grad1[(0, 0)]
    );

    Ok(())
}
