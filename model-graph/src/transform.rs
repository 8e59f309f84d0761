//! Bijections between a distribution's natural support and unconstrained
//! real space.
//!
//! Gradient-based samplers operate on supports without boundaries. Each
//! transform maps a constrained value x to an unconstrained y, and scoring in
//! y-space picks up the change-of-variables correction log|dx/dy|:
//!
//! - `Log`: x > 0, y = ln(x), x = exp(y), log|dx/dy| = y.
//! - `Logit`: p in (0, 1), y = ln(p / (1 - p)), p = sigmoid(y),
//!   log|dp/dy| = ln(p) + ln(1 - p).
//!
//! Both act elementwise on matrix values. The unconstrained side is always
//! Real-tagged (Matrix-tagged for matrices): logit space is unbounded, so the
//! Probability tag's [0, 1] invariant cannot hold there.

use crate::common::{Mat, Result};
use crate::errors::GraphError;
use crate::value::NodeValue;

/// A stateless bijection keyed to a support type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Positive reals onto the real line via the natural log.
    Log,
    /// The unit interval onto the real line via log-odds.
    Logit,
}

fn sigmoid(y: f64) -> f64 {
    1.0 / (1.0 + (-y).exp())
}

impl Transform {
    fn forward_scalar(self, x: f64, node: usize) -> Result<f64> {
        match self {
            Transform::Log => {
                if x <= 0.0 {
                    return Err(GraphError::OutOfRange { node, value: x });
                }
                Ok(x.ln())
            }
            Transform::Logit => {
                if !(0.0..=1.0).contains(&x) {
                    return Err(GraphError::OutOfRange { node, value: x });
                }
                Ok((x / (1.0 - x)).ln())
            }
        }
    }

    fn inverse_scalar(self, y: f64) -> f64 {
        match self {
            Transform::Log => y.exp(),
            Transform::Logit => sigmoid(y),
        }
    }

    /// Map a constrained value into unconstrained space.
    pub fn to_unconstrained(self, constrained: &NodeValue, node: usize) -> Result<NodeValue> {
        match constrained {
            NodeValue::Real(x) | NodeValue::Probability(x) => {
                Ok(NodeValue::Real(self.forward_scalar(*x, node)?))
            }
            NodeValue::Matrix(m) => {
                let mut out = m.clone();
                for e in out.iter_mut() {
                    *e = self.forward_scalar(*e, node)?;
                }
                Ok(NodeValue::Matrix(out))
            }
            other => Err(GraphError::TypeMismatch {
                node,
                expected: self.constrained_type(),
                found: other.value_type(),
            }),
        }
    }

    /// Map an unconstrained value back onto the natural support.
    pub fn to_constrained(self, unconstrained: &NodeValue, node: usize) -> Result<NodeValue> {
        match unconstrained {
            NodeValue::Real(y) => {
                let x = self.inverse_scalar(*y);
                Ok(match self {
                    Transform::Log => NodeValue::Real(x),
                    Transform::Logit => NodeValue::Probability(x),
                })
            }
            NodeValue::Matrix(m) => Ok(NodeValue::Matrix(m.map(|y| self.inverse_scalar(y)))),
            other => Err(GraphError::TypeMismatch {
                node,
                expected: crate::value::ValueType::Real,
                found: other.value_type(),
            }),
        }
    }

    /// log|det(Jacobian)| of the constrained-from-unconstrained map,
    /// evaluated at the current constrained value and summed elementwise.
    pub fn log_abs_jacobian_determinant(self, constrained: &NodeValue, node: usize) -> Result<f64> {
        let term = |x: f64| -> Result<f64> {
            match self {
                Transform::Log => {
                    if x <= 0.0 {
                        return Err(GraphError::OutOfRange { node, value: x });
                    }
                    Ok(x.ln())
                }
                Transform::Logit => {
                    if !(0.0..=1.0).contains(&x) {
                        return Err(GraphError::OutOfRange { node, value: x });
                    }
                    Ok(x.ln() + (1.0 - x).ln())
                }
            }
        };
        match constrained {
            NodeValue::Real(x) | NodeValue::Probability(x) => term(*x),
            NodeValue::Matrix(m) => {
                let mut sum = 0.0;
                for &e in m.iter() {
                    sum += term(e)?;
                }
                Ok(sum)
            }
            other => Err(GraphError::TypeMismatch {
                node,
                expected: self.constrained_type(),
                found: other.value_type(),
            }),
        }
    }

    /// Push a gradient w.r.t. the constrained value through to the
    /// unconstrained representation, including the d log|J| / dy term.
    ///
    /// For y = ln(x): dL/dy = dL/dx * x + 1.
    /// For y = logit(p): dL/dy = dL/dp * p(1-p) + (1 - 2p).
    pub fn unconstrained_gradient(
        self,
        back_grad: &Mat,
        constrained: &NodeValue,
        node: usize,
    ) -> Result<Mat> {
        let adjust = |g: f64, x: f64| -> f64 {
            match self {
                Transform::Log => g * x + 1.0,
                Transform::Logit => {
                    let s = x * (1.0 - x);
                    g * s + (1.0 - 2.0 * x)
                }
            }
        };
        match constrained {
            NodeValue::Real(x) | NodeValue::Probability(x) => {
                let mut out = back_grad.clone();
                out[(0, 0)] = adjust(back_grad[(0, 0)], *x);
                Ok(out)
            }
            NodeValue::Matrix(m) => {
                if m.len() != back_grad.len() {
                    return Err(GraphError::InvalidArgument(format!(
                        "node {}: gradient buffer holds {} entries, value holds {}",
                        node,
                        back_grad.len(),
                        m.len()
                    )));
                }
                Ok(back_grad.zip_map(m, adjust))
            }
            other => Err(GraphError::TypeMismatch {
                node,
                expected: self.constrained_type(),
                found: other.value_type(),
            }),
        }
    }

    /// First/second derivatives of the log-density w.r.t. the unconstrained
    /// scalar, from derivatives w.r.t. the constrained scalar x.
    ///
    /// With x(y) and the log|J| correction:
    ///   G1 = g1 * x' + d log|J| / dy
    ///   G2 = g2 * x'^2 + g1 * x'' + d^2 log|J| / dy^2
    pub fn value_gradients(self, g1: f64, g2: f64, x: f64) -> (f64, f64) {
        match self {
            Transform::Log => {
                // x = e^y: x' = x'' = x; log|J| = y.
                (g1 * x + 1.0, g2 * x * x + g1 * x)
            }
            Transform::Logit => {
                // p = sigmoid(y): p' = s, p'' = s(1-2p), s = p(1-p);
                // log|J| = ln p + ln(1-p), d/dy = 1-2p, d2/dy2 = -2s.
                let s = x * (1.0 - x);
                (
                    g1 * s + (1.0 - 2.0 * x),
                    g2 * s * s + g1 * s * (1.0 - 2.0 * x) - 2.0 * s,
                )
            }
        }
    }

    fn constrained_type(self) -> crate::value::ValueType {
        match self {
            Transform::Log => crate::value::ValueType::Real,
            Transform::Logit => crate::value::ValueType::Probability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_round_trip() {
        let x = NodeValue::Real(2.5);
        let y = Transform::Log.to_unconstrained(&x, 0).unwrap();
        let back = Transform::Log.to_constrained(&y, 0).unwrap();
        let diff = (back.as_real().unwrap() - 2.5_f64).abs();
        assert!(diff < 1e-12);
    }

    #[test]
    fn logit_jacobian_matches_direct_formula() {
        let p = 0.3_f64;
        let ld = Transform::Logit
            .log_abs_jacobian_determinant(&NodeValue::Probability(p), 0)
            .unwrap();
        assert!((ld - (p.ln() + (1.0 - p).ln())).abs() < 1e-12);
    }

    #[test]
    fn log_rejects_nonpositive() {
        let err = Transform::Log.to_unconstrained(&NodeValue::Real(-1.0), 7);
        assert!(matches!(
            err,
            Err(GraphError::OutOfRange { node: 7, .. })
        ));
    }
}
