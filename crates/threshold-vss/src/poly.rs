use crate::group::{Element, Point, Scalar};
use rand_core::RngCore;
use thiserror::Error;

/// Evaluation point of a polynomial. Participants are numbered from 1, the
/// point 0 holds the shared secret and must never be handed out.
pub type Idx = u32;

/// The value of a polynomial at `index`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eval<A> {
    pub value: A,
    pub index: Idx,
}

#[derive(Debug, Error)]
pub enum PolyError {
    #[error("{0} evaluations cannot recover a polynomial of threshold {1}")]
    NotEnoughEvaluations(usize, usize),
    #[error("evaluation index {0} appears twice")]
    DuplicateIndex(Idx),
}

/// A polynomial with coefficients in `C`, constant term first. The variable
/// is always a scalar, so `C` is either a scalar (a secret polynomial) or a
/// point (its commitment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poly<C>(Vec<C>);

impl<C: Element> Poly<C> {
    /// Samples `degree + 1` random coefficients, i.e. a sharing with
    /// threshold `degree + 1`
    pub fn new_from<R: RngCore>(degree: usize, rng: &mut R) -> Self {
        Self((0..=degree).map(|_| C::rand(rng)).collect())
    }
}

impl<C> Poly<C>
where
    C: Element,
    C::RHS: Scalar<RHS = C::RHS>,
{
    /// Evaluates the polynomial at `x = i` with Horner's rule
    pub fn eval(&self, i: Idx) -> Eval<C> {
        let x = C::RHS::from_u64(i.into());
        let mut value = C::zero();
        for coeff in self.0.iter().rev() {
            value.mul(&x);
            value.add(coeff);
        }

        Eval { value, index: i }
    }

    /// Interpolates the constant term from the `t` evaluations with the
    /// lowest indices.
    pub fn recover(t: usize, mut evals: Vec<Eval<C>>) -> Result<C, PolyError> {
        if evals.len() < t {
            return Err(PolyError::NotEnoughEvaluations(evals.len(), t));
        }

        evals.sort_by_key(|e| e.index);
        evals.truncate(t);
        if let Some(pair) = evals.windows(2).find(|pair| pair[0].index == pair[1].index) {
            return Err(PolyError::DuplicateIndex(pair[0].index));
        }

        let xs: Vec<C::RHS> = evals
            .iter()
            .map(|e| C::RHS::from_u64(e.index.into()))
            .collect();

        let mut secret = C::zero();
        for (i, eval) in evals.iter().enumerate() {
            let mut term = eval.value.clone();
            let basis = lagrange_at_zero(&xs, i).ok_or(PolyError::DuplicateIndex(eval.index))?;
            term.mul(&basis);
            secret.add(&term);
        }

        Ok(secret)
    }
}

/// The `i`-th Lagrange basis polynomial over `xs`, evaluated at 0:
/// `prod_{j != i} x_j / (x_j - x_i)`. None when two of `xs` are equal.
fn lagrange_at_zero<S: Scalar<RHS = S>>(xs: &[S], i: usize) -> Option<S> {
    let mut num = S::one();
    let mut den = S::one();
    for (j, xj) in xs.iter().enumerate().filter(|(j, _)| *j != i) {
        num.mul(xj);
        let mut diff = xj.clone();
        diff.sub(&xs[i]);
        den.mul(&diff);
    }

    num.mul(&den.inverse()?);
    Some(num)
}

impl<C> From<Vec<C>> for Poly<C> {
    fn from(coeffs: Vec<C>) -> Self {
        Self(coeffs)
    }
}

impl<C> From<Poly<C>> for Vec<C> {
    fn from(poly: Poly<C>) -> Self {
        poly.0
    }
}

impl<S: Scalar<RHS = S>> Poly<S> {
    /// Multiplies every coefficient with the generator of `P`
    pub fn commit<P: Point<RHS = S>>(&self) -> Poly<P> {
        Poly(
            self.0
                .iter()
                .map(|coeff| {
                    let mut point = P::one();
                    point.mul(coeff);
                    point
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::bn254::{Scalar as Sc, G1, G2};
    use proptest::prelude::*;

    fn random(degree: usize) -> Poly<Sc> {
        Poly::new_from(degree, &mut rand::thread_rng())
    }

    proptest! {
        #[test]
        fn recovers_with_enough_evaluations(degree in 0..20usize, extra in 0..5usize) {
            let poly = random(degree);
            let evals: Vec<_> = (1..=(degree + 1 + extra) as Idx).map(|i| poly.eval(i)).collect();
            prop_assert_eq!(Poly::recover(degree + 1, evals).unwrap(), poly.0[0]);
        }

        #[test]
        fn too_few_points_give_another_constant(degree in 1..20usize) {
            let poly = random(degree);
            let evals: Vec<_> = (1..=degree as Idx).map(|i| poly.eval(i)).collect();
            prop_assert_ne!(Poly::recover(degree, evals).unwrap(), poly.0[0]);
        }

        #[test]
        fn horner_matches_the_naive_sum(degree in 0..20usize, idx in 1..1000u32) {
            let poly = random(degree);
            let x = Sc::from_u64(idx.into());

            let mut expected = Sc::zero();
            let mut power = Sc::one();
            for coeff in &poly.0 {
                let mut term = *coeff;
                term.mul(&power);
                expected.add(&term);
                power.mul(&x);
            }
            prop_assert_eq!(poly.eval(idx).value, expected);
        }
    }

    #[test]
    fn eval_at_zero_is_the_secret() {
        let poly = random(4);
        assert_eq!(poly.eval(0).value, poly.0[0]);
    }

    #[test]
    fn recover_rejects_bad_inputs() {
        let poly = random(2);
        let evals: Vec<_> = (1..=2).map(|i| poly.eval(i)).collect();
        assert!(matches!(
            Poly::recover(3, evals),
            Err(PolyError::NotEnoughEvaluations(2, 3))
        ));

        let evals = vec![poly.eval(1), poly.eval(1), poly.eval(2)];
        assert!(matches!(
            Poly::recover(3, evals),
            Err(PolyError::DuplicateIndex(1))
        ));
    }

    #[test]
    fn recovers_in_the_exponent() {
        let poly = random(3);
        let public = poly.commit::<G1>();
        let evals: Vec<_> = [9, 2, 5, 7].iter().map(|i| public.eval(*i)).collect();

        let mut expected = G1::one();
        expected.mul(&poly.0[0]);
        assert_eq!(Poly::recover(4, evals).unwrap(), expected);
    }

    #[test]
    fn commitment_evaluates_to_the_public_share() {
        let poly = random(2);
        let public = poly.commit::<G2>();
        assert_eq!(public.0.len(), 3);

        for i in 1..=5 {
            let mut expected = G2::one();
            expected.mul(&poly.eval(i).value);
            assert_eq!(public.eval(i).value, expected);
        }
    }
}
