//! Fixed-weight feed-forward networks used to pick vehicle controls and signal phases.
//!
//! A [PolicyParams] is an immutable stack of dense layers, initialised once
//! and never trained. [infer] evaluates it as a pure function: hidden layers
//! use a ReLU activation and the final layer applies the policy's
//! [OutputActivation].

use itertools::Itertools;
use rand::Rng;
use rand_distr::{Distribution, Uniform, WeightedIndex};

/// Layer sizes of the vehicle policy: 8 inputs, two hidden layers, 2 outputs.
pub const DRIVING_DIMS: [usize; 4] = [8, 16, 16, 2];

/// Layer sizes of the signal policy: 12 inputs, two hidden layers, 4 outputs.
pub const SIGNAL_DIMS: [usize; 4] = [12, 32, 32, 4];

/// The activation applied to the final layer of a policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputActivation {
    /// Squashes every output into (-1, 1).
    Tanh,
    /// Normalises the outputs onto the probability simplex.
    Softmax,
}

/// A single dense layer.
#[derive(Clone, Debug)]
struct Layer {
    inputs: usize,
    outputs: usize,
    /// Row-major `outputs x inputs` weight matrix.
    weights: Vec<f64>,
    biases: Vec<f64>,
}

/// The immutable parameters of a feed-forward policy.
#[derive(Clone, Debug)]
pub struct PolicyParams {
    layers: Vec<Layer>,
    output: OutputActivation,
}

impl Layer {
    /// Creates a layer with Xavier-uniform weights and zero biases.
    fn xavier(inputs: usize, outputs: usize, rng: &mut (impl Rng + ?Sized)) -> Self {
        let bound = (6.0 / (inputs + outputs) as f64).sqrt();
        let distr = Uniform::new_inclusive(-bound, bound);
        Self {
            inputs,
            outputs,
            weights: (0..inputs * outputs).map(|_| distr.sample(rng)).collect(),
            biases: vec![0.0; outputs],
        }
    }

    fn zeroed(inputs: usize, outputs: usize) -> Self {
        Self {
            inputs,
            outputs,
            weights: vec![0.0; inputs * outputs],
            biases: vec![0.0; outputs],
        }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .chunks_exact(self.inputs)
            .zip(&self.biases)
            .map(|(row, bias)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + bias)
            .collect()
    }
}

impl PolicyParams {
    /// Creates a randomly initialised policy with the given layer sizes,
    /// listed from the input layer to the output layer.
    ///
    /// # Panics
    /// If fewer than two sizes are given.
    pub fn xavier(dims: &[usize], output: OutputActivation, rng: &mut (impl Rng + ?Sized)) -> Self {
        assert!(dims.len() >= 2, "A policy needs an input and an output layer");
        let layers = dims
            .iter()
            .tuple_windows()
            .map(|(&inputs, &outputs)| Layer::xavier(inputs, outputs, rng))
            .collect();
        Self { layers, output }
    }

    /// Creates a policy whose weights are all zero.
    /// Its raw outputs are zero for every input.
    pub fn zeroed(dims: &[usize], output: OutputActivation) -> Self {
        assert!(dims.len() >= 2, "A policy needs an input and an output layer");
        let layers = dims
            .iter()
            .tuple_windows()
            .map(|(&inputs, &outputs)| Layer::zeroed(inputs, outputs))
            .collect();
        Self { layers, output }
    }

    /// The length of the input vector.
    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.inputs)
    }

    /// The length of the output vector.
    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.outputs)
    }

    /// The activation of the final layer.
    pub fn output_activation(&self) -> OutputActivation {
        self.output
    }
}

/// Creates a randomly initialised vehicle policy.
pub fn driving_policy(rng: &mut (impl Rng + ?Sized)) -> PolicyParams {
    PolicyParams::xavier(&DRIVING_DIMS, OutputActivation::Tanh, rng)
}

/// Creates a randomly initialised signal controller policy.
pub fn signal_policy(rng: &mut (impl Rng + ?Sized)) -> PolicyParams {
    PolicyParams::xavier(&SIGNAL_DIMS, OutputActivation::Softmax, rng)
}

/// Evaluates a policy on an input of [PolicyParams::input_size] values.
pub fn infer(params: &PolicyParams, input: &[f64]) -> Vec<f64> {
    debug_assert_eq!(input.len(), params.input_size(), "Policy input has the wrong length");
    let mut values = input.to_vec();

    let hidden = params.layers.len() - 1;
    for (idx, layer) in params.layers.iter().enumerate() {
        values = layer.forward(&values);
        if idx < hidden {
            values.iter_mut().for_each(|v| *v = v.max(0.0));
        }
    }

    match params.output {
        OutputActivation::Tanh => values.iter_mut().for_each(|v| *v = v.tanh()),
        OutputActivation::Softmax => softmax(&mut values),
    }
    values
}

/// Normalises a vector in place onto the probability simplex.
fn softmax(values: &mut [f64]) {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    values.iter_mut().for_each(|v| *v = (*v - max).exp());
    let sum: f64 = values.iter().sum();
    values.iter_mut().for_each(|v| *v /= sum);
}

/// Draws an index with probability proportional to its weight.
///
/// Falls back to the largest finite weight (the last, if tied) if the weights
/// do not form a valid distribution.
pub fn sample_index(weights: &[f64], rng: &mut (impl Rng + ?Sized)) -> usize {
    let distr = weights
        .iter()
        .all(|w| w.is_finite())
        .then(|| WeightedIndex::new(weights).ok())
        .flatten();
    match distr {
        Some(distr) => distr.sample(rng),
        None => {
            log::warn!("Cannot sample from {:?}, using arg-max", weights);
            weights
                .iter()
                .positions(|w| w.is_finite())
                .max_by(|&a, &b| weights[a].total_cmp(&weights[b]))
                .unwrap_or(0)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn driving_outputs_are_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let policy = driving_policy(&mut rng);
        assert_eq!(policy.input_size(), 8);
        assert_eq!(policy.output_size(), 2);

        for scale in [0.0, 0.5, 1.0, 100.0, -100.0] {
            let out = infer(&policy, &[scale; 8]);
            assert_eq!(out.len(), 2);
            assert!(out.iter().all(|v| (-1.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn signal_outputs_form_distribution() {
        let mut rng = StdRng::seed_from_u64(11);
        let policy = signal_policy(&mut rng);
        let out = infer(&policy, &[0.3; 12]);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|p| *p > 0.0 && *p <= 1.0));
        assert_approx_eq!(out.iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn inference_is_pure() {
        let mut rng = StdRng::seed_from_u64(3);
        let policy = driving_policy(&mut rng);
        let input = [0.1, 0.9, 1.0, 0.4, 0.2, 0.7, 0.5, -0.25];
        assert_eq!(infer(&policy, &input), infer(&policy, &input));
        assert_eq!(infer(&policy.clone(), &input), infer(&policy, &input));
    }

    #[test]
    fn same_seed_same_weights() {
        let a = driving_policy(&mut StdRng::seed_from_u64(99));
        let b = driving_policy(&mut StdRng::seed_from_u64(99));
        let input = [0.5; 8];
        assert_eq!(infer(&a, &input), infer(&b, &input));
    }

    #[test]
    fn xavier_bounds_and_zero_bias() {
        let policy = signal_policy(&mut StdRng::seed_from_u64(5));
        for layer in &policy.layers {
            let bound = (6.0 / (layer.inputs + layer.outputs) as f64).sqrt();
            assert_eq!(layer.weights.len(), layer.inputs * layer.outputs);
            assert!(layer.weights.iter().all(|w| w.abs() <= bound));
            assert!(layer.biases.iter().all(|b| *b == 0.0));
        }
    }

    #[test]
    fn zeroed_policy_outputs() {
        let tanh = PolicyParams::zeroed(&DRIVING_DIMS, OutputActivation::Tanh);
        assert_eq!(infer(&tanh, &[1.0; 8]), vec![0.0, 0.0]);

        let softmax = PolicyParams::zeroed(&SIGNAL_DIMS, OutputActivation::Softmax);
        for p in infer(&softmax, &[1.0; 12]) {
            assert_approx_eq!(p, 0.25);
        }
    }

    #[test]
    fn sampling_follows_weights() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_index(&[0.0, 0.0, 1.0, 0.0], &mut rng), 2);

        let mut counts = [0usize; 2];
        for _ in 0..2000 {
            counts[sample_index(&[0.8, 0.2], &mut rng)] += 1;
        }
        assert!(counts[0] > counts[1]);
        assert!(counts[1] > 0);
    }

    #[test]
    fn sampling_falls_back_to_arg_max() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_index(&[0.0, 0.0, 0.0], &mut rng), 2);
        assert_eq!(sample_index(&[0.1, -1.0, 0.7], &mut rng), 2);
        assert_eq!(sample_index(&[0.9, -1.0, 0.7], &mut rng), 0);
    }

    #[test]
    fn sampling_fallback_skips_non_finite_weights() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_index(&[0.2, f64::NAN, 0.5, 0.1], &mut rng), 2);
        assert_eq!(sample_index(&[0.1, f64::INFINITY, 0.3], &mut rng), 2);
        assert_eq!(sample_index(&[f64::NAN, f64::NAN], &mut rng), 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "wrong length")]
    fn inference_rejects_short_input() {
        let policy = PolicyParams::zeroed(&DRIVING_DIMS, OutputActivation::Tanh);
        infer(&policy, &[0.0; 5]);
    }
}
