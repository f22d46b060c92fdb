//! BUY/WAIT classifier trained on synthetic majority-vote labels.
//!
//! The training set is drawn uniformly from the unit cube and labelled by a
//! fixed rule, so the network learns to approximate that rule rather than
//! anything about real price behavior. A fresh network is trained for every
//! evaluation; no weights are persisted.

use crate::domain::evaluation::{ClassifierOutput, FeatureVector};
use anyhow::ensure;
use rand::seq::SliceRandom;
use rand::Rng;

pub const FEATURE_COUNT: usize = 5;
pub const DEFAULT_THRESHOLD: f64 = 0.65;

const HIDDEN_1: usize = 16;
const HIDDEN_2: usize = 8;

const ADAM_BETA_1: f64 = 0.9;
const ADAM_BETA_2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;
const LOSS_EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    pub samples: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Drop probability after the first hidden layer.
    pub dropout: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            samples: 100,
            epochs: 50,
            batch_size: 16,
            learning_rate: 0.001,
            dropout: 0.2,
        }
    }
}

impl TrainingOptions {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.samples >= 1, "training samples must be >= 1");
        ensure!(self.epochs >= 1, "training epochs must be >= 1");
        ensure!(self.batch_size >= 1, "batch size must be >= 1");
        ensure!(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            "learning rate must be positive (got {})",
            self.learning_rate
        );
        ensure!(
            (0.0..1.0).contains(&self.dropout),
            "dropout must be in [0, 1) (got {})",
            self.dropout
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSample {
    pub features: [f64; FEATURE_COUNT],
    /// 1.0 = BUY, 0.0 = WAIT.
    pub label: f64,
}

/// BUY iff at least 3 of: momentum > 0.5, volatility < 0.5, priceToMA7 > 0.5,
/// priceToMA14 > 0.5, recentTrend > 0.5.
pub fn majority_vote_label(features: &[f64; FEATURE_COUNT]) -> f64 {
    let [momentum, volatility, price_to_ma7, price_to_ma14, recent_trend] = *features;
    let votes = [
        momentum > 0.5,
        volatility < 0.5,
        price_to_ma7 > 0.5,
        price_to_ma14 > 0.5,
        recent_trend > 0.5,
    ]
    .iter()
    .filter(|&&v| v)
    .count();

    if votes >= 3 {
        1.0
    } else {
        0.0
    }
}

pub fn generate_training_data<R: Rng + ?Sized>(samples: usize, rng: &mut R) -> Vec<TrainingSample> {
    (0..samples)
        .map(|_| {
            let mut features = [0.0; FEATURE_COUNT];
            for f in features.iter_mut() {
                *f = rng.gen::<f64>();
            }
            TrainingSample {
                features,
                label: majority_vote_label(&features),
            }
        })
        .collect()
}

/// Anything that maps a normalized feature vector to a BUY probability.
pub trait SignalModel: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, input: &[f64; FEATURE_COUNT]) -> f64;
}

pub fn classify(model: &dyn SignalModel, features: &FeatureVector, threshold: f64) -> ClassifierOutput {
    let probability = model.predict(&features.model_input());
    ClassifierOutput::from_probability(probability, threshold)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub samples: usize,
    pub epochs: usize,
    pub initial_loss: f64,
    pub final_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone)]
struct Dense {
    inputs: usize,
    outputs: usize,
    // Row-major: weights[o * inputs + i].
    weights: Vec<f64>,
    bias: Vec<f64>,
}

impl Dense {
    fn he_normal<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let std_dev = (2.0 / inputs as f64).sqrt();
        let weights = (0..inputs * outputs)
            .map(|_| standard_normal(rng) * std_dev)
            .collect();
        Self {
            inputs,
            outputs,
            weights,
            bias: vec![0.0; outputs],
        }
    }

    fn glorot_uniform<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = (0..inputs * outputs)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();
        Self {
            inputs,
            outputs,
            weights,
            bias: vec![0.0; outputs],
        }
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|o| {
                let row = &self.weights[o * self.inputs..(o + 1) * self.inputs];
                self.bias[o] + row.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>()
            })
            .collect()
    }

    /// Accumulates parameter gradients for upstream gradient `dz`; returns `dL/dx`.
    fn backward(&self, x: &[f64], dz: &[f64], grads: &mut DenseGrads) -> Vec<f64> {
        let mut dx = vec![0.0; self.inputs];
        for o in 0..self.outputs {
            let g = dz[o];
            if g == 0.0 {
                continue;
            }
            grads.bias[o] += g;
            for i in 0..self.inputs {
                grads.weights[o * self.inputs + i] += g * x[i];
                dx[i] += self.weights[o * self.inputs + i] * g;
            }
        }
        dx
    }
}

#[derive(Debug, Clone)]
struct DenseGrads {
    weights: Vec<f64>,
    bias: Vec<f64>,
}

impl DenseGrads {
    fn zeros_like(layer: &Dense) -> Self {
        Self {
            weights: vec![0.0; layer.weights.len()],
            bias: vec![0.0; layer.bias.len()],
        }
    }
}

#[derive(Debug, Clone)]
struct AdamMoments {
    m: Vec<f64>,
    v: Vec<f64>,
}

impl AdamMoments {
    fn new(len: usize) -> Self {
        Self {
            m: vec![0.0; len],
            v: vec![0.0; len],
        }
    }
}

#[derive(Debug, Clone)]
struct Adam {
    learning_rate: f64,
    step: i32,
    // (weights, bias) per layer.
    moments: Vec<(AdamMoments, AdamMoments)>,
}

impl Adam {
    fn new(learning_rate: f64, layers: &[Dense]) -> Self {
        Self {
            learning_rate,
            step: 0,
            moments: layers
                .iter()
                .map(|l| (AdamMoments::new(l.weights.len()), AdamMoments::new(l.bias.len())))
                .collect(),
        }
    }

    fn apply(&mut self, layers: &mut [Dense], grads: &[DenseGrads]) {
        self.step += 1;
        let correction = (1.0 - ADAM_BETA_2.powi(self.step)).sqrt() / (1.0 - ADAM_BETA_1.powi(self.step));
        let lr = self.learning_rate * correction;

        for ((layer, grad), (mw, mb)) in layers.iter_mut().zip(grads).zip(self.moments.iter_mut()) {
            adam_update(&mut layer.weights, &grad.weights, mw, lr);
            adam_update(&mut layer.bias, &grad.bias, mb, lr);
        }
    }
}

fn adam_update(params: &mut [f64], grads: &[f64], moments: &mut AdamMoments, lr: f64) {
    for (idx, p) in params.iter_mut().enumerate() {
        let g = grads[idx];
        let m = &mut moments.m[idx];
        let v = &mut moments.v[idx];
        *m = ADAM_BETA_1 * *m + (1.0 - ADAM_BETA_1) * g;
        *v = ADAM_BETA_2 * *v + (1.0 - ADAM_BETA_2) * g * g;
        *p -= lr * *m / (v.sqrt() + ADAM_EPSILON);
    }
}

/// 5 -> 16 (ReLU, dropout) -> 8 (ReLU) -> 1 (sigmoid).
#[derive(Debug, Clone)]
pub struct MlpClassifier {
    layers: [Dense; 3],
    dropout: f64,
}

impl MlpClassifier {
    pub fn new<R: Rng + ?Sized>(dropout: f64, rng: &mut R) -> Self {
        Self {
            layers: [
                Dense::he_normal(FEATURE_COUNT, HIDDEN_1, rng),
                Dense::he_normal(HIDDEN_1, HIDDEN_2, rng),
                Dense::glorot_uniform(HIDDEN_2, 1, rng),
            ],
            dropout,
        }
    }

    /// Generates the synthetic dataset and trains a fresh network on it.
    pub fn train<R: Rng + ?Sized>(
        options: &TrainingOptions,
        rng: &mut R,
    ) -> anyhow::Result<(Self, TrainingReport)> {
        options.validate()?;
        let data = generate_training_data(options.samples, rng);
        let mut model = Self::new(options.dropout, rng);
        let report = model.fit(&data, options, rng)?;
        Ok((model, report))
    }

    pub fn fit<R: Rng + ?Sized>(
        &mut self,
        data: &[TrainingSample],
        options: &TrainingOptions,
        rng: &mut R,
    ) -> anyhow::Result<TrainingReport> {
        options.validate()?;
        ensure!(!data.is_empty(), "training data must be non-empty");

        let initial_loss = self.loss(data);
        let mut optimizer = Adam::new(options.learning_rate, &self.layers);
        let mut order: Vec<usize> = (0..data.len()).collect();

        for _ in 0..options.epochs {
            order.shuffle(rng);
            for batch in order.chunks(options.batch_size) {
                let mut grads = [
                    DenseGrads::zeros_like(&self.layers[0]),
                    DenseGrads::zeros_like(&self.layers[1]),
                    DenseGrads::zeros_like(&self.layers[2]),
                ];
                let scale = 1.0 / batch.len() as f64;
                for &idx in batch {
                    self.accumulate_gradients(&data[idx], scale, &mut grads, rng);
                }
                optimizer.apply(&mut self.layers, &grads);
            }
        }

        let final_loss = self.loss(data);
        let accuracy = self.accuracy(data);
        tracing::debug!(
            samples = data.len(),
            epochs = options.epochs,
            initial_loss,
            final_loss,
            accuracy,
            "classifier trained"
        );

        Ok(TrainingReport {
            samples: data.len(),
            epochs: options.epochs,
            initial_loss,
            final_loss,
            accuracy,
        })
    }

    /// Mean binary cross-entropy with dropout disabled.
    pub fn loss(&self, data: &[TrainingSample]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        data.iter()
            .map(|s| binary_cross_entropy(self.predict(&s.features), s.label))
            .sum::<f64>()
            / data.len() as f64
    }

    pub fn accuracy(&self, data: &[TrainingSample]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let correct = data
            .iter()
            .filter(|s| (self.predict(&s.features) >= 0.5) == (s.label >= 0.5))
            .count();
        correct as f64 / data.len() as f64
    }

    fn accumulate_gradients<R: Rng + ?Sized>(
        &self,
        sample: &TrainingSample,
        scale: f64,
        grads: &mut [DenseGrads; 3],
        rng: &mut R,
    ) {
        let x = &sample.features;
        let keep = 1.0 - self.dropout;

        let z1 = self.layers[0].forward(x);
        let mask: Vec<f64> = z1
            .iter()
            .map(|_| {
                if rng.gen::<f64>() < self.dropout {
                    0.0
                } else {
                    1.0 / keep
                }
            })
            .collect();
        let h1: Vec<f64> = z1.iter().zip(&mask).map(|(z, m)| relu(*z) * m).collect();

        let z2 = self.layers[1].forward(&h1);
        let a2: Vec<f64> = z2.iter().map(|z| relu(*z)).collect();

        let z3 = self.layers[2].forward(&a2);
        let p = sigmoid(z3[0]);

        // Sigmoid + BCE collapses to (p - y).
        let dz3 = [(p - sample.label) * scale];
        let da2 = self.layers[2].backward(&a2, &dz3, &mut grads[2]);
        let dz2: Vec<f64> = da2
            .iter()
            .zip(&z2)
            .map(|(d, z)| if *z > 0.0 { *d } else { 0.0 })
            .collect();
        let dh1 = self.layers[1].backward(&h1, &dz2, &mut grads[1]);
        let dz1: Vec<f64> = dh1
            .iter()
            .zip(&mask)
            .zip(&z1)
            .map(|((d, m), z)| if *z > 0.0 { d * m } else { 0.0 })
            .collect();
        self.layers[0].backward(x, &dz1, &mut grads[0]);
    }
}

impl SignalModel for MlpClassifier {
    fn name(&self) -> &str {
        "mlp_synthetic_majority_vote"
    }

    fn predict(&self, input: &[f64; FEATURE_COUNT]) -> f64 {
        let h1: Vec<f64> = self.layers[0].forward(input).into_iter().map(relu).collect();
        let h2: Vec<f64> = self.layers[1].forward(&h1).into_iter().map(relu).collect();
        sigmoid(self.layers[2].forward(&h2)[0])
    }
}

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn binary_cross_entropy(p: f64, y: f64) -> f64 {
    let p = p.clamp(LOSS_EPSILON, 1.0 - LOSS_EPSILON);
    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
}

// Box-Muller; `rand` alone has no normal distribution.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
