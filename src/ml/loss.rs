// ============================================================
// Layer 5 — Losses and Accuracy
// ============================================================
// Three ways to train, selected by LossMode:
//
//   si:       CE(instance_logits, instance_labels)
//   mi:       CE(bag_logits, bag_labels)
//   combined: β · SI + (1 − β) · MI
//
// β starts at `beta` and decays geometrically every epoch:
//   β_e = beta · beta_decay^(e − 1)       (e = 1, 2, ...)
// so early epochs lean on the instance loss and later ones on
// the bag loss.

use burn::{nn::loss::CrossEntropyLossConfig, prelude::*};

use crate::domain::options::LossMode;
use crate::ml::mil::MilOutput;

/// Weights of the single-instance and multi-instance loss terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossWeights {
    pub si: f64,
    pub mi: f64,
}

impl LossWeights {
    pub fn for_epoch(mode: LossMode, beta: f64, beta_decay: f64, epoch: usize) -> Self {
        match mode {
            LossMode::Si => Self { si: 1.0, mi: 0.0 },
            LossMode::Mi => Self { si: 0.0, mi: 1.0 },
            LossMode::Combined => {
                let exponent = epoch.saturating_sub(1) as i32;
                let si = (beta * beta_decay.powi(exponent)).clamp(0.0, 1.0);
                Self { si, mi: 1.0 - si }
            }
        }
    }
}

/// Weighted cross-entropy over instances and/or bags; shape [1].
pub fn mil_loss<B: Backend>(
    output:          &MilOutput<B>,
    instance_labels: Tensor<B, 1, Int>,
    bag_labels:      Tensor<B, 1, Int>,
    weights:         LossWeights,
) -> Tensor<B, 1> {
    let device = output.bag_logits.device();
    let ce     = CrossEntropyLossConfig::new().init(&device);

    let si = (weights.si > 0.0)
        .then(|| ce.forward(output.instance_logits.clone(), instance_labels) * weights.si);
    let mi = (weights.mi > 0.0)
        .then(|| ce.forward(output.bag_logits.clone(), bag_labels) * weights.mi);

    match (si, mi) {
        (Some(si), Some(mi)) => si + mi,
        (Some(si), None)     => si,
        (None, Some(mi))     => mi,
        (None, None)         => Tensor::zeros([1], &device),
    }
}

/// Number of rows of `logits` whose argmax equals the label.
pub fn correct_predictions<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns [batch, 1] — flatten to [batch] before comparing
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted
        .equal(labels)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

/// Row-wise argmax of a row-major `[rows, classes]` buffer.
pub fn argmax_rows(values: &[f32], classes: usize) -> Vec<usize> {
    values
        .chunks(classes.max(1))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn labels(values: &[i64]) -> Tensor<TestBackend, 1, Int> {
        Tensor::from_data(
            burn::tensor::TensorData::new(values.to_vec(), [values.len()]),
            &Default::default(),
        )
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    #[test]
    fn test_weights_per_mode() {
        assert_eq!(LossWeights::for_epoch(LossMode::Si, 0.5, 0.9, 3), LossWeights { si: 1.0, mi: 0.0 });
        assert_eq!(LossWeights::for_epoch(LossMode::Mi, 0.5, 0.9, 3), LossWeights { si: 0.0, mi: 1.0 });
    }

    #[test]
    fn test_beta_decays_per_epoch() {
        let first = LossWeights::for_epoch(LossMode::Combined, 0.8, 0.5, 1);
        assert!((first.si - 0.8).abs() < 1e-12);
        assert!((first.mi - 0.2).abs() < 1e-12);

        let third = LossWeights::for_epoch(LossMode::Combined, 0.8, 0.5, 3);
        assert!((third.si - 0.2).abs() < 1e-12);
        assert!((third.si + third.mi - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_logits_give_ln2() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([2, 2], &device);
        let output = MilOutput { instance_logits: logits.clone(), bag_logits: logits };

        for weights in [
            LossWeights { si: 1.0, mi: 0.0 },
            LossWeights { si: 0.0, mi: 1.0 },
            LossWeights { si: 0.3, mi: 0.7 },
        ] {
            let loss = scalar(mil_loss(&output, labels(&[0, 1]), labels(&[0, 1]), weights));
            assert!((loss - std::f64::consts::LN_2).abs() < 1e-5, "{weights:?} → {loss}");
        }
    }

    #[test]
    fn test_combined_mixes_terms() {
        let device = Default::default();
        // instances are confidently right, bags are uniform
        let instance_logits = Tensor::<TestBackend, 2>::from_floats([[20.0, 0.0], [0.0, 20.0]], &device);
        let bag_logits      = Tensor::<TestBackend, 2>::zeros([1, 2], &device);
        let output = MilOutput { instance_logits, bag_logits };

        let loss = scalar(mil_loss(&output, labels(&[0, 1]), labels(&[1]), LossWeights { si: 0.5, mi: 0.5 }));
        assert!((loss - 0.5 * std::f64::consts::LN_2).abs() < 1e-4);
    }

    #[test]
    fn test_correct_predictions() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]], &device);
        assert_eq!(correct_predictions(logits, labels(&[1, 1, 1])), 2);
    }

    #[test]
    fn test_argmax_rows() {
        assert_eq!(argmax_rows(&[0.1, 0.7, 0.2, 0.5, 0.4, 0.1], 3), vec![1, 0]);
        assert!(argmax_rows(&[], 3).is_empty());
    }
}
