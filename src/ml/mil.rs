// ============================================================
// Layer 5 — Multiple-Instance Pooling
// ============================================================
// The network scores every instance. A bag score is obtained by
// pooling the instance logits of that bag, class by class:
//
//   instance logits [bags * P, C] ──reshape──▶ [bags, P, C]
//                                 ──pool P───▶ [bags, C]
//
//   max:  the most confident instance decides
//   mean: every instance counts equally
//   lse:  (1/r) · log(mean(exp(r · x)))  — mean for r→0, max for r→∞

use burn::prelude::*;

use crate::domain::options::PoolingKind;

/// Instance and bag logits of one forward pass.
pub struct MilOutput<B: Backend> {
    pub instance_logits: Tensor<B, 2>,
    pub bag_logits:      Tensor<B, 2>,
}

#[derive(Debug, Clone, Copy)]
pub struct MilPooling {
    pub kind:  PoolingKind,
    /// Sharpness of the log-sum-exp pooling
    pub lse_r: f64,
}

impl MilPooling {
    pub fn new(kind: PoolingKind, lse_r: f64) -> Self {
        Self { kind, lse_r }
    }

    /// Pool `[bags * per_bag, C]` instance logits into `[bags, C]` bag logits.
    pub fn pool<B: Backend>(&self, instance_logits: Tensor<B, 2>, per_bag: usize) -> Tensor<B, 2> {
        let [total, classes] = instance_logits.dims();
        let bags = total / per_bag.max(1);
        if per_bag <= 1 {
            return instance_logits;
        }

        let grouped = instance_logits.reshape([bags, per_bag, classes]);
        let pooled  = match self.kind {
            PoolingKind::Max  => grouped.max_dim(1),
            PoolingKind::Mean => grouped.mean_dim(1),
            PoolingKind::Lse  => {
                // shift by the max for numerical stability
                let r     = self.lse_r;
                let peak  = grouped.clone().max_dim(1).detach();
                let shift = (grouped - peak.clone().expand([bags, per_bag, classes])) * r;
                peak + shift.exp().mean_dim(1).log() / r
            }
        };
        pooled.reshape([bags, classes])
    }

    pub fn forward<B: Backend>(&self, instance_logits: Tensor<B, 2>, per_bag: usize) -> MilOutput<B> {
        let bag_logits = self.pool(instance_logits.clone(), per_bag);
        MilOutput { instance_logits, bag_logits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    /// two bags of three instances, two classes
    fn logits() -> Tensor<TestBackend, 2> {
        Tensor::from_floats(
            [
                [1.0, 0.0], [3.0, -1.0], [2.0, 4.0],
                [0.0, 0.0], [0.0, 3.0], [6.0, 0.0],
            ],
            &Default::default(),
        )
    }

    fn values(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-4, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn test_max_pooling() {
        let pooled = MilPooling::new(PoolingKind::Max, 1.0).pool(logits(), 3);
        assert_eq!(pooled.dims(), [2, 2]);
        assert_close(&values(pooled), &[3.0, 4.0, 6.0, 3.0]);
    }

    #[test]
    fn test_mean_pooling() {
        let pooled = MilPooling::new(PoolingKind::Mean, 1.0).pool(logits(), 3);
        assert_close(&values(pooled), &[2.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_lse_pooling() {
        let pooled = values(MilPooling::new(PoolingKind::Lse, 1.0).pool(logits(), 3));
        let lse = |xs: [f32; 3]| (xs.iter().map(|x| x.exp()).sum::<f32>() / 3.0).ln();
        assert_close(&pooled, &[
            lse([1.0, 3.0, 2.0]), lse([0.0, -1.0, 4.0]),
            lse([0.0, 0.0, 6.0]), lse([0.0, 3.0, 0.0]),
        ]);
    }

    #[test]
    fn test_lse_approaches_max_for_large_r() {
        let pooled = values(MilPooling::new(PoolingKind::Lse, 50.0).pool(logits(), 3));
        let max    = values(MilPooling::new(PoolingKind::Max, 1.0).pool(logits(), 3));
        for (l, m) in pooled.iter().zip(&max) {
            assert!((l - m).abs() < 0.05);
        }
    }

    #[test]
    fn test_single_instance_bags_pass_through() {
        let out = MilPooling::new(PoolingKind::Mean, 1.0).forward(logits(), 1);
        assert_eq!(values(out.bag_logits), values(out.instance_logits));
    }
}
