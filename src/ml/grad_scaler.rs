// ============================================================
// Layer 5 — Dynamic Loss Scaling
// ============================================================
// Mixed-precision training multiplies the loss by a large scale
// so small gradients survive reduced precision, then divides
// the gradients back before the optimiser sees them:
//
//   backward(loss · S) → grads · S → unscale → grads
//
// Non-finite gradients after unscaling mean the scale was too
// large: the step is skipped and S halves. After 2000 clean
// steps in a row S doubles. Disabled, the scaler is a
// pass-through and never skips a step.

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::marker::PhantomData;

pub const INITIAL_SCALE:   f64   = 65536.0;
pub const GROWTH_FACTOR:   f64   = 2.0;
pub const BACKOFF_FACTOR:  f64   = 0.5;
pub const GROWTH_INTERVAL: usize = 2000;

#[derive(Debug, Clone)]
pub struct GradScaler {
    enabled:        bool,
    scale:          f64,
    growth_tracker: usize,
    overflow_count: usize,
}

impl GradScaler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            scale: INITIAL_SCALE,
            growth_tracker: 0,
            overflow_count: 0,
        }
    }

    /// Current multiplier, 1.0 when disabled.
    pub fn scale(&self) -> f64 {
        if self.enabled { self.scale } else { 1.0 }
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }

    pub fn scale_loss<B: Backend>(&self, loss: Tensor<B, 1>) -> Tensor<B, 1> {
        if self.enabled { loss.mul_scalar(self.scale) } else { loss }
    }

    /// Divide every gradient of `module` by the scale.
    ///
    /// Returns the gradients and whether all of them are finite.
    pub fn unscale<B, M>(&self, grads: GradientsParams, module: &M) -> (GradientsParams, bool)
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        if !self.enabled {
            return (grads, true);
        }

        let mut visitor = Unscale::<B> {
            grads,
            inv_scale: 1.0 / self.scale,
            finite:    true,
            _backend:  PhantomData,
        };
        module.visit(&mut visitor);
        (visitor.grads, visitor.finite)
    }

    /// Adjust the scale after a step; `grads_finite` from `unscale`.
    pub fn update(&mut self, grads_finite: bool) {
        if !self.enabled {
            return;
        }

        if grads_finite {
            self.growth_tracker += 1;
            if self.growth_tracker >= GROWTH_INTERVAL {
                self.scale *= GROWTH_FACTOR;
                self.growth_tracker = 0;
            }
        } else {
            self.overflow_count += 1;
            self.scale *= BACKOFF_FACTOR;
            self.growth_tracker = 0;
            tracing::debug!("Gradient overflow, loss scale reduced to {}", self.scale);
        }
    }
}

/// True when no element of `tensor` is NaN or infinite.
pub fn all_finite<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> bool {
    tensor.to_data().iter::<f64>().all(f64::is_finite)
}

struct Unscale<B: AutodiffBackend> {
    grads:     GradientsParams,
    inv_scale: f64,
    finite:    bool,
    _backend:  PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Unscale<B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) else {
            return;
        };
        let grad = grad.mul_scalar(self.inv_scale);
        if self.finite && !all_finite(&grad) {
            self.finite = false;
        }
        self.grads.register::<B::InnerBackend, D>(id, grad);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = Autodiff<NdArray>;

    fn linear() -> Linear<TestBackend> {
        LinearConfig::new(2, 1).init(&Default::default())
    }

    fn grads_for(model: &Linear<TestBackend>, scaler: &GradScaler) -> GradientsParams {
        let x = Tensor::<TestBackend, 2>::ones([3, 2], &Default::default());
        let loss = scaler.scale_loss(model.forward(x).sum());
        GradientsParams::from_grads(loss.backward(), model)
    }

    fn weight_grad(grads: &GradientsParams, model: &Linear<TestBackend>) -> Vec<f32> {
        grads
            .get::<NdArray, 2>(model.weight.id)
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap()
    }

    #[test]
    fn test_unscale_recovers_plain_gradients() {
        let model  = linear();
        let plain  = grads_for(&model, &GradScaler::new(false));
        let scaler = GradScaler::new(true);
        let (unscaled, finite) = scaler.unscale(grads_for(&model, &scaler), &model);
        assert!(finite);

        for (a, b) in weight_grad(&plain, &model).iter().zip(weight_grad(&unscaled, &model)) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_large_finite_gradients_are_not_overflow() {
        let device = Default::default();
        // The f32 sum of these is +inf, yet every element is finite.
        let big = Tensor::<NdArray, 1>::from_floats([3.0e38, 3.0e38, 3.0e38], &device);
        assert!(!big.clone().sum().into_scalar().is_finite());
        assert!(all_finite(&big));

        let nan = Tensor::<NdArray, 1>::from_floats([1.0, f32::NAN], &device);
        let inf = Tensor::<NdArray, 2>::from_floats([[0.0, f32::NEG_INFINITY]], &device);
        assert!(!all_finite(&nan));
        assert!(!all_finite(&inf));
    }

    #[test]
    fn test_unscale_flags_nan_gradient() {
        let model  = linear();
        let scaler = GradScaler::new(true);
        let mut grads = grads_for(&model, &scaler);
        let nan = Tensor::<NdArray, 2>::from_floats([[f32::NAN], [1.0]], &Default::default());
        grads.register::<NdArray, 2>(model.weight.id, nan);

        let (_, finite) = scaler.unscale(grads, &model);
        assert!(!finite);
    }

    #[test]
    fn test_disabled_is_pass_through() {
        let scaler = GradScaler::new(false);
        assert_eq!(scaler.scale(), 1.0);
        let loss = Tensor::<NdArray, 1>::from_floats([2.5], &Default::default());
        assert_eq!(scaler.scale_loss(loss).into_scalar(), 2.5);

        let mut scaler = scaler;
        scaler.update(false);
        assert_eq!(scaler.scale(), 1.0);
        assert_eq!(scaler.overflow_count(), 0);
    }

    #[test]
    fn test_backoff_on_overflow() {
        let mut scaler = GradScaler::new(true);
        scaler.update(false);
        assert_eq!(scaler.scale(), INITIAL_SCALE * BACKOFF_FACTOR);
        assert_eq!(scaler.overflow_count(), 1);
    }

    #[test]
    fn test_growth_after_interval() {
        let mut scaler = GradScaler::new(true);
        for _ in 0..GROWTH_INTERVAL - 1 {
            scaler.update(true);
        }
        assert_eq!(scaler.scale(), INITIAL_SCALE);
        scaler.update(true);
        assert_eq!(scaler.scale(), INITIAL_SCALE * GROWTH_FACTOR);
    }

    #[test]
    fn test_overflow_resets_growth_tracker() {
        let mut scaler = GradScaler::new(true);
        for _ in 0..GROWTH_INTERVAL - 1 {
            scaler.update(true);
        }
        scaler.update(false);
        scaler.update(true);
        assert_eq!(scaler.scale(), INITIAL_SCALE * BACKOFF_FACTOR);
    }
}
