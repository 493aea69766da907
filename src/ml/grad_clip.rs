// ============================================================
// Layer 5 — Global Gradient Norm Clipping
// ============================================================
// Clips all gradients of a module together:
//
//   total = sqrt(Σ_params ||g||²)
//   coef  = max_norm / (total + 1e-6)
//   g    ← g · coef          when coef < 1
//
// Every parameter shares one coefficient, so the direction of
// the full update is preserved.

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::marker::PhantomData;

/// Clip `grads` of `module` to a global L2 norm of `max_norm`.
///
/// Returns the gradients and the norm measured before clipping.
pub fn clip_grad_norm<B, M>(grads: GradientsParams, module: &M, max_norm: f64) -> (GradientsParams, f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut norm = SquaredNorm::<B> { grads: &grads, total: 0.0, _backend: PhantomData };
    module.visit(&mut norm);
    let total = norm.total.sqrt();

    let coef = max_norm / (total + 1e-6);
    if coef.is_nan() || coef >= 1.0 {
        return (grads, total);
    }

    let mut scale = Scale::<B> { grads, coef, _backend: PhantomData };
    module.visit(&mut scale);
    (scale.grads, total)
}

struct SquaredNorm<'a, B: AutodiffBackend> {
    grads:    &'a GradientsParams,
    total:    f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.total += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Scale<B: AutodiffBackend> {
    grads:    GradientsParams,
    coef:     f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Scale<B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.coef));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = Autodiff<NdArray>;

    fn setup(scale: f32) -> (Linear<TestBackend>, GradientsParams) {
        let model: Linear<TestBackend> = LinearConfig::new(4, 2).init(&Default::default());
        let x = Tensor::<TestBackend, 2>::ones([8, 4], &Default::default()).mul_scalar(scale);
        let grads = model.forward(x).sum().backward();
        let grads = GradientsParams::from_grads(grads, &model);
        (model, grads)
    }

    fn norm_of(model: &Linear<TestBackend>, grads: GradientsParams) -> f64 {
        clip_grad_norm(grads, model, f64::INFINITY).1
    }

    #[test]
    fn test_large_gradients_are_clipped_to_max_norm() {
        let (model, grads) = setup(100.0);
        let (clipped, before) = clip_grad_norm(grads, &model, 1.0);
        assert!(before > 1.0);
        let after = norm_of(&model, clipped);
        assert!((after - 1.0).abs() < 1e-3, "norm after clipping: {after}");
    }

    #[test]
    fn test_small_gradients_untouched() {
        let (model, grads) = setup(0.001);
        let (kept, before) = clip_grad_norm(grads, &model, 1e6);
        assert!((norm_of(&model, kept) - before).abs() < 1e-9);
    }
}
