//! Gradient clipping by the norm over all parameters together.
//!
//! Optimizer-level clipping in burn works per tensor; here every float
//! parameter's gradient is scaled by the same factor so the joint L2 norm
//! stays at or below the threshold.

use burn::module::{Module, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use std::marker::PhantomData;

const EPSILON: f64 = 1e-6;

/// L2 norm of all gradients registered for `module`'s float parameters.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let mut visitor = SquaredNorm::<B> {
        grads,
        sum: 0.0,
        _backend: PhantomData,
    };
    module.visit(&mut visitor);
    visitor.sum.sqrt()
}

/// Scale every gradient so the joint norm is at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_global_norm<B, M>(module: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let norm = global_grad_norm::<B, M>(module, grads);
    if norm > max_norm {
        let mut visitor = Scale::<B> {
            grads,
            factor: max_norm / (norm + EPSILON),
            _backend: PhantomData,
        };
        module.visit(&mut visitor);
    }
    norm
}

struct SquaredNorm<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    sum: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum += (grad.clone() * grad).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Scale<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    factor: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Scale<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::Param;

    type TestBackend = Autodiff<NdArray<f32>>;
    type Inner = NdArray<f32>;

    #[derive(Module, Debug)]
    struct TwoWeights<B: Backend> {
        a: Param<Tensor<B, 1>>,
        b: Param<Tensor<B, 1>>,
    }

    fn setup(ga: [f32; 2], gb: [f32; 2]) -> (TwoWeights<TestBackend>, GradientsParams) {
        let device = Default::default();
        let module = TwoWeights::<TestBackend> {
            a: Param::from_tensor(Tensor::zeros([2], &device)),
            b: Param::from_tensor(Tensor::zeros([2], &device)),
        };
        let mut grads = GradientsParams::new();
        grads.register::<Inner, 1>(module.a.id, Tensor::from_floats(ga, &device));
        grads.register::<Inner, 1>(module.b.id, Tensor::from_floats(gb, &device));
        (module, grads)
    }

    #[test]
    fn test_joint_norm_is_bounded() {
        // Each gradient has norm 0.9, jointly about 1.27
        let (module, mut grads) = setup([0.9, 0.0], [0.0, 0.9]);

        let before = clip_global_norm::<TestBackend, _>(&module, &mut grads, 1.0);
        assert!((before - (2.0f64 * 0.81).sqrt()).abs() < 1e-5);

        let after = global_grad_norm::<TestBackend, _>(&module, &grads);
        assert!(after <= 1.0, "joint norm {after} exceeds 1.0");
        assert!(after > 0.99);
    }

    #[test]
    fn test_direction_is_preserved() {
        let (module, mut grads) = setup([3.0, 0.0], [0.0, 4.0]);
        clip_global_norm::<TestBackend, _>(&module, &mut grads, 1.0);

        let a = grads.get::<Inner, 1>(module.a.id).unwrap().into_data();
        let b = grads.get::<Inner, 1>(module.b.id).unwrap().into_data();
        a.assert_approx_eq(&TensorData::from([0.6f32, 0.0]), 4);
        b.assert_approx_eq(&TensorData::from([0.0f32, 0.8]), 4);
    }

    #[test]
    fn test_small_gradients_untouched() {
        let (module, mut grads) = setup([0.3, 0.0], [0.0, 0.4]);
        let norm = clip_global_norm::<TestBackend, _>(&module, &mut grads, 1.0);
        assert!((norm - 0.5).abs() < 1e-5);

        let a = grads.get::<Inner, 1>(module.a.id).unwrap().into_data();
        a.assert_approx_eq(&TensorData::from([0.3f32, 0.0]), 6);
    }
}
