//! Content, style and total-variation losses as differentiable scalars.

use burn::tensor::Tensor;

use crate::model::{Activation, Backend};

/// A one-element loss tensor that gradients can flow back from.
pub type Scalar = Tensor<Backend, 1>;

/// Content loss of one layer: `sum((x - p)^2) / (2 * sqrt(d) * sqrt(h * w))`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn content_layer_loss(reference: &Activation, current: &Activation) -> Scalar {
    let [_, d, h, w] = reference.dims();
    let k = 1.0 / (2.0 * (d as f64).sqrt() * ((h * w) as f64).sqrt());

    let diff = current.clone() - reference.clone();
    (diff.clone() * diff).sum().mul_scalar(k)
}

/// Gram matrix `F F^T` of an activation reshaped to `(d, h * w)`.
#[must_use]
pub fn gram_matrix(activation: &Activation) -> Tensor<Backend, 2> {
    let [_, d, h, w] = activation.dims();
    let features = activation.clone().reshape([d, h * w]);
    features.clone().matmul(features.transpose())
}

/// Style loss of one layer: `sum((G(x) - A)^2) / (4 * d^2 * (h * w)^2)`.
///
/// `target` is the Gram matrix of the reference activation.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn style_layer_loss(target: &Tensor<Backend, 2>, current: &Activation) -> Scalar {
    let [_, d, h, w] = current.dims();
    let m = (h * w) as f64;
    let n = d as f64;
    let c = 1.0 / (4.0 * n * n * m * m);

    let diff = gram_matrix(current) - target.clone();
    (diff.clone() * diff).sum().mul_scalar(c)
}

/// Anisotropic total variation: summed absolute differences between
/// vertically and horizontally adjacent pixels over all channels.
///
/// The subgradient of `|0|` is zero.
#[must_use]
pub fn total_variation(image: &Activation) -> Scalar {
    let [n, c, h, w] = image.dims();
    let mut total = Tensor::zeros([1], &image.device());

    if h > 1 {
        let lower = image.clone().slice([0..n, 0..c, 1..h, 0..w]);
        let upper = image.clone().slice([0..n, 0..c, 0..h - 1, 0..w]);
        total = total + (lower - upper).abs().sum();
    }
    if w > 1 {
        let right = image.clone().slice([0..n, 0..c, 0..h, 1..w]);
        let left = image.clone().slice([0..n, 0..c, 0..h, 0..w - 1]);
        total = total + (right - left).abs().sum();
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use burn::tensor::{backend, TensorData};
    use rand::{Rng, SeedableRng};

    fn tensor(shape: [usize; 4], values: Vec<f64>) -> Activation {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn random(shape: [usize; 4], seed: u64) -> Activation {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let len = shape.iter().product();
        tensor(shape, (0..len).map(|_| rng.random_range(-2.0..2.0)).collect())
    }

    fn values<B: backend::Backend, const D: usize>(t: Tensor<B, D>) -> Vec<f64> {
        t.into_data().convert::<f64>().to_vec::<f64>().unwrap()
    }

    #[test]
    fn test_content_loss_zero_when_equal() {
        let p = random([1, 5, 4, 3], 1);
        assert_eq!(content_layer_loss(&p, &p).into_scalar(), 0.0);
    }

    #[test]
    fn test_content_loss_normalisation() {
        // h * w = 4, d = 4 -> k = 1 / (2 * 2 * 2)
        let p = tensor([1, 4, 2, 2], vec![0.0; 16]);
        let x = tensor([1, 4, 2, 2], vec![1.0; 16]);

        assert_abs_diff_eq!(content_layer_loss(&p, &x).into_scalar(), 16.0 / 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_content_loss_gradient_is_scaled_difference() {
        let p = random([1, 2, 3, 4], 2);
        let x = random([1, 2, 3, 4], 3).require_grad();

        let loss = content_layer_loss(&p, &x);
        assert!(loss.clone().into_scalar() > 0.0);

        // d/dx k * sum((x - p)^2) = 2k (x - p), k = 1 / (2 * sqrt(2) * sqrt(12))
        let grads = loss.backward();
        let k = 1.0 / (2.0 * 2.0_f64.sqrt() * 12.0_f64.sqrt());
        let expected = values((x.clone() - p).mul_scalar(2.0 * k));
        for (g, e) in values(x.grad(&grads).unwrap()).iter().zip(&expected) {
            assert_abs_diff_eq!(g, e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gram_is_symmetric() {
        let gram = values(gram_matrix(&random([1, 6, 5, 3], 4)));

        assert_eq!(gram.len(), 36);
        for i in 0..6 {
            for j in 0..6 {
                assert_abs_diff_eq!(gram[i * 6 + j], gram[j * 6 + i], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_gram_is_spatially_invariant() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let data: Vec<f64> = (0..24).map(|_| rng.random_range(-2.0..2.0)).collect();

        // swap pixel (0, 0) with pixel (1, 2) in every channel of a 2x3 map
        let mut shuffled = data.clone();
        for c in 0..4 {
            shuffled.swap(c * 6, c * 6 + 5);
        }

        let a = values(gram_matrix(&tensor([1, 4, 2, 3], data)));
        let b = values(gram_matrix(&tensor([1, 4, 2, 3], shuffled)));
        for (u, v) in a.iter().zip(&b) {
            assert_abs_diff_eq!(u, v, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_style_loss_zero_when_grams_match() {
        let a = random([1, 3, 4, 4], 6);
        let loss = style_layer_loss(&gram_matrix(&a), &a);

        assert_abs_diff_eq!(loss.into_scalar(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_style_loss_gradient() {
        let target = gram_matrix(&random([1, 2, 3, 3], 7));
        let mut rng = rand::rngs::StdRng::seed_from_u64(8);
        let data: Vec<f64> = (0..18).map(|_| rng.random_range(-2.0..2.0)).collect();

        let x = tensor([1, 2, 3, 3], data.clone()).require_grad();
        let loss = style_layer_loss(&target, &x);
        assert!(loss.clone().into_scalar() > 0.0);
        let analytic = values(x.grad(&loss.backward()).unwrap());

        let h = 1e-5;
        for index in [0, 7, 13] {
            let mut plus = data.clone();
            plus[index] += h;
            let mut minus = data.clone();
            minus[index] -= h;
            let numeric = (style_layer_loss(&target, &tensor([1, 2, 3, 3], plus)).into_scalar()
                - style_layer_loss(&target, &tensor([1, 2, 3, 3], minus)).into_scalar())
                / (2.0 * h);
            assert_abs_diff_eq!(analytic[index], numeric, epsilon = 1e-6 * (1.0 + numeric.abs()));
        }
    }

    #[test]
    fn test_total_variation() {
        let image = tensor([1, 1, 2, 2], vec![0.0, 1.0, 3.0, 7.0]).require_grad();
        let tv = total_variation(&image);

        // vertical: |3-0| + |7-1|, horizontal: |1-0| + |7-3|
        assert_abs_diff_eq!(tv.clone().into_scalar(), 14.0);
        let grads = tv.backward();
        assert_eq!(values(image.grad(&grads).unwrap()), vec![-2.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_total_variation_of_constant_is_zero() {
        let image = tensor([1, 3, 5, 4], vec![9.0; 60]).require_grad();
        let tv = total_variation(&image);

        assert_eq!(tv.clone().into_scalar(), 0.0);
        let grads = tv.backward();
        assert!(values(image.grad(&grads).unwrap()).iter().all(|g| *g == 0.0));
    }

    #[test]
    fn test_total_variation_of_single_row() {
        let image = tensor([1, 1, 1, 3], vec![1.0, 4.0, 2.0]);
        assert_abs_diff_eq!(total_variation(&image).into_scalar(), 5.0);
    }
}
