use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, linalg};

use super::ActFn;
use crate::{MlErr, Result};

/// A fully connected layer with an optional activation.
///
/// Its parameters are the `dim.0 x dim.1` weights in row-major order followed by
/// the `dim.1` biases.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs.
    /// * `act_fn` - The activation applied to the outputs, if any.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            act_fn,
            x: Array2::zeros((0, dim.0)),
            z: Array2::zeros((0, dim.1)),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        (self.dim.0 + 1) * self.dim.1
    }

    /// Computes the layer output for a batch, caching what `backward` needs.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = x.dot(&w);
        z += &b;

        self.x = x.to_owned();

        let a = match &self.act_fn {
            Some(act_fn) => z.mapv(|v| act_fn.f(v)),
            None => z.clone(),
        };

        self.z = z;
        Ok(a)
    }

    /// Adds this layer's gradient into `grad` and returns the derivative of the
    /// loss with respect to the layer input.
    ///
    /// # Arguments
    /// * `params` - The layer parameters used in the last forward pass.
    /// * `grad` - The layer slice of the gradient buffer.
    /// * `d` - The derivative of the loss with respect to the layer output.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if d.dim() != self.z.dim() {
            return Err(MlErr::SizeMismatch {
                what: "dense output delta",
                got: d.len(),
                expected: self.z.len(),
            });
        }

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1., &self.x.t(), &d, 1., &mut dw);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len(params.len())?;

        let (w, b) = params.split_at(self.dim.0 * self.dim.1);
        Ok((
            ArrayView2::from_shape(self.dim, w)?,
            ArrayView1::from_shape(self.dim.1, b)?,
        ))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len(grad.len())?;

        let (dw, db) = grad.split_at_mut(self.dim.0 * self.dim.1);
        Ok((
            ArrayViewMut2::from_shape(self.dim, dw)?,
            ArrayViewMut1::from_shape(self.dim.1, db)?,
        ))
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "dense parameters",
                got: len,
                expected: self.size(),
            });
        }

        Ok(())
    }
}
