use ndarray::prelude::*;

use super::{Relu, Softmax};

#[derive(Clone, Copy, Debug)]
pub enum ActFn {
    Relu(Relu),
    Softmax(Softmax),
}

impl ActFn {
    pub fn relu() -> Self {
        Self::Relu(Relu::new())
    }

    pub fn softmax() -> Self {
        Self::Softmax(Softmax::new())
    }

    /// Writes the activation of `z` into `a`, both must have the same shape.
    pub fn forward(&self, z: ArrayView2<f32>, mut a: ArrayViewMut2<f32>) {
        match self {
            Self::Relu(f) => a.zip_mut_with(&z, |a, &z| *a = f.f(z)),
            Self::Softmax(f) => {
                a.assign(&z);
                f.apply(a);
            }
        }
    }

    /// Multiplies the incoming delta by the derivative of the activation at `z`.
    pub fn backward(&self, z: ArrayView2<f32>, mut d: ArrayViewMut2<f32>) {
        match self {
            Self::Relu(f) => d.zip_mut_with(&z, |d, &z| *d *= f.df(z)),
            Self::Softmax(_) => {}
        }
    }
}
