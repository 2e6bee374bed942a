use std::{num::NonZeroUsize, ops::Range};

use ndarray::{ArrayD, IxDyn, prelude::*};
use rand::rngs::StdRng;

use super::{layers::Dense, loss::LossFn};
use crate::{
    MlErr, Result,
    dataset::Dataset,
    optimization::{Optimizer, OptimizerSpec},
    training::{Evaluation, Fit},
};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The model owns one flat buffer of parameters, each layer reads the range given by its offset.
pub struct Sequential {
    layers: Vec<Dense>,
    offsets: Vec<Range<usize>>,
    params: Vec<f32>,
    grad: Vec<f32>,
    loss_fn: Box<dyn LossFn + Send + Sync>,
    optimizer: Option<Box<dyn Optimizer + Send + Sync>>,
    rng: StdRng,
}

impl Sequential {
    pub(super) fn new(
        layers: Vec<Dense>,
        params: Vec<f32>,
        loss_fn: Box<dyn LossFn + Send + Sync>,
        rng: StdRng,
    ) -> Result<Self> {
        let mut offsets = Vec::with_capacity(layers.len());
        let mut start = 0;

        for layer in &layers {
            offsets.push(start..start + layer.size());
            start += layer.size();
        }

        if params.len() != start {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: params.len(),
                expected: start,
            });
        }

        Ok(Self {
            layers,
            offsets,
            grad: vec![0.; start],
            params,
            loss_fn,
            optimizer: None,
            rng,
        })
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.params.len()
    }

    /// The amount of features the model expects per sample.
    pub fn input(&self) -> usize {
        self.layers.first().map(|layer| layer.dim().0).unwrap_or_default()
    }

    /// The amount of values the model outputs per sample.
    pub fn output(&self) -> usize {
        self.layers.last().map(|layer| layer.dim().1).unwrap_or_default()
    }

    pub fn is_compiled(&self) -> bool {
        self.optimizer.is_some()
    }

    /// Prepares the model for training, replacing any previous optimizer state.
    ///
    /// # Arguments
    /// * `learning_rate` - The step size of the optimizer.
    /// * `spec` - Which optimizer to use.
    ///
    /// # Returns
    /// An error if any hyperparameter is invalid, in which case the model is left untouched.
    pub fn compile(&mut self, learning_rate: f32, spec: OptimizerSpec) -> Result<()> {
        self.optimizer = Some(spec.build(self.size(), learning_rate)?);
        Ok(())
    }

    /// Fits the model to `train`, lazily, one epoch per item of the returned sequence.
    ///
    /// # Arguments
    /// * `train` - The data to learn from, shuffled every epoch.
    /// * `validation` - The data evaluated after every epoch.
    /// * `epochs` - How many passes over `train` to make.
    /// * `batch_size` - How many samples go into every optimizer step.
    ///
    /// # Returns
    /// The epoch sequence, or an error if the model isn't compiled or the data doesn't fit it.
    pub fn fit<'a>(
        &'a mut self,
        train: &'a Dataset,
        validation: &'a Dataset,
        epochs: NonZeroUsize,
        batch_size: NonZeroUsize,
    ) -> Result<Fit<'a>> {
        if !self.is_compiled() {
            return Err(MlErr::NotCompiled);
        }

        self.check_dataset(train)?;
        self.check_dataset(validation)?;

        Ok(Fit::new(self, train, validation, epochs, batch_size))
    }

    /// Makes one pass over `train`, taking an optimizer step per batch.
    ///
    /// # Returns
    /// The mean of the batch losses.
    pub(crate) fn train_epoch(&mut self, train: &Dataset, batch_size: usize) -> Result<f32> {
        let Self {
            layers,
            offsets,
            params,
            grad,
            loss_fn,
            optimizer,
            rng,
        } = self;

        let optimizer = optimizer.as_mut().ok_or(MlErr::NotCompiled)?;
        let mut total_loss = 0.;
        let mut num_batches = 0;

        for (x, y) in train.shuffled_batches(batch_size, rng) {
            let mut out = x.view();
            for (layer, range) in layers.iter_mut().zip(offsets.iter()) {
                out = layer.forward(&params[range.clone()], out)?;
            }

            total_loss += loss_fn.loss(out, y.view());
            let mut d_last = loss_fn.loss_prime(out, y.view());
            let mut d = d_last.view_mut();

            for (layer, range) in layers.iter_mut().zip(offsets.iter()).rev() {
                d = layer.backward(&params[range.clone()], &mut grad[range.clone()], d)?;
            }

            optimizer.update_params(grad.as_slice(), params.as_mut_slice())?;
            num_batches += 1;
        }

        Ok(total_loss / num_batches.max(1) as f32)
    }

    /// Computes the model's output for a batch of samples.
    pub fn predict(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.input() {
            return Err(MlErr::SizeMismatch {
                what: "features",
                got: x.ncols(),
                expected: self.input(),
            });
        }

        let mut out = x.to_owned();
        for (layer, range) in self.layers.iter().zip(&self.offsets) {
            out = layer.infer(&self.params[range.clone()], out.view())?;
        }

        Ok(out)
    }

    /// Evaluates the model over a dataset.
    ///
    /// # Returns
    /// The mean loss and the fraction of samples whose highest scored class is the target's.
    pub fn evaluate(&self, data: &Dataset) -> Result<Evaluation> {
        self.check_dataset(data)?;

        let y_pred = self.predict(data.x())?;
        let loss = self.loss_fn.loss(y_pred.view(), data.y());

        let hits = y_pred
            .rows()
            .into_iter()
            .zip(data.y().rows())
            .filter(|(pred, target)| argmax(*pred) == argmax(*target))
            .count();

        Ok(Evaluation {
            loss,
            accuracy: hits as f32 / data.len() as f32,
        })
    }

    /// The parameters split per layer as a kernel tensor followed by a bias tensor.
    pub fn weights(&self) -> Result<Vec<ArrayD<f32>>> {
        let mut tensors = Vec::with_capacity(2 * self.layers.len());

        for (layer, range) in self.layers.iter().zip(&self.offsets) {
            let mut params = &self.params[range.clone()];

            for shape in layer.tensor_shapes() {
                let (tensor, rest) = params.split_at(shape.iter().product());
                tensors.push(ArrayD::from_shape_vec(IxDyn(&shape), tensor.to_vec())?);
                params = rest;
            }
        }

        Ok(tensors)
    }

    /// Replaces every parameter, in the same order `weights` returns them.
    ///
    /// # Returns
    /// An error if the amount of tensors or any of their shapes differ from the model's, in
    /// which case no parameter is modified.
    pub fn set_weights(&mut self, tensors: &[ArrayD<f32>]) -> Result<()> {
        let expected: Vec<Vec<usize>> = self
            .layers
            .iter()
            .flat_map(|layer| layer.tensor_shapes())
            .collect();

        if tensors.len() != expected.len() {
            return Err(MlErr::SizeMismatch {
                what: "tensors",
                got: tensors.len(),
                expected: expected.len(),
            });
        }

        for (i, (tensor, shape)) in tensors.iter().zip(&expected).enumerate() {
            if tensor.shape() != shape.as_slice() {
                return Err(MlErr::ShapeMismatch {
                    tensor: i,
                    got: tensor.shape().to_vec(),
                    expected: shape.clone(),
                });
            }
        }

        self.params.clear();
        for tensor in tensors {
            self.params.extend(tensor.iter().copied());
        }

        Ok(())
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    fn check_dataset(&self, data: &Dataset) -> Result<()> {
        if data.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        if data.features() != self.input() {
            return Err(MlErr::SizeMismatch {
                what: "features",
                got: data.features(),
                expected: self.input(),
            });
        }

        if data.classes() != self.output() {
            return Err(MlErr::SizeMismatch {
                what: "classes",
                got: data.classes(),
                expected: self.output(),
            });
        }

        Ok(())
    }
}

fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 { (i, v) } else { best }
        })
        .0
}
