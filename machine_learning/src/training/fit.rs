use std::{iter::FusedIterator, num::NonZeroUsize};

use super::Evaluation;
use crate::{MlErr, Result, arch::Sequential, dataset::Dataset};

/// What a `Fit` yields at the end of every epoch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochEnd {
    /// 1-based.
    pub epoch: usize,
    pub loss: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

/// A running fit of a `Sequential` model.
///
/// Each call to `next` trains one epoch and evaluates the validation set, so dropping the
/// sequence early stops the training. It ends after the last epoch or after the first error.
pub struct Fit<'a> {
    model: &'a mut Sequential,
    train: &'a Dataset,
    validation: &'a Dataset,
    epochs: usize,
    batch_size: usize,
    epoch: usize,
    failed: bool,
}

impl<'a> Fit<'a> {
    pub(crate) fn new(
        model: &'a mut Sequential,
        train: &'a Dataset,
        validation: &'a Dataset,
        epochs: NonZeroUsize,
        batch_size: NonZeroUsize,
    ) -> Self {
        Self {
            model,
            train,
            validation,
            epochs: epochs.get(),
            batch_size: batch_size.get(),
            epoch: 0,
            failed: false,
        }
    }

    fn step(&mut self) -> Result<EpochEnd> {
        let loss = self.model.train_epoch(self.train, self.batch_size)?;
        if !loss.is_finite() {
            return Err(MlErr::NonFinite { epoch: self.epoch });
        }

        let Evaluation { loss: val_loss, accuracy } = self.model.evaluate(self.validation)?;

        Ok(EpochEnd {
            epoch: self.epoch,
            loss,
            val_loss,
            val_accuracy: accuracy,
        })
    }
}

impl Iterator for Fit<'_> {
    type Item = Result<EpochEnd>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.epoch >= self.epochs {
            return None;
        }

        self.epoch += 1;
        let result = self.step();
        self.failed = result.is_err();
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }

        let remaining = self.epochs - self.epoch;
        (0, Some(remaining))
    }
}

impl FusedIterator for Fit<'_> {}
