use ndarray::{Axis, concatenate, prelude::*};
use rand::{Rng, seq::SliceRandom};

use crate::{MlErr, Result};

/// An in memory dataset, one sample per row of `x` with its one-hot target in the same row of `y`.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    x: Array2<f32>,
    y: Array2<f32>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `x` - The samples.
    /// * `y` - The targets.
    ///
    /// # Returns
    /// A new `Dataset` instance or an error if the amount of samples and targets differ.
    pub fn new(x: Array2<f32>, y: Array2<f32>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(MlErr::SizeMismatch {
                what: "dataset targets",
                got: y.nrows(),
                expected: x.nrows(),
            });
        }

        Ok(Self { x, y })
    }

    /// Creates a new `Dataset` from integer labels, one-hot encoding them.
    ///
    /// # Arguments
    /// * `x` - The samples.
    /// * `labels` - One label per sample, each in `0..classes`.
    /// * `classes` - The amount of classes.
    pub fn from_labels(x: Array2<f32>, labels: &[usize], classes: usize) -> Result<Self> {
        let y = one_hot(labels, classes)?;
        Self::new(x, y)
    }

    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn features(&self) -> usize {
        self.x.ncols()
    }

    pub fn classes(&self) -> usize {
        self.y.ncols()
    }

    pub fn x(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView2<'_, f32> {
        self.y.view()
    }

    /// Stacks several datasets one after the other, keeping their order.
    ///
    /// # Arguments
    /// * `parts` - The datasets to join, they must agree on features and classes.
    ///
    /// # Returns
    /// The concatenation or an error if `parts` is empty or their widths differ.
    pub fn concat(parts: &[&Dataset]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(MlErr::EmptyDataset);
        };

        for part in parts {
            if part.features() != first.features() {
                return Err(MlErr::SizeMismatch {
                    what: "dataset features",
                    got: part.features(),
                    expected: first.features(),
                });
            }

            if part.classes() != first.classes() {
                return Err(MlErr::SizeMismatch {
                    what: "dataset classes",
                    got: part.classes(),
                    expected: first.classes(),
                });
            }
        }

        let xs: Vec<_> = parts.iter().map(|part| part.x.view()).collect();
        let ys: Vec<_> = parts.iter().map(|part| part.y.view()).collect();

        Self::new(concatenate(Axis(0), &xs)?, concatenate(Axis(0), &ys)?)
    }

    /// Splits a shuffled permutation of the rows into batches.
    ///
    /// # Arguments
    /// * `batch_size` - The maximum amount of rows per batch, the last one may be smaller.
    /// * `rng` - The random source used to shuffle.
    ///
    /// # Returns
    /// An iterator over owned `(x, y)` batches.
    pub fn shuffled_batches<'a, R: Rng>(
        &'a self,
        batch_size: usize,
        rng: &mut R,
    ) -> impl Iterator<Item = (Array2<f32>, Array2<f32>)> + use<'a, R> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);

        let batch_size = batch_size.max(1);
        let batches: Vec<Vec<usize>> = order.chunks(batch_size).map(<[usize]>::to_vec).collect();

        batches.into_iter().map(move |rows| {
            (
                self.x.select(Axis(0), &rows),
                self.y.select(Axis(0), &rows),
            )
        })
    }
}

/// One-hot encodes `labels` into a `(labels.len(), classes)` matrix.
pub fn one_hot(labels: &[usize], classes: usize) -> Result<Array2<f32>> {
    let mut y = Array2::zeros((labels.len(), classes));

    for (i, &label) in labels.iter().enumerate() {
        if label >= classes {
            return Err(MlErr::SizeMismatch {
                what: "label",
                got: label,
                expected: classes,
            });
        }

        y[[i, label]] = 1.;
    }

    Ok(y)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn one_hot_sets_a_single_column() {
        let y = one_hot(&[2, 0], 3).unwrap();
        assert_eq!(y, array![[0., 0., 1.], [1., 0., 0.]]);
        assert!(one_hot(&[3], 3).is_err());
    }

    #[test]
    fn concat_keeps_order() {
        let a = Dataset::from_labels(array![[1., 1.]], &[0], 2).unwrap();
        let b = Dataset::from_labels(array![[2., 2.], [3., 3.]], &[1, 1], 2).unwrap();

        let joined = Dataset::concat(&[&a, &b]).unwrap();
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.x().column(0).to_vec(), vec![1., 2., 3.]);
        assert_eq!(joined.y().row(0).to_vec(), vec![1., 0.]);
    }

    #[test]
    fn concat_rejects_different_widths() {
        let a = Dataset::from_labels(array![[1., 1.]], &[0], 2).unwrap();
        let b = Dataset::from_labels(array![[1.]], &[0], 2).unwrap();
        assert!(Dataset::concat(&[&a, &b]).is_err());
        assert!(matches!(Dataset::concat(&[]), Err(MlErr::EmptyDataset)));
    }

    #[test]
    fn batches_cover_every_row_once() {
        let x = Array2::from_shape_fn((10, 1), |(i, _)| i as f32);
        let labels = vec![0; 10];
        let dataset = Dataset::from_labels(x, &labels, 1).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let batches: Vec<_> = dataset.shuffled_batches(4, &mut rng).collect();
        assert_eq!(
            batches.iter().map(|(x, _)| x.nrows()).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );

        let mut seen: Vec<f32> = batches.iter().flat_map(|(x, _)| x.iter().copied()).collect();
        seen.sort_by(f32::total_cmp);
        assert_eq!(seen, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }
}
