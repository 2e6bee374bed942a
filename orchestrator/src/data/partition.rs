use std::{fmt, str::FromStr};

use machine_learning::dataset::{Dataset, one_hot};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// How the samples are spread among clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionMode {
    /// Every client sees every class.
    #[default]
    Iid,
    /// Every client sees a couple of classes only.
    NonIid,
}

impl PartitionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iid => "iid",
            Self::NonIid => "non-iid",
        }
    }
}

impl fmt::Display for PartitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iid" => Ok(Self::Iid),
            "non-iid" => Ok(Self::NonIid),
            other => Err(format!("unknown partition mode: {other}")),
        }
    }
}

/// The shape every client partition must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataShape {
    pub train_len: usize,
    pub test_len: usize,
    pub features: usize,
    pub classes: usize,
}

impl Default for DataShape {
    fn default() -> Self {
        Self {
            train_len: 1000,
            test_len: 100,
            features: 784,
            classes: 10,
        }
    }
}

/// A client partition as it's stored: raw pixel rows in `0..=255` and integer labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPartition {
    pub x_train: Vec<Vec<f32>>,
    pub y_train: Vec<i64>,
    pub x_test: Vec<Vec<f32>>,
    pub y_test: Vec<i64>,
}

/// A client's private train and test split, ready for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub train: Dataset,
    pub test: Dataset,
}

impl RawPartition {
    /// Validates the partition against `shape` and builds its datasets, normalizing the
    /// pixels into `[0, 1]` and one-hot encoding the labels.
    ///
    /// # Returns
    /// The partition or the first shape violation found, checked before building anything.
    pub fn into_partition(self, shape: &DataShape) -> Result<Partition, DataError> {
        let train = Split {
            x_field: "x_train",
            y_field: "y_train",
            x: self.x_train,
            y: self.y_train,
            len: shape.train_len,
        };

        let test = Split {
            x_field: "x_test",
            y_field: "y_test",
            x: self.x_test,
            y: self.y_test,
            len: shape.test_len,
        };

        train.validate(shape)?;
        test.validate(shape)?;

        Ok(Partition {
            train: train.into_dataset(shape)?,
            test: test.into_dataset(shape)?,
        })
    }
}

struct Split {
    x_field: &'static str,
    y_field: &'static str,
    x: Vec<Vec<f32>>,
    y: Vec<i64>,
    len: usize,
}

impl Split {
    fn validate(&self, shape: &DataShape) -> Result<(), DataError> {
        check_len(self.x_field, self.x.len(), self.len)?;
        check_len(self.y_field, self.y.len(), self.len)?;

        for row in &self.x {
            check_len(self.x_field, row.len(), shape.features)?;
        }

        for (index, &value) in self.y.iter().enumerate() {
            if value < 0 || value as usize >= shape.classes {
                return Err(DataError::Label {
                    field: self.y_field,
                    index,
                    value,
                    classes: shape.classes,
                });
            }
        }

        Ok(())
    }

    fn into_dataset(self, shape: &DataShape) -> Result<Dataset, DataError> {
        let shape_err = |got| DataError::Shape {
            field: self.x_field,
            got,
            expected: self.len * shape.features,
        };

        let flat: Vec<f32> = self.x.into_iter().flatten().map(|px| px / 255.).collect();
        let got = flat.len();
        let x = Array2::from_shape_vec((self.len, shape.features), flat)
            .map_err(|_| shape_err(got))?;

        let labels: Vec<usize> = self.y.iter().map(|&label| label as usize).collect();
        let y = one_hot(&labels, shape.classes).map_err(|_| shape_err(got))?;

        Dataset::new(x, y).map_err(|_| shape_err(got))
    }
}

fn check_len(field: &'static str, got: usize, expected: usize) -> Result<(), DataError> {
    if got != expected {
        return Err(DataError::Shape {
            field,
            got,
            expected,
        });
    }

    Ok(())
}
