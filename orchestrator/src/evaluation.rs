use machine_learning::dataset::Dataset;

use crate::{
    aggregation::GlobalModel,
    error::{FederationError, Result},
    model::LocalModel,
};

/// Scores the global model against the shared test set.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvaluationService;

impl EvaluationService {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates `global` over `test_set` without modifying either.
    ///
    /// # Returns
    /// The accuracy in `[0, 1]`, or `NotInitialized` if either is missing.
    pub fn evaluate<M: LocalModel>(
        &self,
        global: Option<&GlobalModel<M>>,
        test_set: Option<&Dataset>,
    ) -> Result<f32> {
        let (Some(global), Some(test_set)) = (global, test_set) else {
            return Err(FederationError::NotInitialized);
        };

        let evaluation = global.model().evaluate(test_set)?;
        Ok(evaluation.accuracy)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn, array};

    use super::*;
    use crate::{
        aggregation::AggregationEngine,
        testing::{MockFactory, MockModel},
    };

    fn global(factory: &MockFactory) -> GlobalModel<MockModel> {
        let params = vec![ArrayD::zeros(IxDyn(&[2, 3])), ArrayD::zeros(IxDyn(&[3]))];
        AggregationEngine::new().build_global(&params, factory, 1).unwrap()
    }

    #[test]
    fn scores_the_global_model() {
        let factory = MockFactory::new(0.5);
        let test_set = Dataset::from_labels(array![[0., 1.], [1., 0.]], &[0, 1], 2).unwrap();

        let accuracy = EvaluationService::new()
            .evaluate(Some(&global(&factory)), Some(&test_set))
            .unwrap();
        assert_eq!(accuracy, 0.5);
    }

    #[test]
    fn needs_both_a_model_and_a_test_set() {
        let factory = MockFactory::new(0.5);
        let test_set = Dataset::from_labels(array![[0., 1.]], &[0], 2).unwrap();
        let service = EvaluationService::new();

        assert!(matches!(
            service.evaluate(Some(&global(&factory)), None),
            Err(FederationError::NotInitialized)
        ));
        assert!(matches!(
            service.evaluate::<MockModel>(None, Some(&test_set)),
            Err(FederationError::NotInitialized)
        ));
    }
}
