use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tensorflow::{Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor};
use thiserror::Error;
use tracing::{error, info};

use crate::error::PredictError;
use crate::labels::EyeDisease;
use crate::preprocess::ImageTensor;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TensorFlow error: {0}")]
    Tensorflow(#[from] tensorflow::Status),

    #[error("Operation '{0}' not found in graph")]
    MissingOperation(String),

    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),
}

/// Maps one preprocessed image to a probability per [`EyeDisease`].
pub trait Classifier: Send + Sync {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError>;
}

/// A frozen TensorFlow graph exported from the trained Keras model.
pub struct TfClassifier {
    session: Session,
    graph: Graph,
    input_op: String,
    output_op: String,
}

impl TfClassifier {
    pub fn load(model_path: &Path, input_op: &str, output_op: &str) -> Result<Self, ModelError> {
        let mut graph = Graph::new();
        let mut model_file = File::open(model_path)?;
        let mut model_bytes = Vec::new();
        model_file.read_to_end(&mut model_bytes)?;

        graph.import_graph_def(&model_bytes, &ImportGraphDefOptions::new())?;

        // Fail at load time rather than on the first request.
        for name in [input_op, output_op] {
            if graph.operation_by_name(name).map_err(tensorflow::Status::from)?.is_none() {
                return Err(ModelError::MissingOperation(name.to_string()));
            }
        }

        let session = Session::new(&SessionOptions::new(), &graph)?;

        Ok(TfClassifier {
            session,
            graph,
            input_op: input_op.to_string(),
            output_op: output_op.to_string(),
        })
    }

    fn operation(&self, name: &str) -> Result<tensorflow::Operation, ModelError> {
        self.graph
            .operation_by_name(name)
            .map_err(tensorflow::Status::from)?
            .ok_or_else(|| ModelError::MissingOperation(name.to_string()))
    }
}

impl Classifier for TfClassifier {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        let mut input_tensor = Tensor::<f32>::new(&input.shape());
        input_tensor.copy_from_slice(input.data());

        let input_operation = self.operation(&self.input_op)?;
        let output_operation = self.operation(&self.output_op)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_operation, 0, &input_tensor);
        let output_token = args.request_fetch(&output_operation, 0);
        self.session.run(&mut args)?;

        let output_tensor: Tensor<f32> = args.fetch(output_token)?;
        Ok(output_tensor.to_vec())
    }
}

/// Whether a classifier could be loaded at startup.
#[derive(Clone)]
pub enum ModelState {
    Ready(Arc<dyn Classifier>),
    Unavailable(String),
}

impl ModelState {
    pub fn load(model_path: &Path, input_op: &str, output_op: &str) -> Self {
        match TfClassifier::load(model_path, input_op, output_op) {
            Ok(model) => {
                info!(path = %model_path.display(), "Model loaded successfully");
                ModelState::Ready(Arc::new(model))
            }
            Err(e) => {
                error!(path = %model_path.display(), error = %e, "Error loading model");
                ModelState::Unavailable(e.to_string())
            }
        }
    }

    pub fn classifier(&self) -> Result<Arc<dyn Classifier>, PredictError> {
        match self {
            ModelState::Ready(model) => Ok(Arc::clone(model)),
            ModelState::Unavailable(reason) => Err(PredictError::ModelUnavailable(reason.clone())),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ModelState::Ready(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class: EyeDisease,
    pub confidence: f32,
}

impl Prediction {
    /// Picks the most probable class. Ties go to the lowest index.
    pub fn from_probabilities(probabilities: &[f32]) -> Result<Self, ModelError> {
        if probabilities.len() != EyeDisease::COUNT {
            return Err(ModelError::UnexpectedOutput(format!(
                "expected {} probabilities, got {}",
                EyeDisease::COUNT,
                probabilities.len()
            )));
        }
        if let Some(bad) = probabilities.iter().find(|p| !p.is_finite()) {
            return Err(ModelError::UnexpectedOutput(format!(
                "non-finite probability {bad}"
            )));
        }

        let (index, &best) = probabilities
            .iter()
            .enumerate()
            .fold((0, &probabilities[0]), |acc, cur| {
                if cur.1 > acc.1 {
                    cur
                } else {
                    acc
                }
            });

        let class = EyeDisease::from_index(index)
            .ok_or_else(|| ModelError::UnexpectedOutput(format!("no label for index {index}")))?;

        Ok(Prediction {
            class,
            confidence: best.clamp(0.0, 1.0),
        })
    }
}
