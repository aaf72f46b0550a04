use crate::error::{BundleError, PipelineError, Result};
use crate::pipeline::{CANCELLATION, PipeMap};
use async_trait::async_trait;
use tracing::debug;

/// One stage of a bundle build.
///
/// Inputs ending in `?` are optional. Outputs are always required.
#[async_trait]
pub trait BuildStep: Send + Sync {
    fn name(&self) -> String;

    fn input(&self) -> Vec<String>;

    fn output(&self) -> Vec<String>;

    async fn process(&self, data: PipeMap) -> Result<PipeMap>;

    fn validate_input(&self, data: &PipeMap) -> std::result::Result<(), PipelineError> {
        for input in self.input() {
            let is_optional = input.ends_with('?');
            let clean_input = input.trim_end_matches('?');

            if !is_optional && !data.contains_key(clean_input) {
                return Err(PipelineError::MissingInput {
                    step: self.name(),
                    required: clean_input.to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate_output(&self, data: &PipeMap) -> std::result::Result<(), PipelineError> {
        for output in self.output() {
            if !data.contains_key(&output) {
                return Err(PipelineError::MissingOutput {
                    step: self.name(),
                    required: output,
                });
            }
        }
        Ok(())
    }
}

/// Ordered list of build steps; aborts on the first failure
pub struct Pipeline {
    steps: Vec<Box<dyn BuildStep>>,
    name: String,
    external_inputs: Vec<String>,
}

impl Pipeline {
    pub fn new(name: &str) -> Self {
        Self {
            steps: Vec::new(),
            name: name.to_string(),
            external_inputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set external inputs that will be provided via initial PipeMap
    pub fn with_external_inputs(mut self, external_inputs: Vec<String>) -> Self {
        self.external_inputs = external_inputs;
        self
    }

    /// Append a step, checking its required inputs are produced upstream
    pub fn add_step(mut self, step: Box<dyn BuildStep>) -> std::result::Result<Self, PipelineError> {
        let mut available_sources = self.external_inputs.clone();
        for existing in &self.steps {
            available_sources.extend(existing.output());
        }

        let current_inputs = step.input();
        let missing_inputs: Vec<&String> = current_inputs
            .iter()
            .filter(|input| !input.ends_with('?'))
            .filter(|input| !available_sources.iter().any(|source| source == *input))
            .collect();

        if !missing_inputs.is_empty() {
            return Err(PipelineError::config_error(format!(
                "Step '{}' requires inputs {:?} that are not available.\n\
                 Available sources (previous step outputs + external inputs): {:?}",
                step.name(),
                missing_inputs,
                available_sources,
            )));
        }

        debug!(
            "Adding step '{}' to pipeline '{}'. Inputs: {:?}",
            step.name(),
            self.name,
            current_inputs
        );

        self.steps.push(step);
        Ok(self)
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub async fn execute(&self, mut data: PipeMap) -> Result<PipeMap> {
        debug!(
            "Executing pipeline '{}' with {} steps",
            self.name,
            self.steps.len()
        );

        for (index, step) in self.steps.iter().enumerate() {
            if data.get_typed(CANCELLATION).is_some_and(|c| c.is_cancelled()) {
                debug!("Pipeline '{}' cancelled before step '{}'", self.name, step.name());
                return Err(BundleError::Cancelled);
            }

            debug!("Processing step {}: '{}'", index + 1, step.name());

            step.validate_input(&data)?;
            data = step.process(data).await?;
            step.validate_output(&data)?;

            debug!("Step '{}' processed successfully", step.name());
        }

        debug!("Pipeline '{}' executed successfully", self.name);
        Ok(data)
    }
}
