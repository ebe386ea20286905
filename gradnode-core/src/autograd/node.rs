use std::sync::Arc;

use log::debug;

use crate::autograd::function::{BackwardContext, ForwardContext, Function, NodeKind, TensorMeta};
use crate::autograd::variable::Variable;
use crate::backend::BackendSelector;
use crate::config::Config;
use crate::error::GradNodeError;
use crate::tensor::Tensor;

/// A [`Function`] bound into the graph.
///
/// The node owns the function's parameters, the configuration it was built
/// under, and after forward, the retained inputs and the input descriptors.
/// Retained inputs stay alive for as long as the node does, so `backward`
/// may be called any number of times.
#[derive(Debug)]
pub struct FunctionNode {
    function: Box<dyn Function>,
    config: Config,
    inputs: Vec<TensorMeta>,
    retained: Vec<Option<Variable>>,
    output_count: usize,
    forwarded: bool,
}

impl FunctionNode {
    pub fn new<F: Function + 'static>(function: F, config: &Config) -> Self {
        debug!("constructing {} node", function.kind().name());
        FunctionNode {
            function: Box::new(function),
            config: config.clone(),
            inputs: Vec::new(),
            retained: Vec::new(),
            output_count: 0,
            forwarded: false,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.function.kind()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// The wrapped function, if it is an `F`.
    pub fn function<F: Function + 'static>(&self) -> Option<&F> {
        let function: &dyn Function = self.function.as_ref();
        function.as_any().downcast_ref::<F>()
    }

    /// Descriptors of the inputs of the last forward call.
    pub fn inputs(&self) -> &[TensorMeta] {
        &self.inputs
    }

    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// Indexes of the inputs kept alive for backward.
    pub fn retained_inputs(&self) -> Vec<usize> {
        self.retained
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| i))
            .collect()
    }

    /// A retained input, or `None` if input `index` was not retained.
    pub fn retained_input(&self, index: usize) -> Option<&Variable> {
        self.retained.get(index).and_then(|slot| slot.as_ref())
    }

    /// Validates the inputs, then computes the outputs.
    ///
    /// Calling it again on the same node rebinds it to the new inputs;
    /// stateful functions (dropout) keep their state across calls.
    ///
    /// # Errors
    /// `Validation` before any computation if the type check fails, and
    /// `BackendMismatch` if the reference path is taken with inputs from
    /// different devices.
    pub fn forward(&mut self, inputs: &[Variable]) -> Result<Vec<Tensor>, GradNodeError> {
        let operation = self.kind().name();
        let metas: Vec<TensorMeta> = inputs.iter().map(|v| TensorMeta::of(v.tensor())).collect();
        self.function.check_type_forward(&metas)?;

        let tensors: Vec<Tensor> = inputs.iter().map(|v| v.tensor().clone()).collect();
        let backends = BackendSelector::from_config(&self.config);
        let mut ctx = ForwardContext::new(&self.config, &backends);
        let outputs = self.function.forward(&tensors, &mut ctx)?;
        let retain = ctx.into_retained();

        if let Some(&index) = retain.iter().find(|&&i| i >= inputs.len()) {
            return Err(GradNodeError::contract(
                operation,
                format!("cannot retain input {} of {}", index, inputs.len()),
            ));
        }
        self.retained = inputs
            .iter()
            .enumerate()
            .map(|(i, v)| retain.contains(&i).then(|| v.clone()))
            .collect();
        self.inputs = metas;
        self.output_count = outputs.len();
        self.forwarded = true;
        debug!(
            "{}: forward done, {} output(s), retaining {:?}",
            operation,
            outputs.len(),
            retain
        );
        Ok(outputs)
    }

    /// Runs forward and seals the node into the graph as the creator of its
    /// outputs.
    pub fn apply(mut self, inputs: &[Variable]) -> Result<Vec<Variable>, GradNodeError> {
        let outputs = self.forward(inputs)?;
        let requires_grad = inputs.iter().any(|v| v.requires_grad());
        let node = Arc::new(self);
        Ok(outputs
            .into_iter()
            .map(|t| Variable::from_node(t, Arc::clone(&node), requires_grad))
            .collect())
    }

    /// Computes the gradients of the inputs listed in `indexes`.
    ///
    /// # Errors
    /// `ContractViolation` if forward has not run, if `indexes` is not
    /// strictly ascending or names a nonexistent input, if the number of
    /// upstream gradients differs from the number of outputs, if a needed
    /// input was not retained, or if the function returns a gradient tuple
    /// of the wrong length.
    pub fn backward(
        &self,
        indexes: &[usize],
        grad_outputs: &[Variable],
    ) -> Result<Vec<Variable>, GradNodeError> {
        let operation = self.kind().name();
        if !self.forwarded {
            return Err(GradNodeError::contract(operation, "backward called before forward"));
        }
        if grad_outputs.len() != self.output_count {
            return Err(GradNodeError::contract(
                operation,
                format!(
                    "expected {} upstream gradient(s), got {}",
                    self.output_count,
                    grad_outputs.len()
                ),
            ));
        }
        if indexes.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(GradNodeError::contract(
                operation,
                format!("indexes {:?} are not strictly ascending", indexes),
            ));
        }
        if let Some(&index) = indexes.iter().find(|&&i| i >= self.inputs.len()) {
            return Err(GradNodeError::contract(
                operation,
                format!("index {} is out of range for {} input(s)", index, self.inputs.len()),
            ));
        }

        debug!("{}: composing gradients for inputs {:?}", operation, indexes);
        let ctx = BackwardContext::new(operation, &self.config, &self.retained);
        let grads = self.function.backward(&ctx, indexes, grad_outputs)?;
        if grads.len() != indexes.len() {
            return Err(GradNodeError::contract(
                operation,
                format!(
                    "returned {} gradient(s) for {} requested input(s)",
                    grads.len(),
                    indexes.len()
                ),
            ));
        }
        Ok(grads)
    }
}
