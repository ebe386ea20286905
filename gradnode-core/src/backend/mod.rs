//! # Compute backends
//!
//! Every node computes through a [`ComputeBackend`]. Two implementations
//! exist:
//!
//! - [`accelerated::AcceleratedBackend`]: host-only, `F32`-only kernels
//!   (strided GEMM from `matrixmultiply`, rayon-parallel elementwise work).
//! - [`reference::ReferenceBackend`]: generic kernels for every floating
//!   dtype, used whenever the accelerated path is not ready.
//!
//! A [`BackendSelector`] holds the backends in priority order and hands out
//! the first one that reports itself ready for a call's operands. Before the
//! reference path is chosen, all operands must live on the same device.

use std::fmt::Debug;

use log::trace;
use rand::rngs::StdRng;

use crate::config::Config;
use crate::device::StorageDevice;
use crate::error::GradNodeError;
use crate::tensor::Tensor;
use crate::types::DType;

pub mod accelerated;
pub mod reference;


pub use accelerated::AcceleratedBackend;
pub use reference::ReferenceBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Accelerated,
    Reference,
}

/// What a particular call needs from a backend before it may run there.
#[derive(Debug, Clone, Copy)]
pub struct Requirements<'a> {
    /// Operand ranks the accelerated kernels accept for this call.
    pub ranks: &'a [usize],
    /// Cleared by callers with extra gating (e.g. a non-`F32` output dtype).
    pub allow_accelerated: bool,
}

impl<'a> Requirements<'a> {
    pub const fn ranks(ranks: &'a [usize]) -> Self {
        Requirements {
            ranks,
            allow_accelerated: true,
        }
    }

    pub fn allow_accelerated(mut self, allow: bool) -> Self {
        self.allow_accelerated = allow;
        self
    }
}

/// A numeric execution path for the node family.
///
/// Implementations are synchronous: any parallel or queued work is joined
/// before a method returns.
pub trait ComputeBackend: Debug + Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Readiness predicate for the given operands.
    fn is_ready(&self, inputs: &[&Tensor], requirements: &Requirements<'_>) -> bool;

    /// `y = x · Wᵀ (+ b)`, in `x`'s dtype.
    fn linear_forward(
        &self,
        x: &Tensor,
        w: &Tensor,
        b: Option<&Tensor>,
    ) -> Result<Tensor, GradNodeError>;

    /// `gx = gy · W`, in `gy`'s dtype.
    fn linear_backward_data(&self, gy: &Tensor, w: &Tensor) -> Result<Tensor, GradNodeError>;

    /// `gW = gyᵀ · x`, in `w_dtype`.
    fn linear_backward_weight(
        &self,
        x: &Tensor,
        gy: &Tensor,
        w_dtype: DType,
    ) -> Result<Tensor, GradNodeError>;

    /// Draws a fresh scale/zero mask and applies it. Returns `(mask, y)`.
    fn dropout_forward(
        &self,
        x: &Tensor,
        ratio: f64,
        rng: &mut StdRng,
    ) -> Result<(Tensor, Tensor), GradNodeError>;

    /// Elementwise `a * mask` for identically shaped operands.
    fn multiply(&self, a: &Tensor, mask: &Tensor) -> Result<Tensor, GradNodeError>;

    /// `gx = gy * mask`.
    fn dropout_backward(&self, mask: &Tensor, gy: &Tensor) -> Result<Tensor, GradNodeError> {
        self.multiply(gy, mask)
    }
}

/// Ordered list of backends; the first ready one wins.
#[derive(Debug)]
pub struct BackendSelector {
    backends: Vec<Box<dyn ComputeBackend>>,
}

impl BackendSelector {
    pub fn from_config(config: &Config) -> Self {
        let mut backends: Vec<Box<dyn ComputeBackend>> = Vec::with_capacity(2);
        if config.accelerate {
            backends.push(Box::new(AcceleratedBackend));
        }
        backends.push(Box::new(ReferenceBackend));
        BackendSelector { backends }
    }

    pub fn reference_only() -> Self {
        BackendSelector {
            backends: vec![Box::new(ReferenceBackend)],
        }
    }

    /// Picks the backend for one call.
    ///
    /// # Errors
    /// `BackendMismatch` when the reference path would be taken with
    /// operands from different devices.
    pub fn select(
        &self,
        operation: &str,
        inputs: &[&Tensor],
        requirements: &Requirements<'_>,
    ) -> Result<&dyn ComputeBackend, GradNodeError> {
        for backend in &self.backends {
            if !backend.is_ready(inputs, requirements) {
                continue;
            }
            if backend.kind() == BackendKind::Reference {
                ensure_same_device(operation, inputs)?;
            }
            trace!("{}: dispatching to {:?} backend", operation, backend.kind());
            return Ok(backend.as_ref());
        }
        Err(GradNodeError::InternalError(format!(
            "{}: no backend is ready for the given operands",
            operation
        )))
    }
}

/// Fails with `BackendMismatch` unless every tensor lives on one device.
pub fn ensure_same_device(operation: &str, inputs: &[&Tensor]) -> Result<(), GradNodeError> {
    let devices: Vec<StorageDevice> = inputs.iter().map(|t| t.device()).collect();
    if devices.windows(2).any(|pair| pair[0] != pair[1]) {
        return Err(GradNodeError::BackendMismatch {
            operation: operation.to_string(),
            devices,
        });
    }
    Ok(())
}

/// Known special case for matrix products on host arrays: a view that is
/// neither row- nor column-major dense but has a unit dimension is copied
/// into a contiguous layout before use. Not a general layout policy.
///
/// The reference kernels gather their operands in logical order, so the copy
/// never changes a result. It only fixes the memory layout the product reads
/// from, and returns the input itself when no copy is needed.
pub(crate) fn normalize_degenerate_layout(t: &Tensor) -> Result<Tensor, GradNodeError> {
    let needs_copy = {
        let guard = t.read_data();
        guard.device == StorageDevice::CPU
            && !guard.is_contiguous()
            && !guard.is_f_contiguous()
            && guard.shape.contains(&1)
    };
    if needs_copy {
        trace!("copying degenerate strided view {:?} to a contiguous layout", t);
        return t.contiguous();
    }
    Ok(t.clone())
}
