// Main modules of the crate
pub mod autograd;
pub mod backend;
pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod ops;
pub mod tensor;
pub mod tensor_data;
pub mod types;
pub mod utils;

// Re-export the types most callers need at the crate root
pub use autograd::{FunctionNode, Variable};
pub use config::Config;
pub use device::StorageDevice;
pub use error::GradNodeError;
pub use ops::{dropout, linear};
pub use tensor::Tensor;
pub use types::DType;
// Re-export traits required by public functions/structs
pub use num_traits;
