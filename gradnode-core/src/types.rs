/// Defines the possible data types for Tensor elements.
///
/// Only the floating kinds take part in differentiation; the integer kinds
/// exist so that tensors of the wrong kind can be rejected by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating-point type.
    F32,
    /// 64-bit floating-point type.
    F64,
    /// 32-bit integer type.
    I32,
    /// 64-bit integer type.
    I64,
}

impl DType {
    /// Returns `true` for the floating-point kinds.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    /// The type two floating operands are computed in: the wider one.
    pub(crate) fn promote(a: DType, b: DType) -> DType {
        if a == DType::F64 || b == DType::F64 {
            DType::F64
        } else {
            DType::F32
        }
    }
}
