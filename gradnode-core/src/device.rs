/// Represents the physical location where tensor data is stored.
///
/// Tensors on different devices belong to different numeric backends and
/// must never be mixed inside a single reference-path computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageDevice {
    /// Data is stored in main system memory (RAM).
    #[default]
    CPU,
    /// Data is stored in device memory.
    ///
    /// **Note:** device kernels are not part of this crate; GPU tensors only
    /// carry metadata so that validation and backend checks can see them.
    GPU,
}
