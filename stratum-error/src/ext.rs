use crate::StratumResult;

/// Extension trait for StratumResult
pub trait ResultExt<T>: private::Sealed {
    /// Flatten a nested [`StratumResult`]. Helper function until <https://github.com/rust-lang/rust/issues/70142> is stabilized.
    fn flatten(self) -> StratumResult<T>;
}

mod private {
    use crate::StratumResult;

    pub trait Sealed {}

    impl<T> Sealed for StratumResult<StratumResult<T>> {}
}

impl<T> ResultExt<T> for StratumResult<StratumResult<T>> {
    fn flatten(self) -> StratumResult<T> {
        match self {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) | Err(e) => Err(e),
        }
    }
}
