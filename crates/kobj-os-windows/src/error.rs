/// Error types for Windows operations.
#[derive(thiserror::Error, Debug)]
pub enum WindowsError {
    /// The profile describes an image with an unsupported pointer width.
    #[error("Unsupported pointer width: {0}")]
    UnsupportedPointerWidth(u64),

    /// A constant required by the operation is missing from the profile.
    #[error("Missing constant: {0}")]
    MissingConstant(&'static str),
}

impl From<WindowsError> for kobj_core::KobjError {
    fn from(value: WindowsError) -> Self {
        kobj_core::KobjError::Os(value.into())
    }
}
