use thiserror::Error;

/// Reasons a COLLADA import can fail. Every variant is fatal for the asset: nothing is
/// returned for a partially imported scene.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportError {
    /// A structural violation: a missing element or attribute, an unparsable token, or counts
    /// that disagree with each other.
    #[error("malformed <{element}>: {reason}")]
    MalformedAsset { element: String, reason: String },
    /// A joint name that is absent from the skin's joint table.
    #[error("<{element}> references unknown joint \"{name}\"")]
    UnknownJoint { name: String, element: String },
    /// An index that exceeds the array it points into.
    #[error("index {index} in <{element}> is out of range for {len} entries")]
    IndexOutOfRange {
        element: String,
        index: usize,
        len: usize,
    },
}

impl ImportError {
    pub fn malformed(element: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedAsset {
            element: element.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_joint(name: impl Into<String>, element: impl Into<String>) -> Self {
        Self::UnknownJoint {
            name: name.into(),
            element: element.into(),
        }
    }

    pub fn out_of_range(element: impl Into<String>, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange {
            element: element.into(),
            index,
            len,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// Fails with [`ImportError::IndexOutOfRange`] unless `index < len`.
pub(crate) fn check_index(element: &str, index: usize, len: usize) -> Result<usize> {
    if index < len {
        Ok(index)
    } else {
        Err(ImportError::out_of_range(element, index, len))
    }
}
