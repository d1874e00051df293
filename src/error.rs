/// What went wrong, coarsely. `InvalidInput` covers bad observation
/// tables and inconsistent configuration; `Numerics` covers failures
/// inside the fitting machinery itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FitErrorKind {
    InvalidInput,
    Numerics,
}

#[derive(Clone)]
pub struct FitError {
    kind: FitErrorKind,
    message: String,
}

impl FitError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: FitErrorKind::InvalidInput,
            message: message.into(),
        }
    }

    pub fn numerics(message: impl Into<String>) -> Self {
        Self {
            kind: FitErrorKind::Numerics,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FitErrorKind {
        self.kind
    }
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for FitError {}
