use thiserror::Error;

/// Raised while coercing a loosely-typed store document into a domain type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundaryError {
    #[error("document {document}: missing field `{field}`")]
    MissingField {
        document: String,
        field: &'static str,
    },
    #[error("document {document}: field `{field}` has unexpected value {value}")]
    InvalidField {
        document: String,
        field: &'static str,
        value: String,
    },
    #[error("document {document}: expected an object")]
    NotAnObject { document: String },
}

impl BoundaryError {
    pub fn document(&self) -> &str {
        match self {
            Self::MissingField { document, .. }
            | Self::InvalidField { document, .. }
            | Self::NotAnObject { document } => document,
        }
    }
}
