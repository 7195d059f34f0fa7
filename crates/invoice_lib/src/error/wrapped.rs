use crate::error::ErrorBag;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub struct InvoiceError {
    pub inner: ErrorBag,
    pub file: &'static str,
    pub line: u32,
}

impl InvoiceError {
    pub fn is_validation(&self) -> bool {
        matches!(self.inner, ErrorBag::ValidationError(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.inner,
            ErrorBag::NotFoundError(_) | ErrorBag::SqlxError(sqlx::Error::RowNotFound)
        )
    }
}

impl Display for InvoiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for InvoiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}
