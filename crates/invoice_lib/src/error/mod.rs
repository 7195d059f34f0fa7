mod bag;
mod custom;
mod wrapped;

pub use bag::ErrorBag;
pub use custom::{
    AlreadyProcessingError, CustomError, NotFoundError, TransactionFailedError, ValidationError,
};
pub use wrapped::InvoiceError;

/// Export macros for creating errors
mod macros;
