/// Closure for `map_err` wrapping any error convertible into `ErrorBag`
/// together with the location it was raised at.
#[macro_export]
macro_rules! err_from {
    () => {
        |e| $crate::error::InvoiceError {
            inner: $crate::error::ErrorBag::from(e),
            file: file!(),
            line: line!(),
        }
    };
}

#[macro_export]
macro_rules! err_create {
    ($t:expr) => {
        $crate::error::InvoiceError {
            inner: $crate::error::ErrorBag::from($t),
            file: file!(),
            line: line!(),
        }
    };
}

#[macro_export]
macro_rules! err_custom_create {
    ($($t:tt)*) => {
        $crate::err_create!($crate::error::CustomError::new(&format!($($t)*)))
    };
}
