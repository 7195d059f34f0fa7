mod client_ops;
mod invoice_ops;
mod tx_ops;
mod wallet_ops;

pub use client_ops::*;
pub use invoice_ops::*;
pub use tx_ops::*;
pub use wallet_ops::*;
