use crate::error::{InvoiceError, ValidationError};
use crate::err_create;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

macro_rules! string_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = InvoiceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(err_create!(ValidationError::new(
                        $field,
                        &format!("unknown value {other}")
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Paid,
    EscrowHeld,
    EscrowReleased,
    Canceled,
}

string_enum!(InvoiceStatus, "status", {
    Draft => "draft",
    Pending => "pending",
    Paid => "paid",
    EscrowHeld => "escrow_held",
    EscrowReleased => "escrow_released",
    Canceled => "canceled",
});

impl InvoiceStatus {
    /// Display label shown next to an invoice.
    pub fn label(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "Draft",
            InvoiceStatus::Pending => "Pending",
            InvoiceStatus::Paid => "Paid",
            InvoiceStatus::EscrowHeld => "In Escrow",
            InvoiceStatus::EscrowReleased => "Escrow Released",
            InvoiceStatus::Canceled => "Canceled",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::EscrowReleased)
    }

    pub fn is_outstanding(&self) -> bool {
        matches!(self, InvoiceStatus::Pending | InvoiceStatus::EscrowHeld)
    }

    /// Lifecycle: draft -> pending -> paid | escrow_held -> escrow_released,
    /// any non final status may be canceled.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        match (self, next) {
            (a, b) if *a == b => true,
            (Draft, Pending) => true,
            (Pending, Paid) | (Pending, EscrowHeld) => true,
            (EscrowHeld, EscrowReleased) => true,
            (Draft | Pending | EscrowHeld, Canceled) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum CryptoCurrency {
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "USDC")]
    Usdc,
}

impl CryptoCurrency {
    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoCurrency::Eth => "ETH",
            CryptoCurrency::Usdc => "USDC",
        }
    }
}

impl Display for CryptoCurrency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CryptoCurrency {
    type Err = InvoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ETH" => Ok(CryptoCurrency::Eth),
            "USDC" => Ok(CryptoCurrency::Usdc),
            other => Err(err_create!(ValidationError::new(
                "crypto_currency",
                &format!("unsupported currency {other}")
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Individual,
    Business,
}

string_enum!(ClientType, "client_type", {
    Individual => "individual",
    Business => "business",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletType {
    Eth,
    Usdc,
}

string_enum!(WalletType, "wallet_type", {
    Eth => "eth",
    Usdc => "usdc",
});

impl WalletType {
    pub fn currency(&self) -> CryptoCurrency {
        match self {
            WalletType::Eth => CryptoCurrency::Eth,
            WalletType::Usdc => CryptoCurrency::Usdc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Payment,
    Withdrawal,
    EscrowRelease,
    Fee,
}

string_enum!(TransactionType, "transaction_type", {
    Payment => "payment",
    Withdrawal => "withdrawal",
    EscrowRelease => "escrow_release",
    Fee => "fee",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

string_enum!(TransactionStatus, "transaction_status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Failed => "failed",
});
