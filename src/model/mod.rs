//! Types that represent the core data model, such as `TransactionRecord` and `TransferRequest`.
mod account;
mod amount;
mod audit;
mod branch;
mod transaction;
mod transfer;
mod user;

pub use account::{AccountKind, BalanceDrift, FinanceAccount};
pub use amount::{Amount, AmountError};
pub use audit::AuditEntry;
pub use branch::{Branch, Ministry};
pub use transaction::{
    normalize, TransactionKind, TransactionRecord, TransactionStatus, OFFERING, SPECIAL_DONATION,
    TITHE, TRANSFER_IN, TRANSFER_OUT,
};
pub use transfer::{TransferLeg, TransferMethod, TransferRequest, TransferStatus};
pub use user::{Permission, Role, User, UserStatus};
