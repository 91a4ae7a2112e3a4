// Models module - Database entity representations

pub mod audit_log;
pub mod certificate;
pub mod fowl;
pub mod health_record;
pub mod transfer;
pub mod user;

pub use audit_log::AuditLog;
pub use certificate::DigitalCertificate;
pub use fowl::Fowl;
pub use health_record::HealthRecord;
pub use transfer::{OwnershipTransfer, PartyRole, TransferStatus};
pub use user::User;
