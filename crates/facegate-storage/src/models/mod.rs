pub mod audit;
pub mod identity;

pub use audit::AuditEntry;
pub use identity::{
    CorruptRecord, EnrollmentRecord, LoadedRecord, decode_embedding, encode_embedding,
};
