//! Shared foundation for the CNPJ consolidation pipeline.
//!
//! Everything here is storage-agnostic: the key and record types the
//! source readers produce, the consolidated document shape served to
//! clients, the error taxonomy, and the injected metrics port.

pub mod error;
pub mod metrics;
pub mod model;

pub use error::{RegistryError, Result};
pub use model::{
    BaseRecord, BranchRecord, Cnpj, Company, Page, PartnerRecord, TaxRecord,
};
