//! # Infrastructure Adapters
//!
//! Implementations of the tenant configuration source and decryption
//! boundaries for development and tests.

pub mod memory_tenant_source;
pub mod plaintext_decryptor;

pub use memory_tenant_source::InMemoryTenantSource;
pub use plaintext_decryptor::PlaintextSecretDecryptor;
