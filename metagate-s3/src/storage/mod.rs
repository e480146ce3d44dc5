//! Metadata and data storage backends

mod ephemeral;
mod traits;


pub use ephemeral::{EphemeralDataStore, EphemeralMetadataStore};
pub use traits::{
    Bucket, DataStore, Location, MetadataStore, ObjectMetadata, ReservedFields, StoreError,
    StoredEntry,
};
