//! S3-compatible object store client used to keep uploaded resumes.

pub mod client;

pub use client::{
    object_key, ObjectStoreClient, ObjectStoreConfig, ObjectStoreError, StoredObject,
    RESUME_PREFIX,
};
