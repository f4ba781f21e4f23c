//! Object-store side channel.
//!
//! Used to empty buckets the engine cannot delete while they hold data,
//! to install expiration policies, and to sweep orphaned buckets by tag.

mod object_store;
mod s3;

pub use object_store::{
    LifecycleRule, ObjectStore, ObjectVersion, PageToken, TaggedBucket, VersionPage,
    DELETE_BATCH_SIZE, LIST_PAGE_SIZE,
};
pub use s3::S3ObjectStore;
