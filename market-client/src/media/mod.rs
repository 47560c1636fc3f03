mod host;
mod upload;
mod validate;

pub use host::{BucketMediaHost, CloudMediaHost, MediaHost};
pub use upload::{MediaUploader, RetryPolicy};
pub use validate::{
    IMAGE_MIME_TYPES, MediaFile, MediaKind, MediaLimits, MediaRejection, UploadContext,
    VIDEO_MIME_TYPES, validate, validate_batch,
};
