pub mod form;
pub mod services;

pub use form::{read_form, FormData, ImageFile};
pub use services::{upload_image, POSTS_BUCKET, PROFILE_BUCKET};

/// Upper bound for multipart bodies on image routes.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
