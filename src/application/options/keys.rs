//! Flat option names understood by transform engines.

pub const TIMEOUT: &str = "timeout";
pub const MAX_SOURCE_SIZE_KBYTES: &str = "maxSourceSizeKBytes";
pub const PAGE_LIMIT: &str = "pageLimit";
pub const INCLUDE_CONTENTS: &str = "includeContents";
pub const SOURCE_ENCODING: &str = "sourceEncoding";
pub const TARGET_ENCODING: &str = "targetEncoding";

// Pages are 0-based here and 1-based in `PagedSourceOptions`.
pub const PAGE: &str = "page";
pub const START_PAGE: &str = "startPage";
pub const END_PAGE: &str = "endPage";

pub const CROP_GRAVITY: &str = "cropGravity";
pub const CROP_WIDTH: &str = "cropWidth";
pub const CROP_HEIGHT: &str = "cropHeight";
pub const CROP_PERCENTAGE: &str = "cropPercentage";
pub const CROP_X_OFFSET: &str = "cropXOffset";
pub const CROP_Y_OFFSET: &str = "cropYOffset";

pub const OFFSET: &str = "offset";
pub const DURATION: &str = "duration";

pub const AUTO_ORIENT: &str = "autoOrient";
pub const ALPHA_REMOVE: &str = "alphaRemove";
pub const THUMBNAIL: &str = "thumbnail";
pub const RESIZE_WIDTH: &str = "resizeWidth";
pub const RESIZE_HEIGHT: &str = "resizeHeight";
pub const RESIZE_PERCENTAGE: &str = "resizePercentage";
pub const ALLOW_ENLARGEMENT: &str = "allowEnlargement";
pub const MAINTAIN_ASPECT_RATIO: &str = "maintainAspectRatio";

pub const IMAGE_KEYS: [&str; 8] = [
    AUTO_ORIENT,
    ALPHA_REMOVE,
    THUMBNAIL,
    RESIZE_WIDTH,
    RESIZE_HEIGHT,
    RESIZE_PERCENTAGE,
    ALLOW_ENLARGEMENT,
    MAINTAIN_ASPECT_RATIO,
];

pub const FLASH_VERSION: &str = "flashVersion";
