/// Dimension of the embeddings produced by the default encoder.
pub const DEFAULT_EMBEDDING_DIM: usize = 128;

/// Euclidean distance below which a gallery match is accepted.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Max frames a track can go unmatched before removal (~0.5 s at 30 fps).
pub const TRACKER_MAX_MISSED: usize = 15;

/// Max centroid travel in pixels between consecutive processed frames.
pub const TRACKER_MAX_ASSOCIATION_DISTANCE: f64 = 75.0;

/// Embeddings kept per track for identity voting.
pub const SMOOTHING_WINDOW: usize = 5;

/// EAR values kept per track.
pub const EAR_WINDOW: usize = 30;

/// Gallery size above which queries go through the metric index.
pub const INDEX_MIN_GALLERY_SIZE: usize = 256;

/// Side of the square grey patch used for texture analysis.
pub const TEXTURE_PATCH_SIZE: usize = 64;

pub const SETTINGS_FILENAME: &str = "settings.json";
pub const DATABASE_FILENAME: &str = "rollcall.db";
pub const ENCODING_CACHE_FILENAME: &str = "encodings.json";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
