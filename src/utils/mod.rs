pub mod image_ops;
pub mod metrics;

pub use image_ops::{has_image_extension, validate_image_bytes, write_temp_image};
pub use metrics::{Metrics, MetricsSnapshot};
