pub mod post;

pub use post::{ModelFamily, PostProcessor, RawDetection, TransformParams};
