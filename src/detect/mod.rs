mod backend;
mod backends;
mod filter;
mod result;

pub use backend::{DetectionFrame, DetectionSource, MalformedFrame};
pub use backends::{JsonLinesSource, ScriptedSource};
pub use filter::{
    ClassFilter, DEFAULT_ALLOWED_CLASSES, DEFAULT_MIN_CONFIDENCE, DEFAULT_PERSON_CLASS,
};
pub use result::{BBox, Detection};
