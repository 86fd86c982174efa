pub mod chat;
pub mod error;
pub mod events;
pub mod image;
pub mod models;
pub mod style;

pub use error::{Operation, PipelineError};
pub use image::{ImagePayload, ImageSlot};
pub use style::{AspectRatio, FidelityMode, StyleMetadata};
