//! Data models for the application, organized by domain.

mod job;
mod quality;
mod upload;
mod video;

pub use job::*;
pub use quality::*;
pub use upload::*;
pub use video::*;
