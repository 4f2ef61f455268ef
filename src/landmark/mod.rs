pub mod frame;
pub mod index;
pub mod source;

pub use frame::{Landmark, LandmarkFrame};
pub use index::{LandmarkIndex, Side};
pub use source::{PosePublisher, PoseSource};
