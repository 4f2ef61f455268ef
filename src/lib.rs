pub mod body_scale;
pub mod camera;
pub mod config;
pub mod driver;
pub mod landmark;
pub mod math;
pub mod outfit;
pub mod rig;
