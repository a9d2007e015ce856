// Library exports for the emotion overlay

pub mod annotator;
pub mod camera;
pub mod config;
pub mod display;
pub mod emotion;
pub mod error;
pub mod logging;
pub mod models;
pub mod session;
