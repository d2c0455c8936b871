pub mod cluster;
pub mod cluster_engine;
pub mod crop_selector;
pub mod frame;
pub mod geometry;
pub mod location_extractor;
pub mod preprocessor;
pub mod trigger;
