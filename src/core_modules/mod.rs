pub mod alarm;
pub mod canvas;
pub mod frame_processor;
pub mod occupancy_engine;
pub mod region;
pub mod verifier;
