// THEORY:
// This file is the main entry point for the `parking_vision` library crate.
// It exposes the `ParkingPipeline` and the `monitor` loop as the high-level
// interface used by the `parking_monitor` runner. The building blocks live in
// `core_modules`, each owning exactly one stage of the per-frame decision:
//
//   raw frame -> FrameProcessor -> occupancy mask -> OccupancyEngine -> report
//
// Everything outside of that chain (where frames come from, where annotated
// frames go, how text is rasterised) is reached through small traits so the
// decision logic can be driven headless in tests.

pub mod core_modules;
pub mod monitor;
pub mod pipeline;
pub mod stream;
