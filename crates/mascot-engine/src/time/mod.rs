//! Frame timing.
//!
//! One [`FrameClock`] per render loop; `tick()` once per presented frame. The
//! resulting [`FrameTime::dt`] is what a renderer's `update` and
//! `begin_render_with_time` take.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
