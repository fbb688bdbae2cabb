//! Testing utilities and harness for fetch-image
//!
//! Everything here is deterministic: time only moves when a test calls
//! [`TestUiLoop::advance`], and resolutions or loads only finish when the test
//! completes them.

mod clock;
mod fakes;
mod ui_loop;

pub use clock::ManualClock;
pub use fakes::*;
pub use ui_loop::TestUiLoop;

pub mod prelude {
    pub use crate::{
        DelegateCall, ManualClock, PrefetchEvent, RecordingDelegate, RecordingPrefetcher,
        ScriptedPipeline, ScriptedResolver, TestUiLoop,
    };
}
