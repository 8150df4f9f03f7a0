//! Realtime status publishing through a triple buffer in shared memory.
//!
//! A "servo" thread publishes its status every millisecond through one
//! mapping of a named segment; a reporter attached through a second mapping
//! samples the latest value at a much slower rate.
//!
//! Run with:
//!   cargo run --example status-reporter --features logging

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use shmprims::logging::init_logging_from_env;
use shmprims::segment::{Segment, SharedRegion};
use shmprims::state::{SharedTripleBuffer, TripleBuffer};
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
struct AxisStatus {
    cycle: u64,
    position: [f64; 3],
    following_error: f64,
    enabled: bool,
}

const CYCLES: u64 = 2_000;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), BoxError> {
    init_logging_from_env();

    let name = format!("/shmprims-status-{}", std::process::id());
    let size = TripleBuffer::<AxisStatus>::memory_size();

    let servo_side: Arc<dyn SharedRegion> = Arc::new(Segment::create(&name, size)?);
    let status = SharedTripleBuffer::create_at(servo_side, 0, AxisStatus::default())?;

    let reporter_side: Arc<dyn SharedRegion> = Arc::new(Segment::open(&name)?);
    // SAFETY: created just above with the same type; `AxisStatus` is plain
    // data and the writer only stores valid values.
    let view = unsafe { SharedTripleBuffer::<AxisStatus>::attach_at(reporter_side, 0)? };

    let running = AtomicBool::new(true);
    thread::scope(|s| -> Result<(), BoxError> {
        let mut writer = status.writer()?;
        let running = &running;
        let servo = s.spawn(move || {
            for cycle in 1..=CYCLES {
                let t = cycle as f64 * 1e-3;
                writer.publish(AxisStatus {
                    cycle,
                    position: [t.sin(), t.cos(), t],
                    following_error: 1e-4 * (t * 7.0).sin(),
                    enabled: true,
                });
                thread::sleep(Duration::from_millis(1));
            }
            running.store(false, Ordering::Release);
        });

        let mut reader = view.reader()?;
        while running.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(100));
            if reader.snapshot() {
                let st = reader.get();
                info!(
                    cycle = st.cycle,
                    x = st.position[0],
                    y = st.position[1],
                    z = st.position[2],
                    ferror = st.following_error,
                    "axis status"
                );
            }
        }

        servo.join().map_err(|_| "servo thread panicked")?;
        let last = reader.latest();
        info!(cycle = last.cycle, enabled = last.enabled, "final status");
        Ok(())
    })
}
