use crate::models::state::SessionState;
use crate::models::status::StatusCode;

/// The four-operation recorder surface shared by every backend.
///
/// Faults never propagate past these calls: each one reports a
/// [`StatusCode`] and logs the detail.
pub trait AudioRecorder: Send {
    /// Configure the recorder. Callable before the first recording and
    /// between recordings.
    fn init_recording(&mut self, sample_rate_hz: u32, channel_count: u16) -> StatusCode;

    fn start_recording(&mut self) -> StatusCode;

    fn stop_recording(&mut self) -> StatusCode;

    /// Free the underlying device. Repeating it once released is a no-op.
    fn release(&mut self) -> StatusCode;

    fn state(&self) -> SessionState;
}
