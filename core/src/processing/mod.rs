pub mod cfar;
pub mod doppler;
pub mod range;
pub mod waveform;

pub use cfar::{CfarConfig, CfarDetector, CfarOutput, CfarStage, CfarVariant};
pub use doppler::{doppler_process, DopplerStage, DopplerWindow, RangeDopplerMap};
pub use range::{compress_aligned, matched_filter, RangeStage};
pub use waveform::{barker_code, Waveform, WaveformKind};
