pub mod ffprobe;

pub use ffprobe::{FormatInfo, ProbeData, StreamInfo, probe};
