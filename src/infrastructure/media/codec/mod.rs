//! Audio codec and sample conversion

pub mod converter;
pub mod g711;
pub mod resampler;

pub use converter::SampleConverter;
pub use g711::{PcmuCodec, G711_CLOCK_RATE, PCMU_PAYLOAD_TYPE};
pub use resampler::{create_resampler, LinearResampler, Resampler};
