//! Low-latency network audio transport pipeline: RTP packetization,
//! FEC erasure coding, jitter buffering, adaptive resampling, and RTCP
//! feedback. See `README`-level module docs below for the data flow.
//!
//! ```text
//! sender:   Frame -> Packetizer -> FecBlockWriter -> Interleaver -> OutboundRouter -> UDP
//! receiver: UDP -> FecParser -> FecBlockReader -> Validator -> Delayer -> Streamer -> Resampler -> Frame
//! ```

pub mod audio_io;
pub mod codec;
pub mod config;
pub mod delayer;
pub mod error;
pub mod fec_block;
pub mod freq_estimator;
pub mod interleaver;
pub mod packet;
pub mod packetizer;
pub mod pool;
pub mod resampler;
pub mod router;
pub mod rtcp;
pub mod sample_spec;
pub mod sequencer;
pub mod session;
pub mod streamer;
pub mod timestamp_mapper;
pub mod validator;

pub use config::{FecConfig, SessionConfig};
pub use error::{Error, Result};
pub use sample_spec::{ChannelLayout, Frame, SampleFormat, SampleSpec};
pub use session::{ReceiverSession, SenderSession, SessionStatus};
