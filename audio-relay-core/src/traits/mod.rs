pub mod capture_source;
pub mod decode_sink;
pub mod delegate;
pub mod segment_encoder;
pub mod transport;
