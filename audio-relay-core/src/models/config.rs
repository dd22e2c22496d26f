use std::time::Duration;

/// Fixed constraints applied when acquiring a capture source.
///
/// These are encoding-quality decisions, not runtime negotiables: the relay
/// always captures mono at the target rate, with echo cancellation on and
/// noise suppression / auto gain off. Backends apply the processing flags
/// where the host supports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Target sample rate in Hz.
    pub sample_rate: u32,

    /// Number of capture channels. Only mono is supported.
    pub channels: u16,

    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain: bool,
}

impl CaptureConstraints {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.channels != 1 {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        Ok(())
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            echo_cancellation: true,
            noise_suppression: false,
            auto_gain: false,
        }
    }
}

/// A negotiated media container format for the decode pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    /// MIME type with optional codec parameters.
    pub mime: String,
}

impl MediaFormat {
    pub fn new(mime: impl Into<String>) -> Self {
        Self { mime: mime.into() }
    }

    /// Preferred container: WebM with an explicit Opus codec.
    pub fn preferred() -> Self {
        Self::new("audio/webm; codecs=opus")
    }

    /// Fallback container when the sink cannot name the codec.
    pub fn fallback() -> Self {
        Self::new("audio/webm")
    }
}

/// Configuration for the transmitter controller.
#[derive(Debug, Clone)]
pub struct TransmitConfig {
    pub constraints: CaptureConstraints,

    /// Segment cadence when encoding from a live device.
    pub live_interval: Duration,

    /// Segment cadence when encoding the fallback tone. Finer than the live
    /// cadence: the tone is cheap to encode and keeps listener latency low.
    pub fallback_interval: Duration,

    /// How long to wait for the handshake reply before giving up.
    pub handshake_timeout: Duration,
}

impl TransmitConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.constraints.validate()?;
        if self.live_interval.is_zero() || self.fallback_interval.is_zero() {
            return Err("segment intervals must be positive".into());
        }
        if self.handshake_timeout.is_zero() {
            return Err("handshake timeout must be positive".into());
        }
        Ok(())
    }
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            live_interval: Duration::from_secs(1),
            fallback_interval: Duration::from_millis(100),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration for the listener controller.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Container format candidates, in preference order. The first one the
    /// decode sink supports is used for the pipeline.
    pub formats: Vec<MediaFormat>,

    /// Delay between the pipeline opening and the first append, so a small
    /// initial buffer accumulates before playback starts.
    pub start_delay: Duration,

    /// Delay before retrying an append while the container is still opening.
    pub retry_delay: Duration,
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.formats.is_empty() {
            return Err("at least one media format candidate is required".into());
        }
        Ok(())
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            formats: vec![MediaFormat::preferred(), MediaFormat::fallback()],
            start_delay: Duration::from_millis(200),
            retry_delay: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_constraints_are_valid() {
        assert!(CaptureConstraints::default().validate().is_ok());
    }

    #[test]
    fn zero_sample_rate_rejected() {
        let constraints = CaptureConstraints {
            sample_rate: 0,
            ..Default::default()
        };
        assert!(constraints.validate().is_err());
    }

    #[test]
    fn stereo_capture_rejected() {
        let constraints = CaptureConstraints {
            channels: 2,
            ..Default::default()
        };
        assert!(constraints.validate().is_err());
    }

    #[test]
    fn default_transmit_config_is_valid() {
        assert!(TransmitConfig::default().validate().is_ok());
    }

    #[test]
    fn playback_config_requires_format_candidate() {
        let config = PlaybackConfig {
            formats: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
