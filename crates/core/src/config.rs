use crate::channel::Leg;
use std::time::Duration;

/// How long a legacy `audio_output` waits behind its inline transcript.
pub const DEFAULT_LEGACY_AUDIO_DELAY: Duration = Duration::from_millis(300);

/// Connection parameters and engine tuning for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Endpoint of the leg that carries client events.
    pub outbound_url: String,
    /// Endpoint of the leg that carries server events.
    pub inbound_url: String,
    /// The leg whose `Open` event opens the session.
    pub primary: Leg,
    pub legacy_audio_delay: Duration,
    /// Upper bound on a tool handler's run time. `None` waits forever.
    pub tool_call_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(outbound_url: impl Into<String>, inbound_url: impl Into<String>) -> Self {
        Self {
            outbound_url: outbound_url.into(),
            inbound_url: inbound_url.into(),
            primary: Leg::Outbound,
            legacy_audio_delay: DEFAULT_LEGACY_AUDIO_DELAY,
            tool_call_timeout: None,
        }
    }

    pub fn with_primary(mut self, primary: Leg) -> Self {
        self.primary = primary;
        self
    }

    pub fn with_legacy_audio_delay(mut self, delay: Duration) -> Self {
        self.legacy_audio_delay = delay;
        self
    }

    pub fn with_tool_call_timeout(mut self, timeout: Duration) -> Self {
        self.tool_call_timeout = Some(timeout);
        self
    }
}
