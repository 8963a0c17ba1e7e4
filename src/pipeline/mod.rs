mod blur;
mod controller;
mod targets;
mod threshold;

use crate::error::PipelineError;

pub use blur::blur;
pub use controller::PipelineController;
pub use targets::{PingPong, RenderTargetSet};
pub use threshold::composite;

/// One of the two drawn channels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Particle silhouettes in particle color
    Body,
    /// Glyph UVs of pattern-flagged particles
    Pattern,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Body, Channel::Pattern];

    pub fn label(self) -> &'static str {
        match self {
            Channel::Body => "body",
            Channel::Pattern => "pattern",
        }
    }

    /// Output selector value shown to the user
    pub fn selector(self) -> u32 {
        match self {
            Channel::Body => 0,
            Channel::Pattern => 1,
        }
    }

    pub fn from_selector(selector: u32) -> Result<Self, PipelineError> {
        match selector {
            0 => Ok(Channel::Body),
            1 => Ok(Channel::Pattern),
            other => Err(PipelineError::UnrecognizedSelector(other)),
        }
    }
}

/// Per-channel stage switches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelToggles {
    pub draw: bool,
    pub blur: bool,
}

impl Default for ChannelToggles {
    fn default() -> Self {
        Self {
            draw: true,
            blur: true,
        }
    }
}

/// Which stages run each frame and which channel is shown
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPipelineConfig {
    pub body: ChannelToggles,
    pub pattern: ChannelToggles,
    pub threshold: bool,
    /// Raw selector, see [`Channel::from_selector`]
    pub output_channel: u32,
}

impl Default for RenderPipelineConfig {
    fn default() -> Self {
        Self {
            body: ChannelToggles::default(),
            pattern: ChannelToggles::default(),
            threshold: true,
            output_channel: Channel::Body.selector(),
        }
    }
}

impl RenderPipelineConfig {
    pub fn toggles(&self, channel: Channel) -> ChannelToggles {
        match channel {
            Channel::Body => self.body,
            Channel::Pattern => self.pattern,
        }
    }

    pub fn toggles_mut(&mut self, channel: Channel) -> &mut ChannelToggles {
        match channel {
            Channel::Body => &mut self.body,
            Channel::Pattern => &mut self.pattern,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_selector(channel.selector()).unwrap(), channel);
        }
        assert!(matches!(
            Channel::from_selector(7),
            Err(PipelineError::UnrecognizedSelector(7))
        ));
    }

    #[test]
    fn test_default_config_enables_everything() {
        let config = RenderPipelineConfig::default();
        for channel in Channel::ALL {
            assert_eq!(config.toggles(channel), ChannelToggles { draw: true, blur: true });
        }
        assert!(config.threshold);
        assert_eq!(config.output_channel, 0);
    }
}
