use crate::pipeline::project::DutyCycle;
use crate::shared::NUM_CHANNELS;

const SILENT: f32 = 0.001; // faders at or below this count as off

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelConfig {
    pub duty_cycle: DutyCycle, // used when a row has no duty of its own
    pub mute: bool,
    pub solo: bool,
    pub volume: f32, // fader, 0.0 - 1.0
}

impl ChannelConfig {
    fn new(duty_cycle: DutyCycle) -> Self {
        Self {
            duty_cycle,
            mute: false,
            solo: false,
            volume: 1.0,
        }
    }
}

/// Per-channel mixer settings. Lives in the editor session, not in the project file.
#[derive(Clone, Debug, PartialEq)]
pub struct MixerState {
    pub channels: [ChannelConfig; NUM_CHANNELS],
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            channels: [
                ChannelConfig::new(DutyCycle::Half),
                ChannelConfig::new(DutyCycle::Quarter),
                ChannelConfig::new(DutyCycle::Half),
                ChannelConfig::new(DutyCycle::Half),
            ],
        }
    }
}

impl MixerState {
    pub fn channel(&self, ch: u8) -> Option<&ChannelConfig> {
        self.channels.get((ch as usize).checked_sub(1)?)
    }

    fn channel_mut(&mut self, ch: u8) -> Option<&mut ChannelConfig> {
        self.channels.get_mut((ch as usize).checked_sub(1)?)
    }

    pub fn default_duty(&self, ch: u8) -> DutyCycle {
        self.channel(ch).map(|c| c.duty_cycle).unwrap_or_default()
    }

    /// Muting clears solo on that channel.
    pub fn toggle_mute(&mut self, ch: u8) {
        if let Some(cfg) = self.channel_mut(ch) {
            cfg.mute = !cfg.mute;
            if cfg.mute {
                cfg.solo = false;
            }
        }
    }

    /// Soloing clears mute on that channel.
    pub fn toggle_solo(&mut self, ch: u8) {
        if let Some(cfg) = self.channel_mut(ch) {
            cfg.solo = !cfg.solo;
            if cfg.solo {
                cfg.mute = false;
            }
        }
    }

    /// Pulling a fader to zero mutes it; bringing it back up unmutes it.
    pub fn set_volume(&mut self, ch: u8, volume: f32) {
        let Some(cfg) = self.channel_mut(ch) else { return };
        let volume = volume.clamp(0.0, 1.0);
        if volume <= SILENT {
            cfg.mute = true;
            cfg.solo = false;
        } else if cfg.volume <= SILENT {
            cfg.mute = false;
        }
        cfg.volume = volume;
    }

    pub fn set_default_duty(&mut self, ch: u8, duty: DutyCycle) {
        if let Some(cfg) = self.channel_mut(ch) {
            cfg.duty_cycle = duty;
        }
    }

    pub fn any_solo(&self) -> bool {
        self.channels.iter().any(|c| c.solo)
    }

    /// Resolve mute/solo/fader into the one gain each channel bus gets.
    /// Any solo silences every channel that isn't soloed; otherwise mute wins.
    pub fn bus_gains(&self) -> [f32; NUM_CHANNELS] {
        let any_solo = self.any_solo();
        self.channels.map(|c| {
            let audible = if any_solo { c.solo } else { !c.mute };
            if audible { c.volume } else { 0.0 }
        })
    }
}
