use super::param::AudioParam;

pub const MELODIC_ATTACK: f64 = 0.003;
pub const MELODIC_DECAY_UNIT: f64 = 0.04;
pub const NOISE_DECAY_UNIT: f64 = 0.015;
pub const RELEASE: f64 = 0.01; // sustained notes close over the last 10ms
pub const DECAY_FLOOR: f32 = 0.001;

/// Volume envelope the way the hardware does it.
///
/// `decay == 0` sustains at peak for the whole note and closes linearly at the
/// end. Anything higher is an exponential fall whose length is
/// `(16 - decay) * unit`, no matter how long the note is scheduled for.
pub fn apply_hardware_envelope(
    gain: &mut AudioParam,
    volume: f32,
    decay: u8,
    start: f64,
    duration: f64,
    is_noise: bool,
) {
    let peak = volume.clamp(0.0, 1.0);
    let attack = if is_noise { 0.0 } else { MELODIC_ATTACK };

    gain.set_value_at(0.0, start);
    gain.linear_ramp_to(peak, start + attack);

    if decay == 0 {
        gain.set_value_at(peak, start + duration - RELEASE);
        gain.linear_ramp_to(0.0, start + duration);
    } else {
        let unit = if is_noise { NOISE_DECAY_UNIT } else { MELODIC_DECAY_UNIT };
        let fall = (16 - decay.min(15)) as f64 * unit;
        gain.exponential_ramp_to(DECAY_FLOOR, start + attack + fall);
    }
}
