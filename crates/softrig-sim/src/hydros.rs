//! Hydros: beams whose rest length follows the steering and flight controls.

use crate::beam::HydroFlags;
use crate::inertia::InertiaChannel;
use crate::vehicle::Vehicle;

/// Largest change of the direction state per sub-step without speed coupling.
const ANALOG_RATE: f32 = 0.02;
/// Rate of the aileron, rudder and elevator states, per second.
const SURFACE_RATE: f32 = 4.0;
/// Below this wheel speed the speed-scaled direction input fades in.
const SPEED_DIR_LIMIT: f32 = 12.0;

#[derive(Debug, Clone)]
pub struct Hydro {
    pub beam: usize,
    pub flags: HydroFlags,
    pub inertia: Option<InertiaChannel>,
}

impl Hydro {
    pub fn new(beam: usize, flags: HydroFlags, inertia: Option<InertiaChannel>) -> Self {
        Self { beam, flags, inertia }
    }

    pub(crate) fn reset(&mut self) {
        if let Some(inertia) = &mut self.inertia {
            inertia.reset();
        }
    }

    /// Combined control state and the number of inputs it was built from.
    fn compound(&self, dir: f32, speed: f32, aileron: f32, rudder: f32, elevator: f32) -> (f32, u32) {
        let speed_dir = if speed < SPEED_DIR_LIMIT {
            dir * (SPEED_DIR_LIMIT - speed) / SPEED_DIR_LIMIT
        } else {
            0.0
        };
        let inputs = [
            (HydroFlags::SPEED, speed_dir),
            (HydroFlags::DIR, dir),
            (HydroFlags::REV_DIR, -dir),
            (HydroFlags::AILERON, aileron),
            (HydroFlags::RUDDER, rudder),
            (HydroFlags::ELEVATOR, elevator),
            (HydroFlags::REV_AILERON, -aileron),
            (HydroFlags::REV_RUDDER, -rudder),
            (HydroFlags::REV_ELEVATOR, -elevator),
        ];
        inputs
            .iter()
            .filter(|(flag, _)| self.flags.contains(*flag))
            .fold((0.0, 0), |(sum, count), (_, value)| (sum + value, count + 1))
    }
}

/// Move `state` towards `command` at `rate·dt`, then let it return to centre by `dt`.
fn track_with_return(state: &mut f32, command: f32, rate: f32, dt: f32) {
    if *state == 0.0 && command == 0.0 {
        return;
    }
    if command != 0.0 {
        if *state > command {
            *state -= dt * rate;
        } else {
            *state += dt * rate;
        }
    }
    if *state > dt {
        *state -= dt;
    } else if *state < -dt {
        *state += dt;
    } else {
        *state = 0.0;
    }
}

impl Vehicle {
    fn hydro_speed_coupling(&self) -> bool {
        self.hydros.iter().any(|h| h.flags.contains(HydroFlags::SPEED))
    }

    /// Advance the control states and set every hydro beam's rest length.
    pub(crate) fn calc_hydros(&mut self, dt: f32) {
        let coupled = self.hydro_speed_coupling();
        let ws = self.wheel_speed;
        let c = &mut self.controls;
        if coupled {
            let rate = (30.0 / (10.0 + (ws / 2.0).abs())).max(1.2);
            track_with_return(&mut c.hydro_dir_state, c.hydro_dir_command, rate, dt);
        } else {
            c.hydro_dir_state += (c.hydro_dir_command - c.hydro_dir_state).clamp(-ANALOG_RATE, ANALOG_RATE);
        }
        track_with_return(&mut c.aileron_state, c.aileron_command, SURFACE_RATE, dt);
        track_with_return(&mut c.rudder_state, c.rudder_command, SURFACE_RATE, dt);
        track_with_return(&mut c.elevator_state, c.elevator_command, SURFACE_RATE, dt);

        let (dir, aileron, rudder, elevator) = (c.hydro_dir_state, c.aileron_state, c.rudder_state, c.elevator_state);
        for hydro in &mut self.hydros {
            let (sum, count) = hydro.compound(dir, ws, aileron, rudder, elevator);
            if count == 0 {
                continue;
            }
            let mut state = sum.clamp(-1.0, 1.0) / count as f32;
            if let Some(inertia) = &mut hydro.inertia {
                state = inertia.calc_delay(state, dt);
            }
            let Some(beam) = self.beams.get_mut(hydro.beam) else {
                continue;
            };
            if !hydro.flags.contains(HydroFlags::SPEED) && !beam.animator_bounds {
                self.controls.hydro_dir_wheel_display = state;
            }
            let mut factor = 1.0 - state * beam.hydro_ratio;
            if beam.animator_bounds {
                factor = factor.clamp(1.0 - beam.short_bound, 1.0 + beam.long_bound);
            }
            beam.length = beam.hydro_length * factor;
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::builder::build_vehicle;
    use crate::context::SimContext;
    use crate::def::{HydroDef, HydroInput, NodeDef, VehicleDef};
    use crate::ids::VehicleId;

    fn vehicle(inputs: Vec<HydroInput>, bounds: Option<(f32, f32)>) -> Vehicle {
        let def = VehicleDef {
            nodes: vec![NodeDef::at(0.0, 0.0, 0.0), NodeDef::at(2.0, 0.0, 0.0)],
            hydros: vec![HydroDef {
                nodes: [0, 1],
                ratio: 0.25,
                inputs,
                bounds,
                ..HydroDef::default()
            }],
            ..VehicleDef::default()
        };
        build_vehicle(VehicleId(0), &def, Vec3::ZERO, &SimContext::default()).expect("valid")
    }

    #[test]
    fn test_full_steer_shortens_hydro() {
        let mut v = vehicle(vec![HydroInput::Dir], None);
        v.controls.hydro_dir_command = 1.0;
        for _ in 0..100 {
            v.calc_hydros(0.0005);
        }
        assert!((v.controls.hydro_dir_state - 1.0).abs() < 1e-6);
        let beam = &v.beams()[v.hydros()[0].beam];
        assert!((beam.length - 2.0 * 0.75).abs() < 1e-5);
    }

    #[test]
    fn test_inputs_are_averaged() {
        let mut v = vehicle(vec![HydroInput::Dir, HydroInput::Rudder], None);
        v.controls.hydro_dir_command = 1.0;
        for _ in 0..100 {
            v.calc_hydros(0.0005);
        }
        let beam = &v.beams()[v.hydros()[0].beam];
        // rudder stays centred, so only half the steering reaches the beam
        assert!((beam.length - 2.0 * (1.0 - 0.5 * 0.25)).abs() < 1e-5);
    }

    #[test]
    fn test_animator_bounds_clamp() {
        let mut v = vehicle(vec![HydroInput::Dir], Some((0.1, 0.1)));
        v.controls.hydro_dir_command = 1.0;
        for _ in 0..100 {
            v.calc_hydros(0.0005);
        }
        let beam = &v.beams()[v.hydros()[0].beam];
        assert!((beam.length - 2.0 * 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_surfaces_return_to_centre() {
        let mut state = 0.5;
        for _ in 0..2000 {
            track_with_return(&mut state, 0.0, SURFACE_RATE, 0.0005);
        }
        assert_eq!(state, 0.0);
    }
}
