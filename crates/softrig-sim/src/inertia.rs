//! Command inertia: smooths step inputs along named response curves.
//!
//! Curves are Catmull-Rom splines through `(x, y)` points with `y` in
//! thousandths of the command range per sub-step. A definition file lists
//! a model name on its own line followed by `x,y` pairs; `;` starts a
//! comment line.

use std::sync::Arc;

use glam::Vec2;
use rustc_hash::FxHashMap;

/// Inputs closer than this to the last output restart the curve.
const RESTART_EPSILON: f32 = 0.002;

/// Uniform Catmull-Rom spline parameterised over `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spline {
    points: Vec<Vec2>,
}

impl Spline {
    pub fn new(points: Vec<Vec2>) -> Self {
        Self { points }
    }

    pub fn add_point(&mut self, p: Vec2) {
        self.points.push(p);
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    fn tangent(&self, i: usize) -> Vec2 {
        let n = self.points.len();
        if n < 2 {
            return Vec2::ZERO;
        }
        if i == 0 {
            (self.points[1] - self.points[0]) * 0.5
        } else if i == n - 1 {
            (self.points[n - 1] - self.points[n - 2]) * 0.5
        } else {
            (self.points[i + 1] - self.points[i - 1]) * 0.5
        }
    }

    /// Point at `t` in `[0, 1]` across the whole spline.
    pub fn interpolate(&self, t: f32) -> Vec2 {
        match self.points.len() {
            0 => return Vec2::ZERO,
            1 => return self.points[0],
            _ => {}
        }
        let segments = (self.points.len() - 1) as f32;
        let f = t.clamp(0.0, 1.0) * segments;
        let seg = (f.floor() as usize).min(self.points.len() - 2);
        let local = f - seg as f32;
        if local == 0.0 {
            return self.points[seg];
        }
        if local == 1.0 {
            return self.points[seg + 1];
        }

        let (p0, p1) = (self.points[seg], self.points[seg + 1]);
        let (m0, m1) = (self.tangent(seg), self.tangent(seg + 1));
        let t2 = local * local;
        let t3 = t2 * local;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + local;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        p0 * h00 + m0 * h10 + p1 * h01 + m1 * h11
    }
}

#[derive(Debug, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct InertiaParseError {
    pub line: usize,
    pub message: String,
}

/// Named response curves.
#[derive(Debug, Clone)]
pub struct InertiaModels {
    splines: FxHashMap<String, Arc<Spline>>,
}

impl Default for InertiaModels {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl InertiaModels {
    /// `constant`, `linear`, `quadratic` and `smooth`.
    pub fn with_builtins() -> Self {
        let mut models = Self {
            splines: FxHashMap::default(),
        };
        let builtins: [(&str, &[(f32, f32)]); 4] = [
            ("constant", &[(0.0, 10.0), (1.0, 10.0)]),
            ("linear", &[(0.0, 0.0), (1.0, 20.0)]),
            ("quadratic", &[(0.0, 0.0), (0.5, 5.0), (1.0, 20.0)]),
            ("smooth", &[(0.0, 2.0), (0.5, 10.0), (1.0, 20.0)]),
        ];
        for (name, points) in builtins {
            let spline = Spline::new(points.iter().map(|&(x, y)| Vec2::new(x, y)).collect());
            models.splines.insert(name.to_string(), Arc::new(spline));
        }
        models
    }

    pub fn get(&self, name: &str) -> Option<Arc<Spline>> {
        self.splines.get(name).cloned()
    }

    /// Add the models of a definition file; points append to existing
    /// models of the same name.
    pub fn load_str(&mut self, text: &str) -> Result<usize, InertiaParseError> {
        let mut current: Option<String> = None;
        let mut loaded: FxHashMap<String, Spline> = FxHashMap::default();
        let mut order = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let args: Vec<&str> = line.split(',').map(str::trim).collect();
            if args.len() == 1 {
                current = Some(line.to_string());
                continue;
            }
            let Some(model) = &current else {
                continue;
            };
            let parse = |s: &str| {
                s.parse::<f32>().map_err(|_| InertiaParseError {
                    line: idx + 1,
                    message: format!("invalid number '{s}'"),
                })
            };
            if args.len() != 2 {
                return Err(InertiaParseError {
                    line: idx + 1,
                    message: format!("expected 'x,y', got '{line}'"),
                });
            }
            let point = Vec2::new(parse(args[0])?, parse(args[1])?);
            let spline = loaded.entry(model.clone()).or_insert_with(|| {
                order.push(model.clone());
                self.splines
                    .get(model)
                    .map(|s| (**s).clone())
                    .unwrap_or_default()
            });
            spline.add_point(point);
        }
        let count = order.len();
        for name in order {
            if let Some(spline) = loaded.remove(&name) {
                self.splines.insert(name, Arc::new(spline));
            }
        }
        Ok(count)
    }
}

/// Inertia state of one control channel.
#[derive(Debug, Clone, Default)]
pub struct InertiaChannel {
    pub start_delay: f32,
    pub stop_delay: f32,
    start: Option<Arc<Spline>>,
    stop: Option<Arc<Spline>>,
    last_output: f32,
    time: f32,
}

impl InertiaChannel {
    /// Build a channel from model names. Unknown names or non-positive
    /// delays leave the channel transparent for that direction, with a
    /// warning.
    pub fn new(
        models: &InertiaModels,
        start_delay: f32,
        stop_delay: f32,
        start_function: &str,
        stop_function: &str,
    ) -> Self {
        if start_delay <= 0.0 || stop_delay <= 0.0 {
            tracing::warn!(start_delay, stop_delay, "inertia delays must be positive");
        }
        let start = models.get(start_function);
        if start.is_none() {
            tracing::warn!(function = start_function, "inertia start function not found");
        }
        let stop = models.get(stop_function);
        if stop.is_none() {
            tracing::warn!(function = stop_function, "inertia stop function not found");
        }
        Self {
            start_delay: start_delay.max(0.0),
            stop_delay: stop_delay.max(0.0),
            start,
            stop,
            last_output: 0.0,
            time: 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.start.is_some() && self.stop.is_some()
    }

    pub fn last_output(&self) -> f32 {
        self.last_output
    }

    pub fn reset(&mut self) {
        self.last_output = 0.0;
        self.time = 0.0;
    }

    fn curve_step(factor: f32, spline: &Spline) -> f32 {
        spline.interpolate(factor.min(1.0)).y * 0.001
    }

    /// Move the output towards `input`, never overshooting it.
    pub fn calc_delay(&mut self, input: f32, dt: f32) -> f32 {
        let (Some(start), Some(stop)) = (&self.start, &self.stop) else {
            return input;
        };
        let last = self.last_output;
        let rel_diff = input.abs() - last.abs();
        let abs_diff = input - last;
        if abs_diff.abs() < RESTART_EPSILON {
            self.time = 0.0;
        }
        self.time += dt;
        let start_factor = self.start_delay * self.time;
        let stop_factor = self.stop_delay * self.time;

        let mut output = last;
        if abs_diff > 0.0 {
            if rel_diff > 0.0 {
                output = last + Self::curve_step(start_factor, start);
            } else if rel_diff < 0.0 {
                output = last + Self::curve_step(stop_factor, stop);
            }
            output = output.min(input);
        } else if abs_diff < 0.0 {
            if rel_diff > 0.0 {
                output = last - Self::curve_step(start_factor, start);
            } else if rel_diff < 0.0 {
                output = last - Self::curve_step(stop_factor, stop);
            }
            output = output.max(input);
        }
        self.last_output = output;
        output
    }
}
