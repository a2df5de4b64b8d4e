//! Ground models: friction and fluid parameters of terrain surfaces.
//!
//! Models are kept in a [`GroundModelRegistry`] that starts out with a set of
//! built-in surfaces and can be extended from an INI-style definition file:
//!
//! ```text
//! [wet_concrete]
//! base = concrete
//! static friction coefficient = 0.6
//! ```

use std::path::Path;

use rustc_hash::FxHashMap;

/// Particle/sound family of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FxKind {
    #[default]
    None,
    Hard,
    Dusty,
    Clumpy,
    Particle,
}

impl FxKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(FxKind::None),
            "HARD" => Some(FxKind::Hard),
            "DUSTY" => Some(FxKind::Dusty),
            "CLUMPY" => Some(FxKind::Clumpy),
            "PARTICLE" => Some(FxKind::Particle),
            _ => None,
        }
    }
}

/// Index of a model inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroundModelId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct GroundModel {
    pub name: String,
    /// Adhesion velocity, m/s.
    pub va: f32,
    /// Static friction coefficient.
    pub ms: f32,
    /// Sliding friction coefficient.
    pub mc: f32,
    /// Hydrodynamic friction, s/m.
    pub t2: f32,
    /// Stribeck velocity, m/s.
    pub vs: f32,
    pub alpha: f32,
    pub strength: f32,
    pub fluid_density: f32,
    pub flow_consistency_index: f32,
    pub flow_behavior_index: f32,
    /// Depth below the surface where solid ground starts; zero for solid
    /// surfaces.
    pub solid_ground_level: f32,
    pub drag_anisotropy: f32,
    pub fx: FxKind,
    pub sound_id: i32,
    pub handler_id: i32,
}

impl GroundModel {
    /// A model with loader defaults: everything zero except `alpha` and
    /// `strength`.
    pub fn blank(name: &str) -> Self {
        Self {
            name: name.to_string(),
            va: 0.0,
            ms: 0.0,
            mc: 0.0,
            t2: 0.0,
            vs: 0.0,
            alpha: 2.0,
            strength: 1.0,
            fluid_density: 0.0,
            flow_consistency_index: 0.0,
            flow_behavior_index: 0.0,
            solid_ground_level: 0.0,
            drag_anisotropy: 0.0,
            fx: FxKind::None,
            sound_id: 0,
            handler_id: 0,
        }
    }

    fn solid(name: &str, va: f32, ms: f32, mc: f32, t2: f32, vs: f32, fx: FxKind) -> Self {
        Self {
            va,
            ms,
            mc,
            t2,
            vs,
            fx,
            ..Self::blank(name)
        }
    }

    pub fn is_fluid(&self) -> bool {
        self.solid_ground_level != 0.0
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        let num = || {
            value
                .parse::<f32>()
                .map_err(|_| format!("invalid number '{value}' for '{key}'"))
        };
        match key {
            "adhesion velocity" => self.va = num()?,
            "static friction coefficient" => self.ms = num()?,
            "sliding friction coefficient" => self.mc = num()?,
            "hydrodynamic friction" => self.t2 = num()?,
            "stribeck velocity" => self.vs = num()?,
            "alpha" => self.alpha = num()?,
            "strength" => self.strength = num()?,
            "fluid density" => self.fluid_density = num()?,
            "flow consistency index" => self.flow_consistency_index = num()?,
            "flow behavior index" => self.flow_behavior_index = num()?,
            "solid ground level" => self.solid_ground_level = num()?,
            "drag anisotropy" => self.drag_anisotropy = num()?,
            "fx_type" => {
                self.fx = FxKind::parse(value).ok_or_else(|| format!("invalid fx_type '{value}'"))?
            }
            "base" => {}
            _ if key.starts_with("fx_") => {}
            _ => return Err(format!("unknown key '{key}'")),
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GroundModelError {
    #[error("failed to read ground models: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("ground model '{model}' derives from unknown base '{base}'")]
    UnknownBase { model: String, base: String },
}

/// Named ground models with a default.
#[derive(Debug, Clone)]
pub struct GroundModelRegistry {
    models: Vec<GroundModel>,
    by_name: FxHashMap<String, GroundModelId>,
    default: GroundModelId,
}

impl Default for GroundModelRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl GroundModelRegistry {
    /// Registry holding the built-in surfaces, defaulting to `concrete`.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            models: Vec::new(),
            by_name: FxHashMap::default(),
            default: GroundModelId(0),
        };
        for model in builtin_models() {
            registry.insert(model);
        }
        registry
    }

    /// Add or replace a model by name.
    pub fn insert(&mut self, model: GroundModel) -> GroundModelId {
        if let Some(&id) = self.by_name.get(&model.name) {
            self.models[id.0] = model;
            return id;
        }
        let id = GroundModelId(self.models.len());
        self.by_name.insert(model.name.clone(), id);
        self.models.push(model);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<GroundModelId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: GroundModelId) -> &GroundModel {
        self.models.get(id.0).unwrap_or(&self.models[self.default.0])
    }

    pub fn by_name(&self, name: &str) -> Option<&GroundModel> {
        self.id_of(name).map(|id| &self.models[id.0])
    }

    pub fn default_id(&self) -> GroundModelId {
        self.default
    }

    pub fn default_model(&self) -> &GroundModel {
        &self.models[self.default.0]
    }

    /// Change the default model; unknown names leave it unchanged.
    pub fn set_default(&mut self, name: &str) -> bool {
        match self.id_of(name) {
            Some(id) => {
                self.default = id;
                true
            }
            None => {
                tracing::warn!(name, "unknown default ground model, keeping current");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn load_file(&mut self, path: &Path) -> Result<usize, GroundModelError> {
        let text = std::fs::read_to_string(path)?;
        let count = self.load_str(&text)?;
        tracing::info!(path = %path.display(), count, "loaded ground models");
        Ok(count)
    }

    /// Parse INI-style definitions into the registry. Returns the number of
    /// models defined. `[general]` and `[config]` sections are ignored.
    pub fn load_str(&mut self, text: &str) -> Result<usize, GroundModelError> {
        let mut sections: Vec<(String, usize, Vec<(usize, String, String)>)> = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| GroundModelError::Parse {
                    line: line_no,
                    message: "unterminated section header".to_string(),
                })?;
                sections.push((name.trim().to_string(), line_no, Vec::new()));
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| GroundModelError::Parse {
                line: line_no,
                message: format!("expected 'key = value', got '{line}'"),
            })?;
            let section = sections.last_mut().ok_or_else(|| GroundModelError::Parse {
                line: line_no,
                message: "key outside of a section".to_string(),
            })?;
            section
                .2
                .push((line_no, key.trim().to_string(), value.trim().to_string()));
        }

        let mut count = 0;
        for (name, _, entries) in sections {
            if name == "general" || name == "config" {
                continue;
            }
            let base = entries
                .iter()
                .find(|(_, k, _)| k == "base")
                .map(|(_, _, v)| v.clone());
            let mut model = match base {
                Some(base) => {
                    let mut inherited =
                        self.by_name(&base)
                            .cloned()
                            .ok_or_else(|| GroundModelError::UnknownBase {
                                model: name.clone(),
                                base: base.clone(),
                            })?;
                    inherited.name = name.clone();
                    inherited
                }
                None => GroundModel::blank(&name),
            };
            for (line, key, value) in &entries {
                model
                    .apply(key, value)
                    .map_err(|message| GroundModelError::Parse {
                        line: *line,
                        message,
                    })?;
            }
            self.insert(model);
            count += 1;
        }
        Ok(count)
    }
}

fn builtin_models() -> Vec<GroundModel> {
    vec![
        GroundModel::solid("concrete", 3.0, 1.0, 0.8, 0.01, 1.2, FxKind::Hard),
        GroundModel::solid("asphalt", 3.0, 0.95, 0.75, 0.01, 1.0, FxKind::Hard),
        GroundModel::solid("gravel", 1.5, 0.7, 0.55, 0.02, 0.8, FxKind::Dusty),
        GroundModel::solid("grass", 1.0, 0.5, 0.4, 0.05, 0.7, FxKind::Clumpy),
        GroundModel {
            strength: 0.8,
            fluid_density: 1500.0,
            flow_consistency_index: 1800.0,
            flow_behavior_index: 0.5,
            solid_ground_level: 0.2,
            drag_anisotropy: 0.5,
            ..GroundModel::solid("mud", 0.5, 0.3, 0.25, 0.1, 0.5, FxKind::Clumpy)
        },
        GroundModel {
            fluid_density: 1800.0,
            flow_consistency_index: 1000.0,
            flow_behavior_index: 0.8,
            solid_ground_level: 0.1,
            drag_anisotropy: 0.7,
            ..GroundModel::solid("sand", 0.8, 0.6, 0.45, 0.08, 0.6, FxKind::Particle)
        },
        GroundModel::solid("ice", 0.2, 0.1, 0.05, 0.005, 0.3, FxKind::Hard),
        GroundModel::solid("rock", 3.0, 1.1, 0.9, 0.01, 1.2, FxKind::Hard),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_present() {
        let registry = GroundModelRegistry::with_builtins();
        for name in ["concrete", "asphalt", "gravel", "grass", "mud", "sand", "ice", "rock"] {
            assert!(registry.by_name(name).is_some(), "missing {name}");
        }
        assert_eq!(registry.default_model().name, "concrete");
        assert!(registry.by_name("mud").unwrap().is_fluid());
        assert!(!registry.default_model().is_fluid());
    }

    #[test]
    fn test_load_with_base_inheritance() {
        let mut registry = GroundModelRegistry::with_builtins();
        let text = "\
[general]
version = 3

; slippery variant
[wet_concrete]
base = concrete
static friction coefficient = 0.6
fx_type = DUSTY
";
        assert_eq!(registry.load_str(text).unwrap(), 1);
        let wet = registry.by_name("wet_concrete").unwrap();
        let concrete = registry.by_name("concrete").unwrap();
        assert_eq!(wet.ms, 0.6);
        assert_eq!(wet.mc, concrete.mc);
        assert_eq!(wet.fx, FxKind::Dusty);
    }

    #[test]
    fn test_blank_defaults() {
        let mut registry = GroundModelRegistry::with_builtins();
        registry.load_str("[slick]\nadhesion velocity = 0.1\n").unwrap();
        let slick = registry.by_name("slick").unwrap();
        assert_eq!(slick.alpha, 2.0);
        assert_eq!(slick.strength, 1.0);
        assert_eq!(slick.ms, 0.0);
    }

    #[test]
    fn test_unknown_base() {
        let mut registry = GroundModelRegistry::with_builtins();
        let err = registry.load_str("[x]\nbase = lava\n").unwrap_err();
        assert!(matches!(err, GroundModelError::UnknownBase { .. }));
    }

    #[test]
    fn test_bad_number_reports_line() {
        let mut registry = GroundModelRegistry::with_builtins();
        let err = registry.load_str("[x]\n\nalpha = fast\n").unwrap_err();
        assert!(matches!(err, GroundModelError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_default_switch() {
        let mut registry = GroundModelRegistry::with_builtins();
        assert!(registry.set_default("ice"));
        assert_eq!(registry.default_model().name, "ice");
        assert!(!registry.set_default("nope"));
        assert_eq!(registry.default_model().name, "ice");
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ground_models.cfg");
        std::fs::write(&path, "[tarmac]\nbase = asphalt\n").unwrap();
        let mut registry = GroundModelRegistry::with_builtins();
        assert_eq!(registry.load_file(&path).unwrap(), 1);
        assert!(registry.id_of("tarmac").is_some());
    }
}
