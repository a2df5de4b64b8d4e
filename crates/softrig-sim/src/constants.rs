//! Physical constants and hard capacity limits.

/// Fixed physics sub-step in seconds (2 kHz).
pub const PHYSICS_DT: f32 = 0.0005;
/// Upper bound on sub-steps per visual frame.
pub const MAX_SUBSTEPS: u32 = 100;

pub const MAX_VEHICLES: usize = 5000;
pub const MAX_NODES: usize = 1000;
pub const MAX_BEAMS: usize = 5000;
pub const MAX_WHEELS: usize = 64;
pub const MAX_COMMANDS: usize = 84;
pub const MAX_RIGIDIFIERS: usize = 100;
pub const MAX_ROTATORS: usize = 20;
pub const MAX_HOOKS: usize = 64;
pub const MAX_TIES: usize = 64;
pub const MAX_ROPES: usize = 64;
pub const MAX_ROPABLES: usize = 64;

pub const DEFAULT_SPRING: f32 = 9_000_000.0;
pub const DEFAULT_DAMP: f32 = 12_000.0;
pub const DEFAULT_RIGIDIFIER_SPRING: f32 = 1_000_000.0;
pub const DEFAULT_RIGIDIFIER_DAMP: f32 = 50_000.0;
pub const DEFAULT_GRAVITY: f32 = -9.81;
pub const DEFAULT_DRAG: f32 = 0.05;
pub const DEFAULT_WATERDRAG: f32 = 10.0;
pub const DEFAULT_COLLISION_RANGE: f32 = 0.02;
pub const MIN_BEAM_LENGTH: f32 = 0.1;
pub const BEAM_BREAK: f32 = 1_000_000.0;
pub const BEAM_DEFORM: f32 = 400_000.0;
pub const SUPPORT_BEAM_LIMIT_DEFAULT: f32 = 4.0;
pub const STAB_RATE: f32 = 0.025;
pub const RAD_PER_SEC_TO_RPM: f32 = 9.549_296_6;

pub const HOOK_FORCE_DEFAULT: f32 = 10_000_000.0;
pub const HOOK_RANGE_DEFAULT: f32 = 0.4;
/// Assistance beam shortening rate in m/s.
pub const HOOK_SPEED_DEFAULT: f32 = 0.5;
pub const HOOK_LOCK_TIMER_DEFAULT: f32 = 5.0;
/// Lock group excluded from every hook search.
pub const NODE_LOCKGROUP_EXCLUDED: i32 = 9999;
pub const NODE_LOCKGROUP_DEFAULT: i32 = -1;

pub const NODE_FRICTION_COEF_DEFAULT: f32 = 1.0;
pub const NODE_VOLUME_COEF_DEFAULT: f32 = 1.0;
pub const NODE_SURFACE_COEF_DEFAULT: f32 = 1.0;
/// Smallest mass a node may carry; keeps the inverse mass finite.
pub const MIN_NODE_MASS: f32 = 0.001;

/// Squared node-0 offset beyond which the vehicle origin is re-centred.
pub const ORIGIN_SHIFT_THRESHOLD_SQ: f32 = 10_000.0 * 10_000.0;
/// Bounding box padding around node extents.
pub const AABB_PADDING: f32 = 0.05;

/// Ground collision test interval for ordinary nodes, seconds.
pub const GROUND_TEST_INTERVAL: f32 = 0.005;
/// Ground collision test interval for wheel nodes, seconds.
pub const WHEEL_GROUND_TEST_INTERVAL: f32 = 0.0025;
/// Seconds a dripping node needs to dry.
pub const DRY_TIME: f32 = 5.0;

/// Interior collision cab backoff cap.
pub const COLLCAB_MAX_RATE: i32 = 12;
/// Relative speed (squared) above which cab rates are reset.
pub const FAST_PARTNER_SPEED_SQ: f32 = 16.0;
