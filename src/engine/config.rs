// Simulation constants. Positions are in pixels, always multiples of CELL.

/// Side length of one grid cell in pixels. Snake segments and items are one cell.
pub const CELL: i32 = 20;

/// Playable area in pixels.
pub const WIDTH: i32 = 1040;
pub const HEIGHT: i32 = 640;

/// Playable area in cells (52 x 32).
pub const GRID_WIDTH: i32 = WIDTH / CELL;
pub const GRID_HEIGHT: i32 = HEIGHT / CELL;

/// Target tick cadence in milliseconds.
pub const TICK_MS: u64 = 150;

/// How long a special item stays on the grid before it expires.
pub const SPECIAL_ITEM_LIFETIME_MS: u64 = 5000;

/// A special item becomes eligible every this many consumptions.
pub const SPECIAL_TRIGGER_INTERVAL: u32 = 4;

/// Score granted per item kind.
pub const NORMAL_ITEM_VALUE: i32 = 1;
pub const SPECIAL_ITEM_VALUE: i32 = 5;

/// Initial snake: 3 segments on row y=60, head at x=40, moving right.
pub const INITIAL_LENGTH: usize = 3;
pub const START_X: i32 = 40;
pub const START_Y: i32 = 60;

/// Placement gives up after this many rejected samples (grid considered full).
pub const MAX_PLACEMENT_ATTEMPTS: u32 = 1000;
