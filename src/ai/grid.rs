//! Walkability grid
//!
//! Discretizes a rectangular region of the horizontal (XZ) plane into square
//! cells and records, once per build, whether each cell is free of static
//! geometry.

use std::fmt;

use glam::{IVec2, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Static-geometry overlap test used while building the grid.
///
/// Implemented for closures `Fn(center, half_extents) -> bool` and for
/// [`crate::physics::Physics`].
pub trait ObstacleQuery {
    /// Returns true if an axis-aligned box overlaps blocking geometry
    fn overlaps_box(&self, center: Vec3, half_extents: Vec3) -> bool;
}

impl<F> ObstacleQuery for F
where
    F: Fn(Vec3, Vec3) -> bool,
{
    fn overlaps_box(&self, center: Vec3, half_extents: Vec3) -> bool {
        self(center, half_extents)
    }
}

/// Largest supported cell count; cell ids are stored as `u32`
pub const MAX_CELLS: usize = u32::MAX as usize;

/// Grid layout parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// World extent covered by the grid (X by Z)
    pub world_size: Vec2,
    /// Side length of one cell in world units
    pub cell_size: f32,
    /// Horizontal half-extent of the obstacle probe, as a fraction of the cell size
    pub probe_shrink: f32,
    /// Vertical half-extent of the obstacle probe
    pub probe_half_height: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            world_size: Vec2::new(30.0, 30.0),
            cell_size: 1.0,
            probe_shrink: 0.45,
            probe_half_height: 0.5,
        }
    }
}

impl GridConfig {
    /// Set the covered world extent
    #[must_use]
    pub fn with_world_size(mut self, world_size: Vec2) -> Self {
        self.world_size = world_size;
        self
    }

    /// Set the cell size
    #[must_use]
    pub fn with_cell_size(mut self, cell_size: f32) -> Self {
        self.cell_size = cell_size;
        self
    }

    /// Check the layout and compute the cell dimensions it produces.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-positive or non-finite cell size or world
    /// size, when rounding leaves the grid without cells, or when the cell
    /// count exceeds [`MAX_CELLS`].
    pub fn dimensions(&self) -> Result<(usize, usize), GridError> {
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(GridError::InvalidCellSize(self.cell_size));
        }
        if !self.world_size.is_finite() || self.world_size.x <= 0.0 || self.world_size.y <= 0.0 {
            return Err(GridError::InvalidWorldSize(self.world_size));
        }
        if !(self.probe_shrink > 0.0 && self.probe_shrink <= 0.5) {
            return Err(GridError::InvalidProbe(self.probe_shrink));
        }

        let width = (self.world_size.x / self.cell_size).round();
        let height = (self.world_size.y / self.cell_size).round();
        if width < 1.0 || height < 1.0 {
            return Err(GridError::EmptyGrid {
                world_size: self.world_size,
                cell_size: self.cell_size,
            });
        }

        let too_large = GridError::TooLarge {
            world_size: self.world_size,
            cell_size: self.cell_size,
        };
        if !(width.is_finite() && height.is_finite())
            || width > i32::MAX as f32
            || height > i32::MAX as f32
        {
            return Err(too_large);
        }

        let (width, height) = (width as usize, height as usize);
        match width.checked_mul(height) {
            Some(count) if count <= MAX_CELLS => Ok((width, height)),
            _ => Err(too_large),
        }
    }
}

/// One discretized unit of the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    /// Column
    pub x: i32,
    /// Row (along world Z)
    pub y: i32,
    /// World-space center
    pub world_pos: Vec3,
    /// Whether agents may stand here
    pub walkable: bool,
}

/// A 2D walkability grid laid over the XZ plane
#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    config: GridConfig,
    /// World position of the (0, 0) cell corner
    origin: Vec3,
    cells: Vec<Cell>,
}

impl Grid {
    /// Build a grid centered on `anchor`, probing every cell against `obstacles`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is malformed. Nothing is
    /// allocated in that case.
    pub fn build(
        anchor: Vec3,
        config: GridConfig,
        obstacles: &impl ObstacleQuery,
    ) -> Result<Self, GridError> {
        let (width, height) = config.dimensions()?;
        let origin = anchor
            - Vec3::new(
                config.world_size.x * 0.5,
                0.0,
                config.world_size.y * 0.5,
            );

        let mut grid = Self {
            width,
            height,
            config,
            origin,
            cells: Vec::with_capacity(width * height),
        };

        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let world_pos = grid.cell_to_world_center(x, y);
                grid.cells.push(Cell {
                    x,
                    y,
                    world_pos,
                    walkable: true,
                });
            }
        }

        grid.rebuild(obstacles);
        Ok(grid)
    }

    /// Recompute walkability of every cell.
    ///
    /// Always a full pass; the layout itself does not change.
    pub fn rebuild(&mut self, obstacles: &impl ObstacleQuery) {
        let half_extents = self.probe_half_extents();
        let mut blocked = 0usize;

        for cell in &mut self.cells {
            cell.walkable = !obstacles.overlaps_box(cell.world_pos, half_extents);
            if !cell.walkable {
                blocked += 1;
            }
        }

        log::debug!(
            "Built {}x{} walkability grid ({} blocked cells)",
            self.width,
            self.height,
            blocked
        );
    }

    /// Half extents of the box used to probe a single cell
    #[must_use]
    pub fn probe_half_extents(&self) -> Vec3 {
        let half = self.config.cell_size * self.config.probe_shrink;
        Vec3::new(half, self.config.probe_half_height, half)
    }

    /// Width in cells
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in cells
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Cell size in world units
    #[must_use]
    pub fn cell_size(&self) -> f32 {
        self.config.cell_size
    }

    /// World position of the grid's minimum corner
    #[must_use]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Total number of cells
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// All cells, row-major
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Check if coordinates fall inside the grid
    #[must_use]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Dense index of a cell, if in bounds
    #[must_use]
    pub fn index(&self, x: i32, y: i32) -> Option<usize> {
        self.contains(x, y)
            .then(|| y as usize * self.width + x as usize)
    }

    /// Coordinates of a dense cell index
    #[must_use]
    pub fn coord(&self, index: usize) -> IVec2 {
        IVec2::new((index % self.width) as i32, (index / self.width) as i32)
    }

    /// Get a cell, or `None` when out of bounds
    #[must_use]
    pub fn get_cell(&self, x: i32, y: i32) -> Option<&Cell> {
        self.index(x, y).map(|i| &self.cells[i])
    }

    /// Check if a cell exists and is walkable
    #[must_use]
    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.get_cell(x, y).is_some_and(|cell| cell.walkable)
    }

    /// Raw grid coordinates of a world position, without a bounds check
    #[must_use]
    pub fn world_to_grid(&self, pos: Vec3) -> IVec2 {
        let local = pos - self.origin;
        IVec2::new(
            (local.x / self.config.cell_size).floor() as i32,
            (local.z / self.config.cell_size).floor() as i32,
        )
    }

    /// Coordinates of the cell containing a world position, if inside the grid
    #[must_use]
    pub fn world_to_cell(&self, pos: Vec3) -> Option<IVec2> {
        let coord = self.world_to_grid(pos);
        self.contains(coord.x, coord.y).then_some(coord)
    }

    /// World-space center of a cell (at the grid's base height)
    #[must_use]
    pub fn cell_to_world_center(&self, x: i32, y: i32) -> Vec3 {
        self.origin
            + Vec3::new(
                (x as f32 + 0.5) * self.config.cell_size,
                0.0,
                (y as f32 + 0.5) * self.config.cell_size,
            )
    }
}

/// Malformed grid configuration
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// Cell size is zero, negative or not finite
    InvalidCellSize(f32),
    /// World size has a zero, negative or non-finite axis
    InvalidWorldSize(Vec2),
    /// Obstacle probe shrink factor outside (0, 0.5]
    InvalidProbe(f32),
    /// The world is smaller than half a cell on some axis
    EmptyGrid {
        /// Requested world size
        world_size: Vec2,
        /// Requested cell size
        cell_size: f32,
    },
    /// The world holds more cells than a grid can index
    TooLarge {
        /// Requested world size
        world_size: Vec2,
        /// Requested cell size
        cell_size: f32,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCellSize(size) => write!(f, "Cell size must be positive, got {size}"),
            Self::InvalidWorldSize(size) => {
                write!(f, "World size must be positive on both axes, got {size}")
            }
            Self::InvalidProbe(shrink) => {
                write!(f, "Probe shrink must be in (0, 0.5], got {shrink}")
            }
            Self::EmptyGrid {
                world_size,
                cell_size,
            } => write!(
                f,
                "World size {world_size} with cell size {cell_size} produces no cells"
            ),
            Self::TooLarge {
                world_size,
                cell_size,
            } => write!(
                f,
                "World size {world_size} with cell size {cell_size} exceeds {MAX_CELLS} cells"
            ),
        }
    }
}

impl std::error::Error for GridError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid(size: f32, cell_size: f32) -> Grid {
        let config = GridConfig::default()
            .with_world_size(Vec2::splat(size))
            .with_cell_size(cell_size);
        Grid::build(Vec3::ZERO, config, &|_: Vec3, _: Vec3| false).unwrap()
    }

    #[test]
    fn test_dimensions_and_origin() {
        let grid = open_grid(30.0, 1.0);

        assert_eq!(grid.width(), 30);
        assert_eq!(grid.height(), 30);
        assert_eq!(grid.cell_count(), 900);
        assert!((grid.origin() - Vec3::new(-15.0, 0.0, -15.0)).length() < 1e-5);
    }

    #[test]
    fn test_dimensions_round_to_nearest() {
        let config = GridConfig::default()
            .with_world_size(Vec2::new(10.4, 10.6))
            .with_cell_size(1.0);
        assert_eq!(config.dimensions(), Ok((10, 11)));
    }

    #[test]
    fn test_round_trip_cell_centers() {
        let grid = open_grid(12.0, 0.75);

        for y in 0..grid.height() as i32 {
            for x in 0..grid.width() as i32 {
                let center = grid.cell_to_world_center(x, y);
                assert_eq!(grid.world_to_cell(center), Some(IVec2::new(x, y)));
            }
        }
    }

    #[test]
    fn test_cell_center_matches_stored_position() {
        let grid = open_grid(8.0, 2.0);
        let cell = grid.get_cell(1, 3).unwrap();

        assert_eq!(cell.world_pos, grid.cell_to_world_center(1, 3));
        assert!((cell.world_pos - Vec3::new(-1.0, 0.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn test_out_of_bounds_lookups() {
        let grid = open_grid(10.0, 1.0);

        assert!(grid.get_cell(-1, 0).is_none());
        assert!(grid.get_cell(0, 10).is_none());
        assert!(!grid.is_walkable(10, 10));
        assert_eq!(grid.world_to_cell(Vec3::new(5.0, 0.0, 0.0)), None);
        assert_eq!(grid.world_to_cell(Vec3::new(-5.1, 0.0, 0.0)), None);
        assert_eq!(grid.world_to_grid(Vec3::new(-5.1, 0.0, 0.0)).x, -1);
    }

    #[test]
    fn test_obstacle_marks_cells() {
        // One unit box centered at (0.5, 0, 0.5)
        let obstacle = |center: Vec3, half: Vec3| {
            (center.x - 0.5).abs() < 0.5 + half.x && (center.z - 0.5).abs() < 0.5 + half.z
        };
        let config = GridConfig::default().with_world_size(Vec2::splat(10.0));
        let grid = Grid::build(Vec3::ZERO, config, &obstacle).unwrap();

        let blocked: Vec<_> = grid.cells().iter().filter(|c| !c.walkable).collect();
        assert_eq!(blocked.len(), 1);
        assert_eq!((blocked[0].x, blocked[0].y), (5, 5));
    }

    #[test]
    fn test_probe_tolerates_flush_obstacles() {
        let grid = open_grid(4.0, 1.0);
        let half = grid.probe_half_extents();

        assert!((half.x - 0.45).abs() < 1e-6);
        assert!((half.y - 0.5).abs() < 1e-6);
        assert!((half.z - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_rebuild_is_total() {
        let mut grid = open_grid(6.0, 1.0);
        grid.rebuild(&|_: Vec3, _: Vec3| true);
        assert!(grid.cells().iter().all(|c| !c.walkable));

        grid.rebuild(&|_: Vec3, _: Vec3| false);
        assert!(grid.cells().iter().all(|c| c.walkable));
    }

    #[test]
    fn test_rejects_bad_configuration() {
        let none = |_: Vec3, _: Vec3| false;

        let zero = GridConfig::default().with_cell_size(0.0);
        assert_eq!(
            Grid::build(Vec3::ZERO, zero, &none).unwrap_err(),
            GridError::InvalidCellSize(0.0)
        );

        let negative = GridConfig::default().with_cell_size(-1.0);
        assert!(Grid::build(Vec3::ZERO, negative, &none).is_err());

        let tiny = GridConfig::default()
            .with_world_size(Vec2::new(0.2, 5.0))
            .with_cell_size(1.0);
        assert!(matches!(
            Grid::build(Vec3::ZERO, tiny, &none),
            Err(GridError::EmptyGrid { .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_world() {
        let none = |_: Vec3, _: Vec3| false;

        let huge = GridConfig::default().with_world_size(Vec2::splat(1e12));
        assert!(matches!(huge.dimensions(), Err(GridError::TooLarge { .. })));
        assert!(matches!(
            Grid::build(Vec3::ZERO, huge, &none),
            Err(GridError::TooLarge { .. })
        ));

        // Each axis fits but the product does not
        let wide = GridConfig::default().with_world_size(Vec2::new(100_000.0, 100_000.0));
        assert!(matches!(wide.dimensions(), Err(GridError::TooLarge { .. })));

        // Ratio overflows to infinity
        let tiny_cells = GridConfig::default()
            .with_world_size(Vec2::splat(1e30))
            .with_cell_size(1e-30);
        assert!(matches!(tiny_cells.dimensions(), Err(GridError::TooLarge { .. })));
    }
}
