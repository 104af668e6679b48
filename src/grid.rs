//! Occupancy grid, points and cell states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Walkable,
    Blocked,
}

impl Cell {
    /// Wire value: 0 walkable, 1 blocked.
    pub fn as_u8(self) -> u8 {
        match self {
            Cell::Walkable => 0,
            Cell::Blocked => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Cell::Walkable),
            1 => Some(Cell::Blocked),
            _ => None,
        }
    }
}

/// Integer grid coordinate. Signed and 64-bit so that any integer a client
/// sends can be represented and rejected as out of bounds instead of failing
/// to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: Point) -> u64 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// 4-connected neighbours: right, left, down, up.
    pub fn neighbors_4(self) -> [Point; 4] {
        [
            Point::new(self.x + 1, self.y),
            Point::new(self.x - 1, self.y),
            Point::new(self.x, self.y + 1),
            Point::new(self.x, self.y - 1),
        ]
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Rectangular matrix of cells, stored row-major.
///
/// Serialized as an array of rows of `0`/`1` values, the same shape the map
/// catalog file uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<u8>>", into = "Vec<Vec<u8>>")]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

/// Why a set of rows could not become a [`Grid`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridShapeError {
    #[error("grid has no cells")]
    Empty,

    #[error("row {row} has {actual} cells, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("cell ({x},{y}) has value {value}, expected 0 or 1")]
    BadCell { x: usize, y: usize, value: u8 },
}

impl Grid {
    /// All-walkable grid.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::Walkable; width * height],
        }
    }

    pub fn from_rows(rows: Vec<Vec<u8>>) -> Result<Self, GridShapeError> {
        let height = rows.len();
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if width == 0 {
            return Err(GridShapeError::Empty);
        }

        let mut cells = Vec::with_capacity(width * height);
        for (y, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(GridShapeError::Ragged {
                    row: y,
                    expected: width,
                    actual: row.len(),
                });
            }
            for (x, value) in row.into_iter().enumerate() {
                let cell = Cell::from_u8(value).ok_or(GridShapeError::BadCell { x, y, value })?;
                cells.push(cell);
            }
        }

        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.cells
            .chunks(self.width.max(1))
            .map(|row| row.iter().map(|c| c.as_u8()).collect())
            .collect()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn in_bounds(&self, p: Point) -> bool {
        self.index_of(p).is_some()
    }

    /// Row-major index of an in-bounds point.
    pub fn index_of(&self, p: Point) -> Option<usize> {
        let x = usize::try_from(p.x).ok()?;
        let y = usize::try_from(p.y).ok()?;
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    /// Inverse of [`Grid::index_of`].
    pub fn point_at(&self, index: usize) -> Point {
        Point::new((index % self.width) as i64, (index / self.width) as i64)
    }

    pub fn get(&self, p: Point) -> Option<Cell> {
        self.index_of(p).map(|i| self.cells[i])
    }

    pub fn is_walkable(&self, p: Point) -> bool {
        self.get(p) == Some(Cell::Walkable)
    }

    /// Sets a cell; returns false if the point is out of bounds.
    pub fn set(&mut self, p: Point, cell: Cell) -> bool {
        match self.index_of(p) {
            Some(i) => {
                self.cells[i] = cell;
                true
            }
            None => false,
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Row-major byte encoding used on the gRPC wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.as_u8()).collect()
    }
}

impl TryFrom<Vec<Vec<u8>>> for Grid {
    type Error = GridShapeError;

    fn try_from(rows: Vec<Vec<u8>>) -> Result<Self, Self::Error> {
        Grid::from_rows(rows)
    }
}

impl From<Grid> for Vec<Vec<u8>> {
    fn from(grid: Grid) -> Self {
        grid.to_rows()
    }
}

/// Parses an ASCII picture: `#` is blocked, anything else walkable.
/// Convenient for building small grids in tests and fixtures.
impl std::str::FromStr for Grid {
    type Err = GridShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rows = s
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.bytes().map(|b| u8::from(b == b'#')).collect())
            .collect();
        Grid::from_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_round_trip_through_serde() {
        let grid: Grid = serde_json::from_str("[[0,1,0],[0,0,1]]").unwrap();
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.height(), 2);
        assert_eq!(grid.get(Point::new(1, 0)), Some(Cell::Blocked));
        assert_eq!(serde_json::to_string(&grid).unwrap(), "[[0,1,0],[0,0,1]]");
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = Grid::from_rows(vec![vec![0, 0], vec![0]]).unwrap_err();
        assert_eq!(
            err,
            GridShapeError::Ragged {
                row: 1,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn rejects_non_binary_cells() {
        let err = Grid::from_rows(vec![vec![0, 2]]).unwrap_err();
        assert_eq!(err, GridShapeError::BadCell { x: 1, y: 0, value: 2 });
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Grid::from_rows(vec![]).unwrap_err(), GridShapeError::Empty);
        assert_eq!(Grid::from_rows(vec![vec![]]).unwrap_err(), GridShapeError::Empty);
    }

    #[test]
    fn bounds_handle_negative_coordinates() {
        let grid = Grid::new(3, 3);
        assert!(!grid.in_bounds(Point::new(-1, 0)));
        assert!(!grid.in_bounds(Point::new(0, 3)));
        assert!(grid.in_bounds(Point::new(2, 2)));
        assert!(!grid.in_bounds(Point::new(3_000_000_000, 0)));
        assert!(!grid.in_bounds(Point::new(i64::MIN, i64::MAX)));
        assert_eq!(grid.point_at(grid.index_of(Point::new(2, 1)).unwrap()), Point::new(2, 1));
    }

    #[test]
    fn ascii_picture_marks_hashes_blocked() {
        let grid: Grid = "..#\n.#.".parse().unwrap();
        assert!(grid.is_walkable(Point::new(0, 0)));
        assert!(!grid.is_walkable(Point::new(2, 0)));
        assert!(!grid.is_walkable(Point::new(1, 1)));
    }
}
