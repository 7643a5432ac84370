//! Integer lattice geometry: cells, cardinal directions and rectangles.
//!
//! The lattice is y-up. A [`Bounds`] is described by its top-left cell (minimum
//! x, maximum y) and its bottom-right cell (maximum x, minimum y); both corners
//! belong to the rectangle.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Integer coordinate of a single grid cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    x: i32,
    y: i32,
}

impl Cell {
    /// Creates a new cell coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Horizontal coordinate, growing eastwards.
    #[must_use]
    pub const fn x(&self) -> i32 {
        self.x
    }

    /// Vertical coordinate, growing northwards.
    #[must_use]
    pub const fn y(&self) -> i32 {
        self.y
    }

    /// Cell offset by the provided deltas.
    #[must_use]
    pub const fn add(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Orthogonal neighbor in the provided direction.
    #[must_use]
    pub const fn neighbor(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        self.add(dx, dy)
    }

    /// Direction leading from `self` to an orthogonally adjacent cell.
    pub fn direction_to(self, other: Cell) -> Result<Direction, CoordError> {
        match (other.x - self.x, other.y - self.y) {
            (0, 1) => Ok(Direction::North),
            (1, 0) => Ok(Direction::East),
            (0, -1) => Ok(Direction::South),
            (-1, 0) => Ok(Direction::West),
            _ => Err(CoordError::NotNeighbor {
                from: self,
                to: other,
            }),
        }
    }

    /// Reports whether the two cells share an edge.
    #[must_use]
    pub fn is_neighbor_of(self, other: Cell) -> bool {
        self.direction_to(other).is_ok()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Cardinal direction on the lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward increasing y.
    North,
    /// Toward increasing x.
    East,
    /// Toward decreasing y.
    South,
    /// Toward decreasing x.
    West,
}

impl Direction {
    /// All directions in clockwise order starting at north.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Unit cell offset for a single step in this direction.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (0, 1),
            Self::East => (1, 0),
            Self::South => (0, -1),
            Self::West => (-1, 0),
        }
    }

    /// Opposite direction.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::West => Self::East,
        }
    }

    /// Reports whether both directions lie on the same axis.
    #[must_use]
    pub const fn is_parallel_to(self, other: Direction) -> bool {
        matches!(
            (self, other),
            (Self::North | Self::South, Self::North | Self::South)
                | (Self::East | Self::West, Self::East | Self::West)
        )
    }

    /// Reports whether the directions lie on different axes.
    #[must_use]
    pub const fn is_perpendicular_to(self, other: Direction) -> bool {
        !self.is_parallel_to(other)
    }

    /// Lowercase name used by the input protocol.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = CoordError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "north" => Ok(Self::North),
            "east" => Ok(Self::East),
            "south" => Ok(Self::South),
            "west" => Ok(Self::West),
            other => Err(CoordError::UnknownDirection(other.to_owned())),
        }
    }
}

/// Failures raised by cell and direction helpers.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CoordError {
    /// Two cells were expected to be orthogonal neighbors.
    #[error("{from} and {to} are not orthogonal neighbors")]
    NotNeighbor {
        /// Cell the direction was requested from.
        from: Cell,
        /// Cell the direction was requested to.
        to: Cell,
    },
    /// A direction name did not match any cardinal direction.
    #[error("unknown direction `{0}`")]
    UnknownDirection(String),
}

/// Sentinel failures of the bounds algebra.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BoundsError {
    /// The two rectangles share no cell.
    #[error("no overlap")]
    NoOverlap,
    /// The rectangle has its corners swapped on at least one axis.
    #[error("bounds inverted")]
    Inverted,
    /// The rectangle is too narrow or too short to be split.
    #[error("bounds too small")]
    TooSmall,
}

/// Axis-aligned rectangle of cells, corners inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(rename = "tl")]
    top_l: Cell,
    #[serde(rename = "br")]
    bot_r: Cell,
}

impl Bounds {
    /// Creates bounds from the top-left and bottom-right corners as given.
    #[must_use]
    pub const fn new(top_l: Cell, bot_r: Cell) -> Self {
        Self { top_l, bot_r }
    }

    /// Smallest well-formed bounds containing both cells.
    #[must_use]
    pub fn from_corners(a: Cell, b: Cell) -> Self {
        Self::new(
            Cell::new(a.x.min(b.x), a.y.max(b.y)),
            Cell::new(a.x.max(b.x), a.y.min(b.y)),
        )
    }

    /// Bounds covering exactly one cell.
    #[must_use]
    pub const fn of_cell(cell: Cell) -> Self {
        Self::new(cell, cell)
    }

    /// Window of `width` by `height` cells placed around `center`.
    ///
    /// Odd sizes are centered exactly; even sizes put the extra column to the
    /// west and the extra row to the north of the center cell.
    #[must_use]
    pub fn around(center: Cell, width: u32, height: u32) -> Self {
        let width = i32::try_from(width.max(1)).unwrap_or(i32::MAX);
        let height = i32::try_from(height.max(1)).unwrap_or(i32::MAX);
        let top_l = Cell::new(center.x - width / 2, center.y + height / 2);
        let bot_r = top_l.add(width - 1, -(height - 1));
        Self::new(top_l, bot_r)
    }

    /// Top-left corner (minimum x, maximum y).
    #[must_use]
    pub const fn top_l(&self) -> Cell {
        self.top_l
    }

    /// Bottom-right corner (maximum x, minimum y).
    #[must_use]
    pub const fn bot_r(&self) -> Cell {
        self.bot_r
    }

    /// Top-right corner.
    #[must_use]
    pub const fn top_r(&self) -> Cell {
        Cell::new(self.bot_r.x, self.top_l.y)
    }

    /// Bottom-left corner.
    #[must_use]
    pub const fn bot_l(&self) -> Cell {
        Cell::new(self.top_l.x, self.bot_r.y)
    }

    /// Number of columns covered.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.bot_r.x - self.top_l.x + 1
    }

    /// Number of rows covered.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.top_l.y - self.bot_r.y + 1
    }

    /// Number of cells covered by well-formed bounds.
    #[must_use]
    pub const fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Reports whether the corners are swapped on either axis.
    #[must_use]
    pub const fn is_inverted(&self) -> bool {
        self.top_l.x > self.bot_r.x || self.top_l.y < self.bot_r.y
    }

    /// Bounds with the two corners exchanged.
    #[must_use]
    pub const fn invert(&self) -> Self {
        Self::new(self.bot_r, self.top_l)
    }

    /// Well-formed bounds covering the same cells regardless of corner order.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self::from_corners(self.top_l, self.bot_r)
    }

    /// Reports whether the cell lies inside, edges included.
    #[must_use]
    pub const fn contains(&self, cell: Cell) -> bool {
        self.top_l.x <= cell.x
            && cell.x <= self.bot_r.x
            && self.bot_r.y <= cell.y
            && cell.y <= self.top_l.y
    }

    /// Reports whether `other` lies completely inside `self`.
    #[must_use]
    pub const fn contains_bounds(&self, other: &Bounds) -> bool {
        self.contains(other.top_l) && self.contains(other.bot_r)
    }

    /// Reports whether the cell lies on the outermost ring of the rectangle.
    #[must_use]
    pub const fn has_on_edge(&self, cell: Cell) -> bool {
        self.contains(cell)
            && (cell.x == self.top_l.x
                || cell.x == self.bot_r.x
                || cell.y == self.top_l.y
                || cell.y == self.bot_r.y)
    }

    /// Reports whether the two rectangles share at least one cell.
    #[must_use]
    pub const fn overlaps(&self, other: &Bounds) -> bool {
        !(other.bot_r.x < self.top_l.x
            || other.top_l.x > self.bot_r.x
            || other.top_l.y < self.bot_r.y
            || other.bot_r.y > self.top_l.y)
    }

    /// Rectangle of cells shared by both bounds.
    pub fn intersection(&self, other: &Bounds) -> Result<Bounds, BoundsError> {
        if !self.overlaps(other) {
            return Err(BoundsError::NoOverlap);
        }

        Ok(Self::new(
            Cell::new(self.top_l.x.max(other.top_l.x), self.top_l.y.min(other.top_l.y)),
            Cell::new(self.bot_r.x.min(other.bot_r.x), self.bot_r.y.max(other.bot_r.y)),
        ))
    }

    /// Smallest rectangle containing both bounds; inverted inputs are normalized first.
    #[must_use]
    pub fn join(&self, other: &Bounds) -> Bounds {
        let a = self.normalized();
        let b = other.normalized();
        Self::new(
            Cell::new(a.top_l.x.min(b.top_l.x), a.top_l.y.max(b.top_l.y)),
            Cell::new(a.bot_r.x.max(b.bot_r.x), a.bot_r.y.min(b.bot_r.y)),
        )
    }

    /// Folds [`Bounds::join`] over every rectangle, `None` when the input is empty.
    pub fn join_all<I>(bounds: I) -> Option<Bounds>
    where
        I: IntoIterator<Item = Bounds>,
    {
        bounds
            .into_iter()
            .fold(None, |acc: Option<Bounds>, next| match acc {
                Some(joined) => Some(joined.join(&next)),
                None => Some(next.normalized()),
            })
    }

    /// Bounds grown by `magnitude` cells on every side.
    #[must_use]
    pub const fn expand(&self, magnitude: i32) -> Bounds {
        Self::new(
            self.top_l.add(-magnitude, magnitude),
            self.bot_r.add(magnitude, -magnitude),
        )
    }

    /// Bounds moved by the provided deltas.
    #[must_use]
    pub const fn translate(&self, dx: i32, dy: i32) -> Bounds {
        Self::new(self.top_l.add(dx, dy), self.bot_r.add(dx, dy))
    }

    /// Bounds moved one cell in the provided direction.
    #[must_use]
    pub const fn shifted(&self, direction: Direction) -> Bounds {
        let (dx, dy) = direction.delta();
        self.translate(dx, dy)
    }

    /// Splits the rectangle into `[NW, NE, SE, SW]` quadrants.
    ///
    /// The north-west quadrant takes `floor(width / 2)` columns and
    /// `floor(height / 2)` rows; the remaining quadrants take the rest.
    pub fn quads(&self) -> Result<[Bounds; 4], BoundsError> {
        if self.is_inverted() {
            return Err(BoundsError::Inverted);
        }
        if self.width() < 2 || self.height() < 2 {
            return Err(BoundsError::TooSmall);
        }

        let west_width = self.width() / 2;
        let north_height = self.height() / 2;
        let split_x = self.top_l.x + west_width;
        let split_y = self.top_l.y - north_height;

        Ok([
            Self::new(self.top_l, Cell::new(split_x - 1, split_y + 1)),
            Self::new(Cell::new(split_x, self.top_l.y), Cell::new(self.bot_r.x, split_y + 1)),
            Self::new(Cell::new(split_x, split_y), self.bot_r),
            Self::new(Cell::new(self.top_l.x, split_y), Cell::new(split_x - 1, self.bot_r.y)),
        ])
    }

    /// Rectangles covering the cells of `other` that `self` does not cover.
    ///
    /// Equal bounds produce no rectangles and disjoint bounds produce `other`
    /// unchanged. Otherwise `other` is cut along the edges of the shared region
    /// and every band outside it is returned, north to south and west to east.
    /// A one-cell shift of a fixed-size window yields one rectangle along an
    /// axis and three on a diagonal.
    #[must_use]
    pub fn diff_from(&self, other: &Bounds) -> Vec<Bounds> {
        if self == other {
            return Vec::new();
        }
        let Ok(shared) = self.intersection(other) else {
            return vec![*other];
        };

        let columns = [
            (other.top_l.x, shared.top_l.x - 1),
            (shared.top_l.x, shared.bot_r.x),
            (shared.bot_r.x + 1, other.bot_r.x),
        ];
        let rows = [
            (other.top_l.y, shared.top_l.y + 1),
            (shared.top_l.y, shared.bot_r.y),
            (shared.bot_r.y - 1, other.bot_r.y),
        ];

        let mut bands = Vec::new();
        for (row_index, &(top, bottom)) in rows.iter().enumerate() {
            if top < bottom {
                continue;
            }
            for (column_index, &(left, right)) in columns.iter().enumerate() {
                if left > right || (row_index == 1 && column_index == 1) {
                    continue;
                }
                bands.push(Self::new(Cell::new(left, top), Cell::new(right, bottom)));
            }
        }
        bands
    }

    /// Iterates every cell row by row, north to south and west to east.
    pub fn cells(&self) -> impl Iterator<Item = Cell> {
        let Bounds { top_l, bot_r } = *self;
        (bot_r.y..=top_l.y)
            .rev()
            .flat_map(move |y| (top_l.x..=bot_r.x).map(move |x| Cell::new(x, y)))
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} {}}}", self.top_l, self.bot_r)
    }
}
