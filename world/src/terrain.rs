//! Dense terrain grid with zero-copy slicing and viewport diffs.

use std::{fmt, sync::Arc};

use gridworld_core::{Bounds, Cell};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Single-byte tag describing what a cell is made of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerrainType(u8);

impl TerrainType {
    /// Grass, `G`.
    pub const GRASS: Self = Self(b'G');
    /// Dirt, `D`.
    pub const DIRT: Self = Self(b'D');
    /// Rock, `R`.
    pub const ROCK: Self = Self(b'R');

    /// Tag for an ASCII character other than a newline.
    pub fn from_char(value: char) -> Result<Self, TerrainError> {
        match u8::try_from(value) {
            Ok(byte) if byte.is_ascii() && byte != b'\n' => Ok(Self(byte)),
            _ => Err(TerrainError::InvalidType(value)),
        }
    }

    /// Character used for the tag in the grid string.
    #[must_use]
    pub const fn as_char(self) -> char {
        self.0 as char
    }
}

/// Failures raised by terrain construction, slicing and merging.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TerrainError {
    /// The map bounds have their corners swapped.
    #[error("terrain bounds {0} are inverted")]
    Inverted(Bounds),
    /// A multi-row grid must begin with a newline.
    #[error("terrain grid must start with a newline")]
    MissingLeadingNewline,
    /// The grid string does not have the dimensions of the bounds.
    #[error("terrain grid of {rows} rows does not match bounds {bounds}")]
    DimensionMismatch {
        /// Bounds the grid was meant to fill.
        bounds: Bounds,
        /// Number of rows found in the grid.
        rows: usize,
    },
    /// A row's length differs from the bounds width.
    #[error("terrain row {row} has {found} cells, expected {expected}")]
    RowLength {
        /// Zero-based row index, north first.
        row: usize,
        /// Width of the bounds.
        expected: usize,
        /// Length of the row.
        found: usize,
    },
    /// The character cannot be stored as a terrain tag.
    #[error("{0:?} is not a terrain type")]
    InvalidType(char),
    /// The requested region reaches outside the map.
    #[error("bounds {requested} are not inside terrain {map}")]
    OutOfBounds {
        /// Region asked for.
        requested: Bounds,
        /// Bounds of the map.
        map: Bounds,
    },
    /// The cell lies outside the map.
    #[error("cell {0} is outside the terrain")]
    CellOutside(Cell),
    /// Merged slices left part of the new bounds uncovered.
    #[error("merge left cell {0} uncovered")]
    IncompleteMerge(Cell),
}

/// Record of a single [`TerrainMap::set_type`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeChange {
    /// Cell that changed.
    pub cell: Cell,
    /// Type before the change.
    pub from: TerrainType,
    /// Type after the change.
    pub to: TerrainType,
}

/// Rectangle of terrain in wire form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainMapSlice {
    /// Region the grid covers.
    pub bounds: Bounds,
    /// Newline-delimited grid, north row first.
    pub terrain: String,
}

/// Terrain newly visible after a viewport moved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainMapSlices {
    /// Bounds of the viewport the slices complete.
    pub bounds: Bounds,
    /// The uncovered rectangles.
    pub slices: Vec<TerrainMapSlice>,
}

impl TerrainMapSlices {
    /// Reports whether no rectangle is carried.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

/// Dense grid of [`TerrainType`]s covering a [`Bounds`].
///
/// Storage is shared between a map and the slices cut from it. Writing to a
/// map that shares storage copies it first, so every map behaves as an
/// independent value.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(into = "TerrainMapSlice", try_from = "TerrainMapSlice")]
pub struct TerrainMap {
    bounds: Bounds,
    origin: Cell,
    stride: usize,
    cells: Arc<Vec<TerrainType>>,
}

impl TerrainMap {
    /// Builds a map from a single fill character or a newline-delimited grid.
    ///
    /// A grid starts with a newline and lists `height` rows of `width`
    /// characters, north first. A trailing newline after the last row is
    /// accepted.
    pub fn new(bounds: Bounds, terrain: &str) -> Result<Self, TerrainError> {
        if bounds.is_inverted() {
            return Err(TerrainError::Inverted(bounds));
        }
        let width = dimension(bounds.width());
        let height = dimension(bounds.height());

        let mut chars = terrain.chars();
        if let (Some(fill), None) = (chars.next(), chars.next()) {
            if fill != '\n' {
                let fill = TerrainType::from_char(fill)?;
                return Ok(Self::from_cells(bounds, vec![fill; width * height]));
            }
        }

        let body = terrain
            .strip_prefix('\n')
            .ok_or(TerrainError::MissingLeadingNewline)?;
        let body = body.strip_suffix('\n').unwrap_or(body);
        let rows: Vec<&str> = body.split('\n').collect();
        if rows.len() != height {
            return Err(TerrainError::DimensionMismatch {
                bounds,
                rows: rows.len(),
            });
        }

        let mut cells = Vec::with_capacity(width * height);
        for (row, line) in rows.iter().enumerate() {
            let found = line.chars().count();
            if found != width {
                return Err(TerrainError::RowLength {
                    row,
                    expected: width,
                    found,
                });
            }
            for value in line.chars() {
                cells.push(TerrainType::from_char(value)?);
            }
        }
        Ok(Self::from_cells(bounds, cells))
    }

    fn from_cells(bounds: Bounds, cells: Vec<TerrainType>) -> Self {
        Self {
            bounds,
            origin: bounds.top_l(),
            stride: dimension(bounds.width()),
            cells: Arc::new(cells),
        }
    }

    /// Region covered by the map.
    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn index(&self, cell: Cell) -> usize {
        let row = dimension(self.origin.y() - cell.y());
        let column = dimension(cell.x() - self.origin.x());
        row * self.stride + column
    }

    /// Type of the terrain at `cell`.
    pub fn cell(&self, cell: Cell) -> Result<TerrainType, TerrainError> {
        if !self.bounds.contains(cell) {
            return Err(TerrainError::CellOutside(cell));
        }
        Ok(self.cells[self.index(cell)])
    }

    /// Replaces the type at `cell`, returning the applied change.
    pub fn set_type(&mut self, cell: Cell, to: TerrainType) -> Result<TypeChange, TerrainError> {
        let from = self.cell(cell)?;
        let index = self.index(cell);
        Arc::make_mut(&mut self.cells)[index] = to;
        Ok(TypeChange { cell, from, to })
    }

    /// View of the map restricted to `bounds`, sharing storage with `self`.
    pub fn slice(&self, bounds: Bounds) -> Result<Self, TerrainError> {
        if bounds.is_inverted() || !self.bounds.contains_bounds(&bounds) {
            return Err(TerrainError::OutOfBounds {
                requested: bounds,
                map: self.bounds,
            });
        }
        Ok(Self {
            bounds,
            origin: self.origin,
            stride: self.stride,
            cells: Arc::clone(&self.cells),
        })
    }

    /// Slice of the part of `bounds` the map covers, if any.
    #[must_use]
    pub fn clip(&self, bounds: Bounds) -> Option<Self> {
        let shared = self.bounds.intersection(&bounds).ok()?;
        self.slice(shared).ok()
    }

    /// Wire form of the map.
    #[must_use]
    pub fn to_slice(&self) -> TerrainMapSlice {
        TerrainMapSlice {
            bounds: self.bounds,
            terrain: self.to_string(),
        }
    }

    /// Rectangles of `other` that `self` does not cover, cut from `other`.
    ///
    /// Equal bounds give no slices. Disjoint bounds give `other` whole. A
    /// one-cell move of a fixed-size view gives one slice along an axis and
    /// three on a diagonal.
    #[must_use]
    pub fn diff(&self, other: &TerrainMap) -> TerrainMapSlices {
        let slices = self
            .bounds
            .diff_from(&other.bounds)
            .into_iter()
            .filter_map(|band| other.slice(band).ok())
            .map(|band| band.to_slice())
            .collect();
        TerrainMapSlices {
            bounds: other.bounds,
            slices,
        }
    }

    /// Map over `bounds` assembled from `self` and the provided slices.
    ///
    /// Cells inside `self` are taken from `self`; the slices supply the rest.
    /// Fails when a cell of `bounds` is covered by neither.
    pub fn merge_diff(&self, bounds: Bounds, diff: &TerrainMapSlices) -> Result<Self, TerrainError> {
        let pieces = diff
            .slices
            .iter()
            .map(|slice| TerrainMap::new(slice.bounds, &slice.terrain))
            .collect::<Result<Vec<_>, _>>()?;
        self.merge(bounds, &pieces)
    }

    /// Map over `bounds` assembled from `self` and `pieces`, later pieces winning.
    pub fn merge(&self, bounds: Bounds, pieces: &[TerrainMap]) -> Result<Self, TerrainError> {
        if bounds.is_inverted() {
            return Err(TerrainError::Inverted(bounds));
        }
        let mut cells = Vec::with_capacity(dimension(bounds.width()) * dimension(bounds.height()));
        for cell in bounds.cells() {
            let source = pieces
                .iter()
                .rev()
                .chain(std::iter::once(self))
                .find(|piece| piece.bounds.contains(cell))
                .ok_or(TerrainError::IncompleteMerge(cell))?;
            cells.push(source.cells[source.index(cell)]);
        }
        Ok(Self::from_cells(bounds, cells))
    }
}

fn dimension(value: i32) -> usize {
    usize::try_from(value).unwrap_or(0)
}

impl fmt::Display for TerrainMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = dimension(self.bounds.width());
        for (index, cell) in self.bounds.cells().enumerate() {
            if index % width == 0 {
                writeln!(f)?;
            }
            write!(f, "{}", self.cells[self.index(cell)].as_char())?;
        }
        writeln!(f)
    }
}

impl PartialEq for TerrainMap {
    fn eq(&self, other: &Self) -> bool {
        self.bounds == other.bounds
            && self
                .bounds
                .cells()
                .all(|cell| self.cells[self.index(cell)] == other.cells[other.index(cell)])
    }
}

impl Eq for TerrainMap {}

impl From<TerrainMap> for TerrainMapSlice {
    fn from(map: TerrainMap) -> Self {
        map.to_slice()
    }
}

impl TryFrom<TerrainMapSlice> for TerrainMap {
    type Error = TerrainError;

    fn try_from(slice: TerrainMapSlice) -> Result<Self, Self::Error> {
        TerrainMap::new(slice.bounds, &slice.terrain)
    }
}

#[cfg(test)]
mod tests {
    use gridworld_core::{Bounds, Cell};
    use proptest::prelude::*;

    use super::{TerrainError, TerrainMap, TerrainType};

    const GRID: &str = "\nGGGG\nGDDG\nGDRG\nGGGR\n";

    fn bounds(tl: (i32, i32), br: (i32, i32)) -> Bounds {
        Bounds::new(Cell::new(tl.0, tl.1), Cell::new(br.0, br.1))
    }

    fn grid() -> TerrainMap {
        TerrainMap::new(bounds((0, 0), (3, -3)), GRID).expect("grid")
    }

    #[test]
    fn grid_round_trips_through_display() {
        assert_eq!(grid().to_string(), GRID);
        assert_eq!(grid().cell(Cell::new(2, -2)), Ok(TerrainType::ROCK));
        assert_eq!(grid().cell(Cell::new(1, -1)), Ok(TerrainType::DIRT));
    }

    #[test]
    fn single_character_fills_the_bounds() {
        let map = TerrainMap::new(bounds((-1, 1), (1, -1)), "D").expect("fill");
        assert_eq!(map.to_string(), "\nDDD\nDDD\nDDD\n");
    }

    #[test]
    fn malformed_grids_are_rejected() {
        let b = bounds((0, 0), (3, -3));
        assert_eq!(
            TerrainMap::new(b, "GGGG\nGGGG"),
            Err(TerrainError::MissingLeadingNewline)
        );
        assert_eq!(
            TerrainMap::new(b, "\nGGGG\nGGGG\n"),
            Err(TerrainError::DimensionMismatch { bounds: b, rows: 2 })
        );
        assert!(matches!(
            TerrainMap::new(b, "\nGGGG\nGGG\nGGGG\nGGGG\n"),
            Err(TerrainError::RowLength { row: 1, found: 3, .. })
        ));
    }

    #[test]
    fn slices_read_through_to_the_parent_grid() {
        let slice = grid().slice(bounds((1, -1), (2, -2))).expect("slice");
        assert_eq!(slice.to_string(), "\nDD\nDR\n");
        assert!(grid().slice(bounds((3, 0), (4, -1))).is_err());
    }

    #[test]
    fn writes_do_not_leak_into_other_maps() {
        let original = grid();
        let mut copy = original.clone();
        let mut slice = original.slice(bounds((0, 0), (1, -1))).expect("slice");

        let change = copy.set_type(Cell::new(0, 0), TerrainType::ROCK).expect("set");
        assert_eq!(change.from, TerrainType::GRASS);
        let _ = slice.set_type(Cell::new(1, -1), TerrainType::GRASS).expect("set");

        assert_eq!(original.to_string(), GRID);
        assert_eq!(copy.cell(Cell::new(0, 0)), Ok(TerrainType::ROCK));
        assert_eq!(slice.to_string(), "\nGG\nGG\n");
        assert_eq!(
            copy.set_type(Cell::new(9, 9), TerrainType::DIRT),
            Err(TerrainError::CellOutside(Cell::new(9, 9)))
        );
    }

    #[test]
    fn diagonal_move_diffs_into_three_slices() {
        let map = grid();
        let old = map.slice(bounds((1, -1), (2, -2))).expect("old");
        let new = map.slice(bounds((2, 0), (3, -1))).expect("new");
        let diff = old.diff(&new);

        assert_eq!(diff.bounds, new.bounds());
        assert_eq!(diff.slices.len(), 3);
        let covered: usize = diff
            .slices
            .iter()
            .map(|slice| slice.bounds.area() as usize)
            .sum();
        assert_eq!(covered, 3);
        for slice in &diff.slices {
            assert!(!old.bounds().overlaps(&slice.bounds));
            assert_eq!(
                slice.terrain,
                map.slice(slice.bounds).expect("band").to_string()
            );
        }

        let merged = old.merge_diff(new.bounds(), &diff).expect("merge");
        assert_eq!(merged, new.slice(new.bounds()).expect("view"));
        assert_eq!(merged.to_string(), new.to_string());
    }

    #[test]
    fn equal_views_have_empty_diffs() {
        let view = grid().slice(bounds((0, 0), (1, -1))).expect("view");
        assert!(view.diff(&view).is_empty());
    }

    #[test]
    fn merge_reports_uncovered_cells() {
        let old = grid().slice(bounds((0, 0), (1, -1))).expect("old");
        assert_eq!(
            old.merge(bounds((0, 0), (2, -1)), &[]),
            Err(TerrainError::IncompleteMerge(Cell::new(2, 0)))
        );
    }

    #[test]
    fn maps_serialize_as_bounds_and_grid() {
        let json = serde_json::to_value(grid()).expect("json");
        assert_eq!(json["terrain"], GRID);
        assert_eq!(json["bounds"]["tl"]["x"], 0);
        let back: TerrainMap = serde_json::from_value(json).expect("parse");
        assert_eq!(back.to_string(), GRID);
    }

    fn window() -> impl Strategy<Value = Bounds> {
        (0..4i32, -3..=0i32, 1..=4i32, 1..=4i32).prop_map(|(x, y, w, h)| {
            let w = w.min(4 - x);
            let h = h.min(y + 4);
            Bounds::new(Cell::new(x, y), Cell::new(x + w - 1, y - h + 1))
        })
    }

    proptest! {
        #[test]
        fn slice_text_matches_parent_rows(b in window()) {
            let map = grid();
            let rows: Vec<&str> = GRID.trim_matches('\n').split('\n').collect();
            let mut expected = String::new();
            for y in (b.bot_r().y()..=b.top_l().y()).rev() {
                let row = rows[(-y) as usize];
                expected.push('\n');
                expected.push_str(&row[b.top_l().x() as usize..=b.bot_r().x() as usize]);
            }
            expected.push('\n');
            prop_assert_eq!(map.slice(b).expect("slice").to_string(), expected);
        }

        #[test]
        fn merging_a_diff_rebuilds_the_new_view(a in window(), b in window()) {
            let map = grid();
            let old = map.slice(a).expect("old");
            let new = map.slice(b).expect("new");
            let merged = old.merge_diff(b, &old.diff(&new)).expect("merge");
            prop_assert_eq!(merged.to_string(), new.to_string());
        }
    }
}
