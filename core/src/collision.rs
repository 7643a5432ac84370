//! Classification of interactions between timed moves.
//!
//! Two [`PathAction`]s (or a path and a static cell) are sorted into a
//! [`CollisionKind`] from how their origins, destinations and directions
//! relate. Each kind carries a time span and an overlap function giving the
//! shared physical occupancy of the two movers at any tick of that span.

use serde::{Deserialize, Serialize};

use crate::{
    action::PathAction,
    geometry::Cell,
    time::{Span, WorldTime},
};

/// Overlap values below this threshold are rounding noise and read as zero.
pub const OVERLAP_EPSILON: f64 = 1e-9;

/// How two moves interact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionKind {
    /// The moves do not interact.
    None,
    /// Both moves leave the same cell for the same destination.
    SameOrigDest,
    /// Both moves leave the same cell in opposite directions.
    SameOrig,
    /// Both moves leave the same cell in perpendicular directions.
    SameOrigPerp,
    /// Both moves enter the same cell from opposite sides.
    HeadToHead,
    /// Both moves enter the same cell from perpendicular sides.
    FromSide,
    /// The moves exchange cells.
    Swap,
    /// `a` follows `b` in line, entering the cell `b` is leaving.
    AIntoB,
    /// `a` enters the cell `b` is leaving, from the side.
    AIntoBFromSide,
    /// A move leaving a cell that is also statically occupied.
    CellOrig,
    /// A move entering a cell that is also statically occupied.
    CellDest,
}

/// Classified interaction between two path actions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathCollision {
    kind: CollisionKind,
    a: PathAction,
    b: PathAction,
    span: Span,
}

impl PathCollision {
    /// Classifies the interaction between `a` and `b`.
    ///
    /// For the in-line kinds the pair is reordered so that `a` is always the
    /// move entering the other's origin; every other kind keeps the argument
    /// order.
    #[must_use]
    pub fn classify(a: PathAction, b: PathAction) -> Self {
        let (kind, a, b) = classify_paths(a, b);
        let span = collision_span(kind, &a, &b);
        Self { kind, a, b, span }
    }

    /// Kind of the interaction.
    #[must_use]
    pub const fn kind(&self) -> CollisionKind {
        self.kind
    }

    /// First move of the pair.
    #[must_use]
    pub const fn a(&self) -> PathAction {
        self.a
    }

    /// Second move of the pair.
    #[must_use]
    pub const fn b(&self) -> PathAction {
        self.b
    }

    /// Interval over which the interaction is meaningful.
    #[must_use]
    pub const fn span(&self) -> Span {
        self.span
    }

    /// First tick of the interaction.
    #[must_use]
    pub const fn start(&self) -> WorldTime {
        self.span.start()
    }

    /// Last tick of the interaction.
    #[must_use]
    pub const fn end(&self) -> WorldTime {
        self.span.end()
    }

    /// Shared occupancy at `t`, zero outside the span.
    #[must_use]
    pub fn overlap_at(&self, t: WorldTime) -> f64 {
        if !self.span.contains(t) {
            return 0.0;
        }
        path_overlap(self.kind, &self.a, &self.b, t)
    }
}

/// Classified interaction between a path action and a statically occupied cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellCollision {
    kind: CollisionKind,
    path: PathAction,
    cell: Cell,
    span: Span,
}

impl CellCollision {
    /// Classifies a move against an occupied cell.
    #[must_use]
    pub fn classify(path: PathAction, cell: Cell) -> Self {
        let kind = if cell == path.orig() {
            CollisionKind::CellOrig
        } else if cell == path.dest() {
            CollisionKind::CellDest
        } else {
            CollisionKind::None
        };
        Self {
            kind,
            path,
            cell,
            span: path.span(),
        }
    }

    /// Kind of the interaction.
    #[must_use]
    pub const fn kind(&self) -> CollisionKind {
        self.kind
    }

    /// Moving side of the interaction.
    #[must_use]
    pub const fn path(&self) -> PathAction {
        self.path
    }

    /// Static side of the interaction.
    #[must_use]
    pub const fn cell(&self) -> Cell {
        self.cell
    }

    /// Interval over which the interaction is meaningful.
    #[must_use]
    pub const fn span(&self) -> Span {
        self.span
    }

    /// Share of the static cell occupied by the mover at `t`, zero outside the span.
    #[must_use]
    pub fn overlap_at(&self, t: WorldTime) -> f64 {
        if !self.span.contains(t) {
            return 0.0;
        }
        match self.kind {
            CollisionKind::CellOrig => self.path.orig_partial(t).percentage,
            CollisionKind::CellDest => self.path.dest_partial(t).percentage,
            _ => 0.0,
        }
    }
}

fn classify_paths(a: PathAction, b: PathAction) -> (CollisionKind, PathAction, PathAction) {
    let same_orig = a.orig() == b.orig();
    let same_dest = a.dest() == b.dest();
    let opposite = a.direction() == b.direction().reverse();
    let perpendicular = a.direction().is_perpendicular_to(b.direction());

    if same_orig && same_dest {
        return (CollisionKind::SameOrigDest, a, b);
    }
    if same_orig && opposite {
        return (CollisionKind::SameOrig, a, b);
    }
    if same_orig && perpendicular {
        return (CollisionKind::SameOrigPerp, a, b);
    }
    if same_dest && opposite {
        return (CollisionKind::HeadToHead, a, b);
    }
    if same_dest && perpendicular {
        return (CollisionKind::FromSide, a, b);
    }
    if a.dest() == b.orig() && b.dest() == a.orig() {
        return (CollisionKind::Swap, a, b);
    }

    let (a, b) = if b.dest() == a.orig() { (b, a) } else { (a, b) };
    if a.dest() == b.orig() {
        if a.direction() == b.direction() {
            if a.end() < b.end() {
                return (CollisionKind::AIntoB, a, b);
            }
        } else if perpendicular {
            return (CollisionKind::AIntoBFromSide, a, b);
        }
    }

    (CollisionKind::None, a, b)
}

fn collision_span(kind: CollisionKind, a: &PathAction, b: &PathAction) -> Span {
    let earliest_start = a.start().min(b.start());
    let latest_start = a.start().max(b.start());
    let earliest_end = a.end().min(b.end());
    let latest_end = a.end().max(b.end());
    let overlap = |t: WorldTime| path_overlap(kind, a, b, t);

    match kind {
        CollisionKind::SameOrigDest | CollisionKind::Swap | CollisionKind::None => {
            Span::new(earliest_start, latest_end)
        }
        CollisionKind::SameOrigPerp => Span::new(earliest_start, earliest_end),
        CollisionKind::FromSide => Span::new(latest_start, latest_end),
        CollisionKind::AIntoBFromSide => Span::new(a.start(), b.end()),
        CollisionKind::AIntoB => {
            let start = if a.start() <= b.start() {
                a.start()
            } else {
                settle_start(catch_up_time(a, b), earliest_start, b.end(), overlap)
            };
            Span::new(start, b.end())
        }
        CollisionKind::HeadToHead => {
            let start = settle_start(meeting_time(a, b), earliest_start, latest_end, overlap);
            Span::new(start, latest_end)
        }
        CollisionKind::SameOrig => {
            let end = settle_end(parting_time(a, b), earliest_start, latest_end, overlap);
            Span::new(earliest_start, end)
        }
        CollisionKind::CellOrig | CollisionKind::CellDest => a.span(),
    }
}

fn path_overlap(kind: CollisionKind, a: &PathAction, b: &PathAction, t: WorldTime) -> f64 {
    let a_orig = a.orig_partial(t).percentage;
    let a_dest = a.dest_partial(t).percentage;
    let b_orig = b.orig_partial(t).percentage;
    let b_dest = b.dest_partial(t).percentage;

    // Movers sharing both cells occupy them together for the whole span.

    let overlap = match kind {
        CollisionKind::SameOrigDest => 1.0,
        CollisionKind::SameOrig => a_orig + b_orig - 1.0,
        CollisionKind::SameOrigPerp => a_orig * b_orig,
        CollisionKind::HeadToHead => a_dest + b_dest - 1.0,
        CollisionKind::FromSide => a_dest * b_dest,
        CollisionKind::Swap => {
            let entered = a_dest + b_dest;
            if entered > 1.0 {
                a_orig + b_orig
            } else {
                entered
            }
        }
        CollisionKind::AIntoB => a_dest + b_orig - 1.0,
        CollisionKind::AIntoBFromSide => a_dest * b_orig,
        CollisionKind::None | CollisionKind::CellOrig | CollisionKind::CellDest => 0.0,
    };

    if overlap < OVERLAP_EPSILON {
        0.0
    } else {
        overlap.min(1.0)
    }
}

/// Tick at which `a`, trailing `b` in line, catches up with it.
fn catch_up_time(a: &PathAction, b: &PathAction) -> WorldTime {
    let (a_start, a_duration) = (a.start() as f64, a.span().duration() as f64);
    let (b_start, b_duration) = (b.start() as f64, b.span().duration() as f64);
    if a_duration == 0.0 || b_duration == 0.0 {
        return a.start();
    }

    let denominator = 1.0 / a_duration - 1.0 / b_duration;
    if denominator <= 0.0 {
        return a.start();
    }
    ((a_start / a_duration - b_start / b_duration) / denominator).floor() as WorldTime
}

/// Tick at which two moves entering the same cell first touch.
fn meeting_time(a: &PathAction, b: &PathAction) -> WorldTime {
    let (a_start, a_duration) = (a.start() as f64, a.span().duration() as f64);
    let (b_start, b_duration) = (b.start() as f64, b.span().duration() as f64);
    let total = a_duration + b_duration;
    if total == 0.0 {
        return a.start().max(b.start());
    }
    ((a_duration * b_duration + a_start * b_duration + b_start * a_duration) / total).floor()
        as WorldTime
}

/// Tick at which two moves leaving the same cell stop touching.
fn parting_time(a: &PathAction, b: &PathAction) -> WorldTime {
    let (a_end, a_duration) = (a.end() as f64, a.span().duration() as f64);
    let (b_end, b_duration) = (b.end() as f64, b.span().duration() as f64);
    let total = a_duration + b_duration;
    if total == 0.0 {
        return a.end().min(b.end());
    }
    ((a_end * b_duration + b_end * a_duration - a_duration * b_duration) / total).ceil()
        as WorldTime
}

/// Moves an estimated start onto the last zero-overlap tick before contact.
fn settle_start<F>(estimate: WorldTime, lower: WorldTime, upper: WorldTime, overlap: F) -> WorldTime
where
    F: Fn(WorldTime) -> f64,
{
    let mut start = estimate.clamp(lower, upper);
    while start > lower && overlap(start) > 0.0 {
        start -= 1;
    }
    while start < upper && overlap(start + 1) == 0.0 {
        start += 1;
    }
    start
}

/// Moves an estimated end onto the first zero-overlap tick after contact.
fn settle_end<F>(estimate: WorldTime, lower: WorldTime, upper: WorldTime, overlap: F) -> WorldTime
where
    F: Fn(WorldTime) -> f64,
{
    let mut end = estimate.clamp(lower, upper);
    while end < upper && overlap(end) > 0.0 {
        end += 1;
    }
    while end > lower && overlap(end - 1) == 0.0 {
        end -= 1;
    }
    end
}
