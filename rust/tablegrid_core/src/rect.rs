//! Rectangular cell regions that never split a spanning cell.

use crate::doc::CellPos;
use crate::error::Result;
use crate::grid::{GridMap, Rect};

/// The smallest rectangle holding both cells, grown until no cell crosses
/// its border.
pub fn rect_between(map: &GridMap, a: CellPos, b: CellPos) -> Result<Rect> {
    let rect = map.find_cell(a)?.union(&map.find_cell(b)?);
    Ok(close(map, rect))
}

/// Grow `rect` until every cell touching it lies wholly inside it.
///
/// Each round either leaves the rectangle alone or strictly enlarges it, so
/// the loop ends within `width + height` rounds.
pub fn close(map: &GridMap, mut rect: Rect) -> Rect {
    loop {
        let mut grown = rect;
        for pos in map.cells_in_rect(rect) {
            if let Ok(cell) = map.find_cell(pos) {
                if !grown.contains(&cell) {
                    grown = grown.union(&cell);
                }
            }
        }
        if grown == rect {
            return rect;
        }
        rect = grown;
    }
}

/// Whether the cell at `pos` lies wholly inside `rect`.
pub fn is_selected(map: &GridMap, rect: Rect, pos: CellPos) -> bool {
    map.find_cell(pos).map(|cell| rect.contains(&cell)).unwrap_or(false)
}

/// Visit each distinct cell of `rect` once, in row-major order of its
/// top-left slot.
pub fn for_each_cell_in_rect(map: &GridMap, rect: Rect, mut f: impl FnMut(CellPos, Rect)) {
    for pos in map.cells_in_rect(rect) {
        if let Ok(cell) = map.find_cell(pos) {
            f(pos, cell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::{Table, TableCell};
    use crate::error::TableError;
    use pretty_assertions::assert_eq;

    fn c() -> TableCell {
        TableCell::default()
    }

    #[test]
    fn rowspan_next_to_anchor_covers_both_rows() {
        // Row 0: [a][b rowspan 2]; row 1: [c].
        let table = Table::from_rows(vec![vec![c(), c().with_span(1, 2)], vec![c()]]);
        let map = GridMap::build(&table).unwrap();
        assert!(map.is_rectangular());
        let rect = rect_between(&map, CellPos::new(0, 0), CellPos::new(0, 1)).unwrap();
        assert_eq!(rect, Rect::new(0, 0, 2, 2));
        let rect = rect_between(&map, CellPos::new(0, 0), CellPos::new(1, 0)).unwrap();
        assert_eq!(rect, Rect::new(0, 0, 1, 2));
    }

    #[test]
    fn closing_cascades() {
        // Column 0 catches the wide cell in row 1, which in turn catches the
        // wide cell in row 2.
        let table = Table::from_rows(vec![
            vec![c(), c(), c()],
            vec![c().with_span(2, 1), c()],
            vec![c(), c().with_span(2, 1)],
        ]);
        let map = GridMap::build(&table).unwrap();
        assert_eq!(rect_between(&map, CellPos::new(0, 0), CellPos::new(0, 0)).unwrap(), Rect::new(0, 0, 1, 1));
        assert_eq!(rect_between(&map, CellPos::new(0, 1), CellPos::new(0, 2)).unwrap(), Rect::new(1, 0, 3, 1));
        assert_eq!(rect_between(&map, CellPos::new(0, 0), CellPos::new(2, 0)).unwrap(), Rect::new(0, 0, 3, 3));
    }

    #[test]
    fn unknown_position_is_an_error() {
        let map = GridMap::build(&Table::from_rows(vec![vec![c()]])).unwrap();
        assert!(matches!(rect_between(&map, CellPos::new(0, 0), CellPos::new(3, 0)), Err(TableError::OutOfTable(_))));
    }

    #[test]
    fn selection_membership_needs_whole_cell() {
        let table = Table::from_rows(vec![vec![c().with_span(2, 1)], vec![c(), c()]]);
        let map = GridMap::build(&table).unwrap();
        assert!(!is_selected(&map, Rect::new(0, 0, 1, 2), CellPos::new(0, 0)));
        assert!(is_selected(&map, Rect::new(0, 0, 2, 1), CellPos::new(0, 0)));
    }

    #[test]
    fn visits_each_cell_once() {
        let table = Table::from_rows(vec![vec![c().with_span(2, 2), c()], vec![c()]]);
        let map = GridMap::build(&table).unwrap();
        let mut seen = Vec::new();
        for_each_cell_in_rect(&map, map.full_rect(), |pos, _| seen.push(pos));
        assert_eq!(seen, vec![CellPos::new(0, 0), CellPos::new(0, 1), CellPos::new(1, 0)]);
    }
}
