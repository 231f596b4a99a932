use std::collections::HashSet;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tablegrid_core::rect::{for_each_cell_in_rect, is_selected, rect_between};
use tablegrid_core::{extract, insert, CellContentFill, CellPos, Doc, GridMap, Node, Normalizer, Rect, Table, TableCell};

fn c(text: &str) -> TableCell {
    TableCell::text(text)
}

fn span(text: &str, colspan: u32, rowspan: u32) -> TableCell {
    TableCell::text(text).with_span(colspan, rowspan)
}

fn doc(rows: Vec<Vec<TableCell>>) -> Doc {
    Doc::new(vec![Node::Table(Table::from_rows(rows))])
}

/// One cell: colspan, rowspan and an optional width hint for each column.
fn cell_shape() -> impl Strategy<Value = (u32, u32, Option<u32>)> {
    (1u32..=3, 1u32..=3, prop::option::of(prop::sample::select(vec![80u32, 120])))
}

/// Uneven rows of spanning cells, each holding a distinct text. The first row
/// is never empty.
fn table_rows() -> impl Strategy<Value = Vec<Vec<TableCell>>> {
    (
        prop::collection::vec(cell_shape(), 1..=4),
        prop::collection::vec(prop::collection::vec(cell_shape(), 0..=4), 0..=3),
    )
        .prop_map(|(first, rest)| {
            let mut n = 0;
            let mut rows = Vec::new();
            for shapes in std::iter::once(first).chain(rest) {
                let mut cells = Vec::new();
                for (colspan, rowspan, width) in shapes {
                    n += 1;
                    let mut cell = span(&format!("c{}", n), colspan, rowspan);
                    if let Some(width) = width {
                        cell = cell.with_colwidths(vec![width; colspan as usize]);
                    }
                    cells.push(cell);
                }
                rows.push(cells);
            }
            rows
        })
}

fn covered_width(map: &GridMap, row: usize) -> usize {
    (0..map.width()).filter(|col| map.cell_at(row, *col).is_some()).count()
}

fn texts(d: &Doc) -> Vec<String> {
    let mut out: Vec<String> = d
        .table(0)
        .unwrap()
        .rows
        .iter()
        .flat_map(|r| r.cells.iter().map(|c| c.content.text.clone()))
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out
}

fn normalized(rows: Vec<Vec<TableCell>>) -> Doc {
    Normalizer::default().normalize(&doc(rows)).unwrap()
}

proptest! {
    #[test]
    fn normalizing_makes_tables_rectangular_once_and_for_all(rows in table_rows()) {
        let normalizer = Normalizer::default();
        let fixed = normalizer.normalize(&doc(rows)).unwrap();
        let map = GridMap::build(fixed.table(0).unwrap()).unwrap();
        prop_assert_eq!(map.problems(), &[]);
        for row in 0..map.height() {
            prop_assert_eq!(covered_width(&map, row), map.width());
        }
        prop_assert_eq!(normalizer.fix_tables(None, &fixed).unwrap(), None);
        let again = normalizer.normalize(&fixed).unwrap();
        prop_assert_eq!(again.nodes, fixed.nodes);
    }

    #[test]
    fn normalizing_keeps_all_content(rows in table_rows()) {
        let original = doc(rows);
        let fixed = Normalizer::default().normalize(&original).unwrap();
        prop_assert_eq!(texts(&fixed), texts(&original));
    }

    #[test]
    fn closed_rects_never_split_cells(rows in table_rows()) {
        let fixed = normalized(rows);
        let map = GridMap::build(fixed.table(0).unwrap()).unwrap();
        let cells: Vec<CellPos> = map.cells().map(|(pos, _)| pos).collect();
        for a in &cells {
            for b in &cells {
                let rect = rect_between(&map, *a, *b).unwrap();
                for (_, occupied) in map.cells() {
                    if occupied.intersects(&rect) {
                        prop_assert!(rect.contains(&occupied), "{:?} splits {:?}", rect, occupied);
                    }
                }
            }
        }
    }

    #[test]
    fn cells_in_rect_reports_each_cell_once(rows in table_rows()) {
        let fixed = normalized(rows);
        let map = GridMap::build(fixed.table(0).unwrap()).unwrap();
        for top in 0..map.height() {
            for bottom in top + 1..=map.height() {
                for left in 0..map.width() {
                    for right in left + 1..=map.width() {
                        let rect = Rect::new(left, top, right, bottom);
                        let listed = map.cells_in_rect(rect);
                        let distinct: HashSet<_> = listed.iter().copied().collect();
                        prop_assert_eq!(distinct.len(), listed.len());
                        for (pos, occupied) in map.cells() {
                            prop_assert_eq!(distinct.contains(&pos), occupied.intersects(&rect));
                        }

                        let mut visited = Vec::new();
                        for_each_cell_in_rect(&map, rect, |pos, _| visited.push(pos));
                        let visited_set: HashSet<_> = visited.iter().copied().collect();
                        prop_assert_eq!(visited_set.len(), visited.len());
                        prop_assert_eq!(visited_set, distinct);
                    }
                }
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn extract_then_insert_is_identity_on_whole_cell_rects(rows in table_rows()) {
        let original = normalized(rows);
        let table = original.table(0).unwrap();
        let map = GridMap::build(table).unwrap();
        let cells: Vec<CellPos> = map.cells().map(|(pos, _)| pos).collect();
        for a in &cells {
            for b in &cells {
                let rect = rect_between(&map, *a, *b).unwrap();
                let fragment = extract(table, &map, rect).unwrap();
                let pasted = insert(&original, 0, rect, &fragment, &CellContentFill::default()).unwrap();
                prop_assert_eq!(&pasted.doc.nodes, &original.nodes, "round trip over {:?}", rect);
            }
        }
    }
}

#[test]
fn worked_example_round_trips() {
    let rows = vec![
        vec![span("big", 2, 2), c("a"), c("b")],
        vec![c("c"), c("d")],
        vec![c("e"), c("f"), span("wide", 2, 1)],
    ];
    let original = doc(rows);
    let table = original.table(0).unwrap();
    let map = GridMap::build(table).unwrap();
    let rect = rect_between(&map, CellPos::new(0, 0), CellPos::new(1, 1)).unwrap();
    assert_eq!(rect, Rect::new(0, 0, 4, 2));
    let fragment = extract(table, &map, rect).unwrap();
    let pasted = insert(&original, 0, rect, &fragment, &CellContentFill::default()).unwrap();
    assert_eq!(pasted.doc.nodes, original.nodes);
}

#[test]
fn colspan_row_over_plain_row_is_already_rectangular() {
    let d = doc(vec![vec![span("wide", 2, 1)], vec![c("a"), c("b")]]);
    assert_eq!(Normalizer::default().fix_tables(None, &d).unwrap(), None);
}

#[test]
fn short_row_gets_one_filler() {
    let d = doc(vec![vec![c("a"), c("b")], vec![c("c")]]);
    let fixed = Normalizer::default().normalize(&d).unwrap();
    let row = &fixed.table(0).unwrap().rows[1];
    assert_eq!(row.cells.len(), 2);
    assert_eq!(row.cells[1].content.text, "");
}

#[test]
fn selection_next_to_rowspan_covers_the_span() {
    let table = Table::from_rows(vec![vec![c("a"), span("tall", 1, 2)], vec![c("b")]]);
    let map = GridMap::build(&table).unwrap();
    let rect = rect_between(&map, CellPos::new(0, 0), CellPos::new(1, 0)).unwrap();
    assert_eq!(rect, Rect::new(0, 0, 1, 2));
    let rect = rect_between(&map, CellPos::new(0, 0), CellPos::new(0, 1)).unwrap();
    assert_eq!(rect, Rect::new(0, 0, 2, 2));
    assert!(is_selected(&map, rect, CellPos::new(0, 1)));
}

#[test]
fn extracting_part_of_a_wide_cell_leaves_the_source_alone() {
    let d = doc(vec![vec![span("wide", 3, 1)], vec![c("a"), c("b"), c("c")]]);
    let table = d.table(0).unwrap();
    let map = GridMap::build(table).unwrap();
    let fragment = extract(table, &map, Rect::new(0, 0, 2, 2)).unwrap();
    assert_eq!(fragment.rows[0][0].colspan, 2);
    assert_eq!(fragment.rows[0][0].content.text, "wide");

    let after = Normalizer::default().normalize(&d).unwrap();
    assert_eq!(after.table(0).unwrap().rows[0].cells[0].colspan, 3);
}
