use std::collections::HashSet;

use anyhow::Result;
use glam::{IVec2, Vec2};

use lumo::prelude::*;

mod framework;

use framework::*;

fn cell(graph: &NodeGraph, id: NodeId) -> IVec2 {
    graph.node(id).unwrap().cell()
}

fn position(graph: &NodeGraph, id: NodeId) -> Vec2 {
    graph.node(id).unwrap().position()
}

#[test]
pub fn producers_are_left_of_consumers() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (a, _) = add_texture_node(&mut graph, "a", 0, &log);
    let (b, _) = add_texture_node(&mut graph, "b", 1, &log);
    let (c, _) = add_texture_node(&mut graph, "c", 1, &log);
    let (main, _) = add_texture_node(&mut graph, "main", 2, &log);
    link(&mut graph, a, 0, b, 0)?;
    link(&mut graph, a, 0, c, 0)?;
    link(&mut graph, b, 0, main, 0)?;
    link(&mut graph, c, 0, main, 1)?;

    let report = graph.auto_layout(main)?;

    assert_eq!(report.columns, 3);
    assert!(report.loop_suspects.is_empty());
    for (from, to) in graph.links() {
        let producer = graph.slot(from).unwrap().node();
        let consumer = graph.slot(to).unwrap().node();
        assert!(
            cell(&graph, consumer).x > cell(&graph, producer).x,
            "{producer} must be left of {consumer}"
        );
        assert!(position(&graph, consumer).x > position(&graph, producer).x);
    }
    assert_eq!(cell(&graph, a).x, 0);
    assert_eq!(cell(&graph, main).x, 2);
    Ok(())
}

#[test]
pub fn columns_are_spaced_from_the_root() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (a, _) = add_texture_node(&mut graph, "a", 0, &log);
    let (b, _) = add_texture_node(&mut graph, "b", 1, &log);
    let (main, _) = add_texture_node(&mut graph, "main", 1, &log);
    link(&mut graph, a, 0, b, 0)?;
    link(&mut graph, b, 0, main, 0)?;

    let report = graph.auto_layout(main)?;

    // Default nodes are 100x50, columns are 70 apart.
    assert_eq!(position(&graph, main), Vec2::new(0.0, -25.0));
    assert_eq!(position(&graph, b), Vec2::new(-170.0, -25.0));
    assert_eq!(position(&graph, a), Vec2::new(-340.0, -25.0));
    assert_eq!(cell(&graph, b), IVec2::new(1, 0));
    for id in [a, b, main] {
        assert!(graph.node(id).unwrap().is_inserted());
        assert!(report.used.contains(&id));
    }
    Ok(())
}

#[test]
pub fn rows_never_collide() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (main, _) = add_texture_node(&mut graph, "main", 2, &log);
    let (x, _) = add_texture_node(&mut graph, "x", 0, &log);
    let (y, _) = add_texture_node(&mut graph, "y", 0, &log);
    let (t, _) = add_texture_node(&mut graph, "t", 1, &log);
    let (z, _) = add_texture_node(&mut graph, "z", 0, &log);
    link(&mut graph, x, 0, main, 0)?;
    link(&mut graph, y, 0, main, 1)?;
    link(&mut graph, z, 0, t, 0)?;

    let report = graph.auto_layout(main)?;

    assert_eq!(report.placed.len(), 5);
    let cells = [main, x, y, t, z].map(|id| cell(&graph, id));
    assert_eq!(cells.iter().collect::<HashSet<_>>().len(), 5, "Every node gets its own cell: {cells:?}");
    assert_eq!(cell(&graph, x).x, cell(&graph, z).x);
    assert!(report.used.contains(&x) && report.used.contains(&y));
    assert!(
        !report.used.contains(&t) && !report.used.contains(&z),
        "Terminals other than the root are not used."
    );

    // Nodes sharing a column never overlap.
    let column = [x, y, z].map(|id| position(&graph, id).y);
    for (i, a) in column.iter().enumerate() {
        for b in column.iter().skip(i + 1) {
            assert!((a - b).abs() >= 50.0);
        }
    }
    Ok(())
}

#[test]
pub fn cycles_are_reported_not_placed() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (main, _) = add_texture_node(&mut graph, "main", 0, &log);
    let (a, _) = add_texture_node(&mut graph, "a", 1, &log);
    let (b, _) = add_texture_node(&mut graph, "b", 1, &log);
    link(&mut graph, a, 0, b, 0)?;
    link(&mut graph, b, 0, a, 0)?;
    graph.node_mut(a).unwrap().set_position(Vec2::new(12.0, 34.0));

    let report = graph.auto_layout(main)?;

    assert_eq!(report.loop_suspects, vec![a, b]);
    assert_eq!(report.placed, vec![main]);
    assert_eq!(cell(&graph, a), IVec2::new(-1, -1));
    assert_eq!(cell(&graph, b), IVec2::new(-1, -1));
    assert_eq!(position(&graph, a), Vec2::new(12.0, 34.0), "Unplaced nodes keep their position.");
    assert_eq!(cell(&graph, main), IVec2::new(0, 0));
    Ok(())
}

#[test]
pub fn cycles_below_the_root_are_reported() -> Result<()> {
    let settings = GraphSettingsBuilder::new().loop_threshold(5).build();
    let (mut graph, _) = make_graph_with_settings(settings);
    let log = exec_log();
    let (a, _) = add_texture_node(&mut graph, "a", 1, &log);
    let (b, _) = add_texture_node(&mut graph, "b", 1, &log);
    let (main, _) = add_texture_node(&mut graph, "main", 1, &log);
    link(&mut graph, a, 0, b, 0)?;
    link(&mut graph, b, 0, a, 0)?;
    link(&mut graph, b, 0, main, 0)?;

    let report = graph.auto_layout(main)?;

    assert_eq!(report.loop_suspects, vec![a, b]);
    assert_eq!(report.placed, vec![main]);
    Ok(())
}

#[test]
pub fn isolated_nodes_are_left_alone() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (a, _) = add_texture_node(&mut graph, "a", 0, &log);
    let (main, _) = add_texture_node(&mut graph, "main", 1, &log);
    let (lonely, _) = add_texture_node(&mut graph, "lonely", 0, &log);
    link(&mut graph, a, 0, main, 0)?;
    graph.node_mut(lonely).unwrap().set_position(Vec2::new(500.0, 500.0));

    let report = graph.auto_layout(main)?;

    assert!(!report.placed.contains(&lonely));
    assert_eq!(cell(&graph, lonely), IVec2::new(-1, -1));
    assert_eq!(position(&graph, lonely), Vec2::new(500.0, 500.0));
    assert!(!graph.node(lonely).unwrap().is_inserted());
    Ok(())
}

#[test]
pub fn unknown_root_is_an_error() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (a, _) = add_texture_node(&mut graph, "a", 0, &log);
    graph.remove_node(a)?;

    let err = graph.auto_layout(a).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NodeNotFound(_))));
    Ok(())
}

#[test]
pub fn each_loop_suspect_is_reported_once() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (main, _) = add_texture_node(&mut graph, "main", 1, &log);
    let (tail, _) = add_texture_node(&mut graph, "tail", 0, &log);
    let (a, _) = add_texture_node(&mut graph, "a", 2, &log);
    let (b, _) = add_texture_node(&mut graph, "b", 1, &log);
    let (c, _) = add_texture_node(&mut graph, "c", 1, &log);
    link(&mut graph, tail, 0, a, 0)?;
    link(&mut graph, a, 0, b, 0)?;
    link(&mut graph, b, 0, c, 0)?;
    link(&mut graph, c, 0, a, 1)?;
    link(&mut graph, c, 0, main, 0)?;

    let report = graph.auto_layout(main)?;

    assert_eq!(report.loop_suspects, vec![a, b, c]);
    assert_eq!(report.loop_warnings, report.loop_suspects.len());
    assert_eq!(report.placed, vec![main, tail], "The tail feeding the loop is still placed.");

    // Running it again starts from scratch.
    let again = graph.auto_layout(main)?;
    assert_eq!(again.loop_warnings, 3);
    Ok(())
}

#[test]
pub fn layout_keeps_roots_executing() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (a, _) = add_texture_node(&mut graph, "a", 0, &log);
    let (main, _) = add_texture_node(&mut graph, "main", 1, &log);
    let (b, _) = add_texture_node(&mut graph, "b", 0, &log);
    let (module, _) = TestModule::new("preview", &log);
    let preview = graph.add_node(
        NodeBuilder::new("preview")
            .type_name("Test")
            .input("in0", SlotType::Texture2D)
            .output("out", SlotType::Texture2D)
            .root(true)
            .module(module.all_time()),
    );
    let (viewer, _) = add_texture_node(&mut graph, "viewer", 1, &log);
    link(&mut graph, a, 0, main, 0)?;
    link(&mut graph, b, 0, preview, 0)?;
    link(&mut graph, preview, 0, viewer, 0)?;
    let mut ctx = make_context(&graph);

    let stats = graph.tick(0, cmd(), &mut ctx)?;
    assert!(stats.executed(preview));

    let report = graph.auto_layout(main)?;
    assert!(!report.used.contains(&preview), "Layout only follows links into terminal nodes.");

    assert!(graph.is_used(preview));
    assert!(!graph.is_used(viewer));
    let stats = graph.tick(1, cmd(), &mut ctx)?;
    assert!(stats.executed(preview), "Layout never changes what executes.");
    Ok(())
}

#[test]
pub fn layout_keeps_failed_nodes_unused() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (module, state) = TestModule::new("broken", &log);
    state.lock().unwrap().fail_init = true;
    let (broken, _) = add_with_module(&mut graph, "broken", 0, module, state);
    let (main, _) = add_texture_node(&mut graph, "main", 1, &log);
    link(&mut graph, broken, 0, main, 0)?;
    let mut ctx = make_context(&graph);

    let report = graph.auto_layout(main)?;

    assert!(report.placed.contains(&broken));
    assert!(!graph.is_used(broken));
    let stats = graph.tick(0, cmd(), &mut ctx)?;
    assert!(!stats.executed(broken));
    assert!(stats.executed(main));
    Ok(())
}
