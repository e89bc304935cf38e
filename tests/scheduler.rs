use anyhow::Result;
use ash::vk;

use lumo::prelude::*;

mod framework;

use framework::*;

fn extent(size: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: size,
        height: size,
    }
}

/// a -> b -> main
fn chain(graph: &mut NodeGraph, log: &ExecLog) -> Result<[(NodeId, SharedProbe); 3]> {
    let a = add_texture_node(graph, "a", 0, log);
    let b = add_texture_node(graph, "b", 1, log);
    let main = add_texture_node(graph, "main", 1, log);
    link(graph, a.0, 0, b.0, 0)?;
    link(graph, b.0, 0, main.0, 0)?;
    Ok([a, b, main])
}

#[test]
pub fn chain_executes_upstream_first() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let [(a, _), (b, _), (main, main_probe)] = chain(&mut graph, &log)?;
    let mut ctx = make_context(&graph);

    let stats = graph.tick(0, cmd(), &mut ctx)?;

    assert_eq!(stats.executed, vec![a, b, main]);
    assert_eq!(names(&log, 0), vec!["a", "b", "main"]);
    assert!(stats.skipped.is_empty());
    // The consumer sees what its upstream published this frame.
    assert_eq!(
        main_probe.lock().unwrap().inputs.get(&0).copied().flatten(),
        published_view(&graph, b)
    );
    Ok(())
}

#[test]
pub fn diamond_executes_shared_upstream_once() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (a, a_probe) = add_texture_node(&mut graph, "a", 0, &log);
    let (b, _) = add_texture_node(&mut graph, "b", 1, &log);
    let (c, _) = add_texture_node(&mut graph, "c", 1, &log);
    let (main, _) = add_texture_node(&mut graph, "main", 2, &log);
    link(&mut graph, a, 0, b, 0)?;
    link(&mut graph, a, 0, c, 0)?;
    link(&mut graph, b, 0, main, 0)?;
    link(&mut graph, c, 0, main, 1)?;
    let mut ctx = make_context(&graph);

    let stats = graph.tick(0, cmd(), &mut ctx)?;

    assert_eq!(a_probe.lock().unwrap().executions, vec![0]);
    assert_eq!(stats.executed, vec![a, b, c, main]);
    Ok(())
}

#[test]
pub fn unchanged_nodes_do_not_execute_again() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let [(a, _), (b, _), (main, _)] = chain(&mut graph, &log)?;
    let mut ctx = make_context(&graph);
    graph.tick(0, cmd(), &mut ctx)?;

    let stats = graph.tick(1, cmd(), &mut ctx)?;
    assert!(stats.executed.is_empty());
    assert_eq!(stats.skipped, vec![a, b, main]);

    graph.mark_changed(b)?;
    let stats = graph.tick(2, cmd(), &mut ctx)?;
    assert_eq!(stats.executed, vec![b, main], "A change propagates downstream only.");
    Ok(())
}

#[test]
pub fn all_time_nodes_execute_every_frame() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (module, probe) = TestModule::new("clock", &log);
    let (clock, clock_probe) = add_with_module(&mut graph, "clock", 0, module.all_time(), probe);
    let (main, main_probe) = add_texture_node(&mut graph, "main", 1, &log);
    link(&mut graph, clock, 0, main, 0)?;
    let mut ctx = make_context(&graph);

    for frame in 0..3 {
        let stats = graph.tick(frame, cmd(), &mut ctx)?;
        assert_eq!(stats.executed, vec![clock, main]);
    }
    assert_eq!(clock_probe.lock().unwrap().executions, vec![0, 1, 2]);
    assert_eq!(main_probe.lock().unwrap().executions, vec![0, 1, 2]);
    Ok(())
}

#[test]
pub fn unused_nodes_are_skipped() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let [(a, _), _, _] = chain(&mut graph, &log)?;
    let (stray, stray_probe) = add_texture_node(&mut graph, "stray", 1, &log);
    link(&mut graph, a, 0, stray, 0)?;
    let mut ctx = make_context(&graph);

    let stats = graph.tick(0, cmd(), &mut ctx)?;

    assert!(!graph.is_used(stray));
    assert!(!stats.executed(stray));
    assert!(stats.skipped.contains(&stray));
    assert!(stray_probe.lock().unwrap().executions.is_empty());
    Ok(())
}

#[test]
pub fn disabled_nodes_are_skipped() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let [(a, _), (b, _), (main, _)] = chain(&mut graph, &log)?;
    let mut ctx = make_context(&graph);
    graph.set_enabled(b, false)?;

    let stats = graph.tick(0, cmd(), &mut ctx)?;
    assert_eq!(stats.executed, vec![main]);
    assert!(!stats.executed(a), "Nodes behind a disabled node are not pulled.");

    graph.set_enabled(b, true)?;
    let stats = graph.tick(1, cmd(), &mut ctx)?;
    assert_eq!(stats.executed, vec![a, b, main]);
    Ok(())
}

#[test]
pub fn cycle_aborts_only_its_root() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (x, _) = add_texture_node(&mut graph, "x", 1, &log);
    let (y, _) = add_texture_node(&mut graph, "y", 1, &log);
    let (looped, _) = add_texture_node(&mut graph, "main", 1, &log);
    let (w, _) = add_texture_node(&mut graph, "w", 0, &log);
    let (module, _) = TestModule::new("preview", &log);
    let preview = graph.add_node(
        NodeBuilder::new("preview")
            .type_name("Test")
            .input("in0", SlotType::Texture2D)
            .output("out", SlotType::Texture2D)
            .root(true)
            .module(module),
    );
    link(&mut graph, x, 0, y, 0)?;
    link(&mut graph, y, 0, x, 0)?;
    link(&mut graph, y, 0, looped, 0)?;
    link(&mut graph, w, 0, preview, 0)?;
    assert!(graph.has_cycle());
    let mut ctx = make_context(&graph);

    let stats = graph.tick(0, cmd(), &mut ctx)?;

    assert_eq!(stats.aborted, vec![looped]);
    assert!(!stats.executed(x));
    assert!(!stats.executed(y));
    assert_eq!(stats.executed, vec![w, preview], "Other roots still execute.");
    Ok(())
}

#[test]
pub fn resize_travels_downstream() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let [(a, a_probe), (b, b_probe), (main, main_probe)] = chain(&mut graph, &log)?;
    let mut ctx = make_context(&graph);
    graph.tick(0, cmd(), &mut ctx)?;

    graph.request_resize(a, extent(512))?;
    let stats = graph.tick(1, cmd(), &mut ctx)?;

    assert_eq!(stats.resized, vec![a, b, main]);
    assert_eq!(stats.executed, vec![a, b, main], "Resized nodes execute again.");
    for probe in [&a_probe, &b_probe, &main_probe] {
        let probe = probe.lock().unwrap();
        assert_eq!(probe.extent, extent(512));
        assert_eq!(probe.resizes, 1);
    }
    assert_eq!(graph.output_descriptor(b, 0).and_then(|r| r.extent()), Some(extent(512)));
    Ok(())
}

#[test]
pub fn resize_respects_policies() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let [(a, a_probe), (b, b_probe), (_, main_probe)] = chain(&mut graph, &log)?;
    graph.node_mut(a).unwrap().set_resize_policy(ResizePolicy {
        by_event: true,
        by_hand: false,
    });
    graph.node_mut(b).unwrap().set_resize_policy(ResizePolicy {
        by_event: false,
        by_hand: true,
    });
    let mut ctx = make_context(&graph);

    graph.request_resize(a, extent(64))?;
    graph.tick(0, cmd(), &mut ctx)?;
    assert_eq!(a_probe.lock().unwrap().resizes, 0, "Manual resize is disabled for a.");

    graph.resize_event(extent(128));
    let stats = graph.tick(1, cmd(), &mut ctx)?;
    assert_eq!(a_probe.lock().unwrap().extent, extent(128));
    assert_eq!(b_probe.lock().unwrap().resizes, 0, "Resize events are ignored by b.");
    assert_eq!(main_probe.lock().unwrap().extent, extent(128));
    assert!(!stats.resized.contains(&b));
    Ok(())
}

#[test]
pub fn resize_failure_disables_the_node() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let [(a, a_probe), (b, b_probe), (main, _)] = chain(&mut graph, &log)?;
    let mut ctx = make_context(&graph);
    graph.tick(0, cmd(), &mut ctx)?;

    a_probe.lock().unwrap().fail_resize = true;
    graph.request_resize(a, extent(9000))?;
    let stats = graph.tick(1, cmd(), &mut ctx)?;

    assert_eq!(graph.node(a).unwrap().state(), ModuleState::Failed);
    assert!(!graph.is_used(a));
    assert!(!stats.executed(a));
    assert_eq!(a_probe.lock().unwrap().units, 1);
    // Downstream nodes fall back to an empty input and keep running.
    assert_eq!(b_probe.lock().unwrap().inputs.get(&0).copied(), Some(None));
    assert_eq!(stats.executed, vec![b, main]);
    Ok(())
}

#[test]
pub fn context_follows_the_frame() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let (module, probe) = TestModule::new("main", &log);
    let (_, probe) = add_with_module(&mut graph, "main", 0, module.all_time(), probe);
    let mut ctx = make_context(&graph);

    for frame in [3, 4, 7] {
        ctx.advance(1.0 / 60.0);
        graph.tick(frame, cmd(), &mut ctx)?;
    }

    assert_eq!(probe.lock().unwrap().context_frames, vec![3, 4, 7]);
    assert!((ctx.time() - 3.0 / 60.0).abs() < 1e-5);
    Ok(())
}

#[test]
pub fn topological_order_matches_execution_order() -> Result<()> {
    let (mut graph, _) = make_graph();
    let log = exec_log();
    let [(a, _), (b, _), (main, _)] = chain(&mut graph, &log)?;
    let mut ctx = make_context(&graph);

    let stats = graph.tick(0, cmd(), &mut ctx)?;

    assert_eq!(graph.topological_order()?, vec![a, b, main]);
    assert_eq!(stats.executed, graph.topological_order()?);
    Ok(())
}
