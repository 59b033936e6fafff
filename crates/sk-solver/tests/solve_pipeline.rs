//! End-to-end solve scenarios

#![cfg(feature = "newton")]

use approx::assert_relative_eq;
use glam::DVec2;
use sk_core::{Constraint, Handle, Scene, Session, SolverConfig, SolverState, bevel};
use sk_solver::{NullBackend, SolveOutcome, SolvePipeline};

fn pipeline() -> SolvePipeline {
    SolvePipeline::with_default_backend(SolverConfig::default())
}

/// Scene with one sketch on the XY plane
fn sketch_scene() -> (Scene, Handle) {
    let mut scene = Scene::new();
    let wp = scene.entities().origin_elements().plane_xy;
    let sketch = scene.entities_mut().add_sketch(wp).unwrap();
    (scene, sketch)
}

fn sketch_state(scene: &Scene, sketch: Handle) -> SolverState {
    scene.entities().get(sketch).unwrap().as_sketch().unwrap().solver_state
}

fn clear_all(scene: &mut Scene) {
    for handle in scene.entities().handles() {
        scene.entities_mut().clear(handle);
    }
}

#[test]
fn test_distance_solves() {
    let (mut scene, sketch) = sketch_scene();
    let store = scene.entities_mut();
    let a = store.add_point_2d([0.0, 0.0], sketch).unwrap();
    let b = store.add_point_2d([5.0, 0.0], sketch).unwrap();
    store.get_mut(a).unwrap().fixed = true;
    scene
        .add_constraint(Constraint::distance(a, b, 10.0).in_sketch(sketch))
        .unwrap();
    clear_all(&mut scene);

    let outcome = pipeline().solve(&mut scene, Some(sketch));
    let report = outcome.report().expect("solver should be available");
    assert_eq!(report.state(), SolverState::Okay);
    assert_eq!(report.groups.len(), 1);

    assert_relative_eq!(scene.co(b).unwrap().distance(scene.co(a).unwrap()), 10.0, epsilon = 1e-6);
    assert_eq!(scene.co(a).unwrap(), DVec2::ZERO, "Fixed point must not move");
    assert_eq!(sketch_state(&scene, sketch), SolverState::Okay);

    // Only what moved is dirty
    assert!(scene.entities().is_dirty(b));
    assert!(!scene.entities().is_dirty(a));
}

#[test]
fn test_contradiction_leaves_geometry() {
    let (mut scene, sketch) = sketch_scene();
    let store = scene.entities_mut();
    let a = store.add_point_2d([0.0, 0.0], sketch).unwrap();
    let b = store.add_point_2d([5.0, 0.0], sketch).unwrap();
    store.get_mut(a).unwrap().fixed = true;
    scene
        .add_constraint(Constraint::distance(a, b, 10.0).in_sketch(sketch))
        .unwrap();
    let second = scene
        .add_constraint(Constraint::distance(a, b, 20.0).in_sketch(sketch))
        .unwrap();
    clear_all(&mut scene);

    let outcome = pipeline().solve(&mut scene, Some(sketch));
    let report = outcome.report().unwrap();
    assert_eq!(report.state(), SolverState::Inconsistent);
    assert_eq!(report.failed().collect::<Vec<_>>(), vec![second]);

    assert_eq!(scene.co(b).unwrap(), DVec2::new(5.0, 0.0));
    assert!(!scene.entities().is_dirty(b));
    assert!(scene.constraints().get(second).unwrap().failed);
    assert_eq!(sketch_state(&scene, sketch), SolverState::Inconsistent);
}

#[test]
fn test_redundant_constraints_still_write() {
    let (mut scene, sketch) = sketch_scene();
    let store = scene.entities_mut();
    let a = store.add_point_2d([0.0, 0.0], sketch).unwrap();
    let b = store.add_point_2d([4.0, 1.0], sketch).unwrap();
    let line = store.add_line_2d(a, b, sketch).unwrap();
    scene
        .add_constraint(Constraint::horizontal(line).in_sketch(sketch))
        .unwrap();
    let again = scene
        .add_constraint(Constraint::horizontal(line).in_sketch(sketch))
        .unwrap();

    let outcome = pipeline().solve(&mut scene, Some(sketch));
    let report = outcome.report().unwrap();
    assert_eq!(report.state(), SolverState::RedundantOkay);
    assert!(report.is_ok());
    assert!(scene.constraints().get(again).unwrap().failed);

    let (p, q) = (scene.co(a).unwrap(), scene.co(b).unwrap());
    assert!((p.y - q.y).abs() < 1e-8, "Line should be horizontal: {} vs {}", p, q);
}

#[test]
fn test_unavailable_backend_is_noop() {
    let (mut scene, sketch) = sketch_scene();
    let store = scene.entities_mut();
    let a = store.add_point_2d([0.0, 0.0], sketch).unwrap();
    let b = store.add_point_2d([5.0, 0.0], sketch).unwrap();
    scene
        .add_constraint(Constraint::distance(a, b, 10.0).in_sketch(sketch))
        .unwrap();
    clear_all(&mut scene);

    let pipeline = SolvePipeline::new(Box::new(NullBackend), SolverConfig::default());
    assert!(!pipeline.is_available());
    assert_eq!(pipeline.solve(&mut scene, Some(sketch)), SolveOutcome::Unavailable);
    assert_eq!(pipeline.solve(&mut scene, None), SolveOutcome::Unavailable);

    assert_eq!(scene.co(b).unwrap(), DVec2::new(5.0, 0.0));
    assert!(scene.entities().dirty_handles().is_empty());
}

#[test]
fn test_solve_all_groups() {
    let (mut scene, first) = sketch_scene();
    let wp = scene.entities().origin_elements().plane_yz;
    let second = scene.entities_mut().add_sketch(wp).unwrap();
    let p = scene.entities_mut().add_point_3d([1.0, 2.0, 3.0]).unwrap();
    let plane = scene.entities().origin_elements().plane_xy;
    scene.add_constraint(Constraint::coincident(p, plane)).unwrap();

    let outcome = pipeline().solve(&mut scene, None);
    let report = outcome.report().unwrap();
    assert_eq!(report.groups.len(), 3);
    assert_eq!(report.groups[0].sketch, None);
    assert!(report.group(Some(first)).is_some());
    assert!(report.group(Some(second)).is_some());
    assert!(report.is_ok());

    // The point dropped onto the XY plane
    let location = scene.location(p).unwrap();
    assert!(location.z.abs() < 1e-8, "Point should lie in XY, got {}", location);
    assert_relative_eq!(location.x, 1.0, epsilon = 1e-6);
}

#[test]
fn test_reference_constraint_is_measured() {
    let (mut scene, sketch) = sketch_scene();
    let store = scene.entities_mut();
    let a = store.add_point_2d([0.0, 0.0], sketch).unwrap();
    let b = store.add_point_2d([3.0, 4.0], sketch).unwrap();
    let line = store.add_line_2d(a, b, sketch).unwrap();
    scene
        .add_constraint(Constraint::vertical(line).in_sketch(sketch))
        .unwrap();
    let measured = scene
        .add_constraint(Constraint::distance(a, b, 1.0).in_sketch(sketch).reference())
        .unwrap();

    let outcome = pipeline().solve(&mut scene, Some(sketch));
    assert!(outcome.report().unwrap().is_ok());

    let value = scene.constraints().get(measured).unwrap().kind.value().unwrap();
    let actual = scene.co(a).unwrap().distance(scene.co(b).unwrap());
    assert_relative_eq!(value, actual, epsilon = 1e-9);
    assert!((value - 1.0).abs() > 0.5, "Reference constraint must not drive geometry");
}

#[test]
fn test_bevel_then_solve() {
    let (mut scene, sketch) = sketch_scene();
    let store = scene.entities_mut();
    let a = store.add_point_2d([0.0, 0.0], sketch).unwrap();
    let corner = store.add_point_2d([1.0, 0.0], sketch).unwrap();
    let b = store.add_point_2d([1.0, 1.0], sketch).unwrap();
    let l1 = store.add_line_2d(a, corner, sketch).unwrap();
    let l2 = store.add_line_2d(corner, b, sketch).unwrap();
    scene
        .add_constraint(Constraint::horizontal(l1).in_sketch(sketch))
        .unwrap();
    scene
        .add_constraint(Constraint::vertical(l2).in_sketch(sketch))
        .unwrap();

    let mut session = Session::new();
    let result = bevel(&mut scene, &mut session, corner, 0.25).unwrap();
    assert!(result.removed_corner);

    let outcome = pipeline().solve(&mut scene, Some(sketch));
    let report = outcome.report().unwrap();
    assert!(report.is_ok(), "Bevelled corner should solve: {:?}", report);

    let center = scene.co(result.center).unwrap();
    let [t1, t2] = result.tangent_points.map(|h| scene.co(h).unwrap());
    assert_relative_eq!(center.distance(t1), 0.25, epsilon = 1e-6);
    assert_relative_eq!(center.distance(t2), 0.25, epsilon = 1e-6);
    assert_relative_eq!(t1.y, 0.0, epsilon = 1e-6);
    assert_relative_eq!(t2.x, 1.0, epsilon = 1e-6);
}
