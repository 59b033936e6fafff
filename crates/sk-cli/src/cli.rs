//! Command line definitions and command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sk_core::handle::{MAX_KINDS, MAX_SLOTS};
use sk_core::{
    Constraint, EntityKind, Handle, Scene, Session, SketcherConfig, SolverState, bevel,
};
use sk_solver::{SolveOutcome, SolvePipeline, SolveReport};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "sketcher")]
#[command(about = "Parametric sketch scenes: inspect, solve, bevel and edit")]
#[command(version)]
pub struct Cli {
    /// Configuration file (RON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a small constrained demo scene
    Demo {
        /// Output scene file
        out: PathBuf,
    },

    /// Print the contents of a scene
    Info {
        /// Scene file
        scene: PathBuf,
    },

    /// Solve constraints and save the result
    Solve {
        /// Scene file
        scene: PathBuf,

        /// Only solve this sketch (`kind:slot` or raw handle)
        #[arg(long, value_parser = parse_handle)]
        sketch: Option<Handle>,

        /// Output file, defaults to overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Round off the corner at a point with a tangent arc
    Bevel {
        /// Scene file
        scene: PathBuf,

        /// Corner point (`kind:slot` or raw handle)
        #[arg(long, value_parser = parse_handle)]
        point: Handle,

        /// Arc radius
        #[arg(long)]
        radius: f64,

        /// Output file, defaults to overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove an entity
    Remove {
        /// Scene file
        scene: PathBuf,

        /// Entity (`kind:slot` or raw handle)
        #[arg(value_parser = parse_handle)]
        handle: Handle,

        /// Also remove everything that depends on the entity
        #[arg(long)]
        cascade: bool,

        /// Output file, defaults to overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Parse `kind:slot` or a raw integer handle
pub fn parse_handle(s: &str) -> Result<Handle, String> {
    if let Some((kind, slot)) = s.split_once(':') {
        let kind: usize = kind.trim().parse().map_err(|e| format!("invalid kind: {e}"))?;
        let slot: usize = slot.trim().parse().map_err(|e| format!("invalid slot: {e}"))?;
        if kind >= MAX_KINDS || slot >= MAX_SLOTS {
            return Err(format!("handle {kind}:{slot} out of range"));
        }
        return Ok(Handle::assemble(kind, slot));
    }
    let raw: i32 = s.trim().parse().map_err(|e| format!("invalid handle: {e}"))?;
    if raw < 0 {
        return Err("handle must not be negative".into());
    }
    Ok(Handle::from_raw(raw))
}

/// Runs commands with one configuration
pub struct App {
    config: SketcherConfig,
    pipeline: SolvePipeline,
}

impl App {
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => SketcherConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SketcherConfig::default(),
        };
        let pipeline = SolvePipeline::with_default_backend(config.solver.clone());
        Ok(Self { config, pipeline })
    }

    pub fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Demo { out } => self.cmd_demo(&out),
            Commands::Info { scene } => self.cmd_info(&scene),
            Commands::Solve {
                scene,
                sketch,
                output,
            } => self.cmd_solve(&scene, sketch, output.as_deref()),
            Commands::Bevel {
                scene,
                point,
                radius,
                output,
            } => self.cmd_bevel(&scene, point, radius, output.as_deref()),
            Commands::Remove {
                scene,
                handle,
                cascade,
                output,
            } => self.cmd_remove(&scene, handle, cascade, output.as_deref()),
        }
    }

    fn load(&self, path: &Path) -> Result<Scene> {
        let mut scene =
            Scene::load(path).with_context(|| format!("Failed to load scene {}", path.display()))?;
        scene.apply_config(&self.config);
        debug!("Loaded {} entities from {}", scene.entities().len(), path.display());
        Ok(scene)
    }

    fn save(&self, scene: &Scene, path: &Path) -> Result<()> {
        scene
            .save(path)
            .with_context(|| format!("Failed to save scene {}", path.display()))?;
        info!("Saved scene to {}", path.display());
        Ok(())
    }

    fn solve(&self, scene: &mut Scene, sketch: Option<Handle>) -> Result<SolveReport> {
        match self.pipeline.solve(scene, sketch) {
            SolveOutcome::Solved(report) => Ok(report),
            SolveOutcome::Unavailable => bail!(
                "Solver backend '{}' is not available",
                self.pipeline.backend_name()
            ),
        }
    }

    fn cmd_demo(&self, out: &Path) -> Result<()> {
        let mut scene = build_demo(&self.config)?;
        let report = self.solve(&mut scene, None)?;
        print_report(&scene, &report);
        self.save(&scene, out)?;
        println!("Demo scene written to {}", out.display());
        Ok(())
    }

    fn cmd_info(&self, path: &Path) -> Result<()> {
        let mut scene = self.load(path)?;

        println!("Scene: {}", path.display());
        println!("  Entities: {}", scene.entities().len());
        for (kind, count) in EntityKind::ALL.iter().zip(scene.entities().collection_offsets()) {
            if count > 0 {
                println!("    {:<10} {}", kind.collection_name(), count);
            }
        }

        for sketch in scene.entities().slab(EntityKind::Sketch) {
            if let Some(data) = sketch.as_sketch() {
                println!(
                    "  Sketch {} '{}': {}",
                    sketch.handle(),
                    sketch.name,
                    data.solver_state
                );
            }
        }

        println!("  Constraints: {}", scene.constraints().len());
        for constraint in scene.constraints().iter() {
            let entities: Vec<String> = constraint.entities().iter().map(|h| h.to_string()).collect();
            let scope = constraint.sketch.map_or_else(|| "3D".to_string(), |s| s.to_string());
            let value = constraint
                .kind
                .value()
                .map(|v| format!(" = {v:.4}"))
                .unwrap_or_default();
            let reference = if constraint.is_reference { " (reference)" } else { "" };
            println!(
                "    {} [{}] in {}{}{}",
                constraint.type_name(),
                entities.join(", "),
                scope,
                value,
                reference
            );
        }

        let mut session = Session::from_config(&self.config);
        let rebuilt = session.refresh(&mut scene);
        println!("  Render batches: {} ({} entities refreshed)", session.batch_count(), rebuilt);
        Ok(())
    }

    fn cmd_solve(&self, path: &Path, sketch: Option<Handle>, output: Option<&Path>) -> Result<()> {
        let mut scene = self.load(path)?;
        let report = self.solve(&mut scene, sketch)?;
        print_report(&scene, &report);
        self.save(&scene, output.unwrap_or(path))
    }

    fn cmd_bevel(&self, path: &Path, point: Handle, radius: f64, output: Option<&Path>) -> Result<()> {
        let mut scene = self.load(path)?;
        let mut session = Session::from_config(&self.config);
        let result = bevel(&mut scene, &mut session, point, radius)
            .with_context(|| format!("Failed to bevel {point}"))?;
        println!(
            "Added arc {} around {} (tangent points {}, {})",
            result.arc, result.center, result.tangent_points[0], result.tangent_points[1]
        );

        let sketch = scene.entities().get(result.arc).and_then(|e| e.sketch());
        let report = self.solve(&mut scene, sketch)?;
        print_report(&scene, &report);
        self.save(&scene, output.unwrap_or(path))
    }

    fn cmd_remove(&self, path: &Path, handle: Handle, cascade: bool, output: Option<&Path>) -> Result<()> {
        let mut scene = self.load(path)?;
        if !scene.entities().contains(handle) {
            bail!("No entity {handle} in {}", path.display());
        }
        if scene.entities().get(handle).is_some_and(|e| e.is_origin()) {
            bail!("{handle} is an origin element and cannot be removed");
        }

        let mut session = Session::from_config(&self.config);
        let removed = if cascade {
            scene.delete(handle, &mut session)
        } else {
            if scene.is_referenced(handle) {
                bail!("{handle} is still referenced, use --cascade to remove its dependents");
            }
            usize::from(scene.remove(handle, &mut session).is_some())
        };
        println!("Removed {removed} entities");
        self.save(&scene, output.unwrap_or(path))
    }
}

fn print_report(scene: &Scene, report: &SolveReport) {
    for group in &report.groups {
        let label = group
            .sketch
            .map_or_else(|| "3D".to_string(), |s| format!("Sketch {s}"));
        println!("{}: {} (dof {})", label, group.state, group.dof);
        if group.state != SolverState::Okay {
            println!("  {}", group.state.description());
        }
        for id in &group.failed {
            if let Some(constraint) = scene.constraints().get(*id) {
                println!("  failed: {} {}", constraint.type_name(), id);
            }
        }
    }
}

/// Constrained rectangle with a circle and a reference dimension
pub fn build_demo(config: &SketcherConfig) -> Result<Scene> {
    let mut scene = Scene::from_config(config);
    let wp = scene.entities().origin_elements().plane_xy;
    let store = scene.entities_mut();

    let sketch = store.add_sketch(wp)?;
    let corners = [[0.0, 0.0], [4.2, 0.3], [3.8, 2.9], [-0.2, 2.1]]
        .into_iter()
        .map(|co| store.add_point_2d(co, sketch))
        .collect::<Result<Vec<_>, _>>()?;
    let lines = (0..4)
        .map(|i| store.add_line_2d(corners[i], corners[(i + 1) % 4], sketch))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(first) = store.get_mut(corners[0]) {
        first.fixed = true;
        first.name = "Anchor".into();
    }

    let nm = store.add_normal_2d(sketch)?;
    let ct = store.add_point_2d([2.0, 1.5], sketch)?;
    let circle = store.add_circle(nm, ct, 0.4, sketch)?;

    let lifted = store.add_point_3d([1.0, 1.0, 2.5])?;
    let yz = scene.entities().origin_elements().plane_yz;

    for constraint in [
        Constraint::horizontal(lines[0]),
        Constraint::horizontal(lines[2]),
        Constraint::vertical(lines[1]),
        Constraint::vertical(lines[3]),
        Constraint::distance(corners[0], corners[1], 4.0),
        Constraint::distance(corners[1], corners[2], 2.5),
        Constraint::midpoint(ct, lines[0]),
        Constraint::radius(circle, 0.5),
        Constraint::distance(ct, corners[3], 1.0).reference(),
    ] {
        scene.add_constraint(constraint.in_sketch(sketch))?;
    }
    scene.add_constraint(Constraint::distance(lifted, yz, 1.5))?;

    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_handle() {
        assert_eq!(parse_handle("5:2").unwrap(), Handle::assemble(5, 2));
        let raw = Handle::assemble(3, 1).raw();
        assert_eq!(parse_handle(&raw.to_string()).unwrap(), Handle::assemble(3, 1));
        assert!(parse_handle("-1").is_err());
        assert!(parse_handle("16:0").is_err());
        assert!(parse_handle("x").is_err());
    }

    #[test]
    fn test_demo_solve_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo.ron");
        let app = App::new(None).unwrap();
        app.cmd_demo(&path).unwrap();

        let scene = Scene::load(&path).unwrap();
        let sketch = scene.entities().slab(EntityKind::Sketch)[0].as_sketch().unwrap();
        assert!(sketch.solver_state.is_ok());

        app.cmd_solve(&path, None, None).unwrap();
        app.cmd_info(&path).unwrap();
    }

    #[test]
    fn test_remove_refuses_referenced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demo.ron");
        let app = App::new(None).unwrap();
        app.cmd_demo(&path).unwrap();

        let sketch = Handle::assemble(EntityKind::Sketch.index(), 0);
        assert!(app.cmd_remove(&path, sketch, false, None).is_err());

        let before = Scene::load(&path).unwrap().entities().len();
        app.cmd_remove(&path, sketch, true, None).unwrap();
        let after = Scene::load(&path).unwrap();
        assert!(after.entities().len() < before);
        assert!(after.entities().slab(EntityKind::Sketch).is_empty());
    }
}
