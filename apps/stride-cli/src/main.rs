use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use glam::{Mat4, Vec2, Vec3};
use stride_ecs::{Body, ComponentStore, Mesh, MeshHandle};
use stride_integrate::IntegratorKind;
use stride_kernel::{Backends, Engine, EngineConfig, FixedClock, Scene, SystemClock};
use stride_render::{GraphicsSubsystem, RecordingBackend};
use stride_sim::{AiSubsystem, Brain, LifetimeSubsystem, PhysicsSubsystem, set_timeout};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stride-cli", about = "Headless demo runner for the stride engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Run the demo scene headlessly and print frame statistics
    Run {
        /// Simulated seconds before the demo's timeout requests exit
        #[arg(short, long, default_value = "2.0")]
        seconds: f64,
        /// JSON engine configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Pace the loop with the wall clock instead of a fixed step
        #[arg(long)]
        realtime: bool,
        /// Number of spinning bodies
        #[arg(short, long, default_value = "3")]
        bodies: usize,
        /// Integrator used by the physics subsystem
        #[arg(long, value_enum, default_value_t = Solver::Rk4)]
        integrator: Solver,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Solver {
    Euler,
    Midpoint,
    Rk4,
}

impl From<Solver> for IntegratorKind {
    fn from(solver: Solver) -> Self {
        match solver {
            Solver::Euler => IntegratorKind::Euler,
            Solver::Midpoint => IntegratorKind::Midpoint,
            Solver::Rk4 => IntegratorKind::Rk4,
        }
    }
}

/// Posted by the watcher brain each time it thinks.
struct Census {
    bodies: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("stride-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("ecs: {}", stride_ecs::crate_info());
            println!("kernel: {}", stride_kernel::crate_info());
            println!("render: {}", stride_render::crate_info());
            println!("sim: {}", stride_sim::crate_info());
            println!("default integrator: {:?}", IntegratorKind::default());
        }
        Commands::Run {
            seconds,
            config,
            realtime,
            bodies,
            integrator,
        } => {
            anyhow::ensure!(seconds.is_finite() && seconds >= 0.0, "--seconds must be >= 0");
            let config = match config {
                Some(path) => EngineConfig::load(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => EngineConfig::default(),
            };
            run_demo(config, seconds, realtime, bodies, integrator.into())?;
        }
    }

    Ok(())
}

fn run_demo(
    config: EngineConfig,
    seconds: f64,
    realtime: bool,
    bodies: usize,
    integrator: IntegratorKind,
) -> anyhow::Result<()> {
    let recorder = RecordingBackend::new();
    let mut backends = Backends::headless().with_graphics(recorder.clone());
    if realtime {
        backends = backends.with_clock(SystemClock::new());
    } else {
        backends = backends.with_clock(FixedClock::new(config.draw_period()));
    }

    let clear_color = config.clear_color;
    let mut engine = Engine::new(config, backends)?;

    let censuses = Rc::new(Cell::new(0u32));
    let seen = censuses.clone();
    engine.on_message(move |census: &Census, _frame| {
        seen.set(seen.get() + 1);
        tracing::debug!(bodies = census.bodies, "census");
        Ok(())
    });

    let view = Mat4::from_scale(Vec3::splat(0.1));
    let mut scene = Scene::new("demo")
        .with_subsystem(AiSubsystem)
        .with_subsystem(PhysicsSubsystem::from_kind(integrator))
        .with_subsystem(LifetimeSubsystem)
        .with_subsystem(GraphicsSubsystem::new(clear_color).with_view(view));
    populate(scene.entities_mut(), bodies, seconds)?;

    info!(seconds, realtime, bodies, ?integrator, "running demo");
    engine.run("stride demo", 640, 480, scene)?;

    let stats = engine.stats();
    println!("iterations:   {}", stats.iterations);
    println!("updates:      {}", stats.updates);
    println!("draws:        {}", stats.draws);
    println!("lagged draws: {}", stats.lagged_draws);
    println!("messages:     {} dispatched, {} dropped", stats.dispatched_messages, stats.dropped_messages);
    println!("censuses:     {}", censuses.get());
    print!("{}", recorder.summary());
    Ok(())
}

fn populate(store: &mut ComponentStore, bodies: usize, seconds: f64) -> anyhow::Result<()> {
    for i in 0..bodies {
        let id = store.spawn();
        let offset = i as f32 * 2.0;
        let body = Body::at(Vec2::new(offset, 0.0))
            .with_velocity(Vec2::new(0.0, 1.0 + offset))
            .with_spin(1.0 + i as f32)
            .with_damping(0.1);
        store.insert(id, body)?;
        store.insert(id, Mesh::new(MeshHandle(i as u64)))?;
    }

    let watcher = store.spawn();
    let brain = Brain::new(2.0).with_think(|_, frame| {
        let bodies = frame.entities.count::<Body>();
        frame.post(Census { bodies });
        Ok(())
    });
    store.insert(watcher, brain)?;

    set_timeout(store, seconds, |frame| {
        info!("demo time is up");
        frame.exit();
        Ok(())
    })?;
    Ok(())
}
