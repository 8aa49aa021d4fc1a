//! A headless scene: a crowd of wandering agents and one commanded agent in a warehouse with shelves.
//!
//! The first simulated click starts every agent, later clicks send the whole crowd to the clicked point.

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use bevy::{
    app::ScheduleRunnerPlugin,
    diagnostic::FrameCount,
    log::LogPlugin,
    math::{UVec3, Vec3A},
    prelude::*,
};
use waymark::prelude::*;

const WANDERERS: usize = 50;
const FLOOR_HALF_SIZE: f32 = 20.0;
const FLOOR_SUBDIVISIONS: u32 = 40;
const LAST_FRAME: u32 = 1800;
const SUMMARY_INTERVAL: u32 = 120;

/// Frames at which a click is simulated, and where it lands.
const CLICKS: [(u32, Vec3); 4] = [
    (10, Vec3::ZERO),
    (600, Vec3::new(12.0, 0.0, -12.0)),
    (1000, Vec3::new(-15.0, 0.0, 9.0)),
    (1400, Vec3::new(40.0, 0.0, 40.0)),
];

fn main() -> anyhow::Result<()> {
    let navmesh = build_warehouse().context("Failed to build the warehouse navmesh")?;
    let config = SimulationConfig {
        seed: 0x5eed,
        debug: true,
        ..default()
    };
    let mut simulation = Simulation::from_navmesh(Arc::new(navmesh), config);
    for _ in 0..WANDERERS {
        simulation.spawn(SpawnPoint::RandomWalkable, Autonomy::Wander);
    }
    let player = simulation.spawn(SpawnPoint::BoundsCenter, Autonomy::Commanded);

    let exit = App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(
            Duration::from_secs_f64(1.0 / 60.0),
        )))
        .add_plugins(LogPlugin::default())
        .add_event::<Click>()
        .insert_resource(Crowd {
            simulation,
            player,
            started: false,
        })
        .add_systems(
            Update,
            (emit_clicks, handle_clicks, tick_crowd, log_summary, exit_when_done).chain(),
        )
        .run();

    match exit {
        AppExit::Success => Ok(()),
        AppExit::Error(code) => anyhow::bail!("Crowd scene exited with code {code}"),
    }
}

/// The warehouse floor with two rows of shelves and a steep ramp that is not walkable.
fn build_warehouse() -> Result<NavMesh, waymark::NavGraphBuildError> {
    let mut trimesh = floor(FLOOR_HALF_SIZE, FLOOR_SUBDIVISIONS);
    trimesh.extend(TriMesh::new(
        vec![
            Vec3A::new(15.0, 0.0, 15.0),
            Vec3A::new(19.0, 0.0, 15.0),
            Vec3A::new(19.0, 6.0, 19.0),
            Vec3A::new(15.0, 6.0, 19.0),
        ],
        vec![UVec3::new(0, 2, 1), UVec3::new(0, 3, 2)],
    ));
    trimesh.mark_walkable_triangles(45.0_f32.to_radians());

    let shelves = [-10.0, -4.0, 4.0, 10.0]
        .into_iter()
        .flat_map(|x| {
            [-8.0, 8.0].map(|z| {
                Obstacle::from_box(Vec3::new(x, 1.0, z), Vec3::new(1.0, 1.0, 5.0))
            })
        })
        .collect::<Vec<_>>();
    NavMesh::build("warehouse", trimesh, &shelves)
}

fn floor(half_size: f32, subdivisions: u32) -> TriMesh {
    let step = 2.0 * half_size / subdivisions as f32;
    let row = subdivisions + 1;
    let vertices = (0..=subdivisions)
        .flat_map(|z| {
            (0..=subdivisions).map(move |x| {
                Vec3A::new(-half_size + x as f32 * step, 0.0, -half_size + z as f32 * step)
            })
        })
        .collect();
    let indices = (0..subdivisions)
        .flat_map(|z| {
            (0..subdivisions).flat_map(move |x| {
                let a = x + z * row;
                [
                    UVec3::new(a, a + row + 1, a + 1),
                    UVec3::new(a, a + row, a + row + 1),
                ]
            })
        })
        .collect();
    TriMesh::new(vertices, indices)
}

#[derive(Resource)]
struct Crowd {
    simulation: Simulation,
    player: AgentId,
    started: bool,
}

#[derive(Event, Debug, Clone, Copy)]
struct Click(Vec3);

fn emit_clicks(frame: Res<FrameCount>, mut clicks: EventWriter<Click>) {
    for (click_frame, point) in CLICKS {
        if frame.0 == click_frame {
            clicks.write(Click(point));
        }
    }
}

fn handle_clicks(mut clicks: EventReader<Click>, mut crowd: ResMut<Crowd>) {
    for Click(point) in clicks.read().copied() {
        if !crowd.started {
            crowd.started = true;
            crowd.simulation.start_all(point);
            continue;
        }
        info!("Click at {point}, sending the crowd there");
        crowd.simulation.broadcast_destination(point);
        let player = crowd.player;
        match crowd.simulation.command(player) {
            Ok(mut commands) => {
                let flags = commands.set_destination(point);
                debug!("Player path flags: {flags:?}");
            }
            Err(err) => warn!("{err}"),
        }
    }
}

fn tick_crowd(time: Res<Time>, mut crowd: ResMut<Crowd>, frame: Res<FrameCount>) {
    let summary = crowd.simulation.tick(time.delta_secs());
    if summary.abandoned > 0 {
        debug!(
            "Frame {}: {} agents abandoned their path",
            frame.0, summary.abandoned
        );
    }
}

fn log_summary(crowd: Res<Crowd>, frame: Res<FrameCount>) {
    if frame.0 == 0 || frame.0 % SUMMARY_INTERVAL != 0 {
        return;
    }
    let simulation = &crowd.simulation;
    let moving = simulation
        .agents()
        .filter(|(_, agent)| agent.is_moving() && !agent.path().is_empty())
        .count();
    let walkable = simulation
        .agents()
        .filter(|(_, agent)| simulation.query().is_point_walkable(agent.position()))
        .count();
    info!(
        "Frame {}: {moving}/{} agents walking, {walkable} on walkable ground, {} pending events",
        frame.0,
        simulation.len(),
        simulation.scheduler().len()
    );
    if let Some(player) = simulation.agent(crowd.player) {
        info!(
            "Player at {} is {:?}",
            player.position(),
            player.state()
        );
    }
    if let Some(overlay) = simulation.debug_overlay() {
        let waypoints: usize = overlay.paths.iter().map(|(_, points)| points.len()).sum();
        debug!(
            "Overlay: {} edges, {} obstacles, {waypoints} waypoints",
            overlay.edges.len(),
            overlay.obstacles.len()
        );
    }
}

fn exit_when_done(frame: Res<FrameCount>, mut exit: EventWriter<AppExit>) {
    if frame.0 >= LAST_FRAME {
        info!("Simulated {LAST_FRAME} frames, exiting");
        exit.write(AppExit::Success);
    }
}
