//! Drop a sphere onto a plane and watch it come to rest
//!
//! Runs headless over host-memory buffers, then simulates one frame of GPU
//! refinement requests against the octree.

use anyhow::{Context, Result};
use glam::{DQuat, DVec3};
use sdf_engine::gpu::{HostAllocator, RequestRecord};
use sdf_engine::physics::{body_snapshot, is_asleep};
use sdf_engine::{Engine, EngineConfig, Material, Shape};
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig {
        task_threads: 2,
        tick_log_interval: 0.5,
        ..Default::default()
    };
    let mut engine = Engine::new(config, &HostAllocator).context("creating engine")?;

    let stone = Material::new(2400.0, 0.3, 0.6, 0.4).with_colour([120, 120, 120, 255]);
    let rubber = Material::new(700.0, 0.3, 0.9, 0.7).with_colour([200, 40, 40, 255]);

    let ground = engine.create_sdf(
        Shape::Plane {
            normal: DVec3::Y,
            offset: 0.0,
        },
        stone.colour,
    )?;
    let ball = engine.create_sdf(Shape::Sphere { radius: 1.0 }, rubber.colour)?;

    engine.add_substance(ground, stone, DVec3::ZERO, DQuat::IDENTITY, true)?;
    let ball_id = engine.add_substance(ball, rubber, DVec3::new(0.0, 3.0, 0.0), DQuat::IDENTITY, false)?;
    let body = engine
        .substance(ball_id)
        .context("ball substance missing")?
        .body;

    println!("Dropping a sphere from y = 3.0 ...");
    engine.start_physics()?;
    for _ in 0..50 {
        std::thread::sleep(Duration::from_millis(100));
        let state = body_snapshot(engine.physics(), body).context("ball body missing")?;
        println!(
            "  y = {:6.3}  vy = {:6.3}",
            state.position.y, state.velocity.y
        );
        if is_asleep(engine.physics(), body) {
            println!("[OK] sphere is asleep");
            break;
        }
    }
    engine.stop_physics();

    for record in engine.substance_records() {
        println!(
            "  substance {} centre {:?} radius {:.2}",
            record.id, record.centre, record.radius
        );
    }

    // Pretend the raymarcher hit the ball's surface in one work group
    let mut slots = vec![RequestRecord::EMPTY; engine.config().request_slot_count()];
    slots[0] = RequestRecord {
        position: [0.0, 1.0, 0.0],
        depth: 3,
    };
    engine
        .request_channel()
        .request_buffer()
        .copy(bytemuck::cast_slice(&slots), 0)?;
    let stats = engine.handle_requests()?;
    println!(
        "Requests: {} seen, {} expanded, {} bricked, {} nodes uploaded",
        stats.non_empty, stats.expanded, stats.bricked, stats.uploaded_nodes
    );

    engine.shutdown();
    Ok(())
}
