//! Loads the scenes under `tests/data`.

use std::{env, path::PathBuf};

use glam::{UVec3, Vec3, Vec3A};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use waymark::{Obstacle, PathQuery, QueryConfig, TriMesh};

#[derive(Debug, Deserialize, Clone)]
struct Geometry {
    verts: Vec<[f32; 3]>,
    tris: Vec<[u32; 3]>,
}

#[derive(Debug, Deserialize, Clone)]
struct Obstacles {
    boxes: Vec<ObstacleBox>,
}

#[derive(Debug, Deserialize, Clone)]
struct ObstacleBox {
    center: [f32; 3],
    half_extents: [f32; 3],
}

/// Maximum walkable slope used for every scene.
pub const MAX_SLOPE_DEGREES: f32 = 45.0;

#[allow(dead_code)]
pub fn load_trimesh(scene: &str) -> TriMesh {
    let geometry = load_json::<Geometry>(scene, "geometry");
    TriMesh::new(
        geometry.verts.iter().map(|v| Vec3A::from(*v)).collect(),
        geometry.tris.iter().map(|i| UVec3::from(*i)).collect(),
    )
}

#[allow(dead_code)]
pub fn load_obstacles(scene: &str) -> Vec<Obstacle> {
    load_json::<Obstacles>(scene, "obstacles")
        .boxes
        .iter()
        .map(|b| Obstacle::from_box(Vec3::from(b.center), Vec3::from(b.half_extents)))
        .collect()
}

#[allow(dead_code)]
pub fn load_query(scene: &str) -> PathQuery {
    let mut trimesh = load_trimesh(scene);
    trimesh.mark_walkable_triangles(MAX_SLOPE_DEGREES.to_radians());
    PathQuery::from_trimesh(
        scene,
        trimesh,
        &load_obstacles(scene),
        QueryConfig::default(),
    )
}

fn data_dir() -> PathBuf {
    env::current_dir().unwrap().join("tests").join("data")
}

#[track_caller]
fn load_json<T: DeserializeOwned>(scene: &str, name: &str) -> T {
    let path = data_dir().join(scene).join(format!("{name}.json"));
    let file = std::fs::read_to_string(&path).unwrap_or_else(|e| {
        panic!("Failed to read file: {}: {}", path.display(), e);
    });
    let value: Value = serde_json::from_str(&file).unwrap_or_else(|e| {
        panic!("Failed to parse JSON: {}: {}", path.display(), e);
    });
    serde_json::from_value(value).unwrap_or_else(|e| {
        panic!("Failed to deserialize JSON: {}: {}", path.display(), e);
    })
}
