// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Saved viewer preferences (camera pose, outline tunables, session socket),
//! stored as JSON under the platform config directory.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_SOCK: &str = "/tmp/chamber-session.sock";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ViewerPrefs {
    pub camera: CameraPrefs,
    pub outline: OutlinePrefs,
    pub socket_path: Option<String>,
    pub show_hud: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraPrefs {
    pub pos: [f32; 3],
    pub orientation: [f32; 4],
    pub pitch: f32,
    pub fov_y: f32,
    pub orthographic: bool,
}

impl Default for CameraPrefs {
    fn default() -> Self {
        Self {
            pos: [0.0, 0.0, 300.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
            pitch: 0.0,
            fov_y: 60f32.to_radians(),
            orthographic: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlinePrefs {
    pub edge_strength: f32,
    pub edge_glow: f32,
    pub edge_thickness: f32,
    pub downsample_ratio: u32,
}

impl Default for OutlinePrefs {
    fn default() -> Self {
        Self {
            edge_strength: 3.0,
            edge_glow: 0.0,
            edge_thickness: 1.0,
            downsample_ratio: 2,
        }
    }
}

fn prefs_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("dev", "flyingrobots", "Chamber")?;
    Some(proj.config_dir().join("viewer.json"))
}

pub fn load() -> ViewerPrefs {
    let Some(path) = prefs_path() else {
        return ViewerPrefs::default();
    };
    match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            warn!(?path, %err, "unreadable prefs, using defaults");
            ViewerPrefs::default()
        }),
        Err(_) => ViewerPrefs::default(),
    }
}

pub fn save(prefs: &ViewerPrefs) {
    let Some(path) = prefs_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match serde_json::to_vec_pretty(prefs) {
        Ok(bytes) => {
            if let Err(err) = fs::write(&path, bytes) {
                warn!(?path, %err, "failed to save prefs");
            }
        }
        Err(err) => warn!(%err, "failed to serialize prefs"),
    }
}
