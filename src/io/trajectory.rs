//! Trajectory export in the KITTI benchmark format.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::map::WorldMap;

/// Write the world map's trajectory to `path` in KITTI format: one line per
/// frame in acquisition order, each holding the 12 values of the top three
/// rows of the frame's robot-to-world matrix, row-major and space-separated.
pub fn write_trajectory<P: AsRef<Path>>(map: &WorldMap, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("failed to create trajectory file {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    let frames = map.frames_in_order();
    for frame in &frames {
        let matrix = frame.robot_to_world().to_matrix();
        let mut values = Vec::with_capacity(12);
        for row in 0..3 {
            for col in 0..4 {
                values.push(matrix[(row, col)].to_string());
            }
        }
        writeln!(writer, "{}", values.join(" "))
            .with_context(|| format!("failed to write trajectory to {}", path.display()))?;
    }
    writer.flush()?;

    info!(frames = frames.len(), path = %path.display(), "trajectory written");
    Ok(())
}
