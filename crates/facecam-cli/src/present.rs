//! Terminal rendering of loading progress and detected faces.

use crate::engine::Snapshot;
use anyhow::{Context, Result};
use facecam_core::{DisplayedFace, LoadStage, OverlayLabel};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Print one loading stage line; the indicator is done at `Ready`.
pub fn loading(stage: LoadStage) {
    match stage {
        LoadStage::Ready => println!("{stage}"),
        _ => println!("[..] {stage}"),
    }
}

/// Render the face list as an aligned table.
pub fn face_table(faces: &[DisplayedFace]) -> String {
    if faces.is_empty() {
        return "No faces detected\n".to_string();
    }
    let mut out = format!("{:<8} {:<16} {:>5} {:<8} {}\n", "ID", "NAME", "AGE", "GENDER", "EMOTION");
    for face in faces {
        out.push_str(&format!(
            "{:<8} {:<16} {:>5.0} {:<8} {}\n",
            face.id,
            face.name,
            face.age,
            face.gender,
            face.top_expression.map(|e| e.as_str()).unwrap_or("-"),
        ));
    }
    out
}

#[derive(Serialize)]
struct FacesLine<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence: Option<u32>,
    faces: &'a [DisplayedFace],
}

/// One JSON object per cycle.
pub fn faces_json(snapshot: &Snapshot) -> Result<String> {
    let line = FacesLine {
        sequence: snapshot.sequence,
        faces: &snapshot.faces,
    };
    serde_json::to_string(&line).context("failed to serialize faces")
}

pub fn print_snapshot(snapshot: &Snapshot, json: bool) -> Result<()> {
    let text = if json {
        faces_json(snapshot)? + "\n"
    } else {
        face_table(&snapshot.faces)
    };
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Write the composited frame, if the snapshot carries one.
pub fn write_overlay(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let Some(image) = &snapshot.composite else {
        return Ok(());
    };
    image
        .save(path)
        .with_context(|| format!("failed to write overlay {}", path.display()))?;
    tracing::debug!(path = %path.display(), "overlay written");
    Ok(())
}

/// Write caption annotations as a JSON array next to the overlay.
pub fn write_labels(labels: &[OverlayLabel], path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(labels).context("failed to serialize labels")?;
    std::fs::write(path, text).with_context(|| format!("failed to write labels {}", path.display()))
}
