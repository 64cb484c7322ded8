//! Reads input files into records
//!
//! GPX track points become one [`Feature`] each, tagged with the name of their
//! track and the index of their segment so they can be grouped back into tracks
//! with gaps between segments. JSON inputs are plain lists of
//! serialized features.

use crate::error::ReplayError;
use gpx::Gpx;
use std::io::BufReader;
use std::path::Path;
use time::OffsetDateTime;
use track_engine::Feature;

/// Property holding the name of the GPX track a point came from
pub const TRACK_FIELD: &str = "track";

/// Property holding the segment index within the GPX track
pub const SEGMENT_FIELD: &str = "segment";

/// Load all records of a file, picking the format from its extension
pub fn load_records(path: &Path) -> Result<Vec<Feature>, ReplayError> {
    profiling::scope!("load_records");

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let open = || {
        std::fs::File::open(path)
            .map(BufReader::new)
            .map_err(|source| ReplayError::Io {
                path: path.to_path_buf(),
                source,
            })
    };

    let records = match extension.as_deref() {
        Some("gpx") => {
            let gpx = gpx::read(open()?).map_err(|source| ReplayError::Gpx {
                path: path.to_path_buf(),
                source,
            })?;
            let source = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            features_from_gpx(&gpx, &source)
        }
        Some("json") => serde_json::from_reader(open()?).map_err(|source| ReplayError::Json {
            path: path.to_path_buf(),
            source,
        })?,
        _ => return Err(ReplayError::UnsupportedInput(path.to_path_buf())),
    };

    tracing::info!(path = %path.display(), records = records.len(), "Loaded input");
    Ok(records)
}

/// Seconds since the epoch, keeping sub-second precision
pub fn unix_seconds(time: OffsetDateTime) -> f64 {
    time.unix_timestamp_nanos() as f64 / 1e9
}

/// One feature per GPX track point
///
/// Tracks without a name are called `<source>#<index>`.
pub fn features_from_gpx(gpx: &Gpx, source: &str) -> Vec<Feature> {
    let mut features = Vec::new();
    for (t, track) in gpx.tracks.iter().enumerate() {
        let name = track
            .name
            .clone()
            .unwrap_or_else(|| format!("{}#{}", source, t));

        for (s, segment) in track.segments.iter().enumerate() {
            for (p, waypoint) in segment.points.iter().enumerate() {
                let point = waypoint.point();
                let mut feature = Feature::new(format!("{}/{}/{}", name, s, p))
                    .with_point(point.x(), point.y())
                    .with_property(TRACK_FIELD, name.as_str())
                    .with_property(SEGMENT_FIELD, s as f64);
                if let Some(elevation) = waypoint.elevation {
                    feature = feature.with_altitude(elevation);
                }
                if let Some(time) = waypoint.time {
                    feature = feature.with_time(unix_seconds(time.into()));
                }
                if let Some(label) = &waypoint.name {
                    feature = feature.with_property("name", label.as_str());
                }
                features.push(feature);
            }
        }
    }
    features
}
