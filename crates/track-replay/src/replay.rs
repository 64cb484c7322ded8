//! Builds tracks from the loaded records and drives them along the timeline

use crate::error::ReplayError;
use crate::loader::{SEGMENT_FIELD, load_records};
use crate::settings::Settings;
use crate::timeline::{Tick, Timeline};
use serde::Serialize;
use std::io::Write;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use track_engine::{
    Config, Feature, FieldValue, SortField, TrackBuilder, TrackEntity, TrackStyle, UpdateOutcome,
};

/// Totals of a track, printed before playback
#[derive(Debug, Serialize)]
struct TrackSummary<'a> {
    id: &'a str,
    name: &'a str,
    points: usize,
    segments: usize,
    distance_m: f64,
    duration_s: Option<f64>,
    speed_m_per_h: Option<f64>,
}

/// Marker state of one track at one tick
#[derive(Debug, Serialize)]
struct MarkerReport<'a> {
    track: &'a str,
    lon: Option<f64>,
    lat: Option<f64>,
    sort: Option<f64>,
    visible: bool,
    rebuilt: bool,
    elapsed_distance_m: f64,
    elapsed_duration_s: Option<f64>,
    speed_m_per_h: Option<f64>,
    label: Option<String>,
}

impl<'a> MarkerReport<'a> {
    fn new(track: &'a TrackEntity, outcome: UpdateOutcome) -> Self {
        let marker = track.marker();
        let stats = track.statistics();
        Self {
            track: track.name(),
            lon: marker.map(|m| m.lon),
            lat: marker.map(|m| m.lat),
            sort: marker.map(|m| m.sort),
            visible: track.is_marker_visible(),
            rebuilt: outcome == UpdateOutcome::Rebuilt,
            elapsed_distance_m: stats.elapsed_distance,
            elapsed_duration_s: stats.elapsed_duration,
            speed_m_per_h: stats.average_speed,
            label: track
                .current_attributes()
                .and_then(|a| a.get("name"))
                .map(FieldValue::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
struct TickReport<'a> {
    tick: Tick,
    time: String,
    tracks: Vec<MarkerReport<'a>>,
}

/// RFC 3339 form of a time in seconds since the epoch
pub fn format_instant(seconds: f64) -> String {
    let millis = (seconds * 1e3).round() as i128;
    OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
        .unwrap_or_else(|| seconds.to_string())
}

/// Turn loaded records into tracks, grouping them when requested
pub fn build_tracks(
    records: &mut [Feature],
    settings: &Settings,
) -> Result<Vec<TrackEntity>, ReplayError> {
    profiling::scope!("build_tracks");

    let builder = TrackBuilder::new(Config {
        style: TrackStyle {
            interpolate_marker: !settings.snap,
            ..TrackStyle::default()
        },
        track_id_field: settings.track_id_field.clone(),
        segment_field: Some(SEGMENT_FIELD.to_string()),
        ..Config::default()
    });
    let sort_field = SortField::from(settings.sort_field.as_str());

    let mut tracks = match settings.group_field() {
        Some(field) => {
            let mut existing: Vec<TrackEntity> = Vec::new();
            let outcome = builder.split_by_field(records, field, &sort_field, &mut existing);
            for (group, err) in &outcome.failed {
                tracing::warn!(group = %group, "Skipping group: {}", err);
            }
            if !outcome.leftover.is_empty() {
                tracing::warn!(
                    records = outcome.leftover.len(),
                    field = %field,
                    "Records without a group were ignored"
                );
            }
            outcome.created
        }
        None => vec![builder.create_track(Some("all"), sort_field, records)?],
    };

    if let Some((start, end)) = settings.clamp_range() {
        for track in &mut tracks {
            if track.clamp(start, end) {
                tracing::debug!(track = %track.name(), points = track.geometry().len(), "Clamped track");
            }
        }
    }
    Ok(tracks)
}

/// Sort range covered by the animatable tracks
pub fn data_range(tracks: &[TrackEntity]) -> Option<(f64, f64)> {
    tracks
        .iter()
        .filter(|track| track.is_animatable())
        .filter_map(|track| {
            let coordinates = track.geometry().coordinates();
            Some((coordinates.first()?.sort, coordinates.last()?.sort))
        })
        .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
}

/// One JSON line per track with its totals
pub fn write_summary<W: Write>(out: &mut W, tracks: &[TrackEntity]) -> Result<(), ReplayError> {
    for track in tracks {
        let stats = track.statistics();
        let summary = TrackSummary {
            id: track.id(),
            name: track.name(),
            points: track.geometry().len(),
            segments: track.geometry().segment_ranges().len(),
            distance_m: stats.total_distance,
            duration_s: stats.total_duration,
            speed_m_per_h: stats.average_speed,
        };
        writeln!(out, "{}", serde_json::to_string(&summary)?)?;
    }
    Ok(())
}

/// Play the tracks along the timeline, returning the number of ticks emitted
pub fn play<W: Write>(
    tracks: &mut [TrackEntity],
    settings: &Settings,
    out: &mut W,
) -> Result<usize, ReplayError> {
    let (start, end) = data_range(tracks).ok_or(ReplayError::NothingToReplay)?;
    let timeline = Timeline::new(start, end, settings.step, settings.window)?;

    for track in tracks.iter_mut() {
        if !track.enter_animating() {
            tracing::info!(track = %track.name(), "Track is not animatable, skipping");
        }
    }

    let mut ticks = 0;
    for tick in timeline.ticks().take(settings.limit.unwrap_or(usize::MAX)) {
        profiling::scope!("tick");
        let outcomes: Vec<UpdateOutcome> = tracks
            .iter_mut()
            .filter(|track| track.is_animating())
            .map(|track| track.update_window(tick.start, tick.end))
            .collect();
        let report = TickReport {
            time: format_instant(tick.end),
            tick,
            tracks: tracks
                .iter()
                .filter(|track| track.is_animating())
                .zip(outcomes)
                .map(|(track, outcome)| MarkerReport::new(track, outcome))
                .collect(),
        };
        writeln!(out, "{}", serde_json::to_string(&report)?)?;
        ticks += 1;
    }

    for track in tracks.iter_mut() {
        track.exit_animating();
    }
    tracing::info!(ticks, "Replay finished");
    Ok(ticks)
}

/// Load, build and play everything named in `settings`
pub fn run(settings: &Settings) -> Result<(), ReplayError> {
    let mut records = Vec::new();
    for path in &settings.inputs {
        records.extend(load_records(path)?);
    }

    let mut tracks = build_tracks(&mut records, settings)?;
    tracing::info!(tracks = tracks.len(), records = records.len(), "Built tracks");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_summary(&mut out, &tracks)?;
    play(&mut tracks, settings, &mut out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{TRACK_FIELD, features_from_gpx};
    use clap::Parser;

    fn create_test_settings(args: &[&str]) -> Settings {
        let mut argv = vec!["track-replay", "unused.json"];
        argv.extend_from_slice(args);
        Settings::parse_from(argv)
    }

    fn create_test_records() -> Vec<Feature> {
        let mut records = Vec::new();
        for (name, lat) in [("alpha", 0.0), ("beta", 1.0)] {
            for i in 0..4 {
                records.push(
                    Feature::new(format!("{}-{}", name, i))
                        .with_point(i as f64 * 0.01, lat)
                        .with_time(1_700_000_000.0 + i as f64 * 60.0)
                        .with_property(TRACK_FIELD, name)
                        .with_property("name", format!("{} #{}", name, i)),
                );
            }
        }
        records
    }

    fn read_lines(out: Vec<u8>) -> Vec<serde_json::Value> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_build_tracks_grouped() {
        let settings = create_test_settings(&[]);
        let mut records = create_test_records();
        let tracks = build_tracks(&mut records, &settings).unwrap();

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].name(), "alpha");
        assert_eq!(tracks[1].geometry().len(), 4);
        assert!(records.iter().all(|r| r.properties.contains_key("TRACK_ID")));
    }

    #[test]
    fn test_build_tracks_ungrouped_and_clamped() {
        let settings = create_test_settings(&[
            "--group-by",
            "",
            "--clamp-end",
            "1700000060",
        ]);
        let mut records = create_test_records();
        // Both vessels share timestamps, so only one sample per instant survives
        let tracks = build_tracks(&mut records, &settings).unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].name(), "all");
        assert_eq!(tracks[0].geometry().len(), 2);
    }

    #[test]
    fn test_data_range() {
        let settings = create_test_settings(&[]);
        let mut records = create_test_records();
        let tracks = build_tracks(&mut records, &settings).unwrap();
        assert_eq!(
            data_range(&tracks),
            Some((1_700_000_000.0, 1_700_000_180.0))
        );
        assert_eq!(data_range(&[]), None);
    }

    #[test]
    fn test_play_json() {
        let settings = create_test_settings(&["--step", "90"]);
        let mut records = create_test_records();
        let mut tracks = build_tracks(&mut records, &settings).unwrap();

        let mut out = Vec::new();
        let ticks = play(&mut tracks, &settings, &mut out).unwrap();
        assert_eq!(ticks, 2);

        let lines = read_lines(out);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["time"], "2023-11-14T22:14:50Z");

        // Halfway between the second and third sample
        let first = &lines[0]["tracks"][0];
        assert_eq!(first["track"], "alpha");
        assert!((first["lon"].as_f64().unwrap() - 0.015).abs() < 1e-9);
        assert_eq!(first["label"], "alpha #1");
        assert_eq!(first["visible"], true);

        // Tracks are back in full mode afterwards
        assert!(tracks.iter().all(|t| !t.is_animating()));
    }

    #[test]
    fn test_play_snapped() {
        let settings = create_test_settings(&["--snap", "--step", "90", "--limit", "1"]);
        let mut records = create_test_records();
        let mut tracks = build_tracks(&mut records, &settings).unwrap();

        let mut out = Vec::new();
        assert_eq!(play(&mut tracks, &settings, &mut out).unwrap(), 1);
        let lines = read_lines(out);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["tracks"][0]["lon"], 0.01);
        assert_eq!(lines[0]["tracks"][0]["lat"], 0.0);
    }

    #[test]
    fn test_gpx_segments_are_not_joined() {
        const TWO_SEGMENTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>ferry</name>
    <trkseg>
      <trkpt lat="0.0" lon="0.0"><time>2024-01-01T00:00:00Z</time></trkpt>
      <trkpt lat="0.0" lon="1.0"><time>2024-01-01T00:01:00Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="0.0" lon="50.0"><time>2024-01-01T01:00:00Z</time></trkpt>
      <trkpt lat="0.0" lon="51.0"><time>2024-01-01T01:01:00Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;
        let gpx = gpx::read(TWO_SEGMENTS.as_bytes()).unwrap();
        let mut records = features_from_gpx(&gpx, "sample");
        let settings = create_test_settings(&[]);
        let mut tracks = build_tracks(&mut records, &settings).unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].geometry().segment_ranges().len(), 2);

        // Halfway through the gap the marker stays at the end of the first segment
        let t0 = 1_704_067_200.0;
        assert!(tracks[0].enter_animating());
        tracks[0].update_window(t0, t0 + 1800.0);
        assert_eq!(tracks[0].marker().unwrap().lon, 1.0);
    }

    #[test]
    fn test_play_without_temporal_tracks() {
        let settings = create_test_settings(&["--sort-field", "rank"]);
        let mut records: Vec<Feature> = create_test_records()
            .into_iter()
            .enumerate()
            .map(|(i, f)| f.with_property("rank", i as f64))
            .collect();
        let mut tracks = build_tracks(&mut records, &settings).unwrap();

        let mut out = Vec::new();
        assert!(matches!(
            play(&mut tracks, &settings, &mut out),
            Err(ReplayError::NothingToReplay)
        ));
    }

    #[test]
    fn test_write_summary() {
        let settings = create_test_settings(&[]);
        let mut records = create_test_records();
        let tracks = build_tracks(&mut records, &settings).unwrap();

        let mut out = Vec::new();
        write_summary(&mut out, &tracks).unwrap();
        let lines = read_lines(out);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], "alpha");
        assert_eq!(lines[0]["points"], 4);
        assert_eq!(lines[0]["segments"], 1);
        assert_eq!(lines[0]["duration_s"], 180.0);
    }

    #[test]
    fn test_format_instant() {
        assert_eq!(format_instant(0.0), "1970-01-01T00:00:00Z");
    }
}
