use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Track Replay - Plays recorded tracks back along a timeline
pub struct Settings {
    /// GPX files or JSON feature lists to load
    #[clap(value_name = "FILE", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Field the points of each track are ordered by ("time" makes tracks animatable)
    #[clap(short, long, default_value = "time")]
    pub sort_field: String,

    /// Field used to group records into tracks (empty = one track for everything)
    #[clap(short, long, default_value = "track")]
    pub group_by: String,

    /// Field written on each record with the id of its track
    #[clap(long, default_value = "TRACK_ID")]
    pub track_id_field: String,

    /// Seconds the timeline advances per tick
    #[clap(long, default_value = "60.0")]
    pub step: f64,

    /// Length of the trailing window in seconds (0 = everything since the start)
    #[clap(short, long, default_value = "0.0")]
    pub window: f64,

    /// Snap the marker to the previous sample instead of interpolating
    #[clap(long)]
    pub snap: bool,

    /// Drop samples before this sort value
    #[clap(long, allow_hyphen_values = true)]
    pub clamp_start: Option<f64>,

    /// Drop samples after this sort value
    #[clap(long, allow_hyphen_values = true)]
    pub clamp_end: Option<f64>,

    /// Stop after this many ticks
    #[clap(long)]
    pub limit: Option<usize>,

    /// Log filter used when RUST_LOG is not set
    #[clap(long, default_value = "info")]
    pub log: String,
}

impl Settings {
    /// Grouping field, if grouping is enabled
    pub fn group_field(&self) -> Option<&str> {
        Some(self.group_by.as_str()).filter(|field| !field.is_empty())
    }

    /// Clamp bounds, if any were given
    pub fn clamp_range(&self) -> Option<(f64, f64)> {
        if self.clamp_start.is_none() && self.clamp_end.is_none() {
            return None;
        }
        Some((
            self.clamp_start.unwrap_or(f64::NEG_INFINITY),
            self.clamp_end.unwrap_or(f64::INFINITY),
        ))
    }
}
