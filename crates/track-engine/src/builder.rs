//! TrackBuilder - Creates and extends tracks from feature-like records
//!
//! The builder extracts one point per record, orders points by the sort field and
//! hands them to [`TrackEntity`]. [`TrackBuilder::split_by_field`] groups a whole
//! batch of records into tracks, building new tracks in parallel and tagging every
//! record with the id of the track it ended up in.

use crate::entity::{RecordRef, TrackStyle};
use crate::{
    AppendOutcome, Attributes, Coordinate, FieldValue, Layout, Result, SortField, TrackEntity,
    TrackError, TrackOptions, TrackRecord, TrackSource,
};
use geo::Geometry;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Field that records are tagged with after being assigned to a track
pub const DEFAULT_TRACK_ID_FIELD: &str = "TRACK_ID";

/// Builder configuration
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct Config {
    /// Style given to new tracks
    pub style: TrackStyle,
    /// Keep record attributes as per-sample metadata
    pub include_metadata: bool,
    /// Field written on records assigned to a track
    pub track_id_field: String,
    /// Field separating the segments of one track, see [`TrackOptions::segment_field`]
    pub segment_field: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            style: TrackStyle::default(),
            include_metadata: true,
            track_id_field: DEFAULT_TRACK_ID_FIELD.to_string(),
            segment_field: None,
        }
    }
}

/// Why a record did not contribute a point
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    MissingGeometry,
    MissingSortValue,
    /// Geometry holds more than one point
    AmbiguousGeometry,
    /// Another record already has the same sort value
    DuplicateSortValue,
}

/// A skipped input item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    /// Position in the input
    pub index: usize,
    /// Record id, when the input was a record
    pub id: Option<String>,
    pub reason: RejectReason,
}

/// Summary of an extraction
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractReport {
    /// Points that made it into the track
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
    /// Records that had a value for the sort field
    pub sort_values_found: usize,
}

impl ExtractReport {
    pub(crate) fn reject(&mut self, index: usize, id: Option<String>, reason: RejectReason) {
        self.rejected.push(Rejection { index, id, reason });
    }

    /// Number of rejections with `reason`
    pub fn count(&self, reason: RejectReason) -> usize {
        self.rejected.iter().filter(|r| r.reason == reason).count()
    }
}

/// A point extracted from the input item at `index`
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedPoint {
    pub index: usize,
    /// Id of the source record, if the input was records
    pub id: Option<String>,
    pub coordinate: Coordinate,
    pub attributes: Option<Attributes>,
}

/// Points extracted from records, in input order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    pub points: Vec<ExtractedPoint>,
    /// `Xyzm` as soon as one record has an altitude
    pub layout: Layout,
    pub report: ExtractReport,
}

/// Result of [`TrackBuilder::split_by_field`]
#[derive(Debug, Default)]
pub struct SplitOutcome {
    /// Newly created tracks, ordered by group value
    pub created: Vec<TrackEntity>,
    /// Existing tracks that received records, as `(track id, outcome)`
    pub appended: Vec<(String, AppendOutcome)>,
    /// Groups that could not become a track, as `(group value, error)`
    pub failed: Vec<(String, TrackError)>,
    /// Records without a value for the grouping field
    pub leftover: Vec<usize>,
}

/// Looks up existing tracks by group value
pub trait TrackResolver {
    fn resolve(&mut self, name: &str) -> Option<&mut TrackEntity>;
}

impl TrackResolver for HashMap<String, TrackEntity> {
    fn resolve(&mut self, name: &str) -> Option<&mut TrackEntity> {
        self.get_mut(name)
    }
}

impl TrackResolver for Vec<TrackEntity> {
    fn resolve(&mut self, name: &str) -> Option<&mut TrackEntity> {
        self.iter_mut()
            .find(|track| track.name() == name && !track.is_disposed())
    }
}

/// Single point of a geometry, or why there isn't one
fn single_point(geometry: &Geometry<f64>) -> std::result::Result<geo::Point<f64>, RejectReason> {
    match geometry {
        Geometry::Point(point) => Ok(*point),
        Geometry::MultiPoint(points) => match points.0.as_slice() {
            [point] => Ok(*point),
            [] => Err(RejectReason::MissingGeometry),
            _ => Err(RejectReason::AmbiguousGeometry),
        },
        Geometry::GeometryCollection(collection) => {
            let mut found = None;
            for member in collection.iter() {
                match single_point(member) {
                    Ok(point) if found.is_none() => found = Some(point),
                    Ok(_) | Err(RejectReason::AmbiguousGeometry) => {
                        return Err(RejectReason::AmbiguousGeometry);
                    }
                    Err(_) => {}
                }
            }
            found.ok_or(RejectReason::MissingGeometry)
        }
        _ => Err(RejectReason::MissingGeometry),
    }
}

/// Creates tracks with a shared configuration
#[derive(Clone, Debug, Default)]
pub struct TrackBuilder {
    config: Config,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackBuilder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extract one point per record
    ///
    /// Records without a usable point or sort value are listed in the report.
    /// Points are returned in input order, neither sorted nor deduplicated.
    pub fn extract_coordinates<'r, R>(
        records: impl IntoIterator<Item = &'r R>,
        sort_field: &SortField,
        include_metadata: bool,
    ) -> Extraction
    where
        R: TrackRecord + ?Sized + 'r,
    {
        let mut extraction = Extraction::default();
        let mut has_altitude = false;

        for (index, record) in records.into_iter().enumerate() {
            let sort = sort_field.value_of(record);
            if sort.is_some() {
                extraction.report.sort_values_found += 1;
            }

            let point = match record.geometry() {
                Some(geometry) => single_point(geometry),
                None => Err(RejectReason::MissingGeometry),
            };
            let (point, sort) = match (point, sort) {
                (Ok(point), Some(sort)) => (point, sort),
                (Err(reason), _) => {
                    extraction
                        .report
                        .reject(index, Some(record.id().to_string()), reason);
                    continue;
                }
                (Ok(_), None) => {
                    extraction.report.reject(
                        index,
                        Some(record.id().to_string()),
                        RejectReason::MissingSortValue,
                    );
                    continue;
                }
            };

            let coordinate = match record.altitude() {
                Some(alt) => {
                    has_altitude = true;
                    Coordinate::with_altitude(point.x(), point.y(), alt, sort)
                }
                None => Coordinate::new(point.x(), point.y(), sort),
            };
            extraction.points.push(ExtractedPoint {
                index,
                id: Some(record.id().to_string()),
                coordinate,
                attributes: include_metadata.then(|| record.attributes()),
            });
        }

        if has_altitude {
            extraction.layout = Layout::Xyzm;
        }
        extraction.report.accepted = extraction.points.len();

        if !extraction.report.rejected.is_empty() {
            tracing::debug!(
                accepted = extraction.report.accepted,
                rejected = extraction.report.rejected.len(),
                sort_field = %sort_field,
                "Skipped records during extraction"
            );
        }
        extraction
    }

    /// Options for a new track named `name`
    pub fn options(&self, name: Option<&str>, sort_field: SortField) -> TrackOptions {
        TrackOptions {
            id: None,
            name: name.map(str::to_string),
            sort_field,
            style: self.config.style,
            include_metadata: self.config.include_metadata,
            segment_field: self.config.segment_field.clone(),
        }
    }

    /// Create a track from `records`
    pub fn create_track<R: TrackRecord + Sync>(
        &self,
        name: Option<&str>,
        sort_field: SortField,
        records: &[R],
    ) -> Result<TrackEntity> {
        let (track, report) = TrackEntity::create(
            self.options(name, sort_field),
            TrackSource::records(records),
        )?;
        tracing::trace!(track = %track.id(), rejected = report.rejected.len(), "Built track");
        Ok(track)
    }

    /// Append `records` to an existing track
    pub fn add_to_track<R: TrackRecord + Sync>(
        &self,
        track: &mut TrackEntity,
        records: &[R],
    ) -> Result<AppendOutcome> {
        track.append(TrackSource::records(records))
    }

    /// Group `records` by `grouping_field` and turn each group into a track
    ///
    /// Groups that `resolver` knows are appended to the existing track; the others
    /// become new tracks named after the group value, built in parallel. Every record
    /// that ends up in a track gets the track id written to the configured id field.
    pub fn split_by_field<R, T>(
        &self,
        records: &mut [R],
        grouping_field: &str,
        sort_field: &SortField,
        resolver: &mut T,
    ) -> SplitOutcome
    where
        R: TrackRecord + Sync,
        T: TrackResolver + ?Sized,
    {
        profiling::scope!("builder::split_by_field");
        let mut outcome = SplitOutcome::default();
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, record) in records.iter().enumerate() {
            match record.get(grouping_field).map(FieldValue::to_string) {
                Some(value) if !value.is_empty() => groups.entry(value).or_default().push(index),
                _ => outcome.leftover.push(index),
            }
        }

        // (record indices, track id) pairs to tag once the records are writable again
        let mut tags: Vec<(Vec<usize>, String)> = Vec::new();
        let mut new_groups = Vec::new();
        {
            let shared: &[R] = records;
            let source = |indices: &[usize]| {
                TrackSource::Records(
                    indices
                        .iter()
                        .map(|&i| &shared[i] as RecordRef<'_>)
                        .collect(),
                )
            };

            for (name, indices) in groups {
                let Some(track) = resolver.resolve(&name) else {
                    new_groups.push((name, indices));
                    continue;
                };
                match track.append(source(indices.as_slice())) {
                    Ok(appended) => {
                        let added = appended.added.iter().map(|&i| indices[i]).collect();
                        tags.push((added, track.id().to_string()));
                        outcome.appended.push((track.id().to_string(), appended));
                    }
                    Err(err) => {
                        tracing::warn!(group = %name, "Could not append to track: {}", err);
                        outcome.failed.push((name, err));
                    }
                }
            }

            let built: Vec<_> = new_groups
                .par_iter()
                .map(|(name, indices)| {
                    TrackEntity::create(
                        self.options(Some(name), sort_field.clone()),
                        source(indices.as_slice()),
                    )
                })
                .collect();

            for ((name, indices), result) in new_groups.into_iter().zip(built) {
                match result {
                    Ok((track, report)) => {
                        let mut accepted = indices.clone();
                        accepted.retain(|&i| {
                            !report
                                .rejected
                                .iter()
                                .any(|r| indices.get(r.index) == Some(&i))
                        });
                        tags.push((accepted, track.id().to_string()));
                        outcome.created.push(track);
                    }
                    Err(err) => {
                        tracing::warn!(group = %name, "Could not create track: {}", err);
                        outcome.failed.push((name, err));
                    }
                }
            }
        }

        for (indices, id) in tags {
            for index in indices {
                records[index].set(&self.config.track_id_field, FieldValue::from(id.as_str()));
            }
        }

        tracing::debug!(
            created = outcome.created.len(),
            appended = outcome.appended.len(),
            failed = outcome.failed.len(),
            leftover = outcome.leftover.len(),
            "Split records into tracks"
        );
        outcome
    }
}
