//! Flat coordinate storage ordered by a trailing sort value
//!
//! A [`CoordinateBuffer`] packs every coordinate as `lon, lat, [alt], sort` into one
//! contiguous `Vec<f64>`. The trailing sort value (usually a timestamp) is kept
//! non-decreasing so lookups are plain binary searches over the stride groups.

use geo::Coord;
use std::ops::Range;

/// Number and meaning of the values stored per coordinate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Layout {
    /// `lon, lat, sort`
    #[default]
    Xym,
    /// `lon, lat, alt, sort`
    Xyzm,
}

impl Layout {
    /// Number of `f64` values per coordinate
    #[inline]
    pub const fn stride(self) -> usize {
        match self {
            Layout::Xym => 3,
            Layout::Xyzm => 4,
        }
    }

    #[inline]
    pub const fn has_altitude(self) -> bool {
        matches!(self, Layout::Xyzm)
    }

    pub fn from_stride(stride: usize) -> Option<Self> {
        match stride {
            3 => Some(Layout::Xym),
            4 => Some(Layout::Xyzm),
            _ => None,
        }
    }
}

/// A single decoded coordinate
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinate {
    /// Longitude in degrees
    pub lon: f64,
    /// Latitude in degrees
    pub lat: f64,
    /// Altitude in meters, if the source had one
    pub alt: Option<f64>,
    /// Value of the sort field (seconds since the epoch for temporal tracks)
    pub sort: f64,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64, sort: f64) -> Self {
        Self {
            lon,
            lat,
            alt: None,
            sort,
        }
    }

    pub fn with_altitude(lon: f64, lat: f64, alt: f64, sort: f64) -> Self {
        Self {
            lon,
            lat,
            alt: Some(alt),
            sort,
        }
    }

    /// Linear interpolation of every field towards `other`
    ///
    /// `scale` is 0.0 at `self` and 1.0 at `other`.
    #[inline]
    pub fn lerp(&self, other: &Coordinate, scale: f64) -> Coordinate {
        let mix = |a: f64, b: f64| a + (b - a) * scale;
        Coordinate {
            lon: mix(self.lon, other.lon),
            lat: mix(self.lat, other.lat),
            alt: match (self.alt, other.alt) {
                (Some(a), Some(b)) => Some(mix(a, b)),
                (alt, _) => alt,
            },
            sort: mix(self.sort, other.sort),
        }
    }

    /// Horizontal position as a `geo` coordinate (x = lon, y = lat)
    #[inline]
    pub fn position(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }

    /// Same position (lon, lat, alt), ignoring the sort value
    #[inline]
    pub fn same_position(&self, other: &Coordinate) -> bool {
        self.lon == other.lon && self.lat == other.lat && self.alt == other.alt
    }
}

/// Binary search over the trailing field of each stride group of `data`
///
/// Returns `Ok(index)` of an exact match or `Err(insertion_point)`, like
/// [`slice::binary_search`]. When several coordinates share the value, the first
/// one is reported.
pub fn binary_search_by_sort_value(data: &[f64], stride: usize, value: f64) -> Result<usize, usize> {
    let index = lower_bound(data, stride, value);
    match data.get(index * stride + stride - 1) {
        Some(&found) if found == value => Ok(index),
        _ => Err(index),
    }
}

/// Integer form of a search result: the index, or `-(insertion_point) - 1`
#[inline]
pub fn encode_search_result(result: Result<usize, usize>) -> isize {
    match result {
        Ok(index) => index as isize,
        Err(insertion) => -(insertion as isize) - 1,
    }
}

/// First coordinate index whose sort value is not below `value`
fn lower_bound(data: &[f64], stride: usize, value: f64) -> usize {
    let (mut lo, mut hi) = (0, data.len() / stride);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if data[mid * stride + stride - 1] < value {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// First coordinate index whose sort value is above `value`
fn upper_bound(data: &[f64], stride: usize, value: f64) -> usize {
    let (mut lo, mut hi) = (0, data.len() / stride);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if data[mid * stride + stride - 1] <= value {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Strided coordinate sequence, non-decreasing in sort value
///
/// Mutation is limited to [`insert`](Self::insert) and [`retain_range`](Self::retain_range)
/// so the ordering invariant can't be broken from outside.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateBuffer {
    layout: Layout,
    data: Vec<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl CoordinateBuffer {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(layout: Layout, coordinates: usize) -> Self {
        Self {
            layout,
            data: Vec::with_capacity(coordinates * layout.stride()),
        }
    }

    /// Build from coordinates that are already ordered by sort value
    pub fn from_sorted<I>(layout: Layout, coordinates: I) -> Self
    where
        I: IntoIterator<Item = Coordinate>,
    {
        let mut buffer = Self::new(layout);
        for coordinate in coordinates {
            buffer.push(coordinate);
        }
        buffer
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.layout.stride()
    }

    /// Number of coordinates (not `f64` values)
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.stride()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw flat values, `len() * stride()` long
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, index: usize) -> Option<Coordinate> {
        let stride = self.stride();
        let start = index.checked_mul(stride)?;
        self.data
            .get(start..start.checked_add(stride)?)
            .map(|chunk| self.decode(chunk))
    }

    #[inline]
    pub fn sort_value(&self, index: usize) -> Option<f64> {
        let stride = self.stride();
        let offset = index.checked_mul(stride)?.checked_add(stride - 1)?;
        self.data.get(offset).copied()
    }

    pub fn first(&self) -> Option<Coordinate> {
        self.get(0)
    }

    pub fn last(&self) -> Option<Coordinate> {
        self.len().checked_sub(1).and_then(|index| self.get(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = Coordinate> + '_ {
        self.data
            .chunks_exact(self.stride())
            .map(|chunk| self.decode(chunk))
    }

    pub fn to_vec(&self) -> Vec<Coordinate> {
        self.iter().collect()
    }

    /// See [`binary_search_by_sort_value`]
    #[inline]
    pub fn binary_search(&self, value: f64) -> Result<usize, usize> {
        binary_search_by_sort_value(&self.data, self.stride(), value)
    }

    /// First index whose sort value is `>= value`
    #[inline]
    pub fn lower_bound(&self, value: f64) -> usize {
        lower_bound(&self.data, self.stride(), value)
    }

    /// First index whose sort value is `> value`
    #[inline]
    pub fn upper_bound(&self, value: f64) -> usize {
        upper_bound(&self.data, self.stride(), value)
    }

    /// Insert a coordinate at its sorted position
    ///
    /// Returns the index it landed at, or `None` when a coordinate with the same
    /// sort value already exists (or the sort value is NaN) and nothing was inserted.
    pub fn insert(&mut self, coordinate: Coordinate) -> Option<usize> {
        if coordinate.sort.is_nan() {
            return None;
        }

        let index = self.binary_search(coordinate.sort).err()?;
        let stride = self.stride();
        let encoded = self.encode(&coordinate);
        let at = index * stride;
        self.data.splice(at..at, encoded[..stride].iter().copied());
        Some(index)
    }

    /// Copy of the coordinates in `range` (coordinate indices)
    pub fn slice(&self, range: Range<usize>) -> CoordinateBuffer {
        let stride = self.stride();
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        CoordinateBuffer {
            layout: self.layout,
            data: self.data[start * stride..end * stride].to_vec(),
        }
    }

    /// Coordinates whose sort value lies in `[start, end]`
    pub fn slice_by_sort_value(&self, start: f64, end: f64) -> CoordinateBuffer {
        self.slice(self.sort_range(start, end))
    }

    /// Index range covering the sort values in `[start, end]`
    ///
    /// The start resolves to the insertion point when it is not an exact match, the
    /// end to the index just past the last coordinate not above `end`.
    pub fn sort_range(&self, start: f64, end: f64) -> Range<usize> {
        let first = self.lower_bound(start);
        let last = self.upper_bound(end).max(first);
        first..last
    }

    /// Keep only the coordinates in `range`, returning whether anything was removed
    pub fn retain_range(&mut self, range: Range<usize>) -> bool {
        let len = self.len();
        let end = range.end.min(len);
        let start = range.start.min(end);
        if start == 0 && end == len {
            return false;
        }

        let stride = self.stride();
        self.data.truncate(end * stride);
        self.data.drain(..start * stride);
        true
    }

    /// Append a coordinate that sorts at or after the current last one
    pub(crate) fn push(&mut self, coordinate: Coordinate) {
        debug_assert!(
            self.last().is_none_or(|last| last.sort <= coordinate.sort),
            "coordinates must be pushed in sort order"
        );
        let stride = self.stride();
        let encoded = self.encode(&coordinate);
        self.data.extend_from_slice(&encoded[..stride]);
    }

    /// Append a copy of `other[range]`, which must share this layout
    pub(crate) fn extend_from(&mut self, other: &CoordinateBuffer, range: Range<usize>) {
        debug_assert_eq!(self.layout, other.layout);
        let stride = self.stride();
        self.data
            .extend_from_slice(&other.data[range.start * stride..range.end * stride]);
    }

    /// Rewrite longitudes into [-180, 180]
    pub(crate) fn normalize_longitudes(&mut self) {
        let stride = self.stride();
        for chunk in self.data.chunks_exact_mut(stride) {
            chunk[0] = normalize_longitude(chunk[0]);
        }
    }

    #[inline]
    fn encode(&self, coordinate: &Coordinate) -> [f64; 4] {
        match self.layout {
            Layout::Xym => [coordinate.lon, coordinate.lat, coordinate.sort, 0.0],
            Layout::Xyzm => [
                coordinate.lon,
                coordinate.lat,
                coordinate.alt.unwrap_or(0.0),
                coordinate.sort,
            ],
        }
    }

    #[inline]
    fn decode(&self, chunk: &[f64]) -> Coordinate {
        match self.layout {
            Layout::Xym => Coordinate::new(chunk[0], chunk[1], chunk[2]),
            Layout::Xyzm => Coordinate::with_altitude(chunk[0], chunk[1], chunk[2], chunk[3]),
        }
    }
}

/// Wrap a longitude into [-180, 180]
pub(crate) fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    // 540 wraps to -180; keep the sign of the input for the exact boundary
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}
