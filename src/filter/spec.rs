//! Request-scoped filter criteria

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use super::errors::{FilterError, FilterResult};
use super::expr::FilterNode;
use crate::tiles::Tile;

/// Everything a tile request may filter on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    /// Feature ids, compared against the id column
    pub ids: Option<Vec<String>>,
    pub datetime: Option<DatetimeRange>,
    /// Exposed name of the datetime column to filter; defaults to the
    /// layer's first timestamp column
    pub datetime_column: Option<String>,
    /// `[minx, miny, maxx, maxy]` in EPSG:4326
    pub bbox: Option<[f64; 4]>,
    /// Exposed name / value equality pairs
    pub properties: Vec<(String, Value)>,
    /// CQL2-JSON predicate tree
    pub expression: Option<FilterNode>,
    pub tile: Option<Tile>,
    pub shard_key: Option<i64>,
}

impl FilterSpec {
    pub fn for_tile(tile: Tile) -> Self {
        Self {
            tile: Some(tile),
            ..Self::default()
        }
    }

    pub fn with_tile(mut self, tile: Tile) -> Self {
        self.tile = Some(tile);
        self
    }

    pub fn with_shard_key(mut self, key: i64) -> Self {
        self.shard_key = Some(key);
        self
    }
}

/// Instant or interval, as in `2020-01-01T00:00:00Z/..`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatetimeRange {
    Instant(DateTime<Utc>),
    /// Inclusive bounds; `None` is an open end
    Interval {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

impl DatetimeRange {
    pub fn parse(input: &str) -> FilterResult<Self> {
        let invalid = || FilterError::InvalidDatetime(input.to_string());

        let Some((start, end)) = input.split_once('/') else {
            return Ok(DatetimeRange::Instant(parse_instant(input).ok_or_else(invalid)?));
        };

        let bound = |part: &str| -> FilterResult<Option<DateTime<Utc>>> {
            match part.trim() {
                "" | ".." => Ok(None),
                value => parse_instant(value).map(Some).ok_or_else(invalid),
            }
        };

        let (start, end) = (bound(start)?, bound(end)?);
        if start.is_none() && end.is_none() {
            return Err(invalid());
        }
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(invalid());
            }
        }
        Ok(DatetimeRange::Interval { start, end })
    }
}

/// RFC 3339 timestamp or a bare date (midnight UTC)
fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parses `minx,miny,maxx,maxy`
pub fn parse_bbox(input: &str) -> FilterResult<[f64; 4]> {
    let invalid = || FilterError::InvalidBbox(input.to_string());

    let values = input
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    let bbox: [f64; 4] = values.try_into().map_err(|_| invalid())?;
    if bbox[0] > bbox[2] || bbox[1] > bbox[3] {
        return Err(invalid());
    }
    Ok(bbox)
}
