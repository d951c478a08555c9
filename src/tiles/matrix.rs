//! Tile matrix sets
//!
//! Two grids are supported: `WebMercatorQuad` (EPSG:3857, one tile at zoom
//! 0) and `WorldCRS84Quad` (EPSG:4326, two tiles side by side at zoom 0).

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deepest zoom level served
pub const MAX_ZOOM: u8 = 24;

/// Half the side of the Web Mercator square, in metres
const MERCATOR_HALF_EXTENT: f64 = 20_037_508.342_789_244;

/// Latitude at which Web Mercator becomes a square
const MERCATOR_MAX_LATITUDE: f64 = 85.051_128_779_806_6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileGridError {
    #[error("unknown tile matrix set '{0}'")]
    UnknownMatrixSet(String),

    #[error("zoom {zoom} is above the maximum of {max}")]
    ZoomOutOfRange { zoom: u32, max: u8 },

    #[error("tile {z}/{x}/{y} is outside the {matrix_set} grid")]
    OutOfRange {
        matrix_set: TileMatrixSet,
        z: u8,
        x: u32,
        y: u32,
    },

    #[error("malformed tile coordinate '{0}'")]
    Malformed(String),
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl Bounds {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self {
            minx,
            miny,
            maxx,
            maxy,
        }
    }

    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.minx, self.miny, self.maxx, self.maxy]
    }

    /// Clamps every corner into `limits`
    pub fn clip(&self, limits: &Bounds) -> Bounds {
        Bounds {
            minx: self.minx.clamp(limits.minx, limits.maxx),
            miny: self.miny.clamp(limits.miny, limits.maxy),
            maxx: self.maxx.clamp(limits.minx, limits.maxx),
            maxy: self.maxy.clamp(limits.miny, limits.maxy),
        }
    }
}

/// Zoom / column / row address of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Parses path segments; the row may carry a format extension
    /// (`12.pbf`, `12.mvt`)
    pub fn parse(z: &str, x: &str, y: &str) -> Result<Self, TileGridError> {
        let malformed = || TileGridError::Malformed(format!("{}/{}/{}", z, x, y));
        let row = y.split_once('.').map_or(y, |(row, _)| row);

        let zoom: u32 = z.parse().map_err(|_| malformed())?;
        if zoom > u32::from(MAX_ZOOM) {
            return Err(TileGridError::ZoomOutOfRange {
                zoom,
                max: MAX_ZOOM,
            });
        }

        Ok(Self {
            z: zoom as u8,
            x: x.parse().map_err(|_| malformed())?,
            y: row.parse().map_err(|_| malformed())?,
        })
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Supported tiling schemes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileMatrixSet {
    #[default]
    WebMercatorQuad,
    #[serde(rename = "WorldCRS84Quad")]
    WorldCrs84Quad,
}

impl TileMatrixSet {
    pub fn id(&self) -> &'static str {
        match self {
            TileMatrixSet::WebMercatorQuad => "WebMercatorQuad",
            TileMatrixSet::WorldCrs84Quad => "WorldCRS84Quad",
        }
    }

    /// Native reference system of the grid
    pub fn srid(&self) -> i32 {
        match self {
            TileMatrixSet::WebMercatorQuad => 3857,
            TileMatrixSet::WorldCrs84Quad => 4326,
        }
    }

    /// Columns and rows at a zoom level
    pub fn matrix_size(&self, zoom: u8) -> (u64, u64) {
        let n = 1u64 << zoom;
        match self {
            TileMatrixSet::WebMercatorQuad => (n, n),
            TileMatrixSet::WorldCrs84Quad => (n * 2, n),
        }
    }

    /// Geographic area the grid covers
    pub fn valid_bounds(&self) -> Bounds {
        match self {
            TileMatrixSet::WebMercatorQuad => Bounds::new(
                -180.0,
                -MERCATOR_MAX_LATITUDE,
                180.0,
                MERCATOR_MAX_LATITUDE,
            ),
            TileMatrixSet::WorldCrs84Quad => Bounds::new(-180.0, -90.0, 180.0, 90.0),
        }
    }

    pub fn validate(&self, coord: TileCoord) -> Result<(), TileGridError> {
        if coord.z > MAX_ZOOM {
            return Err(TileGridError::ZoomOutOfRange {
                zoom: u32::from(coord.z),
                max: MAX_ZOOM,
            });
        }
        let (columns, rows) = self.matrix_size(coord.z);
        if u64::from(coord.x) >= columns || u64::from(coord.y) >= rows {
            return Err(TileGridError::OutOfRange {
                matrix_set: *self,
                z: coord.z,
                x: coord.x,
                y: coord.y,
            });
        }
        Ok(())
    }

    /// Tile envelope in longitude / latitude
    pub fn geographic_bounds(&self, coord: TileCoord) -> Bounds {
        match self {
            TileMatrixSet::WebMercatorQuad => {
                let n = (1u64 << coord.z) as f64;
                let lng = |x: f64| x / n * 360.0 - 180.0;
                let lat = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
                Bounds::new(
                    lng(f64::from(coord.x)),
                    lat(f64::from(coord.y) + 1.0),
                    lng(f64::from(coord.x) + 1.0),
                    lat(f64::from(coord.y)),
                )
            }
            TileMatrixSet::WorldCrs84Quad => self.native_bounds(coord),
        }
    }

    /// Tile envelope in the grid's own reference system
    pub fn native_bounds(&self, coord: TileCoord) -> Bounds {
        let n = (1u64 << coord.z) as f64;
        let (origin_x, origin_y, size) = match self {
            TileMatrixSet::WebMercatorQuad => (
                -MERCATOR_HALF_EXTENT,
                MERCATOR_HALF_EXTENT,
                2.0 * MERCATOR_HALF_EXTENT / n,
            ),
            TileMatrixSet::WorldCrs84Quad => (-180.0, 90.0, 180.0 / n),
        };

        let minx = origin_x + f64::from(coord.x) * size;
        let maxy = origin_y - f64::from(coord.y) * size;
        Bounds::new(minx, maxy - size, minx + size, maxy)
    }
}

impl fmt::Display for TileMatrixSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for TileMatrixSet {
    type Err = TileGridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webmercatorquad" => Ok(TileMatrixSet::WebMercatorQuad),
            "worldcrs84quad" => Ok(TileMatrixSet::WorldCrs84Quad),
            _ => Err(TileGridError::UnknownMatrixSet(s.to_string())),
        }
    }
}

/// A validated tile of a matrix set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Tile {
    pub matrix_set: TileMatrixSet,
    pub coord: TileCoord,
}

impl Tile {
    pub fn new(matrix_set: TileMatrixSet, coord: TileCoord) -> Result<Self, TileGridError> {
        matrix_set.validate(coord)?;
        Ok(Self { matrix_set, coord })
    }

    pub fn zoom(&self) -> u8 {
        self.coord.z
    }

    /// Geographic envelope clipped to the matrix set's valid area
    pub fn envelope(&self) -> Bounds {
        self.matrix_set
            .geographic_bounds(self.coord)
            .clip(&self.matrix_set.valid_bounds())
    }

    /// Envelope in the matrix set's reference system, used for encoding
    pub fn native_bounds(&self) -> Bounds {
        self.matrix_set.native_bounds(self.coord)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.matrix_set, self.coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_mercator_root_tile() {
        let tile = Tile::new(TileMatrixSet::WebMercatorQuad, TileCoord::new(0, 0, 0)).unwrap();

        let native = tile.native_bounds();
        assert!(close(native.minx, -MERCATOR_HALF_EXTENT));
        assert!(close(native.maxy, MERCATOR_HALF_EXTENT));

        let envelope = tile.envelope();
        assert!(close(envelope.minx, -180.0));
        assert!(close(envelope.maxx, 180.0));
        assert!(close(envelope.maxy, MERCATOR_MAX_LATITUDE));
        assert!(close(envelope.miny, -MERCATOR_MAX_LATITUDE));
    }

    #[test]
    fn test_mercator_quadrant() {
        let bounds = TileMatrixSet::WebMercatorQuad.geographic_bounds(TileCoord::new(1, 1, 0));
        assert!(close(bounds.minx, 0.0));
        assert!(close(bounds.maxx, 180.0));
        assert!(close(bounds.miny, 0.0));
    }

    #[test]
    fn test_crs84_has_two_root_tiles() {
        let tms = TileMatrixSet::WorldCrs84Quad;
        assert_eq!(tms.matrix_size(0), (2, 1));

        let west = tms.geographic_bounds(TileCoord::new(0, 0, 0));
        assert_eq!(west.to_array(), [-180.0, -90.0, 0.0, 90.0]);
        assert!(tms.validate(TileCoord::new(0, 1, 0)).is_ok());
        assert!(tms.validate(TileCoord::new(0, 2, 0)).is_err());
    }

    #[test]
    fn test_out_of_range_tile_rejected() {
        let err = Tile::new(TileMatrixSet::WebMercatorQuad, TileCoord::new(1, 0, 2)).unwrap_err();
        assert!(matches!(err, TileGridError::OutOfRange { z: 1, y: 2, .. }));
    }

    #[test]
    fn test_parse_coordinates() {
        assert_eq!(TileCoord::parse("5", "10", "12.pbf").unwrap(), TileCoord::new(5, 10, 12));
        assert_eq!(TileCoord::parse("5", "10", "12").unwrap(), TileCoord::new(5, 10, 12));
        assert!(matches!(
            TileCoord::parse("30", "0", "0"),
            Err(TileGridError::ZoomOutOfRange { zoom: 30, .. })
        ));
        assert!(matches!(
            TileCoord::parse("a", "0", "0"),
            Err(TileGridError::Malformed(_))
        ));
    }

    #[test]
    fn test_matrix_set_names() {
        assert_eq!(
            "worldcrs84quad".parse::<TileMatrixSet>().unwrap(),
            TileMatrixSet::WorldCrs84Quad
        );
        assert_eq!(TileMatrixSet::WorldCrs84Quad.to_string(), "WorldCRS84Quad");
        assert!("LINZAntarticaMapTilegrid".parse::<TileMatrixSet>().is_err());
    }
}
