//! GeoTIFF keys: the id registry and the packed GeoKeyDirectory layout.

use std::collections::HashMap;

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::error::{AsyncCogError, AsyncCogResult};
use crate::tags::TagId;

/// The code meaning "user defined" (effectively: no EPSG code).
pub const USER_DEFINED: u16 = 32767;

/// GeoKey ids carried inside the GeoKeyDirectory tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum GeoKey {
    GTModelType = 1024,
    GTRasterType = 1025,
    GTCitation = 1026,
    GeographicType = 2048,
    GeogCitation = 2049,
    GeogGeodeticDatum = 2050,
    GeogPrimeMeridian = 2051,
    GeogLinearUnits = 2052,
    GeogLinearUnitSize = 2053,
    GeogAngularUnits = 2054,
    GeogAngularUnitSize = 2055,
    GeogEllipsoid = 2056,
    GeogSemiMajorAxis = 2057,
    GeogSemiMinorAxis = 2058,
    GeogInvFlattening = 2059,
    GeogAzimuthUnits = 2060,
    GeogPrimeMeridianLong = 2061,
    ProjectedCSType = 3072,
    PCSCitation = 3073,
    Projection = 3074,
    ProjCoordTrans = 3075,
    ProjLinearUnits = 3076,
    ProjLinearUnitSize = 3077,
    ProjStdParallel1 = 3078,
    ProjStdParallel2 = 3079,
    ProjNatOriginLong = 3080,
    ProjNatOriginLat = 3081,
    ProjFalseEasting = 3082,
    ProjFalseNorthing = 3083,
    ProjFalseOriginLong = 3084,
    ProjFalseOriginLat = 3085,
    ProjFalseOriginEasting = 3086,
    ProjFalseOriginNorthing = 3087,
    ProjCenterLong = 3088,
    ProjCenterLat = 3089,
    ProjCenterEasting = 3090,
    ProjCenterNorthing = 3091,
    ProjScaleAtNatOrigin = 3092,
    ProjScaleAtCenter = 3093,
    ProjAzimuthAngle = 3094,
    ProjStraightVertPoleLong = 3095,
    VerticalCSType = 4096,
    VerticalCitation = 4097,
    VerticalDatum = 4098,
    VerticalUnits = 4099,
    /// A private or unrecognized geo key.
    #[num_enum(catch_all)]
    Unknown(u16),
}

/// A single unpacked geo key value.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoValue {
    Short(u16),
    Double(f64),
    Doubles(Vec<f64>),
    Ascii(String),
}

impl GeoValue {
    pub fn as_u16(&self) -> Option<u16> {
        match *self {
            GeoValue::Short(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            GeoValue::Short(v) => Some(v as f64),
            GeoValue::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GeoValue::Ascii(s) => Some(s),
            _ => None,
        }
    }
}

/// Unpack a GeoKeyDirectory: the 4-short header
/// `{version, revision, minor, number_of_keys}` followed by one
/// `{key, tag_location, count, value_or_offset}` record per key.
pub(crate) fn unpack_geo_keys(
    directory: &[u16],
    ascii_params: Option<&str>,
    double_params: Option<&[f64]>,
) -> AsyncCogResult<HashMap<GeoKey, GeoValue>> {
    if directory.len() < 4 {
        return Err(AsyncCogError::GeoKeyMalformed(
            "directory is shorter than its header".into(),
        ));
    }
    let version = directory[0];
    if version != 1 {
        return Err(AsyncCogError::GeoKeyMalformed(format!(
            "unsupported key directory version {version}"
        )));
    }
    let number_of_keys = directory[3] as usize;

    let mut keys = HashMap::with_capacity(number_of_keys);
    for i in 0..number_of_keys {
        let record = directory.get(4 * (i + 1)..4 * (i + 2)).ok_or_else(|| {
            AsyncCogError::GeoKeyMalformed(format!("record {i} extends past the directory"))
        })?;
        let key = GeoKey::from(record[0]);
        let location = record[1];
        let count = record[2] as usize;
        let value_offset = record[3];

        let value = if location == 0 {
            // the offset field is the value itself
            GeoValue::Short(value_offset)
        } else {
            match TagId::from(location) {
                TagId::GeoAsciiParams => {
                    let ascii = ascii_params.ok_or_else(|| {
                        AsyncCogError::GeoKeyMalformed(format!(
                            "key {key:?} references GeoAsciiParams, which is absent"
                        ))
                    })?;
                    GeoValue::Ascii(slice_ascii(ascii, value_offset as usize, count)?)
                }
                TagId::GeoDoubleParams => {
                    let doubles = double_params.ok_or_else(|| {
                        AsyncCogError::GeoKeyMalformed(format!(
                            "key {key:?} references GeoDoubleParams, which is absent"
                        ))
                    })?;
                    let offset = value_offset as usize;
                    let slice = doubles.get(offset..offset + count).ok_or_else(|| {
                        AsyncCogError::GeoKeyMalformed(format!(
                            "key {key:?} slices past GeoDoubleParams"
                        ))
                    })?;
                    if count == 1 {
                        GeoValue::Double(slice[0])
                    } else {
                        GeoValue::Doubles(slice.to_vec())
                    }
                }
                _ => {
                    return Err(AsyncCogError::GeoKeyMalformed(format!(
                        "key {key:?} references unsupported tag {location}"
                    )))
                }
            }
        };
        keys.insert(key, value);
    }
    Ok(keys)
}

/// ASCII geo values are `|`-terminated slices into GeoAsciiParams; the
/// final `|` is excluded by taking `count - 1` characters, and anything
/// after an interior `|` belongs to the next value.
fn slice_ascii(ascii: &str, offset: usize, count: usize) -> AsyncCogResult<String> {
    if count == 0 {
        return Ok(String::new());
    }
    let end = offset + count - 1;
    let slice = ascii.get(offset..end).ok_or_else(|| {
        AsyncCogError::GeoKeyMalformed(format!(
            "ascii slice {offset}..{end} is outside GeoAsciiParams"
        ))
    })?;
    let slice = slice.split('|').next().unwrap_or(slice);
    Ok(slice.trim_end_matches('\0').trim().to_string())
}
