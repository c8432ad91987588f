//! FITS codec for sky maps.
//!
//! Stores one or more co-indexed maps in a single binary-table extension,
//! one `f64` column per map, with `PIXTYPE`/`ORDERING`/`NSIDE` header keys so
//! files are self-describing. Reads address a map by its 1-based channel
//! (column) number, mirroring how multi-map files are addressed by the
//! classic HEALPix tooling.

use fitsio::hdu::HduInfo;
use fitsio::tables::{ColumnDataType, ColumnDescription};
use fitsio::FitsFile;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pixelmap::{GeometryMismatch, PixelMap};

/// Extension name of the map table.
const MAP_EXTENSION: &str = "MAPS";

/// Errors that can occur during map file operations.
#[derive(Error, Debug)]
pub enum MapIoError {
    #[error("FITS I/O error: {0}")]
    Fits(#[from] fitsio::errors::Error),
    #[error("{path}: expected a binary-table map extension")]
    NotATable { path: PathBuf },
    #[error("{path}: no channel {channel} (file has {available})")]
    ChannelOutOfRange {
        path: PathBuf,
        channel: usize,
        available: usize,
    },
    #[error("{path}: {source}")]
    Geometry {
        path: PathBuf,
        source: GeometryMismatch,
    },
    #[error("writing a map file requires at least one map")]
    NoChannels,
    #[error("maps written to one file must share the same n_side")]
    MixedGeometry,
}

/// Write named maps as co-indexed columns of a single binary-table HDU.
///
/// With `overwrite` set an existing file is replaced; otherwise writing onto
/// an existing path fails.
pub fn write_maps<P: AsRef<Path>>(
    path: P,
    overwrite: bool,
    maps: &[(&str, &PixelMap)],
) -> Result<(), MapIoError> {
    let (_, first) = maps.first().ok_or(MapIoError::NoChannels)?;
    if maps.iter().any(|(_, map)| !map.same_geometry(first)) {
        return Err(MapIoError::MixedGeometry);
    }

    let mut fptr = if overwrite {
        FitsFile::create(&path).overwrite().open()?
    } else {
        FitsFile::create(&path).open()?
    };

    let descriptions = maps
        .iter()
        .map(|(name, _)| {
            ColumnDescription::new(*name)
                .with_type(ColumnDataType::Double)
                .create()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut hdu = fptr.create_table(MAP_EXTENSION.to_string(), &descriptions)?;
    for (name, map) in maps {
        hdu = hdu.write_col(&mut fptr, *name, map.as_slice())?;
    }

    hdu.write_key(&mut fptr, "PIXTYPE", "HEALPIX".to_string())?;
    hdu.write_key(&mut fptr, "ORDERING", "NESTED".to_string())?;
    hdu.write_key(&mut fptr, "NSIDE", first.n_side() as i64)?;

    Ok(())
}

/// Read one map from a multi-channel file by its 1-based channel number.
pub fn read_map<P: AsRef<Path>>(path: P, channel: usize) -> Result<PixelMap, MapIoError> {
    let path = path.as_ref();
    let mut fptr = FitsFile::open(path)?;
    let hdu = fptr.hdu(1)?;

    let column_names: Vec<String> = match &hdu.info {
        HduInfo::TableInfo {
            column_descriptions,
            ..
        } => column_descriptions.iter().map(|c| c.name.clone()).collect(),
        _ => {
            return Err(MapIoError::NotATable {
                path: path.to_owned(),
            })
        }
    };

    if channel == 0 || channel > column_names.len() {
        return Err(MapIoError::ChannelOutOfRange {
            path: path.to_owned(),
            channel,
            available: column_names.len(),
        });
    }

    let values: Vec<f64> = hdu.read_col(&mut fptr, &column_names[channel - 1])?;
    let n_side = hdu.read_key::<i64>(&mut fptr, "NSIDE")? as u32;

    PixelMap::from_values(n_side, values).map_err(|source| MapIoError::Geometry {
        path: path.to_owned(),
        source,
    })
}
