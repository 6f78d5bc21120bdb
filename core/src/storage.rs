//! Structured-record persistence helpers.
//!
//! Every calibration artifact is stored as a plain key/value JSON document so
//! downstream tooling can read it without this crate.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::InputMissing(path.display().to_string()));
    }
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

pub(crate) fn mat3_to_rows(m: &nalgebra::Matrix3<f64>) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = m[(r, c)];
        }
    }
    out
}

pub(crate) fn rows_to_mat3(rows: &[[f64; 3]; 3]) -> nalgebra::Matrix3<f64> {
    let mut m = nalgebra::Matrix3::zeros();
    for (r, row) in rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            m[(r, c)] = *v;
        }
    }
    m
}

pub(crate) fn mat3x4_to_rows(m: &nalgebra::Matrix3x4<f64>) -> [[f64; 4]; 3] {
    let mut out = [[0.0; 4]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = m[(r, c)];
        }
    }
    out
}

pub(crate) fn rows_to_mat3x4(rows: &[[f64; 4]; 3]) -> nalgebra::Matrix3x4<f64> {
    let mut m = nalgebra::Matrix3x4::zeros();
    for (r, row) in rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            m[(r, c)] = *v;
        }
    }
    m
}

pub(crate) fn mat4_to_rows(m: &nalgebra::Matrix4<f64>) -> [[f64; 4]; 4] {
    let mut out = [[0.0; 4]; 4];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = m[(r, c)];
        }
    }
    out
}

pub(crate) fn rows_to_mat4(rows: &[[f64; 4]; 4]) -> nalgebra::Matrix4<f64> {
    let mut m = nalgebra::Matrix4::zeros();
    for (r, row) in rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            m[(r, c)] = *v;
        }
    }
    m
}
