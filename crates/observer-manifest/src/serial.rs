//! Serial interface settings of a node profile.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::entry::relative_file;
use crate::error::ManifestError;
use crate::node::{Node, Scalar};

/// Serial port configuration, with the frame decoder module resolved to an
/// absolute path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerialSettings {
    pub port: String,
    pub baudrate: u32,
    pub parity: String,
    pub stopbits: f64,
    pub bytesize: u8,
    pub rtscts: bool,
    pub xonxoff: bool,
    /// Read timeout in seconds; `None` blocks
    pub timeout: Option<f64>,
    /// Module decoding the frames read on the port
    pub module: PathBuf,
}

impl SerialSettings {
    /// Decode the `serial` section. `module` is joined onto `module_dir`.
    pub fn from_node(serial: &Node, module_dir: &Path) -> Result<Self, ManifestError> {
        let module = text(serial, "module")?;
        let module_path = relative_file(&module).ok_or_else(|| {
            ManifestError::invalid_field(
                "serial/module",
                "a module file name relative to the serial directory",
            )
        })?;

        Ok(Self {
            port: text(serial, "port")?,
            baudrate: integer(serial, "baudrate")?,
            parity: text(serial, "parity")?,
            stopbits: number(serial, "stopbits")?
                .ok_or_else(|| ManifestError::invalid_field("serial/stopbits", "a number"))?,
            bytesize: integer(serial, "bytesize")?,
            rtscts: flag(serial, "rtscts")?,
            xonxoff: flag(serial, "xonxoff")?,
            timeout: number(serial, "timeout")?,
            module: module_dir.join(module_path),
        })
    }
}

fn field<'a>(serial: &'a Node, key: &str) -> Result<&'a Scalar, ManifestError> {
    serial
        .get(key)
        .ok_or_else(|| ManifestError::MissingField {
            segment: key.to_string(),
            path: format!("serial/{}", key),
        })?
        .as_scalar()
        .ok_or_else(|| ManifestError::invalid_field(format!("serial/{}", key), "a scalar"))
}

fn text(serial: &Node, key: &str) -> Result<String, ManifestError> {
    field(serial, key)?
        .render()
        .ok_or_else(|| ManifestError::invalid_field(format!("serial/{}", key), "a string"))
}

fn integer<T: TryFrom<i64>>(serial: &Node, key: &str) -> Result<T, ManifestError> {
    let invalid = || ManifestError::invalid_field(format!("serial/{}", key), "an unsigned integer");
    let value = match field(serial, key)? {
        Scalar::Int(i) => *i,
        Scalar::String(s) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    T::try_from(value).map_err(|_| invalid())
}

/// A number, or `None` for null.
fn number(serial: &Node, key: &str) -> Result<Option<f64>, ManifestError> {
    let invalid = || ManifestError::invalid_field(format!("serial/{}", key), "a number");
    match field(serial, key)? {
        Scalar::Null => Ok(None),
        Scalar::Int(i) => Ok(Some(*i as f64)),
        Scalar::Float(f) => Ok(Some(*f)),
        Scalar::String(s) => s.trim().parse::<f64>().map(Some).map_err(|_| invalid()),
        Scalar::Bool(_) => Err(invalid()),
    }
}

fn flag(serial: &Node, key: &str) -> Result<bool, ManifestError> {
    match field(serial, key)? {
        Scalar::Bool(b) => Ok(*b),
        Scalar::Int(0) => Ok(false),
        Scalar::Int(1) => Ok(true),
        _ => Err(ManifestError::invalid_field(
            format!("serial/{}", key),
            "a boolean",
        )),
    }
}
