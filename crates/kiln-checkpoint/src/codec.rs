//! Binary encode/decode for the checkpoint format.
//!
//! All integers are little-endian. Strings are length-prefixed with a
//! `u32` length. Optional fields use a presence byte (0 = absent,
//! 1 = present). Value blocks dispatch on a shape tag through a
//! [`CodecTable`].

use std::borrow::Cow;
use std::io::{Read, Write};
use std::sync::OnceLock;

use kiln_core::{Declarer, PointData, Points, PropertyId, ValueKind};
use kiln_storage::PropertyValues;

use crate::error::CheckpointError;
use crate::types::{CheckpointManifest, RecordManifest};
use crate::{FORMAT_VERSION, MAGIC};

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), CheckpointError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), CheckpointError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian u64.
pub fn write_u64_le(w: &mut dyn Write, v: u64) -> Result<(), CheckpointError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian f64.
pub fn write_f64_le(w: &mut dyn Write, v: f64) -> Result<(), CheckpointError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a `usize` count as a u32, rejecting counts that do not fit.
pub fn write_len(w: &mut dyn Write, n: usize) -> Result<(), CheckpointError> {
    let n = u32::try_from(n).map_err(|_| CheckpointError::Malformed {
        detail: format!("count {n} does not fit in u32"),
    })?;
    write_u32_le(w, n)
}

/// Write a length-prefixed UTF-8 string (u32 length + bytes).
pub fn write_length_prefixed_str(w: &mut dyn Write, s: &str) -> Result<(), CheckpointError> {
    write_len(w, s.len())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, CheckpointError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, CheckpointError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian u64.
pub fn read_u64_le(r: &mut dyn Read) -> Result<u64, CheckpointError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a little-endian f64.
pub fn read_f64_le(r: &mut dyn Read) -> Result<f64, CheckpointError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// Read a u32 count as `usize`.
pub fn read_len(r: &mut dyn Read) -> Result<usize, CheckpointError> {
    Ok(read_u32_le(r)? as usize)
}

/// Read a length-prefixed UTF-8 string.
pub fn read_length_prefixed_str(r: &mut dyn Read) -> Result<String, CheckpointError> {
    let len = read_len(r)?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| CheckpointError::Malformed {
        detail: format!("invalid UTF-8 string: {e}"),
    })
}

fn read_presence(r: &mut dyn Read, what: &str) -> Result<bool, CheckpointError> {
    match read_u8(r)? {
        0 => Ok(false),
        1 => Ok(true),
        v => Err(CheckpointError::Malformed {
            detail: format!("invalid presence flag {v} for {what}"),
        }),
    }
}

fn read_f64s(r: &mut dyn Read, n: usize) -> Result<Vec<f64>, CheckpointError> {
    (0..n).map(|_| read_f64_le(r)).collect()
}

// ── Header and manifest ─────────────────────────────────────────

/// Encode magic, version and the declarations section.
pub fn encode_manifest(w: &mut dyn Write, manifest: &CheckpointManifest) -> Result<(), CheckpointError> {
    w.write_all(&MAGIC)?;
    write_u8(w, FORMAT_VERSION)?;
    write_u32_le(w, manifest.num_states)?;

    write_len(w, manifest.names.len())?;
    for name in &manifest.names {
        write_length_prefixed_str(w, name)?;
    }

    write_len(w, manifest.stateful.len())?;
    for &id in &manifest.stateful {
        write_u32_le(w, id)?;
    }

    write_len(w, manifest.records.len())?;
    for record in &manifest.records {
        let Some(record) = record else {
            write_u8(w, 0)?;
            continue;
        };
        write_u8(w, 1)?;
        match &record.declarer {
            Some(d) => {
                write_u8(w, 1)?;
                write_length_prefixed_str(w, &d.kind)?;
                write_length_prefixed_str(w, &d.name)?;
            }
            None => write_u8(w, 0)?,
        }
        write_length_prefixed_str(w, &record.value_type)?;
        write_u8(w, record.max_state)?;
    }
    Ok(())
}

/// Decode and validate magic, version and the declarations section.
pub fn decode_manifest(r: &mut dyn Read) -> Result<CheckpointManifest, CheckpointError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(CheckpointError::InvalidMagic);
    }
    let version = read_u8(r)?;
    if version != FORMAT_VERSION {
        return Err(CheckpointError::UnsupportedVersion { found: version });
    }
    let num_states = read_u32_le(r)?;

    let n_names = read_len(r)?;
    let names = (0..n_names)
        .map(|_| read_length_prefixed_str(r))
        .collect::<Result<Vec<_>, _>>()?;

    let n_stateful = read_len(r)?;
    let stateful = (0..n_stateful)
        .map(|_| read_u32_le(r))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(&bad) = stateful.iter().find(|&&id| id as usize >= names.len()) {
        return Err(CheckpointError::Malformed {
            detail: format!("stateful property id {bad} has no name"),
        });
    }

    let n_records = read_len(r)?;
    let mut records = Vec::with_capacity(n_records.min(names.len()));
    for _ in 0..n_records {
        if !read_presence(r, "property record")? {
            records.push(None);
            continue;
        }
        let declarer = if read_presence(r, "declarer")? {
            let kind = read_length_prefixed_str(r)?;
            let name = read_length_prefixed_str(r)?;
            Some(Declarer { kind, name })
        } else {
            None
        };
        let value_type = read_length_prefixed_str(r)?;
        let max_state = read_u8(r)?;
        if u32::from(max_state) > kiln_core::MAX_STATE {
            return Err(CheckpointError::Malformed {
                detail: format!("record state depth {max_state}"),
            });
        }
        records.push(Some(RecordManifest {
            declarer,
            value_type,
            max_state,
        }));
    }

    Ok(CheckpointManifest {
        num_states,
        names,
        stateful,
        records,
    })
}

// ── Value blocks ────────────────────────────────────────────────

/// Writes shape parameters, point count and values.
pub type EncodeFn = fn(&mut dyn Write, &Points<f64>) -> Result<(), CheckpointError>;

/// Reads what the matching [`EncodeFn`] wrote.
pub type DecodeFn = fn(&mut dyn Read) -> Result<Points<f64>, CheckpointError>;

/// Encoder and decoder for one value shape.
#[derive(Clone, Copy, Debug)]
pub struct ShapeCodec {
    /// Shape family name, for diagnostics.
    pub name: &'static str,
    /// Encoder.
    pub encode: EncodeFn,
    /// Decoder.
    pub decode: DecodeFn,
}

/// Shape tag → codec lookup, built once and read-only afterwards.
#[derive(Debug)]
pub struct CodecTable {
    codecs: Vec<Option<ShapeCodec>>,
}

impl CodecTable {
    /// An empty table.
    pub fn new() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Register `codec` under `tag`, replacing any previous entry.
    pub fn register(&mut self, tag: u8, codec: ShapeCodec) {
        let i = tag as usize;
        if i >= self.codecs.len() {
            self.codecs.resize(i + 1, None);
        }
        self.codecs[i] = Some(codec);
    }

    /// The process-wide table with codecs for every [`ValueKind`].
    pub fn standard() -> &'static CodecTable {
        static TABLE: OnceLock<CodecTable> = OnceLock::new();
        TABLE.get_or_init(|| {
            let mut table = CodecTable::new();
            table.register(ValueKind::Scalar.tag(), SCALAR);
            table.register(ValueKind::Vector { dims: 0 }.tag(), VECTOR);
            table.register(ValueKind::Tensor { rows: 0, cols: 0 }.tag(), TENSOR);
            table.register(ValueKind::Sequence.tag(), SEQUENCE);
            table
        })
    }

    /// Codec for `tag`.
    pub fn get(&self, tag: u8) -> Option<&ShapeCodec> {
        self.codecs.get(tag as usize)?.as_ref()
    }

    /// Write `values` as `[tag][shape params][n_points][values]`.
    ///
    /// Dual values are written as their primal parts.
    pub fn encode_values(&self, w: &mut dyn Write, values: &PropertyValues) -> Result<(), CheckpointError> {
        let tag = values.kind().tag();
        let codec = self.get(tag).ok_or(CheckpointError::UnknownShapeTag { tag })?;
        let points = match values.data() {
            PointData::Plain(p) => Cow::Borrowed(p),
            dual @ PointData::Dual(_) => Cow::Owned(dual.to_plain()),
        };
        write_u8(w, tag)?;
        (codec.encode)(w, &points)
    }

    /// Read one value block written by [`encode_values`](Self::encode_values).
    pub fn decode_points(&self, r: &mut dyn Read) -> Result<Points<f64>, CheckpointError> {
        let tag = read_u8(r)?;
        let codec = self.get(tag).ok_or(CheckpointError::UnknownShapeTag { tag })?;
        (codec.decode)(r)
    }

    /// Read one value block as plain values of property `id`.
    pub fn decode_values(&self, r: &mut dyn Read, id: PropertyId) -> Result<PropertyValues, CheckpointError> {
        let points = self.decode_points(r)?;
        Ok(PropertyValues::from_data(id, PointData::Plain(points)))
    }
}

impl Default for CodecTable {
    fn default() -> Self {
        Self::new()
    }
}

const SCALAR: ShapeCodec = ShapeCodec {
    name: "scalar",
    encode: encode_scalar,
    decode: decode_scalar,
};

const VECTOR: ShapeCodec = ShapeCodec {
    name: "vector",
    encode: encode_vector,
    decode: decode_vector,
};

const TENSOR: ShapeCodec = ShapeCodec {
    name: "tensor",
    encode: encode_tensor,
    decode: decode_tensor,
};

const SEQUENCE: ShapeCodec = ShapeCodec {
    name: "sequence",
    encode: encode_sequence,
    decode: decode_sequence,
};

fn wrong_shape(expected: &str, points: &Points<f64>) -> CheckpointError {
    CheckpointError::Malformed {
        detail: format!("{expected} codec given {} values", points.kind()),
    }
}

fn write_flat(w: &mut dyn Write, n_points: usize, data: &[f64]) -> Result<(), CheckpointError> {
    write_len(w, n_points)?;
    for &v in data {
        write_f64_le(w, v)?;
    }
    Ok(())
}

fn encode_scalar(w: &mut dyn Write, points: &Points<f64>) -> Result<(), CheckpointError> {
    let Points::Scalar(data) = points else {
        return Err(wrong_shape("scalar", points));
    };
    write_flat(w, data.len(), data)
}

fn decode_scalar(r: &mut dyn Read) -> Result<Points<f64>, CheckpointError> {
    let n = read_len(r)?;
    Ok(Points::Scalar(read_f64s(r, n)?))
}

fn encode_vector(w: &mut dyn Write, points: &Points<f64>) -> Result<(), CheckpointError> {
    let Points::Vector { dims, data } = points else {
        return Err(wrong_shape("vector", points));
    };
    write_u32_le(w, *dims)?;
    write_flat(w, points.len(), data)
}

fn decode_vector(r: &mut dyn Read) -> Result<Points<f64>, CheckpointError> {
    let dims = read_u32_le(r)?;
    let n = read_len(r)?;
    let data = read_f64s(r, n * dims as usize)?;
    Ok(Points::Vector { dims, data })
}

fn encode_tensor(w: &mut dyn Write, points: &Points<f64>) -> Result<(), CheckpointError> {
    let Points::Tensor { rows, cols, data } = points else {
        return Err(wrong_shape("tensor", points));
    };
    write_u32_le(w, *rows)?;
    write_u32_le(w, *cols)?;
    write_flat(w, points.len(), data)
}

fn decode_tensor(r: &mut dyn Read) -> Result<Points<f64>, CheckpointError> {
    let rows = read_u32_le(r)?;
    let cols = read_u32_le(r)?;
    let n = read_len(r)?;
    let data = read_f64s(r, n * rows as usize * cols as usize)?;
    Ok(Points::Tensor { rows, cols, data })
}

fn encode_sequence(w: &mut dyn Write, points: &Points<f64>) -> Result<(), CheckpointError> {
    let Points::Sequence(per_point) = points else {
        return Err(wrong_shape("sequence", points));
    };
    write_len(w, per_point.len())?;
    for values in per_point {
        write_len(w, values.len())?;
        for &v in values {
            write_f64_le(w, v)?;
        }
    }
    Ok(())
}

fn decode_sequence(r: &mut dyn Read) -> Result<Points<f64>, CheckpointError> {
    let n = read_len(r)?;
    let mut per_point = Vec::with_capacity(n.min(1 << 16));
    for _ in 0..n {
        let len = read_len(r)?;
        per_point.push(read_f64s(r, len)?);
    }
    Ok(Points::Sequence(per_point))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{Dual, PropertyType};

    fn manifest() -> CheckpointManifest {
        CheckpointManifest {
            num_states: 2,
            names: vec!["plastic_strain".into(), "density".into()],
            stateful: vec![0],
            records: vec![
                Some(RecordManifest {
                    declarer: Some(Declarer::new("J2Plasticity", "steel")),
                    value_type: "tensor<3x3>".into(),
                    max_state: 1,
                }),
                None,
            ],
        }
    }

    #[test]
    fn manifest_roundtrip() {
        let mut buf = Vec::new();
        encode_manifest(&mut buf, &manifest()).unwrap();
        assert_eq!(&buf[..4], b"KILN");
        let decoded = decode_manifest(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, manifest());
    }

    #[test]
    fn bad_magic_rejected() {
        let data = b"XILN\x01";
        assert!(matches!(
            decode_manifest(&mut data.as_slice()),
            Err(CheckpointError::InvalidMagic)
        ));
    }

    #[test]
    fn future_version_rejected() {
        let mut buf = Vec::new();
        encode_manifest(&mut buf, &manifest()).unwrap();
        buf[4] = FORMAT_VERSION + 1;
        assert!(matches!(
            decode_manifest(&mut buf.as_slice()),
            Err(CheckpointError::UnsupportedVersion { found }) if found == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn dangling_stateful_id_rejected() {
        let mut m = manifest();
        m.stateful = vec![7];
        let mut buf = Vec::new();
        encode_manifest(&mut buf, &m).unwrap();
        assert!(matches!(
            decode_manifest(&mut buf.as_slice()),
            Err(CheckpointError::Malformed { .. })
        ));
    }

    #[test]
    fn every_shape_roundtrips() {
        let table = CodecTable::standard();
        let id = PropertyId(3);
        let kinds = [
            PropertyType::scalar(),
            PropertyType::vector(3),
            PropertyType::tensor(2, 3),
            PropertyType::sequence(),
        ];
        for ty in kinds {
            let mut values = PropertyValues::new(id, ty, 4);
            match values.points_mut::<f64>().unwrap() {
                Points::Sequence(per_point) => {
                    for (i, p) in per_point.iter_mut().enumerate() {
                        p.extend((0..i).map(|j| j as f64 * 0.5));
                    }
                }
                other => {
                    for (i, v) in other.as_flat_mut().unwrap().iter_mut().enumerate() {
                        *v = i as f64 + 0.25;
                    }
                }
            }
            let mut buf = Vec::new();
            table.encode_values(&mut buf, &values).unwrap();
            let decoded = table.decode_values(&mut buf.as_slice(), id).unwrap();
            assert_eq!(decoded, values, "{ty}");
        }
    }

    #[test]
    fn dual_values_store_primal_parts() {
        let id = PropertyId(0);
        let mut values = PropertyValues::new(id, PropertyType::scalar().dual(), 2);
        values.scalars_mut::<Dual>().unwrap()[1] = Dual::new(2.5, [1.0, -1.0]);
        let mut buf = Vec::new();
        CodecTable::standard().encode_values(&mut buf, &values).unwrap();
        let decoded = CodecTable::standard()
            .decode_values(&mut buf.as_slice(), id)
            .unwrap();
        assert_eq!(decoded.scalars::<f64>().unwrap(), &[0.0, 2.5]);
    }

    #[test]
    fn unknown_tag_rejected() {
        let data = [9u8, 0, 0, 0, 0];
        assert!(matches!(
            CodecTable::standard().decode_points(&mut data.as_slice()),
            Err(CheckpointError::UnknownShapeTag { tag: 9 })
        ));
    }

    #[test]
    fn truncated_block_is_io_error() {
        let mut buf = Vec::new();
        let values = PropertyValues::new(PropertyId(0), PropertyType::vector(2), 3);
        CodecTable::standard().encode_values(&mut buf, &values).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            CodecTable::standard().decode_points(&mut buf.as_slice()),
            Err(CheckpointError::Io(_))
        ));
    }
}
