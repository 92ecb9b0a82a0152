//! Fingerprinted binary files: the shortcut graph (`.hsgr`), the core
//! marker (`.core`), the level cache (`.level`) and the preprocessor
//! inputs. All fields are little-endian; every file starts with the same
//! fingerprint and format version.

use std::{
    fs::File,
    io::{BufReader, BufWriter, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use crate::{
    collections::chunked_vec::ChunkedVec,
    error::ContractionError,
    graphs::{EdgeData, InputEdge, Level, QueryEdge},
};

const FINGERPRINT: [u8; 4] = *b"CHGR";
const FORMAT_VERSION: u32 = 1;

const QUERY_EDGE_RECORD_BYTES: usize = 21;

fn encode_query_edge(edge: &QueryEdge) -> [u8; QUERY_EDGE_RECORD_BYTES] {
    let mut record = [0u8; QUERY_EDGE_RECORD_BYTES];
    record[0..4].copy_from_slice(&edge.source.to_le_bytes());
    record[4..8].copy_from_slice(&edge.target.to_le_bytes());
    record[8..12].copy_from_slice(&edge.data.weight.to_le_bytes());
    record[12..16].copy_from_slice(&edge.data.duration.to_le_bytes());
    record[16] = edge.data.forward as u8
        | (edge.data.backward as u8) << 1
        | (edge.data.shortcut as u8) << 2;
    record[17..21].copy_from_slice(&edge.data.turn_or_middle.to_le_bytes());
    record
}

fn decode_query_edge(record: &[u8; QUERY_EDGE_RECORD_BYTES]) -> QueryEdge {
    let u32_at = |offset: usize| {
        u32::from_le_bytes([
            record[offset],
            record[offset + 1],
            record[offset + 2],
            record[offset + 3],
        ])
    };
    let packed_flags = record[16];
    QueryEdge {
        source: u32_at(0),
        target: u32_at(4),
        data: EdgeData {
            weight: u32_at(8),
            duration: u32_at(12),
            turn_or_middle: u32_at(17),
            shortcut: packed_flags & 0b100 != 0,
            forward: packed_flags & 0b001 != 0,
            backward: packed_flags & 0b010 != 0,
        },
    }
}

/// CRC32 of the canonical edge records, exactly as they are laid out in the
/// shortcut graph file. Identical inputs produce identical checksums.
pub fn edge_checksum<'a>(edges: impl Iterator<Item = &'a QueryEdge>) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for edge in edges {
        hasher.update(&encode_query_edge(edge));
    }
    hasher.finalize()
}

struct FileWriter {
    inner: BufWriter<File>,
    path: PathBuf,
}

impl FileWriter {
    fn create(path: &Path) -> Result<Self, ContractionError> {
        let file = File::create(path).map_err(|source| ContractionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = FileWriter {
            inner: BufWriter::new(file),
            path: path.to_path_buf(),
        };
        writer.write_bytes(&FINGERPRINT)?;
        writer.write_u32(FORMAT_VERSION)?;
        Ok(writer)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ContractionError> {
        self.inner
            .write_all(bytes)
            .map_err(|source| ContractionError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn write_u32(&mut self, value: u32) -> Result<(), ContractionError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_u64(&mut self, value: u64) -> Result<(), ContractionError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_f32(&mut self, value: f32) -> Result<(), ContractionError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn finish(mut self) -> Result<(), ContractionError> {
        self.inner.flush().map_err(|source| ContractionError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

struct FileReader {
    inner: BufReader<File>,
    path: PathBuf,
}

impl FileReader {
    /// Opens the file and verifies fingerprint and format version.
    fn open(path: &Path) -> Result<Self, ContractionError> {
        let file = File::open(path).map_err(|source| ContractionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = FileReader {
            inner: BufReader::new(file),
            path: path.to_path_buf(),
        };

        let mut fingerprint = [0u8; 4];
        reader.read_bytes(&mut fingerprint)?;
        if fingerprint != FINGERPRINT {
            return Err(ContractionError::BadFingerprint {
                path: path.to_path_buf(),
            });
        }

        let version = reader.read_u32()?;
        if version != FORMAT_VERSION {
            return Err(ContractionError::UnsupportedVersion {
                path: path.to_path_buf(),
                version,
            });
        }

        Ok(reader)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<(), ContractionError> {
        self.inner
            .read_exact(buffer)
            .map_err(|source| match source.kind() {
                ErrorKind::UnexpectedEof => ContractionError::Truncated {
                    path: self.path.clone(),
                },
                _ => ContractionError::Io {
                    path: self.path.clone(),
                    source,
                },
            })
    }

    fn read_u8(&mut self) -> Result<u8, ContractionError> {
        let mut buffer = [0u8; 1];
        self.read_bytes(&mut buffer)?;
        Ok(buffer[0])
    }

    fn read_u32(&mut self) -> Result<u32, ContractionError> {
        let mut buffer = [0u8; 4];
        self.read_bytes(&mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    fn read_u64(&mut self) -> Result<u64, ContractionError> {
        let mut buffer = [0u8; 8];
        self.read_bytes(&mut buffer)?;
        Ok(u64::from_le_bytes(buffer))
    }

    fn read_i32(&mut self) -> Result<i32, ContractionError> {
        let mut buffer = [0u8; 4];
        self.read_bytes(&mut buffer)?;
        Ok(i32::from_le_bytes(buffer))
    }

    fn read_f32(&mut self) -> Result<f32, ContractionError> {
        let mut buffer = [0u8; 4];
        self.read_bytes(&mut buffer)?;
        Ok(f32::from_le_bytes(buffer))
    }
}

/// Writes the shortcut graph file, draining the edge stream chunk by chunk.
pub fn write_graph(
    path: &Path,
    checksum: u32,
    number_of_vertices: u32,
    edges: ChunkedVec<QueryEdge>,
) -> Result<(), ContractionError> {
    let mut writer = FileWriter::create(path)?;
    writer.write_u32(checksum)?;
    writer.write_u32(number_of_vertices)?;
    writer.write_u64(edges.len() as u64)?;
    for edge in edges {
        writer.write_bytes(&encode_query_edge(&edge))?;
    }
    writer.finish()
}

/// Reads the shortcut graph file back, recomputing and verifying the
/// stored checksum.
pub fn read_graph(path: &Path) -> Result<(u32, u32, Vec<QueryEdge>), ContractionError> {
    let mut reader = FileReader::open(path)?;
    let checksum = reader.read_u32()?;
    let number_of_vertices = reader.read_u32()?;
    let number_of_edges = reader.read_u64()?;

    let mut edges = Vec::with_capacity(number_of_edges as usize);
    let mut record = [0u8; QUERY_EDGE_RECORD_BYTES];
    for _ in 0..number_of_edges {
        reader.read_bytes(&mut record)?;
        edges.push(decode_query_edge(&record));
    }

    let actual = edge_checksum(edges.iter());
    if actual != checksum {
        return Err(ContractionError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: checksum,
            actual,
        });
    }

    Ok((checksum, number_of_vertices, edges))
}

/// Little-endian packed bitset, one bit per vertex.
pub fn write_core_marker(path: &Path, is_core: &[bool]) -> Result<(), ContractionError> {
    let mut writer = FileWriter::create(path)?;
    writer.write_u32(is_core.len() as u32)?;

    let mut packed = vec![0u8; is_core.len().div_ceil(8)];
    for (vertex, &core) in is_core.iter().enumerate() {
        if core {
            packed[vertex / 8] |= 1 << (vertex % 8);
        }
    }
    writer.write_bytes(&packed)?;
    writer.finish()
}

pub fn read_core_marker(path: &Path) -> Result<Vec<bool>, ContractionError> {
    let mut reader = FileReader::open(path)?;
    let number_of_vertices = reader.read_u32()? as usize;

    let mut packed = vec![0u8; number_of_vertices.div_ceil(8)];
    reader.read_bytes(&mut packed)?;

    Ok((0..number_of_vertices)
        .map(|vertex| packed[vertex / 8] & (1 << (vertex % 8)) != 0)
        .collect())
}

/// Levels are persisted as 32-bit floats so later runs can reuse them as
/// cached priorities.
pub fn write_levels(path: &Path, node_levels: &[Level]) -> Result<(), ContractionError> {
    let mut writer = FileWriter::create(path)?;
    writer.write_u32(node_levels.len() as u32)?;
    for &level in node_levels {
        writer.write_f32(level as f32)?;
    }
    writer.finish()
}

pub fn read_levels(path: &Path) -> Result<Vec<f32>, ContractionError> {
    let mut reader = FileReader::open(path)?;
    let number_of_vertices = reader.read_u32()? as usize;
    (0..number_of_vertices)
        .map(|_| reader.read_f32())
        .collect()
}

pub fn write_node_weights(path: &Path, node_weights: &[u32]) -> Result<(), ContractionError> {
    write_u32_array(path, node_weights)
}

pub fn read_node_weights(path: &Path) -> Result<Vec<u32>, ContractionError> {
    read_u32_array(path)
}

pub fn write_node_classes(path: &Path, node_classes: &[u32]) -> Result<(), ContractionError> {
    write_u32_array(path, node_classes)
}

pub fn read_node_classes(path: &Path) -> Result<Vec<u32>, ContractionError> {
    read_u32_array(path)
}

/// The profile properties the preprocessor cares about: the excludable
/// class masks, one filter pass per mask.
pub fn write_profile_properties(
    path: &Path,
    excludable_classes: &[u32],
) -> Result<(), ContractionError> {
    write_u32_array(path, excludable_classes)
}

pub fn read_profile_properties(path: &Path) -> Result<Vec<u32>, ContractionError> {
    read_u32_array(path)
}

/// Input edge records carry `forward` and `backward` as two separate bytes,
/// unlike the packed flag byte of the shortcut graph records.
pub fn write_input_edges(path: &Path, edges: &[InputEdge]) -> Result<(), ContractionError> {
    let mut writer = FileWriter::create(path)?;
    writer.write_u64(edges.len() as u64)?;
    for edge in edges {
        writer.write_u32(edge.source)?;
        writer.write_u32(edge.target)?;
        writer.write_bytes(&edge.weight.to_le_bytes())?;
        writer.write_bytes(&edge.duration.to_le_bytes())?;
        writer.write_bytes(&[edge.forward as u8])?;
        writer.write_bytes(&[edge.backward as u8])?;
        writer.write_u32(edge.turn_id)?;
    }
    writer.finish()
}

pub fn read_input_edges(path: &Path) -> Result<Vec<InputEdge>, ContractionError> {
    let mut reader = FileReader::open(path)?;
    let number_of_edges = reader.read_u64()?;

    let mut edges = Vec::with_capacity(number_of_edges as usize);
    for _ in 0..number_of_edges {
        let source = reader.read_u32()?;
        let target = reader.read_u32()?;
        let weight = reader.read_i32()?;
        let duration = reader.read_i32()?;
        let forward = reader.read_u8()? != 0;
        let backward = reader.read_u8()? != 0;
        let turn_id = reader.read_u32()?;
        edges.push(InputEdge {
            source,
            target,
            weight,
            duration,
            forward,
            backward,
            turn_id,
        });
    }

    Ok(edges)
}

fn write_u32_array(path: &Path, values: &[u32]) -> Result<(), ContractionError> {
    let mut writer = FileWriter::create(path)?;
    writer.write_u32(values.len() as u32)?;
    for &value in values {
        writer.write_u32(value)?;
    }
    writer.finish()
}

fn read_u32_array(path: &Path) -> Result<Vec<u32>, ContractionError> {
    let mut reader = FileReader::open(path)?;
    let len = reader.read_u32()? as usize;
    (0..len).map(|_| reader.read_u32()).collect()
}
