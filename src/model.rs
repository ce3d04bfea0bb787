/// Model loading: TFLite flatbuffer header validation and the operator set.
///
/// The interpreter is an external collaborator, but rejecting an incompatible
/// model before the arena is allocated only needs the flatbuffer root table,
/// which is read here without copying.
use core::fmt;

use heapless::Vec;

/// TFLite file identifier, bytes 4..8 of every model.
pub const FILE_IDENTIFIER: &[u8; 4] = b"TFL3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaError {
    /// Fewer bytes than a flatbuffer header.
    TooShort,
    /// Bytes 4..8 are not `TFL3`.
    BadIdentifier,
    /// An offset points outside the buffer.
    Malformed,
    Version { found: u32, expected: u32 },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::TooShort => write!(f, "model too short"),
            SchemaError::BadIdentifier => write!(f, "not a TFLite model"),
            SchemaError::Malformed => write!(f, "model flatbuffer malformed"),
            SchemaError::Version { found, expected } => write!(
                f,
                "model is schema version {} not equal to supported version {}",
                found, expected
            ),
        }
    }
}

/// A validated, borrowed model image.
#[derive(Debug, Clone, Copy)]
pub struct Model<'a> {
    bytes: &'a [u8],
    version: u32,
}

impl<'a> Model<'a> {
    /// Map a model image. No copying; only the root table is read.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, SchemaError> {
        if bytes.len() < 8 {
            return Err(SchemaError::TooShort);
        }
        if &bytes[4..8] != FILE_IDENTIFIER {
            return Err(SchemaError::BadIdentifier);
        }

        let root = read_u32(bytes, 0)? as usize;
        // Table starts with a signed offset back to its vtable.
        let vtable_rel = read_u32(bytes, root)? as i32 as i64;
        let vtable = root as i64 - vtable_rel;
        if vtable < 0 {
            return Err(SchemaError::Malformed);
        }
        let vtable = vtable as usize;
        let vtable_len = read_u16(bytes, vtable)? as usize;

        // Field 0 of Model is `version`; an absent field means the default 0.
        let version = if vtable_len > 4 {
            match read_u16(bytes, vtable + 4)? {
                0 => 0,
                field => read_u32(bytes, root + field as usize)?,
            }
        } else {
            0
        };

        Ok(Self { bytes, version })
    }

    /// Parse and require a specific schema version.
    pub fn load(bytes: &'a [u8], expected: u32) -> Result<Self, SchemaError> {
        let model = Self::parse(bytes)?;
        if model.version != expected {
            return Err(SchemaError::Version {
                found: model.version,
                expected,
            });
        }
        Ok(model)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, SchemaError> {
    let end = at.checked_add(4).ok_or(SchemaError::Malformed)?;
    let raw = bytes.get(at..end).ok_or(SchemaError::Malformed)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, SchemaError> {
    let end = at.checked_add(2).ok_or(SchemaError::Malformed)?;
    let raw = bytes.get(at..end).ok_or(SchemaError::Malformed)?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

/// Kernels the interpreter can be asked to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Quantize,
    Reshape,
    FullyConnected,
    Softmax,
    Dequantize,
    Mean,
    Conv2D,
    DepthwiseConv2D,
    MaxPool2D,
    Mul,
    Add,
}

impl Op {
    /// Bit position used when handing the op set across FFI.
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpResolverError {
    /// More ops than the resolver was sized for.
    Full,
    Duplicate(Op),
}

impl fmt::Display for OpResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpResolverError::Full => write!(f, "op resolver full"),
            OpResolverError::Duplicate(op) => write!(f, "op {:?} registered twice", op),
        }
    }
}

/// Fixed-capacity set of kernels for one model graph.
#[derive(Debug, Clone)]
pub struct OpResolver<const N: usize> {
    ops: Vec<Op, N>,
}

impl<const N: usize> OpResolver<N> {
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn from_ops(ops: &[Op]) -> Result<Self, OpResolverError> {
        let mut resolver = Self::new();
        for &op in ops {
            resolver.add(op)?;
        }
        Ok(resolver)
    }

    pub fn add(&mut self, op: Op) -> Result<(), OpResolverError> {
        if self.ops.contains(&op) {
            return Err(OpResolverError::Duplicate(op));
        }
        self.ops.push(op).map_err(|_| OpResolverError::Full)
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// All registered ops as a bitmask of [`Op::bit`].
    pub fn mask(&self) -> u32 {
        self.ops.iter().fold(0, |m, op| m | op.bit())
    }
}

impl<const N: usize> Default for OpResolver<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Smallest flatbuffer a TFLite header parser accepts: root table at 16 with
/// a single `version` field. Shared with the startup tests.
#[cfg(test)]
pub(crate) fn test_model(version: u32) -> [u8; 24] {
    let mut m = [0u8; 24];
    m[0..4].copy_from_slice(&16u32.to_le_bytes());
    m[4..8].copy_from_slice(FILE_IDENTIFIER);
    // vtable at 8: 6 bytes long, table 8 bytes, field 0 at +4
    m[8..10].copy_from_slice(&6u16.to_le_bytes());
    m[10..12].copy_from_slice(&8u16.to_le_bytes());
    m[12..14].copy_from_slice(&4u16.to_le_bytes());
    // table at 16: soffset back to the vtable
    m[16..20].copy_from_slice(&8i32.to_le_bytes());
    m[20..24].copy_from_slice(&version.to_le_bytes());
    m
}
