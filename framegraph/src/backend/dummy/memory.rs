//! Simulated GPU memory for the dummy backend.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::backend::{HeapCategory, MemoryLocation};
use crate::error::GraphicsError;
use crate::types::{ResourceDescriptor, ResourceState, TextureFormat};

/// Byte pattern fresh heaps are filled with, so reads of memory nothing wrote
/// are easy to spot.
pub const UNINITIALIZED_BYTE: u8 = 0xCD;

/// A heap backed by a CPU byte array.
#[derive(Debug)]
pub struct DummyHeap {
    id: u64,
    category: HeapCategory,
    bytes: Mutex<Vec<u8>>,
}

impl DummyHeap {
    pub(super) fn new(id: u64, category: HeapCategory, size: u64) -> Self {
        Self {
            id,
            category,
            bytes: Mutex::new(vec![UNINITIALIZED_BYTE; size as usize]),
        }
    }

    /// Backend-unique identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Category the heap was created for.
    pub fn category(&self) -> HeapCategory {
        self.category
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.lock().len() as u64
    }
}

/// Where the bytes of a dummy resource live.
#[derive(Debug)]
pub enum DummyMemory {
    /// Placed in a shared heap.
    Placed { heap: Arc<DummyHeap>, offset: u64 },
    /// Dedicated memory.
    Committed {
        bytes: Mutex<Vec<u8>>,
        location: MemoryLocation,
    },
}

/// A simulated texture or buffer.
#[derive(Debug)]
pub struct DummyResource {
    id: u64,
    descriptor: ResourceDescriptor,
    memory: DummyMemory,
    size: u64,
    creation_state: ResourceState,
    state: Mutex<ResourceState>,
}

impl DummyResource {
    pub(super) fn new(
        id: u64,
        descriptor: ResourceDescriptor,
        memory: DummyMemory,
        initial_state: ResourceState,
    ) -> Self {
        let size = descriptor.byte_size();
        Self {
            id,
            descriptor,
            memory,
            size,
            creation_state: initial_state,
            state: Mutex::new(initial_state),
        }
    }

    /// Backend-unique identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Descriptor the resource was created from.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Tightly packed size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Memory backing the resource.
    pub fn memory(&self) -> &DummyMemory {
        &self.memory
    }

    /// Heap id and byte range for placed resources.
    pub fn placement(&self) -> Option<(u64, std::ops::Range<u64>)> {
        match &self.memory {
            DummyMemory::Placed { heap, offset } => {
                Some((heap.id(), *offset..*offset + self.size))
            }
            DummyMemory::Committed { .. } => None,
        }
    }

    /// State the simulated device believes the resource is in.
    pub fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    pub(super) fn creation_state(&self) -> ResourceState {
        self.creation_state
    }

    pub(super) fn set_state(&self, state: ResourceState) {
        *self.state.lock() = state;
    }

    /// Read `len` bytes starting at `offset` within the resource.
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>, GraphicsError> {
        self.check_range(offset, len)?;
        let (start, end) = (offset as usize, (offset + len) as usize);
        Ok(match &self.memory {
            DummyMemory::Placed { heap, offset: base } => {
                let base = *base as usize;
                heap.bytes.lock()[base + start..base + end].to_vec()
            }
            DummyMemory::Committed { bytes, .. } => bytes.lock()[start..end].to_vec(),
        })
    }

    /// Write `data` at `offset` within the resource.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        self.check_range(offset, data.len() as u64)?;
        let (start, end) = (offset as usize, offset as usize + data.len());
        match &self.memory {
            DummyMemory::Placed { heap, offset: base } => {
                let base = *base as usize;
                heap.bytes.lock()[base + start..base + end].copy_from_slice(data);
            }
            DummyMemory::Committed { bytes, .. } => bytes.lock()[start..end].copy_from_slice(data),
        }
        Ok(())
    }

    /// Fill the whole resource with a repeating texel pattern.
    pub fn fill(&self, pattern: &[u8]) -> Result<(), GraphicsError> {
        if pattern.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "empty fill pattern".to_string(),
            ));
        }
        let data: Vec<u8> = pattern
            .iter()
            .copied()
            .cycle()
            .take(self.size as usize)
            .collect();
        self.write(0, &data)
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<(), GraphicsError> {
        if offset + len > self.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "range {}..{} outside of resource {} ({} bytes)",
                offset,
                offset + len,
                self.id,
                self.size
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Clear value encoding
// ============================================================================

fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn linear_to_srgb(value: f32) -> f32 {
    let value = value.clamp(0.0, 1.0);
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

/// Convert an `f32` to IEEE 754 half precision bits, truncating the mantissa.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exponent == 0xff {
        let nan = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }

    let half_exponent = exponent - 127 + 15;
    if half_exponent >= 0x1f {
        return sign | 0x7c00;
    }
    if half_exponent <= 0 {
        if half_exponent < -10 {
            return sign;
        }
        let mantissa = mantissa | 0x0080_0000;
        let shift = (14 - half_exponent) as u32;
        return sign | (mantissa >> shift) as u16;
    }
    sign | ((half_exponent as u16) << 10) | (mantissa >> 13) as u16
}

/// Bytes of one texel of `format` cleared to `color`.
pub fn encode_color(format: TextureFormat, color: [f32; 4]) -> Result<Vec<u8>, GraphicsError> {
    let [r, g, b, a] = color;
    let bytes = match format {
        TextureFormat::R8Unorm => vec![unorm8(r)],
        TextureFormat::R8Uint => vec![r.max(0.0) as u8],
        TextureFormat::Rg8Unorm => vec![unorm8(r), unorm8(g)],
        TextureFormat::R16Float => f32_to_f16_bits(r).to_le_bytes().to_vec(),
        TextureFormat::R32Float => r.to_le_bytes().to_vec(),
        TextureFormat::R32Uint => (r.max(0.0) as u32).to_le_bytes().to_vec(),
        TextureFormat::Rgba8Unorm => vec![unorm8(r), unorm8(g), unorm8(b), unorm8(a)],
        TextureFormat::Rgba8UnormSrgb => vec![
            unorm8(linear_to_srgb(r)),
            unorm8(linear_to_srgb(g)),
            unorm8(linear_to_srgb(b)),
            unorm8(a),
        ],
        TextureFormat::Bgra8Unorm => vec![unorm8(b), unorm8(g), unorm8(r), unorm8(a)],
        TextureFormat::Bgra8UnormSrgb => vec![
            unorm8(linear_to_srgb(b)),
            unorm8(linear_to_srgb(g)),
            unorm8(linear_to_srgb(r)),
            unorm8(a),
        ],
        TextureFormat::Rgba16Float => [r, g, b, a]
            .iter()
            .flat_map(|c| f32_to_f16_bits(*c).to_le_bytes())
            .collect(),
        TextureFormat::Rg32Float => bytemuck::cast_slice(&[r, g]).to_vec(),
        TextureFormat::Rgba32Float => bytemuck::cast_slice(&color).to_vec(),
        TextureFormat::Depth16Unorm
        | TextureFormat::Depth24PlusStencil8
        | TextureFormat::Depth32Float
        | TextureFormat::Depth32FloatStencil8 => {
            return Err(GraphicsError::InvalidParameter(format!(
                "color clear of depth format {:?}",
                format
            )));
        }
    };
    Ok(bytes)
}

/// Bytes of one texel of depth `format` cleared to `depth` and `stencil`.
pub fn encode_depth_stencil(
    format: TextureFormat,
    depth: f32,
    stencil: u8,
) -> Result<Vec<u8>, GraphicsError> {
    let depth = depth.clamp(0.0, 1.0);
    let bytes = match format {
        TextureFormat::Depth16Unorm => ((depth * 65535.0).round() as u16).to_le_bytes().to_vec(),
        TextureFormat::Depth24PlusStencil8 => {
            let packed = (depth * 16_777_215.0).round() as u32 | ((stencil as u32) << 24);
            packed.to_le_bytes().to_vec()
        }
        TextureFormat::Depth32Float => depth.to_le_bytes().to_vec(),
        TextureFormat::Depth32FloatStencil8 => {
            let mut bytes = depth.to_le_bytes().to_vec();
            bytes.extend_from_slice(&[stencil, 0, 0, 0]);
            bytes
        }
        _ => {
            return Err(GraphicsError::InvalidParameter(format!(
                "depth clear of color format {:?}",
                format
            )));
        }
    };
    Ok(bytes)
}
