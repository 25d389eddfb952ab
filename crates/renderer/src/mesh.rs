use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::gpu::{GraphicsBackend, MeshId, VertexAttribute, VertexLayout};
use crate::shader::LocationTable;
use crate::types::Attribute;

/// Interleaved quad vertex: clip-space position followed by texture coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Unit quad covering clip space, UV (0,0) at the bottom-left corner.
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        position: [-1.0, -1.0],
        uv: [0.0, 0.0],
    },
    Vertex {
        position: [1.0, -1.0],
        uv: [1.0, 0.0],
    },
    Vertex {
        position: [1.0, 1.0],
        uv: [1.0, 1.0],
    },
    Vertex {
        position: [-1.0, 1.0],
        uv: [0.0, 1.0],
    },
];

/// Two counter-clockwise triangles.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;
const UV_OFFSET: u32 = std::mem::size_of::<[f32; 2]>() as u32;

/// Immutable vertex and index data uploaded once.
#[derive(Debug)]
pub struct StaticMesh {
    id: MeshId,
    index_count: u32,
}

impl StaticMesh {
    /// Uploads `vertices` and `indices`, binding each attribute the program
    /// actually uses. Attributes without a location are left out of the
    /// layout.
    pub fn create<B: GraphicsBackend>(
        backend: &mut B,
        vertices: &[Vertex],
        indices: &[u16],
        locations: &LocationTable,
    ) -> Self {
        let layout = vertex_layout(locations);
        let id = backend.create_mesh(bytemuck::cast_slice(vertices), indices, &layout);
        debug!(
            vertices = vertices.len(),
            indices = indices.len(),
            attributes = layout.attributes.len(),
            "static mesh uploaded"
        );
        Self {
            id,
            index_count: indices.len() as u32,
        }
    }

    /// The canonical full-screen quad.
    pub fn quad<B: GraphicsBackend>(backend: &mut B, locations: &LocationTable) -> Self {
        Self::create(backend, &QUAD_VERTICES, &QUAD_INDICES, locations)
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

fn vertex_layout(locations: &LocationTable) -> VertexLayout {
    let attributes = Attribute::ALL
        .into_iter()
        .filter_map(|attribute| {
            let location = locations.attribute(attribute)?;
            let offset = match attribute {
                Attribute::Position => 0,
                Attribute::Uv => UV_OFFSET,
            };
            Some(VertexAttribute {
                location,
                components: 2,
                offset,
            })
        })
        .collect();
    VertexLayout {
        stride: STRIDE,
        attributes,
    }
}
