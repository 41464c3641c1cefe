// src/assets/catalog.rs
// Static asset identifier tables: textures, materials, meshes

use std::collections::HashMap;

use crate::mesh::{self, Geometry};
use crate::proto::{self, material::Side};

pub const TEXTURE_STONE: u64 = 1;
pub const MATERIAL_STONE: u64 = 1;
pub const MESH_CYLINDER: u64 = 1;
pub const MESH_UNIT_BOX: u64 = 2;

/// Physical properties attached to a material id
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalProperties {
    pub density: f64,
}

/// Read-only lookup tables, built once at startup
pub struct AssetCatalog {
    textures: HashMap<u64, &'static str>,
    materials: HashMap<u64, (proto::Material, PhysicalProperties)>,
    meshes: HashMap<u64, Geometry>,
}

impl AssetCatalog {
    pub fn builtin() -> Self {
        let textures = HashMap::from([(TEXTURE_STONE, "stone")]);

        let stone = proto::Material {
            texture_id: TEXTURE_STONE,
            side: Side::DoubleSide as i32,
            flat_shaded: true,
            ..Default::default()
        };
        let materials = HashMap::from([(MATERIAL_STONE, (stone, PhysicalProperties { density: 1.0 }))]);

        let meshes = HashMap::from([
            (MESH_CYLINDER, mesh::cylinder(24)),
            (MESH_UNIT_BOX, mesh::cuboid(1.0, 1.0, 1.0)),
        ]);

        Self { textures, materials, meshes }
    }

    /// File stem for a texture id, e.g. `stone` for `stone.png`
    pub fn texture_name(&self, id: u64) -> Option<&'static str> {
        self.textures.get(&id).copied()
    }

    pub fn material(&self, id: u64) -> Option<&proto::Material> {
        self.materials.get(&id).map(|(m, _)| m)
    }

    pub fn physical_properties(&self, id: u64) -> Option<PhysicalProperties> {
        self.materials.get(&id).map(|(_, p)| *p)
    }

    pub fn mesh(&self, id: u64) -> Option<&Geometry> {
        self.meshes.get(&id)
    }
}

impl Default for AssetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
